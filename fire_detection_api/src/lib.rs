mod routes;
mod server;
pub mod telemetry;

pub mod app;
pub mod config;

pub use app::start_app;
