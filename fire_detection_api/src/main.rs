use fire_detection_api::{config::get_configuration, start_app, telemetry::init_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = get_configuration()?;
    init_tracing(config.log_level);

    start_app(config).await
}
