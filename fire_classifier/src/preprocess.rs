use crate::{config::ImageConfig, error::PredictorError};
use image::imageops::FilterType;
use ndarray::{Array, Ix4};

/// Decodes an encoded image and lays it out as a normalized `[1, 3, size, size]` tensor.
pub fn image_to_tensor(
    image_data: &[u8],
    image_config: &ImageConfig,
) -> Result<Array<f32, Ix4>, PredictorError> {
    let image_reader = image::ImageReader::new(std::io::Cursor::new(image_data))
        .with_guessed_format()
        .map_err(|e| PredictorError::InvalidImage(e.to_string()))?;

    let original_img = image_reader
        .decode()
        .map_err(|e| PredictorError::InvalidImage(e.to_string()))?;

    let size = image_config.size;
    let img = original_img
        .resize_exact(size, size, FilterType::CatmullRom)
        .to_rgb8();

    let [mean_r, mean_g, mean_b] = image_config.mean;
    let [std_r, std_g, std_b] = image_config.std;

    let mut input = Array::zeros((1, 3, size as usize, size as usize));
    for (x, y, pixel) in img.enumerate_pixels() {
        let x = x as usize;
        let y = y as usize;
        let [r, g, b] = pixel.0;
        input[[0, 0, y, x]] = ((r as f32) / 255. - mean_r) / std_r;
        input[[0, 1, y, x]] = ((g as f32) / 255. - mean_g) / std_g;
        input[[0, 2, y, x]] = ((b as f32) / 255. - mean_b) / std_b;
    }

    Ok(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use std::io::Cursor;

    fn encode_png(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
        let img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(width, height, Rgb(color));
        let mut cursor = Cursor::new(Vec::new());
        img.write_to(&mut cursor, image::ImageFormat::Png).unwrap();
        cursor.into_inner()
    }

    #[test]
    fn test_image_to_tensor_shape() {
        let image_config = ImageConfig {
            size: 32,
            ..ImageConfig::default()
        };

        let input = image_to_tensor(&encode_png(100, 60, [255, 0, 0]), &image_config).unwrap();

        assert_eq!(input.shape(), &[1, 3, 32, 32]);
    }

    #[test]
    fn test_image_to_tensor_normalizes_channels() {
        let image_config = ImageConfig {
            size: 4,
            mean: [0.5, 0.5, 0.5],
            std: [0.5, 0.5, 0.5],
        };

        let input = image_to_tensor(&encode_png(4, 4, [255, 0, 255]), &image_config).unwrap();

        assert!((input[[0, 0, 1, 1]] - 1.0).abs() < 1e-5);
        assert!((input[[0, 1, 1, 1]] + 1.0).abs() < 1e-5);
        assert!((input[[0, 2, 3, 0]] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_non_image_is_rejected() {
        let result = image_to_tensor(b"definitely not an image", &ImageConfig::default());
        assert!(matches!(result, Err(PredictorError::InvalidImage(_))));
    }
}
