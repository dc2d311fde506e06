use image::imageops::{self, FilterType};
use ndarray::Array4;

use crate::config::TensorLayout;
use crate::error::PredictError;

/// Decodes raw upload bytes into a `[1, ...]` tensor with values in `[0, 1]`.
///
/// The image is stretched to `size x size` without keeping the aspect ratio,
/// matching how the training set was prepared.
pub fn prepare_image(
    bytes: &[u8],
    size: u32,
    layout: TensorLayout,
) -> Result<Array4<f32>, PredictError> {
    let img = image::load_from_memory(bytes).map_err(PredictError::Decode)?;
    let rgb = img.to_rgb8();
    let resized = imageops::resize(&rgb, size, size, FilterType::CatmullRom);

    let side = size as usize;
    let value = |x: usize, y: usize, c: usize| resized[(x as u32, y as u32)][c] as f32 / 255.0;

    let tensor = match layout {
        TensorLayout::Nhwc => {
            Array4::from_shape_fn((1, side, side, 3), |(_, y, x, c)| value(x, y, c))
        }
        TensorLayout::Nchw => {
            Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| value(x, y, c))
        }
    };

    Ok(tensor)
}
