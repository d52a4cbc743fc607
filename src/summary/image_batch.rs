//! Image batches: accepted containers, layout normalization, PNG payloads.

use std::any::type_name;

use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};
use ndarray::{Array4, ArrayBase, ArrayD, ArrayView3, Data, Dimension, Ix4};

use crate::{Error, Result};

/// Images per batch written to the event stream, as `tf.summary.image`'s
/// default `max_outputs`.
pub const MAX_IMAGE_OUTPUTS: usize = 3;

/// A pixel component convertible to 8-bit.
pub trait Pixel: Copy {
    /// Convert to `u8`. Floats are read as `[0, 1]` and saturate.
    fn to_u8(self) -> u8;
}

impl Pixel for u8 {
    fn to_u8(self) -> u8 {
        self
    }
}

impl Pixel for f32 {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn to_u8(self) -> u8 {
        // Same scale as tf.image.convert_image_dtype(saturate=True); NaN maps to 0.
        (self * 255.5).clamp(0.0, 255.0) as u8
    }
}

impl Pixel for f64 {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn to_u8(self) -> u8 {
        (self * 255.5).clamp(0.0, 255.0) as u8
    }
}

/// Anything that may be handed to `log_images`.
///
/// Shaped `ndarray` arrays of [`Pixel`] values are accepted at any rank (the
/// rank is checked later); flat buffers carry no shape and are refused.
pub trait ImageSource {
    /// Convert to a dynamic-rank array of 8-bit pixels.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedImageType` if the container has no shape.
    fn to_pixels(&self) -> Result<ArrayD<u8>>;
}

impl<S, D> ImageSource for ArrayBase<S, D>
where
    S: Data,
    S::Elem: Pixel,
    D: Dimension,
{
    fn to_pixels(&self) -> Result<ArrayD<u8>> {
        Ok(self.mapv(Pixel::to_u8).into_dyn())
    }
}

impl<P: Pixel> ImageSource for [P] {
    fn to_pixels(&self) -> Result<ArrayD<u8>> {
        Err(Error::UnsupportedImageType(type_name::<Self>().to_string()))
    }
}

impl<P: Pixel> ImageSource for Vec<P> {
    fn to_pixels(&self) -> Result<ArrayD<u8>> {
        Err(Error::UnsupportedImageType(type_name::<Self>().to_string()))
    }
}

/// Check rank 4 and bring the batch into `[b, h, w, c]` order.
///
/// With `channel_first` the input is `[b, c, h, w]`; axes 1 and 3 are
/// swapped, then 1 and 2.
///
/// # Errors
///
/// Returns `InvalidImageShape` if the rank is not 4.
pub fn to_nhwc(pixels: ArrayD<u8>, channel_first: bool) -> Result<Array4<u8>> {
    let shape = pixels.shape().to_vec();
    let mut batch = pixels.into_dimensionality::<Ix4>().map_err(|_| {
        Error::InvalidImageShape(format!("expected rank 4, got shape {shape:?}"))
    })?;
    if channel_first {
        batch.swap_axes(1, 3);
        batch.swap_axes(1, 2);
    }
    Ok(batch)
}

/// PNG-encode one `[h, w, c]` image.
///
/// # Errors
///
/// Returns `InvalidImageShape` for an empty image or a channel count other
/// than 1, 3 or 4, and `Image` if encoding fails.
pub fn encode_png(image: ArrayView3<'_, u8>) -> Result<Vec<u8>> {
    let (height, width, channels) = image.dim();
    let color = match channels {
        1 => ExtendedColorType::L8,
        3 => ExtendedColorType::Rgb8,
        4 => ExtendedColorType::Rgba8,
        other => {
            return Err(Error::InvalidImageShape(format!(
                "expected 1, 3 or 4 channels, got {other}"
            )))
        }
    };
    if height == 0 || width == 0 {
        return Err(Error::InvalidImageShape(format!(
            "image of size {height}x{width} is empty"
        )));
    }
    let too_large = |n: usize| Error::InvalidImageShape(format!("dimension {n} too large"));
    let png_height = u32::try_from(height).map_err(|_| too_large(height))?;
    let png_width = u32::try_from(width).map_err(|_| too_large(width))?;

    // iter() walks logical order, so swapped (non-contiguous) views are fine.
    let raw: Vec<u8> = image.iter().copied().collect();
    let mut png = Vec::new();
    PngEncoder::new(&mut png).write_image(&raw, png_width, png_height, color)?;
    Ok(png)
}
