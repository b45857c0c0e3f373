//! Image handler: downscale for upload, no text.

use super::{Adapted, WorkingCopy};
use crate::error::ExtractError;
use image::{DynamicImage, ImageFormat, ImageReader};
use std::path::Path;

/// Max dimension for uploaded images
const MAX_DIMENSION: u32 = 1024;

pub(super) fn adapt(path: &Path) -> Result<Adapted, ExtractError> {
    let img = ImageReader::open(path)
        .map_err(|e| ExtractError::io(path, e))?
        .with_guessed_format()
        .map_err(|e| ExtractError::io(path, e))?
        .decode()?;

    let (width, height) = (img.width(), img.height());
    let img = resize_if_needed(img);
    tracing::debug!(
        "[Content] Image {}x{} -> {}x{}",
        width,
        height,
        img.width(),
        img.height()
    );

    let temp = tempfile::Builder::new()
        .prefix("fileai-")
        .suffix(".png")
        .tempfile()
        .map_err(ExtractError::WorkingCopy)?;
    img.save_with_format(temp.path(), ImageFormat::Png)?;

    Ok(Adapted {
        text: None,
        working_copy: Some(WorkingCopy::from_temp_path(temp.into_temp_path())),
    })
}

/// Fit within MAX_DIMENSION on both sides, preserving aspect ratio
fn resize_if_needed(img: DynamicImage) -> DynamicImage {
    let (width, height) = (img.width(), img.height());

    if width <= MAX_DIMENSION && height <= MAX_DIMENSION {
        return img;
    }

    let scale = MAX_DIMENSION as f32 / width.max(height) as f32;
    let new_width = ((width as f32 * scale) as u32).max(1);
    let new_height = ((height as f32 * scale) as u32).max(1);

    img.resize_exact(new_width, new_height, image::imageops::FilterType::Lanczos3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use tempfile::TempDir;

    fn write_png(path: &Path, width: u32, height: u32) {
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 0]));
        img.save(path).unwrap();
    }

    #[test]
    fn test_large_image_is_downscaled_preserving_aspect() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("photo.png");
        write_png(&path, 2048, 1024);

        let adapted = adapt(&path).unwrap();
        let copy = adapted.working_copy.unwrap();
        assert_eq!(copy.mime_type(), "image/png");

        let out = image::open(copy.path()).unwrap();
        assert_eq!((out.width(), out.height()), (1024, 512));
        assert!(adapted.text.is_none());
    }

    #[test]
    fn test_small_image_keeps_dimensions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("icon.png");
        write_png(&path, 64, 32);

        let adapted = adapt(&path).unwrap();
        let out = image::open(adapted.working_copy.unwrap().path()).unwrap();
        assert_eq!((out.width(), out.height()), (64, 32));
    }

    #[test]
    fn test_corrupt_image_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"definitely not a jpeg").unwrap();
        assert!(adapt(&path).is_err());
    }
}
