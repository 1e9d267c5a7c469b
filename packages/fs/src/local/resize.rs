use std::path::Path;

use image::imageops::FilterType;
use image::{GenericImageView, ImageFormat, ImageReader};

use crate::{FsError, Result};

/// Decode `input`, rescale bilinearly into the requested box and encode to
/// `output` in the format its extension names.
pub(super) fn resize(input: &Path, output: &Path, width: u32, height: u32) -> Result<()> {
    let format = output_format(output)?;
    let img = ImageReader::open(input)
        .map_err(|e| FsError::io(input.display().to_string(), e))?
        .with_guessed_format()
        .map_err(|e| FsError::io(input.display().to_string(), e))?
        .decode()?;

    let (w, h) = bounds(img.dimensions(), width, height);
    let resized = img.resize_exact(w, h, FilterType::Triangle);
    match format {
        // JPEG has no alpha channel.
        ImageFormat::Jpeg => resized.to_rgb8().save_with_format(output, format)?,
        _ => resized.save_with_format(output, format)?,
    }
    Ok(())
}

fn output_format(output: &Path) -> Result<ImageFormat> {
    let ext = output
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => Ok(ImageFormat::Jpeg),
        "png" => Ok(ImageFormat::Png),
        other => Err(FsError::Unsupported(format!(
            "image output format {:?}",
            other
        ))),
    }
}

/// Both dimensions given: use them. One given: keep the aspect ratio.
/// Neither: keep the source size.
fn bounds((src_w, src_h): (u32, u32), width: u32, height: u32) -> (u32, u32) {
    let scale = |value: u32, num: u32, den: u32| -> u32 {
        if den == 0 {
            return value.max(1);
        }
        ((u64::from(value) * u64::from(num) + u64::from(den) / 2) / u64::from(den)).max(1) as u32
    };
    match (width, height) {
        (0, 0) => (src_w, src_h),
        (w, 0) => (w, scale(src_h, w, src_w)),
        (0, h) => (scale(src_w, h, src_h), h),
        (w, h) => (w, h),
    }
}
