use crate::error::{RenderError, Result};
use image::{ImageFormat, Rgba32FImage, RgbaImage};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tessera_fb::{BufferKind, FrameBuffer};

/// Snapshot of the color buffer as 8-bit RGBA.
pub fn color_image(fb: &FrameBuffer<'_>) -> Result<RgbaImage> {
    let mapping = fb.map_buffer(BufferKind::Color).ok_or(RenderError::NoColor)?;
    let extent = mapping.extent();
    let bytes = mapping.to_rgba8();
    fb.unmap(mapping)?;
    RgbaImage::from_raw(extent.width, extent.height, bytes).ok_or(RenderError::ImageSize {
        width: extent.width,
        height: extent.height,
    })
}

/// Snapshot of the color buffer as float RGBA. Packed colors are divided by 255.
pub fn color_image_f32(fb: &FrameBuffer<'_>) -> Result<Rgba32FImage> {
    let mapping = fb.map_buffer(BufferKind::Color).ok_or(RenderError::NoColor)?;
    let extent = mapping.extent();
    let values = mapping.to_rgba32f();
    fb.unmap(mapping)?;
    Rgba32FImage::from_raw(extent.width, extent.height, values).ok_or(RenderError::ImageSize {
        width: extent.width,
        height: extent.height,
    })
}

/// Writes the color buffer, choosing the encoding from the file extension. OpenEXR
/// keeps float values; everything else is quantized to 8 bits.
///
/// The image is written next to `path` under a temporary name and renamed into
/// place; the temporary file is removed if either step fails.
pub fn write_color(path: &Path, fb: &FrameBuffer<'_>) -> Result<()> {
    let format = ImageFormat::from_path(path)?;
    let tmp = temp_path(path);
    let saved = match format {
        ImageFormat::OpenExr => color_image_f32(fb)?.save_with_format(&tmp, format),
        _ => color_image(fb)?.save_with_format(&tmp, format),
    };
    let written = saved
        .map_err(RenderError::from)
        .and_then(|()| fs::rename(&tmp, path).map_err(RenderError::from));
    if written.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    written
}

/// Hidden sibling of `path` used while an output file is being written.
pub fn temp_path(path: &Path) -> PathBuf {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("output");
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    parent.join(format!(".{}.part-{}-{}", file_name, std::process::id(), stamp))
}
