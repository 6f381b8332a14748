//! Writing the composited atlas to disk.

use std::path::Path;

use cubeuv_render::{AtlasImage, PixelFormat};

use crate::error::BakeError;

/// Save the atlas as PNG: 8 bits per channel for `Rgba8Unorm`, 16 otherwise.
///
/// Channels are clamped to `[0, 1]`; HDR atlases should use an RGBM/RGBD encoding.
pub fn write_atlas_png(
    atlas: &AtlasImage,
    format: PixelFormat,
    path: &Path,
) -> Result<(), BakeError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| BakeError::ImageWrite {
            path: path.to_path_buf(),
            source: image::ImageError::IoError(e),
        })?;
    }

    let size = atlas.size();
    let result = match format {
        PixelFormat::Rgba8Unorm => {
            image::RgbaImage::from_fn(size, size, |x, y| {
                image::Rgba(atlas.pixel(x, y).map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8))
            })
            .save(path)
        }
        PixelFormat::Rgba16Float => {
            image::ImageBuffer::<image::Rgba<u16>, Vec<u16>>::from_fn(size, size, |x, y| {
                image::Rgba(
                    atlas
                        .pixel(x, y)
                        .map(|c| (c.clamp(0.0, 1.0) * 65535.0).round() as u16),
                )
            })
            .save(path)
        }
    };
    result.map_err(|source| BakeError::ImageWrite {
        path: path.to_path_buf(),
        source,
    })?;

    log::info!("Wrote {size}x{size} atlas to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgba8_atlas_round_trips_through_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("atlas.png");
        let mut atlas = AtlasImage::new(4);
        atlas.set_pixel(1, 2, [1.0, 0.5, 0.0, 1.0]);
        write_atlas_png(&atlas, PixelFormat::Rgba8Unorm, &path).unwrap();

        let loaded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(loaded.dimensions(), (4, 4));
        assert_eq!(loaded.get_pixel(1, 2).0, [255, 128, 0, 255]);
        assert_eq!(loaded.get_pixel(0, 0).0, [0, 0, 0, 0]);
    }

    #[test]
    fn test_rgba16_atlas_is_sixteen_bit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("atlas.png");
        let mut atlas = AtlasImage::new(2);
        atlas.set_pixel(0, 0, [2.0, 0.25, 0.0, 1.0]);
        write_atlas_png(&atlas, PixelFormat::Rgba16Float, &path).unwrap();

        let loaded = image::open(&path).unwrap();
        assert_eq!(loaded.color(), image::ColorType::Rgba16);
        let pixel = loaded.to_rgba16().get_pixel(0, 0).0;
        assert_eq!(pixel[0], 65535);
        assert_eq!(pixel[1], 16384);
    }
}
