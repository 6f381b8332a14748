//! One bake: build the source pyramid, composite it on the chosen backend, and
//! write the atlas.

use std::time::Instant;

use cubeuv_config::{AtlasFormat, BakeBackend, Config};
use cubeuv_render::{
    AtlasImage, CompositeDevice, CompositeError, CubeLodSet, CubeTextureInfo,
    CubeUvPacker, PixelFormat, SoftwareDevice, TextureEncoding, init_wgpu_device_blocking,
    upload_lod_set,
};

use crate::error::BakeError;
use crate::input::{load_lod_set, procedural_lod_set};
use crate::output::write_atlas_png;

/// Summary of a finished bake.
#[derive(Debug, Clone, PartialEq)]
pub struct BakeReport {
    pub atlas_size: u32,
    pub lod_count: u32,
    pub tile_count: usize,
    pub encoding: TextureEncoding,
}

fn pixel_format(format: AtlasFormat) -> PixelFormat {
    match format {
        AtlasFormat::Rgba8 => PixelFormat::Rgba8Unorm,
        AtlasFormat::Rgba16Float => PixelFormat::Rgba16Float,
    }
}

/// Source metadata described by the `atlas` config section.
pub fn source_info(config: &Config) -> Result<CubeTextureInfo, BakeError> {
    let encoding: TextureEncoding = config.atlas.encoding.parse()?;
    Ok(CubeTextureInfo {
        format: pixel_format(config.atlas.format),
        encoding,
        ..Default::default()
    })
}

/// Run the whole bake described by `config`.
pub fn run(config: &Config) -> Result<BakeReport, BakeError> {
    let started = Instant::now();
    let info = source_info(config)?;
    let lods = match &config.bake.input_dir {
        Some(dir) => load_lod_set(dir, info)?,
        None => procedural_lod_set(config.atlas.base_face_size, info)?,
    };

    let (atlas, report) = match config.bake.backend {
        BakeBackend::Software => {
            let mut device = SoftwareDevice::new();
            composite_with(&mut device, &lods, config.atlas.lod_count, |device, packer| {
                device.image(packer.atlas()).cloned().ok_or_else(|| {
                    CompositeError::Readback("atlas target not found".to_string())
                })
            })?
        }
        BakeBackend::Gpu => {
            let mut device = init_wgpu_device_blocking()?;
            let gpu_lods = upload_lod_set(&device, &lods)?;
            composite_with(&mut device, &gpu_lods, config.atlas.lod_count, |device, packer| {
                device.read_atlas(packer.atlas())
            })?
        }
    };

    write_atlas_png(&atlas, info.format, &config.bake.output)?;
    log::info!(
        "Baked {} tiles ({} LODs, {:?}) in {:.2?}",
        report.tile_count,
        report.lod_count,
        report.encoding,
        started.elapsed()
    );
    Ok(report)
}

/// Build a packer, composite once, read the atlas back, then dispose.
fn composite_with<D, F>(
    device: &mut D,
    lods: &CubeLodSet<D::Cube>,
    lod_count: Option<u32>,
    read: F,
) -> Result<(AtlasImage, BakeReport), CompositeError>
where
    D: CompositeDevice,
    F: FnOnce(&D, &CubeUvPacker<D>) -> Result<AtlasImage, CompositeError>,
{
    let mut packer = match lod_count {
        Some(count) => CubeUvPacker::with_lod_count(device, lods, count)?,
        None => CubeUvPacker::new(device, lods)?,
    };
    let composited = packer.composite(device).map(|_| ());
    let result = composited.and_then(|()| read(device, &packer));
    let report = BakeReport {
        atlas_size: packer.layout().spec().atlas_size,
        lod_count: packer.layout().spec().lod_count,
        tile_count: packer.tile_count(),
        encoding: packer.descriptor().encoding,
    };
    packer.dispose(device)?;
    Ok((result?, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cubeuv_config::BakeConfig;

    fn config_in(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.atlas.base_face_size = 32;
        config.bake = BakeConfig {
            input_dir: None,
            output: dir.join("atlas.png"),
            backend: BakeBackend::Software,
        };
        config
    }

    #[test]
    fn test_software_bake_writes_atlas() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let report = run(&config).unwrap();
        assert_eq!(report.atlas_size, 128);
        assert_eq!(report.lod_count, 3);
        assert_eq!(report.tile_count, 48);
        let image = image::open(dir.path().join("atlas.png")).unwrap();
        assert_eq!((image.width(), image.height()), (128, 128));
    }

    #[test]
    fn test_rgbe_bake_reports_rgbm16() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.atlas.encoding = "rgbe".to_string();
        config.atlas.format = AtlasFormat::Rgba8;
        config.atlas.lod_count = Some(1);
        let report = run(&config).unwrap();
        assert_eq!(report.encoding, TextureEncoding::Rgbm16);
        assert_eq!(report.lod_count, 1);
        assert_eq!(report.tile_count, 36);
    }

    #[test]
    fn test_unknown_encoding_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.atlas.encoding = "hdr10".to_string();
        let err = run(&config).unwrap_err();
        assert!(matches!(err, BakeError::Configuration(_)));
        assert!(!dir.path().join("atlas.png").exists());
    }

    #[test]
    fn test_logluv_is_rejected_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.atlas.encoding = "logluv".to_string();
        let err = run(&config).unwrap_err();
        assert!(matches!(err, BakeError::Composite(ref e) if e.is_configuration()));
    }
}
