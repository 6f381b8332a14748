//! Cube LOD pyramids: loaded from face PNGs or generated procedurally.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use cubeuv_layout::{CubeFace, lod_count_for};
use cubeuv_render::{CubeImage, CubeLod, CubeLodSet, CubeTextureInfo};
use glam::{Vec3, Vec4};

use crate::error::BakeError;

/// Path of one face image: `<dir>/lod{L}_{face}.png`.
pub fn face_path(dir: &Path, lod: usize, face: CubeFace) -> PathBuf {
    dir.join(format!("lod{lod}_{}.png", face.short_name()))
}

/// Load every consecutive LOD found in `dir`, starting at `lod0`.
///
/// Texels are kept as stored; decoding follows `info.encoding` at composite time.
pub fn load_lod_set(
    dir: &Path,
    info: CubeTextureInfo,
) -> Result<CubeLodSet<Arc<CubeImage>>, BakeError> {
    let mut lods = Vec::new();
    while face_path(dir, lods.len(), CubeFace::PosX).exists() {
        let cube = load_cube(dir, lods.len())?;
        log::debug!("Loaded LOD {} ({}px faces)", lods.len(), cube.face_size());
        lods.push(CubeLod {
            face_size: cube.face_size(),
            texture: Arc::new(cube),
        });
    }
    if lods.is_empty() {
        return Err(BakeError::NoLods(dir.to_path_buf()));
    }
    log::info!("Loaded {} cube LODs from {}", lods.len(), dir.display());
    Ok(CubeLodSet::new(lods, info)?)
}

fn load_cube(dir: &Path, lod: usize) -> Result<CubeImage, BakeError> {
    let mut face_size = None;
    let mut faces: [Vec<[f32; 4]>; 6] = Default::default();
    for face in CubeFace::ALL {
        let path = face_path(dir, lod, face);
        if !path.exists() {
            return Err(BakeError::MissingFace(path));
        }
        let image = image::open(&path)
            .map_err(|source| BakeError::ImageRead {
                path: path.clone(),
                source,
            })?
            .to_rgba32f();
        let (width, height) = image.dimensions();
        let expected = *face_size.get_or_insert(width);
        if width != height || width != expected {
            return Err(BakeError::FaceSize {
                path,
                width,
                height,
                expected,
            });
        }
        faces[face.index() as usize] = image.pixels().map(|p| p.0).collect();
    }
    Ok(CubeImage::new(face_size.unwrap_or(0), faces)?)
}

/// Linear HDR radiance of the built-in test sky.
pub fn sky_radiance(dir: Vec3) -> Vec4 {
    let zenith = Vec3::new(0.15, 0.35, 0.9);
    let horizon = Vec3::new(0.85, 0.9, 1.0);
    let ground = Vec3::new(0.25, 0.2, 0.15);
    let sun_dir = Vec3::new(0.4, 0.6, 0.7).normalize();

    let sky = if dir.y >= 0.0 {
        horizon.lerp(zenith, dir.y.sqrt())
    } else {
        horizon.lerp(ground, (-dir.y).sqrt().min(1.0))
    };
    let sun = dir.dot(sun_dir).max(0.0).powf(256.0) * 20.0;
    (sky + Vec3::splat(sun)).extend(1.0)
}

/// A pyramid of the built-in sky with as many LODs as `base_face_size` allows,
/// stored in `info.encoding`.
pub fn procedural_lod_set(
    base_face_size: u32,
    info: CubeTextureInfo,
) -> Result<CubeLodSet<Arc<CubeImage>>, BakeError> {
    let lod_count = lod_count_for(base_face_size).map_err(cubeuv_render::ConfigurationError::from)?;
    let lods = (0..lod_count)
        .map(|lod| {
            let size = base_face_size >> lod;
            CubeLod {
                texture: Arc::new(CubeImage::from_direction_fn(size, |dir| {
                    info.encoding.encode(sky_radiance(dir))
                })),
                face_size: size,
            }
        })
        .collect();
    log::info!("Generated procedural sky: {lod_count} LODs from {base_face_size}px");
    Ok(CubeLodSet::new(lods, info)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_face(dir: &Path, lod: usize, face: CubeFace, size: u32) {
        let image = image::RgbaImage::from_fn(size, size, |x, _| {
            image::Rgba([(x * 8) as u8, face.index() as u8 * 40, 0, 255])
        });
        image.save(face_path(dir, lod, face)).unwrap();
    }

    #[test]
    fn test_face_path_naming() {
        let path = face_path(Path::new("sky"), 2, CubeFace::NegZ);
        assert_eq!(path, Path::new("sky").join("lod2_nz.png"));
    }

    #[test]
    fn test_loads_consecutive_lods() {
        let dir = tempfile::tempdir().unwrap();
        for (lod, size) in [32, 16].into_iter().enumerate() {
            for face in CubeFace::ALL {
                write_face(dir.path(), lod, face, size);
            }
        }
        let set = load_lod_set(dir.path(), CubeTextureInfo::default()).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.base_face_size(), 32);
        let cube = &set.get(0).unwrap().texture;
        let texel = cube.texel(CubeFace::NegX, 1, 0);
        assert!((texel.y - 120.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_dir_has_no_lods() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_lod_set(dir.path(), CubeTextureInfo::default()).unwrap_err();
        assert!(matches!(err, BakeError::NoLods(_)));
    }

    #[test]
    fn test_missing_face_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        for face in CubeFace::ALL.iter().take(5) {
            write_face(dir.path(), 0, *face, 16);
        }
        let err = load_lod_set(dir.path(), CubeTextureInfo::default()).unwrap_err();
        match err {
            BakeError::MissingFace(path) => assert!(path.ends_with("lod0_nz.png")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_mismatched_face_size_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        for face in CubeFace::ALL {
            let size = if face == CubeFace::PosZ { 8 } else { 16 };
            write_face(dir.path(), 0, face, size);
        }
        let err = load_lod_set(dir.path(), CubeTextureInfo::default()).unwrap_err();
        assert!(matches!(
            err,
            BakeError::FaceSize {
                width: 8,
                expected: 16,
                ..
            }
        ));
    }

    #[test]
    fn test_procedural_set_halves() {
        let set = procedural_lod_set(64, CubeTextureInfo::default()).unwrap();
        let sizes: Vec<u32> = set.iter().map(|l| l.face_size).collect();
        assert_eq!(sizes, vec![64, 32, 16, 8]);
    }

    #[test]
    fn test_procedural_set_rejects_bad_base() {
        let err = procedural_lod_set(48, CubeTextureInfo::default()).unwrap_err();
        assert!(matches!(err, BakeError::Configuration(_)));
    }

    #[test]
    fn test_sun_is_brighter_than_sky() {
        let sun = sky_radiance(Vec3::new(0.4, 0.6, 0.7).normalize());
        let sky = sky_radiance(Vec3::Y);
        assert!(sun.x > 10.0 && sky.x < 1.0);
    }
}
