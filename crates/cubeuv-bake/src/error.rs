//! Bake tool error type.

use std::path::PathBuf;

use cubeuv_config::ConfigError;
use cubeuv_render::{CompositeError, ConfigurationError, GpuInitError};

/// Everything that can stop a bake.
#[derive(Debug, thiserror::Error)]
pub enum BakeError {
    /// A face image could not be decoded.
    #[error("failed to read {path}: {source}")]
    ImageRead {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// The atlas PNG could not be written.
    #[error("failed to write {path}: {source}")]
    ImageWrite {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// The input directory holds no `lod0_*` faces.
    #[error("no cube LODs found in {0}")]
    NoLods(PathBuf),

    /// One face of a LOD is missing.
    #[error("missing face image {0}")]
    MissingFace(PathBuf),

    /// A face is not square or differs from the other faces of its LOD.
    #[error("{path} is {width}x{height}, expected {expected}x{expected}")]
    FaceSize {
        path: PathBuf,
        width: u32,
        height: u32,
        expected: u32,
    },

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Composite(#[from] CompositeError),

    /// The GPU backend was requested but no device could be created.
    #[error("GPU backend unavailable: {0}")]
    Device(#[from] GpuInitError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
