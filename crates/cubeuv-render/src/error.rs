//! Error types for atlas construction and the composite pass.

use cubeuv_layout::LayoutError;

use crate::encoding::TextureEncoding;

/// Invalid input or misuse; never retried.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigurationError {
    /// The base face size cannot produce an atlas layout.
    #[error("invalid atlas layout: {0}")]
    Layout(#[from] LayoutError),

    /// No cube maps were supplied.
    #[error("cube LOD set is empty")]
    EmptyLodSet,

    /// Fewer cube maps than the layout needs.
    #[error("atlas needs {expected} cube LODs but {actual} were supplied")]
    MissingLods { expected: u32, actual: u32 },

    /// A LOD is not half the width of the one before it.
    #[error("cube LOD {index} is {actual}px wide, expected {expected}px")]
    NonHalvingLod {
        index: usize,
        expected: u32,
        actual: u32,
    },

    /// The source encoding has no composite-safe equivalent.
    #[error("{0:?} encoding cannot be written by the composite pass")]
    UnsupportedEncoding(TextureEncoding),

    /// An encoding name that is not recognised at all.
    #[error("unknown texture encoding '{0}'")]
    UnknownEncoding(String),

    /// Face pixel data does not match the declared face size.
    #[error("cube face data has {actual} texels, expected {expected}")]
    FaceDataSize { expected: usize, actual: usize },

    /// The packer's resources were already released.
    #[error("packer has been disposed")]
    Disposed,
}

/// Errors surfaced by [`CubeUvPacker`](crate::CubeUvPacker) and device implementations.
#[derive(Debug, thiserror::Error)]
pub enum CompositeError {
    /// Invalid configuration or use after disposal.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// A target, quad, or per-tile resource could not be allocated.
    #[error("failed to allocate {what}: {reason}")]
    ResourceAllocation { what: &'static str, reason: String },

    /// The atlas target could not be bound for drawing.
    #[error("failed to bind render target: {reason}")]
    TargetBind { reason: String },

    /// Reading the atlas back to host memory failed.
    #[error("atlas readback failed: {0}")]
    Readback(String),
}

impl From<LayoutError> for CompositeError {
    fn from(err: LayoutError) -> Self {
        CompositeError::Configuration(ConfigurationError::Layout(err))
    }
}

impl CompositeError {
    /// Whether this error is a configuration error (as opposed to a resource failure).
    pub fn is_configuration(&self) -> bool {
        matches!(self, CompositeError::Configuration(_))
    }
}
