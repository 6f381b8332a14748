//! Layout error types.

/// Errors raised when a base face size cannot produce a valid atlas layout.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    /// The base face size is zero or not a power of two.
    #[error("base face size {0} is not a positive power of two")]
    NotPowerOfTwo(u32),

    /// The base face size is a power of two but too small to hold a single LOD.
    #[error("base face size {size} yields {lod_count} LODs; at least one is required")]
    TooSmall { size: u32, lod_count: i64 },

    /// The atlas for this base face size does not fit in a `u32` edge.
    #[error("base face size {0} is too large for an atlas")]
    TooLarge(u32),

    /// A requested LOD count is zero or exceeds what the base size supports.
    #[error("requested {requested} LODs but base face size supports 1..={max}")]
    LodCountOutOfRange { requested: u32, max: u32 },

    /// A face index outside `0..6`.
    #[error("face index {0} out of range (expected 0..6)")]
    InvalidFaceIndex(u32),
}
