//! Packing constants for the CubeUV atlas.
//!
//! Shading code that reads the atlas addresses tiles with these exact values,
//! so changing any of them changes the on-GPU layout.

/// The atlas is square with a side of `ATLAS_SCALE × base_face_size`.
pub const ATLAS_SCALE: u32 = 4;

/// `lod_count = floor(log2(base_face_size)) - LOD_COUNT_BIAS`.
///
/// Three doublings of headroom are reserved for the finest LOD's own mip
/// cascade, which leaves this many LOD rows stacked in the atlas.
pub const LOD_COUNT_BIAS: u32 = 2;

/// Faces at or below this width get a single sublevel and stop halving.
pub const MIN_MIP_CHAIN_FACE_SIZE: u32 = 16;

/// Number of sublevels packed for a LOD whose face width exceeds
/// [`MIN_MIP_CHAIN_FACE_SIZE`].
pub const MIP_SUBLEVELS: u32 = 6;

/// Number of cube faces per sublevel.
pub const FACES_PER_SUBLEVEL: u32 = 6;

/// Starting divisor for the per-LOD horizontal centering offset.
pub const INITIAL_CENTERING_DIVISOR: f32 = 4.0;

/// Horizontal step applied after each sublevel, in units of that sublevel's face size.
pub const MIP_OFFSET_X_FACTOR: f32 = 1.25;

/// Vertical step applied after each sublevel, in units of that sublevel's face size.
pub const MIP_OFFSET_Y_FACTOR: f32 = 1.75;

/// Vertical step between LOD rows, in units of the LOD's starting face size.
pub const LOD_ROW_FACTOR: f32 = 2.0;

/// Faces are laid out in a grid of this many columns (and two rows).
pub const FACE_GRID_COLUMNS: u32 = 3;
