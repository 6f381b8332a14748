//! CubeUV atlas geometry: tile placement for a cube-map LOD pyramid and the
//! per-face direction mapping used to resample each tile.

pub mod constants;
mod error;
mod face;
mod planner;
mod tile;

pub use error::LayoutError;
pub use face::{CubeFace, direction_to_face_uv, face_direction};
pub use planner::{AtlasLayout, lod_count_for, plan, plan_with_lods};
pub use tile::{AtlasSpec, Tile, TileRect};
