//! The six cube faces in atlas order and the quad-to-direction mapping.

use glam::{UVec2, Vec3};

use crate::constants::FACE_GRID_COLUMNS;
use crate::error::LayoutError;

/// A cube-map face, numbered in the order tiles are packed into the atlas.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum CubeFace {
    /// +X face
    PosX = 0,
    /// +Y face
    PosY = 1,
    /// +Z face
    PosZ = 2,
    /// −X face
    NegX = 3,
    /// −Y face
    NegY = 4,
    /// −Z face
    NegZ = 5,
}

impl CubeFace {
    /// All six faces in packing order.
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PosX,
        CubeFace::PosY,
        CubeFace::PosZ,
        CubeFace::NegX,
        CubeFace::NegY,
        CubeFace::NegZ,
    ];

    /// Packing index of this face (0..6).
    #[must_use]
    pub fn index(self) -> u32 {
        self as u32
    }

    /// Look up a face by packing index.
    pub fn from_index(index: u32) -> Result<CubeFace, LayoutError> {
        CubeFace::ALL
            .get(index as usize)
            .copied()
            .ok_or(LayoutError::InvalidFaceIndex(index))
    }

    /// The opposite face (e.g., `PosX` → `NegX`).
    #[must_use]
    pub fn opposite(self) -> CubeFace {
        match self {
            CubeFace::PosX => CubeFace::NegX,
            CubeFace::NegX => CubeFace::PosX,
            CubeFace::PosY => CubeFace::NegY,
            CubeFace::NegY => CubeFace::PosY,
            CubeFace::PosZ => CubeFace::NegZ,
            CubeFace::NegZ => CubeFace::PosZ,
        }
    }

    /// Outward-pointing unit normal for this face.
    #[must_use]
    pub fn normal(self) -> Vec3 {
        match self {
            CubeFace::PosX => Vec3::X,
            CubeFace::NegX => Vec3::NEG_X,
            CubeFace::PosY => Vec3::Y,
            CubeFace::NegY => Vec3::NEG_Y,
            CubeFace::PosZ => Vec3::Z,
            CubeFace::NegZ => Vec3::NEG_Z,
        }
    }

    /// Column/row of this face inside a sublevel's 3×2 grid.
    #[must_use]
    pub fn grid_cell(self) -> UVec2 {
        let i = self.index();
        UVec2::new(i % FACE_GRID_COLUMNS, i / FACE_GRID_COLUMNS)
    }

    /// Short lowercase name (`px`, `py`, `pz`, `nx`, `ny`, `nz`).
    #[must_use]
    pub fn short_name(self) -> &'static str {
        match self {
            CubeFace::PosX => "px",
            CubeFace::PosY => "py",
            CubeFace::PosZ => "pz",
            CubeFace::NegX => "nx",
            CubeFace::NegY => "ny",
            CubeFace::NegZ => "nz",
        }
    }
}

/// Map a tile-local quad coordinate to the unit direction sampled from the cube.
///
/// `(u, v)` are in `[0, 1]` with `v` growing along atlas rows; the vertical axis
/// is flipped (`t = -(2v - 1)`) so that row 0 of a tile is the top of its face.
#[must_use]
pub fn face_direction(face: CubeFace, u: f32, v: f32) -> Vec3 {
    let s = 2.0 * u - 1.0;
    let t = -(2.0 * v - 1.0);
    let dir = match face {
        CubeFace::PosX => Vec3::new(1.0, t, -s),
        CubeFace::PosY => Vec3::new(s, 1.0, t),
        CubeFace::PosZ => Vec3::new(s, t, 1.0),
        CubeFace::NegX => Vec3::new(-1.0, t, s),
        CubeFace::NegY => Vec3::new(s, -1.0, -t),
        CubeFace::NegZ => Vec3::new(-s, t, -1.0),
    };
    dir.normalize()
}

/// Inverse of [`face_direction`]: find the face a direction hits and the quad
/// coordinate on that face.
///
/// Ties on the major axis resolve in favour of X, then Y. Returns `None` for a
/// zero or non-finite direction.
#[must_use]
pub fn direction_to_face_uv(dir: Vec3) -> Option<(CubeFace, f32, f32)> {
    if !dir.is_finite() || dir.length_squared() == 0.0 {
        return None;
    }
    let abs = dir.abs();
    let (face, s, t) = if abs.x >= abs.y && abs.x >= abs.z {
        if dir.x > 0.0 {
            (CubeFace::PosX, -dir.z / abs.x, dir.y / abs.x)
        } else {
            (CubeFace::NegX, dir.z / abs.x, dir.y / abs.x)
        }
    } else if abs.y >= abs.z {
        if dir.y > 0.0 {
            (CubeFace::PosY, dir.x / abs.y, dir.z / abs.y)
        } else {
            (CubeFace::NegY, dir.x / abs.y, -dir.z / abs.y)
        }
    } else if dir.z > 0.0 {
        (CubeFace::PosZ, dir.x / abs.z, dir.y / abs.z)
    } else {
        (CubeFace::NegZ, -dir.x / abs.z, dir.y / abs.z)
    };
    let u = (s + 1.0) * 0.5;
    let v = (1.0 - t) * 0.5;
    Some((face, u.clamp(0.0, 1.0), v.clamp(0.0, 1.0)))
}
