//! Atlas dimensions and planned tile placements.

use glam::Vec2;

use crate::face::CubeFace;

/// Atlas dimensions derived from the base (LOD 0) face width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtlasSpec {
    /// Face width of LOD 0 in pixels.
    pub base_face_size: u32,
    /// Side length of the square atlas in pixels.
    pub atlas_size: u32,
    /// Number of LOD rows packed into the atlas.
    pub lod_count: u32,
}

/// Integer pixel rectangle of a tile, with row 0 at the top of the atlas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileRect {
    pub x: u32,
    pub y: u32,
    pub size: u32,
}

impl TileRect {
    /// Exclusive right edge.
    pub fn right(&self) -> u32 {
        self.x + self.size
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u32 {
        self.y + self.size
    }

    /// Whether two rectangles share any pixel.
    pub fn overlaps(&self, other: &TileRect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }
}

/// One placed quad: a single face of a single sublevel of a single LOD.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tile {
    /// Source cube map in the LOD pyramid.
    pub lod_index: u32,
    /// 0 for the full-resolution pass of the LOD, increasing as the face halves.
    pub mip_sublevel: u32,
    /// Which cube face this tile resamples.
    pub face: CubeFace,
    /// Quad centre, in atlas units measured from the atlas midpoint.
    pub center: Vec2,
    /// Side length in atlas pixels.
    pub extent: f32,
}

impl Tile {
    /// Top-left corner in atlas pixel space.
    pub fn min_corner(&self, atlas_size: u32) -> Vec2 {
        self.center + Vec2::splat(atlas_size as f32 * 0.5) - Vec2::splat(self.extent * 0.5)
    }

    /// Pixel rectangle covered by this tile.
    ///
    /// Placements are integral for every valid base size, so rounding only
    /// absorbs float noise.
    pub fn rect(&self, atlas_size: u32) -> TileRect {
        let min = self.min_corner(atlas_size).round();
        TileRect {
            x: min.x.max(0.0) as u32,
            y: min.y.max(0.0) as u32,
            size: self.extent.round().max(1.0) as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_edges() {
        let r = TileRect { x: 4, y: 8, size: 16 };
        assert_eq!(r.right(), 20);
        assert_eq!(r.bottom(), 24);
    }

    #[test]
    fn test_adjacent_rects_do_not_overlap() {
        let a = TileRect { x: 0, y: 0, size: 8 };
        let b = TileRect { x: 8, y: 0, size: 8 };
        let c = TileRect { x: 4, y: 4, size: 8 };
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
        assert!(b.overlaps(&c));
    }

    #[test]
    fn test_tile_rect_from_center() {
        let tile = Tile {
            lod_index: 0,
            mip_sublevel: 0,
            face: CubeFace::PosX,
            center: Vec2::new(-192.0, -192.0),
            extent: 128.0,
        };
        assert_eq!(tile.rect(512), TileRect { x: 0, y: 0, size: 128 });
    }
}
