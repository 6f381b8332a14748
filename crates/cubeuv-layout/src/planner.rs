//! Closed-form placement of every (LOD, sublevel, face) tile in the atlas.
//!
//! Each LOD contributes a diagonal cascade of shrinking 3×2 face grids; LOD rows
//! are stacked below one another. Every tile position is a function of its
//! `(lod, sublevel, face)` triple, so no bin-packing search is involved.

use glam::Vec2;

use crate::constants::{
    ATLAS_SCALE, FACES_PER_SUBLEVEL, INITIAL_CENTERING_DIVISOR, LOD_COUNT_BIAS, LOD_ROW_FACTOR,
    MIN_MIP_CHAIN_FACE_SIZE, MIP_OFFSET_X_FACTOR, MIP_OFFSET_Y_FACTOR, MIP_SUBLEVELS,
};
use crate::error::LayoutError;
use crate::face::CubeFace;
use crate::tile::{AtlasSpec, Tile};

/// The full tile plan for one base face size.
#[derive(Debug, Clone, PartialEq)]
pub struct AtlasLayout {
    spec: AtlasSpec,
    tiles: Vec<Tile>,
    lod_starts: Vec<usize>,
    lod_face_sizes: Vec<u32>,
    lod_sublevels: Vec<u32>,
}

/// Number of LOD rows a base face size supports.
pub fn lod_count_for(base_face_size: u32) -> Result<u32, LayoutError> {
    if !base_face_size.is_power_of_two() {
        return Err(LayoutError::NotPowerOfTwo(base_face_size));
    }
    if base_face_size.checked_mul(ATLAS_SCALE).is_none() {
        return Err(LayoutError::TooLarge(base_face_size));
    }
    let lod_count = i64::from(base_face_size.ilog2()) - i64::from(LOD_COUNT_BIAS);
    if lod_count <= 0 {
        return Err(LayoutError::TooSmall {
            size: base_face_size,
            lod_count,
        });
    }
    Ok(lod_count as u32)
}

/// Plan the atlas for `base_face_size` using every LOD it supports.
pub fn plan(base_face_size: u32) -> Result<AtlasLayout, LayoutError> {
    let lod_count = lod_count_for(base_face_size)?;
    Ok(build(base_face_size, lod_count))
}

/// Plan the atlas for `base_face_size` with only the first `lod_count` LODs.
///
/// Tiles that are planned sit exactly where [`plan`] would put them.
pub fn plan_with_lods(base_face_size: u32, lod_count: u32) -> Result<AtlasLayout, LayoutError> {
    let max = lod_count_for(base_face_size)?;
    if lod_count == 0 || lod_count > max {
        return Err(LayoutError::LodCountOutOfRange {
            requested: lod_count,
            max,
        });
    }
    Ok(build(base_face_size, lod_count))
}

fn build(base_face_size: u32, lod_count: u32) -> AtlasLayout {
    let atlas_size = base_face_size * ATLAS_SCALE;
    let atlas = atlas_size as f32;

    let mut tiles = Vec::with_capacity(expected_tile_count(base_face_size, lod_count));
    let mut lod_starts = Vec::with_capacity(lod_count as usize);
    let mut lod_face_sizes = Vec::with_capacity(lod_count as usize);
    let mut lod_sublevels = Vec::with_capacity(lod_count as usize);

    let mut face_size = base_face_size;
    let mut divisor = INITIAL_CENTERING_DIVISOR;
    let mut offset2 = 0.0_f32;

    for lod_index in 0..lod_count {
        let offset1 = (atlas - atlas / divisor) * 0.5;
        let chained = face_size > MIN_MIP_CHAIN_FACE_SIZE;
        if chained {
            divisor *= 2.0;
        }
        let sublevels = if chained { MIP_SUBLEVELS } else { 1 };

        lod_starts.push(tiles.len());
        lod_face_sizes.push(face_size);
        lod_sublevels.push(sublevels);

        let mut mip_offset = Vec2::ZERO;
        let mut mip_size = face_size as f32;
        for mip_sublevel in 0..sublevels {
            for face in CubeFace::ALL {
                let cell = face.grid_cell().as_vec2();
                let center = Vec2::new(
                    cell.x * mip_size - offset1 + mip_offset.x,
                    cell.y * mip_size - offset1 + offset2 + mip_offset.y,
                );
                tiles.push(Tile {
                    lod_index,
                    mip_sublevel,
                    face,
                    center,
                    extent: mip_size,
                });
            }
            mip_offset.x += MIP_OFFSET_X_FACTOR * mip_size;
            mip_offset.y += MIP_OFFSET_Y_FACTOR * mip_size;
            mip_size *= 0.5;
        }

        offset2 += LOD_ROW_FACTOR * face_size as f32;
        if chained {
            face_size /= 2;
        }
    }

    log::debug!(
        "Planned CubeUV atlas: base {base_face_size}px, atlas {atlas_size}px, {lod_count} LODs, {} tiles",
        tiles.len()
    );

    AtlasLayout {
        spec: AtlasSpec {
            base_face_size,
            atlas_size,
            lod_count,
        },
        tiles,
        lod_starts,
        lod_face_sizes,
        lod_sublevels,
    }
}

/// Closed-form tile count: LODs above the 16 px floor pack six sublevels of six
/// faces, the rest pack one sublevel.
fn expected_tile_count(base_face_size: u32, lod_count: u32) -> usize {
    let floor_log2 = MIN_MIP_CHAIN_FACE_SIZE.ilog2();
    let chained = base_face_size.ilog2().saturating_sub(floor_log2).min(lod_count);
    let single = lod_count - chained;
    ((chained * MIP_SUBLEVELS + single) * FACES_PER_SUBLEVEL) as usize
}

impl AtlasLayout {
    /// Atlas dimensions.
    pub fn spec(&self) -> AtlasSpec {
        self.spec
    }

    /// Every planned tile, ordered by LOD, then sublevel, then face.
    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    /// Closed-form tile count for this layout's base size and LOD count.
    pub fn expected_tile_count(&self) -> usize {
        expected_tile_count(self.spec.base_face_size, self.spec.lod_count)
    }

    /// Starting face width of a LOD, or `None` past the last LOD.
    pub fn lod_face_size(&self, lod_index: u32) -> Option<u32> {
        self.lod_face_sizes.get(lod_index as usize).copied()
    }

    /// Number of sublevels packed for a LOD, or `None` past the last LOD.
    pub fn mip_sublevels(&self, lod_index: u32) -> Option<u32> {
        self.lod_sublevels.get(lod_index as usize).copied()
    }

    /// All tiles belonging to one LOD.
    pub fn lod_tiles(&self, lod_index: u32) -> &[Tile] {
        let Some(&start) = self.lod_starts.get(lod_index as usize) else {
            return &[];
        };
        let end = self
            .lod_starts
            .get(lod_index as usize + 1)
            .copied()
            .unwrap_or(self.tiles.len());
        &self.tiles[start..end]
    }

    /// Look up a single tile by its address.
    pub fn tile(&self, lod_index: u32, mip_sublevel: u32, face: CubeFace) -> Option<&Tile> {
        let start = *self.lod_starts.get(lod_index as usize)?;
        if mip_sublevel >= self.lod_sublevels[lod_index as usize] {
            return None;
        }
        let index = start + (mip_sublevel * FACES_PER_SUBLEVEL + face.index()) as usize;
        self.tiles.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::TileRect;

    fn rects(layout: &AtlasLayout) -> Vec<TileRect> {
        let size = layout.spec().atlas_size;
        layout.tiles().iter().map(|t| t.rect(size)).collect()
    }

    #[test]
    fn test_base_128_example() {
        let layout = plan(128).unwrap();
        assert_eq!(layout.spec().atlas_size, 512);
        assert_eq!(layout.spec().lod_count, 5);
        assert_eq!(layout.mip_sublevels(0), Some(6));
        assert_eq!(layout.lod_tiles(0).len(), 36);
        assert_eq!(layout.tiles().len(), 120);
    }

    #[test]
    fn test_atlas_size_and_tile_count_for_powers_of_two() {
        for exp in 5..=11 {
            let base = 1u32 << exp;
            let layout = plan(base).unwrap();
            assert_eq!(layout.spec().atlas_size, 4 * base);
            assert_eq!(layout.spec().lod_count, exp - 2);
            let closed_form = 36 * (exp as usize - 4) + 12;
            assert_eq!(layout.tiles().len(), closed_form, "base {base}");
            assert_eq!(layout.tiles().len(), layout.expected_tile_count());
        }
    }

    #[test]
    fn test_tile_count_is_sum_over_lods() {
        let layout = plan(256).unwrap();
        let sum: u32 = (0..layout.spec().lod_count)
            .map(|lod| layout.mip_sublevels(lod).unwrap() * 6)
            .sum();
        assert_eq!(layout.tiles().len(), sum as usize);
    }

    #[test]
    fn test_no_tiles_overlap() {
        for exp in 3..=10 {
            let layout = plan(1 << exp).unwrap();
            let rects = rects(&layout);
            for a in 0..rects.len() {
                for b in (a + 1)..rects.len() {
                    assert!(
                        !rects[a].overlaps(&rects[b]),
                        "base {}: {:?} overlaps {:?}",
                        1 << exp,
                        layout.tiles()[a],
                        layout.tiles()[b]
                    );
                }
            }
        }
    }

    #[test]
    fn test_tiles_fit_inside_atlas() {
        for exp in 3..=11 {
            let layout = plan(1 << exp).unwrap();
            let size = layout.spec().atlas_size;
            for tile in layout.tiles() {
                let min = tile.min_corner(size);
                assert!(min.x >= 0.0 && min.y >= 0.0, "{tile:?}");
                assert!(min.x + tile.extent <= size as f32, "{tile:?}");
                assert!(min.y + tile.extent <= size as f32, "{tile:?}");
            }
        }
    }

    #[test]
    fn test_placements_are_pixel_aligned() {
        for exp in 3..=11 {
            let layout = plan(1 << exp).unwrap();
            let size = layout.spec().atlas_size;
            for tile in layout.tiles() {
                let min = tile.min_corner(size);
                assert_eq!(min, min.round(), "{tile:?}");
                assert_eq!(tile.extent, tile.extent.round(), "{tile:?}");
            }
        }
    }

    #[test]
    fn test_first_sublevel_of_lod0_fills_top_left() {
        let layout = plan(128).unwrap();
        let size = layout.spec().atlas_size;
        let r = layout.tile(0, 0, CubeFace::PosX).unwrap().rect(size);
        assert_eq!(r, TileRect { x: 0, y: 0, size: 128 });
        let r = layout.tile(0, 0, CubeFace::NegZ).unwrap().rect(size);
        assert_eq!(r, TileRect { x: 256, y: 128, size: 128 });
        let r = layout.tile(0, 1, CubeFace::PosX).unwrap().rect(size);
        assert_eq!(r, TileRect { x: 192, y: 256, size: 64 });
    }

    #[test]
    fn test_lod_face_sizes_halve_down_to_floor() {
        let layout = plan(128).unwrap();
        let sizes: Vec<u32> = (0..5).map(|l| layout.lod_face_size(l).unwrap()).collect();
        assert_eq!(sizes, vec![128, 64, 32, 16, 16]);
        let mips: Vec<u32> = (0..5).map(|l| layout.mip_sublevels(l).unwrap()).collect();
        assert_eq!(mips, vec![6, 6, 6, 1, 1]);
        assert_eq!(layout.lod_face_size(5), None);
    }

    #[test]
    fn test_sublevel_extent_halves() {
        let layout = plan(64).unwrap();
        for mip in 0..6 {
            let tile = layout.tile(0, mip, CubeFace::PosY).unwrap();
            assert_eq!(tile.extent, 64.0 / (1 << mip) as f32);
            assert_eq!(tile.mip_sublevel, mip);
            assert_eq!(tile.face, CubeFace::PosY);
        }
        assert!(layout.tile(0, 6, CubeFace::PosY).is_none());
        assert!(layout.tile(9, 0, CubeFace::PosY).is_none());
    }

    #[test]
    fn test_tile_lookup_matches_iteration_order() {
        let layout = plan(256).unwrap();
        for tile in layout.tiles() {
            let found = layout
                .tile(tile.lod_index, tile.mip_sublevel, tile.face)
                .unwrap();
            assert_eq!(found, tile);
        }
    }

    #[test]
    fn test_partial_lod_plan_is_prefix() {
        let full = plan(128).unwrap();
        let partial = plan_with_lods(128, 2).unwrap();
        assert_eq!(partial.spec().atlas_size, full.spec().atlas_size);
        assert_eq!(partial.tiles(), &full.tiles()[..72]);
        assert_eq!(partial.tiles().len(), partial.expected_tile_count());
    }

    #[test]
    fn test_rejects_non_power_of_two() {
        assert_eq!(plan(0), Err(LayoutError::NotPowerOfTwo(0)));
        assert_eq!(plan(96), Err(LayoutError::NotPowerOfTwo(96)));
        assert_eq!(plan(130), Err(LayoutError::NotPowerOfTwo(130)));
    }

    #[test]
    fn test_rejects_base_without_lods() {
        assert!(matches!(plan(4), Err(LayoutError::TooSmall { size: 4, lod_count: 0 })));
        assert!(matches!(plan(1), Err(LayoutError::TooSmall { .. })));
        assert!(plan(8).is_ok());
    }

    #[test]
    fn test_rejects_base_that_overflows_atlas() {
        assert_eq!(plan(1 << 30), Err(LayoutError::TooLarge(1 << 30)));
        assert_eq!(plan(1 << 31), Err(LayoutError::TooLarge(1 << 31)));
        assert_eq!(plan_with_lods(1 << 30, 1), Err(LayoutError::TooLarge(1 << 30)));
        assert_eq!(lod_count_for(1 << 29), Ok(27));
    }

    #[test]
    fn test_rejects_lod_count_out_of_range() {
        assert_eq!(
            plan_with_lods(128, 0),
            Err(LayoutError::LodCountOutOfRange {
                requested: 0,
                max: 5
            })
        );
        assert!(plan_with_lods(128, 6).is_err());
        assert!(plan_with_lods(128, 5).is_ok());
    }
}
