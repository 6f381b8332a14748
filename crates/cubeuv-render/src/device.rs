//! The renderer capability the packer drives.

use cubeuv_layout::{Tile, TileRect};

use crate::ambient::{AmbientState, TargetId};
use crate::encoding::{AtlasTargetDescriptor, CubeTextureInfo};
use crate::error::CompositeError;

/// Everything a device needs to build the draw state for one tile.
#[derive(Debug)]
pub struct TileBinding<'a, C> {
    pub tile: Tile,
    /// Pixel rectangle of the tile inside the atlas.
    pub rect: TileRect,
    /// The tile's source cube map (its LOD).
    pub cube: &'a C,
    /// Metadata shared by every cube in the set.
    pub source: &'a CubeTextureInfo,
    pub atlas_size: u32,
}

/// A rendering context able to resample cube maps into a 2D target with
/// unit-quad draws.
///
/// Ambient state is device-wide and persists between calls; the packer
/// snapshots and restores it around every pass.
pub trait CompositeDevice {
    /// Source cube map handle.
    type Cube;
    /// 2D render target handle.
    type Target;
    /// Shared unit-quad geometry.
    type Quad;
    /// Per-tile draw state.
    type TileResource;

    /// Current ambient output settings, including the bound target.
    fn ambient(&self) -> AmbientState;

    /// Replace the ambient output settings and rebind `state.render_target`.
    fn set_ambient(&mut self, state: &AmbientState);

    /// Allocate a 2D render target.
    fn create_target(
        &mut self,
        descriptor: &AtlasTargetDescriptor,
    ) -> Result<Self::Target, CompositeError>;

    /// Identity of a target created by this device.
    fn target_id(&self, target: &Self::Target) -> TargetId;

    /// Make `target` the destination of subsequent draws.
    fn bind_target(&mut self, target: &Self::Target) -> Result<(), CompositeError>;

    /// Allocate the unit quad shared by every tile.
    fn create_quad(&mut self) -> Result<Self::Quad, CompositeError>;

    /// Allocate the draw state for one tile.
    fn create_tile(
        &mut self,
        binding: &TileBinding<'_, Self::Cube>,
        target: &Self::Target,
    ) -> Result<Self::TileResource, CompositeError>;

    /// Draw every tile into the bound target with the given blending.
    fn draw_tiles(
        &mut self,
        target: &Self::Target,
        quad: &Self::Quad,
        tiles: &[Self::TileResource],
        blend: wgpu::BlendState,
    ) -> Result<(), CompositeError>;

    /// Release one tile's draw state.
    fn release_tile(&mut self, tile: Self::TileResource);

    /// Release the shared quad.
    fn release_quad(&mut self, quad: Self::Quad);
}
