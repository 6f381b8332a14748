//! Packs a cube-map LOD pyramid into a single CubeUV atlas.

use cubeuv_layout::{AtlasLayout, plan, plan_with_lods};

use crate::ambient::AmbientScope;
use crate::device::{CompositeDevice, TileBinding};
use crate::encoding::{AtlasTargetDescriptor, Mapping};
use crate::error::{CompositeError, ConfigurationError};
use crate::source::CubeLodSet;

/// Debug name given to the atlas texture.
pub const ATLAS_TEXTURE_NAME: &str = "CubeUvPacker.cubeUv";

/// Owns the atlas target and per-tile draw state for one LOD pyramid.
///
/// The tile plan and all device resources are created once in [`new`](Self::new);
/// [`composite`](Self::composite) can then be called any number of times (for
/// example once per frame) and fully rewrites the atlas each time.
pub struct CubeUvPacker<D: CompositeDevice> {
    layout: AtlasLayout,
    descriptor: AtlasTargetDescriptor,
    atlas: D::Target,
    quad: Option<D::Quad>,
    tiles: Vec<D::TileResource>,
}

impl<D: CompositeDevice> CubeUvPacker<D> {
    /// Plan the atlas for `lods` and allocate every resource the pass needs.
    ///
    /// If any allocation fails, resources already created are released before
    /// the error is returned.
    pub fn new(device: &mut D, lods: &CubeLodSet<D::Cube>) -> Result<Self, CompositeError> {
        let layout = plan(lods.base_face_size())?;
        Self::with_layout(device, lods, layout)
    }

    /// Like [`new`](Self::new), but packs only the first `lod_count` LODs.
    pub fn with_lod_count(
        device: &mut D,
        lods: &CubeLodSet<D::Cube>,
        lod_count: u32,
    ) -> Result<Self, CompositeError> {
        let layout = plan_with_lods(lods.base_face_size(), lod_count)?;
        Self::with_layout(device, lods, layout)
    }

    fn with_layout(
        device: &mut D,
        lods: &CubeLodSet<D::Cube>,
        layout: AtlasLayout,
    ) -> Result<Self, CompositeError> {
        let spec = layout.spec();
        if (lods.len() as u32) < spec.lod_count {
            return Err(ConfigurationError::MissingLods {
                expected: spec.lod_count,
                actual: lods.len() as u32,
            }
            .into());
        }
        if lods.len() as u32 > spec.lod_count {
            log::debug!(
                "Ignoring {} cube LODs beyond the {} the atlas holds",
                lods.len() as u32 - spec.lod_count,
                spec.lod_count
            );
        }

        let descriptor =
            AtlasTargetDescriptor::for_source(ATLAS_TEXTURE_NAME, spec.atlas_size, lods.info())?;
        let atlas = device.create_target(&descriptor)?;
        let quad = device.create_quad()?;

        let mut tiles = Vec::with_capacity(layout.tiles().len());
        for tile in layout.tiles() {
            let Some(lod) = lods.get(tile.lod_index as usize) else {
                // Unreachable after the LOD count check above.
                release_all(device, tiles, quad);
                return Err(ConfigurationError::MissingLods {
                    expected: spec.lod_count,
                    actual: lods.len() as u32,
                }
                .into());
            };
            let binding = TileBinding {
                tile: *tile,
                rect: tile.rect(spec.atlas_size),
                cube: &lod.texture,
                source: lods.info(),
                atlas_size: spec.atlas_size,
            };
            match device.create_tile(&binding, &atlas) {
                Ok(resource) => tiles.push(resource),
                Err(err) => {
                    log::warn!(
                        "Tile allocation failed after {} of {} tiles: {err}",
                        tiles.len(),
                        layout.tiles().len()
                    );
                    release_all(device, tiles, quad);
                    return Err(err);
                }
            }
        }

        log::info!(
            "Created CubeUV packer: {}px atlas, {} LODs, {} tiles, {:?}",
            spec.atlas_size,
            spec.lod_count,
            tiles.len(),
            descriptor.encoding
        );

        Ok(Self {
            layout,
            descriptor,
            atlas,
            quad: Some(quad),
            tiles,
        })
    }

    /// Render every tile into the atlas under neutral output settings.
    ///
    /// The device's ambient state (gamma flags, tone mapping, exposure, bound
    /// target) is identical before and after the call, whether it succeeds or not.
    pub fn composite(&mut self, device: &mut D) -> Result<&D::Target, CompositeError> {
        let Some(quad) = self.quad.as_ref() else {
            return Err(ConfigurationError::Disposed.into());
        };

        let mut scope = AmbientScope::enter(device);
        scope.bind_target(&self.atlas)?;
        let atlas_id = scope.target_id(&self.atlas);
        if scope.ambient().render_target != Some(atlas_id) {
            return Err(CompositeError::TargetBind {
                reason: format!("atlas {atlas_id:?} is not bound after bind"),
            });
        }
        scope.draw_tiles(&self.atlas, quad, &self.tiles, wgpu::BlendState::REPLACE)?;
        drop(scope);

        log::trace!("Composited {} tiles into CubeUV atlas", self.tiles.len());
        Ok(&self.atlas)
    }

    /// Release every per-tile resource and the shared quad.
    ///
    /// The atlas target stays valid so consumers can keep reading it. A second
    /// call returns [`ConfigurationError::Disposed`].
    pub fn dispose(&mut self, device: &mut D) -> Result<(), CompositeError> {
        let Some(quad) = self.quad.take() else {
            return Err(ConfigurationError::Disposed.into());
        };
        let count = self.tiles.len();
        release_all(device, std::mem::take(&mut self.tiles), quad);
        log::debug!("Disposed CubeUV packer ({count} tiles)");
        Ok(())
    }

    pub fn is_disposed(&self) -> bool {
        self.quad.is_none()
    }

    /// The atlas target. Its contents are only meaningful after a composite.
    pub fn atlas(&self) -> &D::Target {
        &self.atlas
    }

    /// Tile plan the packer draws.
    pub fn layout(&self) -> &AtlasLayout {
        &self.layout
    }

    /// Allocation parameters of the atlas.
    pub fn descriptor(&self) -> &AtlasTargetDescriptor {
        &self.descriptor
    }

    /// Always [`Mapping::CubeUvReflection`].
    pub fn mapping(&self) -> Mapping {
        self.descriptor.mapping
    }

    /// Number of live per-tile resources.
    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }
}

fn release_all<D: CompositeDevice>(device: &mut D, tiles: Vec<D::TileResource>, quad: D::Quad) {
    for tile in tiles {
        device.release_tile(tile);
    }
    device.release_quad(quad);
}
