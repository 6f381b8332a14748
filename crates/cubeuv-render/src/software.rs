//! CPU reference implementation of [`CompositeDevice`].
//!
//! Every tile is rasterised pixel by pixel: the pixel centre is mapped to a cube
//! direction with [`face_direction`], the source cube is sampled bilinearly, and
//! the result goes through the same decode / ambient / encode / blend steps the
//! GPU shader performs. Used by the bake tool and as the test double for the
//! packer.

use std::collections::HashMap;
use std::sync::Arc;

use cubeuv_layout::{CubeFace, TileRect, direction_to_face_uv, face_direction};
use glam::{Vec3, Vec4};

use crate::ambient::{AmbientState, TargetId};
use crate::device::{CompositeDevice, TileBinding};
use crate::encoding::{AtlasTargetDescriptor, PixelFormat, TextureEncoding};
use crate::error::{CompositeError, ConfigurationError};

/// Six square faces of raw (still encoded) RGBA texels, row 0 at the top.
#[derive(Debug, Clone, PartialEq)]
pub struct CubeImage {
    face_size: u32,
    faces: [Vec<[f32; 4]>; 6],
}

impl CubeImage {
    /// Wrap face data given in [`CubeFace::ALL`] order.
    pub fn new(face_size: u32, faces: [Vec<[f32; 4]>; 6]) -> Result<Self, ConfigurationError> {
        let expected = (face_size as usize) * (face_size as usize);
        if let Some(face) = faces.iter().find(|f| f.len() != expected) {
            return Err(ConfigurationError::FaceDataSize {
                expected,
                actual: face.len(),
            });
        }
        Ok(Self { face_size, faces })
    }

    /// Build a cube by evaluating `f(face, x, y)` for every texel.
    pub fn from_fn(face_size: u32, mut f: impl FnMut(CubeFace, u32, u32) -> Vec4) -> Self {
        let faces = CubeFace::ALL.map(|face| {
            let mut texels = Vec::with_capacity((face_size * face_size) as usize);
            for y in 0..face_size {
                for x in 0..face_size {
                    texels.push(f(face, x, y).to_array());
                }
            }
            texels
        });
        Self { face_size, faces }
    }

    /// Build a cube by evaluating `f(direction)` at every texel centre.
    pub fn from_direction_fn(face_size: u32, mut f: impl FnMut(Vec3) -> Vec4) -> Self {
        let inv = 1.0 / face_size as f32;
        Self::from_fn(face_size, |face, x, y| {
            let u = (x as f32 + 0.5) * inv;
            let v = (y as f32 + 0.5) * inv;
            f(face_direction(face, u, v))
        })
    }

    pub fn face_size(&self) -> u32 {
        self.face_size
    }

    /// Raw texel at `(x, y)` on `face`.
    pub fn texel(&self, face: CubeFace, x: u32, y: u32) -> Vec4 {
        let x = x.min(self.face_size - 1);
        let y = y.min(self.face_size - 1);
        Vec4::from_array(self.faces[face.index() as usize][(y * self.face_size + x) as usize])
    }

    /// Bilinear sample along `dir`, clamped to the edges of the face it hits.
    pub fn sample(&self, dir: Vec3) -> Vec4 {
        let Some((face, u, v)) = direction_to_face_uv(dir) else {
            return Vec4::ZERO;
        };
        if self.face_size == 0 {
            return Vec4::ZERO;
        }
        let size = self.face_size as f32;
        let fx = (u * size - 0.5).clamp(0.0, size - 1.0);
        let fy = (v * size - 0.5).clamp(0.0, size - 1.0);
        let (x0, y0) = (fx.floor() as u32, fy.floor() as u32);
        let (tx, ty) = (fx - x0 as f32, fy - y0 as f32);
        let top = self
            .texel(face, x0, y0)
            .lerp(self.texel(face, x0 + 1, y0), tx);
        let bottom = self
            .texel(face, x0, y0 + 1)
            .lerp(self.texel(face, x0 + 1, y0 + 1), tx);
        top.lerp(bottom, ty)
    }
}

/// Square RGBA f32 image holding the atlas, row 0 at the top.
#[derive(Debug, Clone, PartialEq)]
pub struct AtlasImage {
    size: u32,
    pixels: Vec<[f32; 4]>,
}

impl AtlasImage {
    /// A zero-filled image.
    pub fn new(size: u32) -> Self {
        Self {
            size,
            pixels: vec![[0.0; 4]; (size as usize) * (size as usize)],
        }
    }

    pub(crate) fn from_pixels(size: u32, pixels: Vec<[f32; 4]>) -> Self {
        debug_assert_eq!(pixels.len(), (size * size) as usize);
        Self { size, pixels }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn pixel(&self, x: u32, y: u32) -> [f32; 4] {
        self.pixels[(y * self.size + x) as usize]
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, value: [f32; 4]) {
        self.pixels[(y * self.size + x) as usize] = value;
    }

    pub fn pixels(&self) -> &[[f32; 4]] {
        &self.pixels
    }

    /// Raw bytes of the pixel buffer, for exact comparisons.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }

    /// 8-bit RGBA, clamped, for image export.
    pub fn to_rgba8(&self) -> Vec<u8> {
        self.pixels
            .iter()
            .flat_map(|p| p.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8))
            .collect()
    }
}

/// Handle to an atlas allocated by [`SoftwareDevice`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftwareTarget {
    id: TargetId,
    size: u32,
}

impl SoftwareTarget {
    pub fn id(&self) -> TargetId {
        self.id
    }

    pub fn size(&self) -> u32 {
        self.size
    }
}

/// Marker for the shared unit quad; the CPU rasteriser needs no geometry.
#[derive(Debug)]
pub struct SoftwareQuad;

/// Draw state for one tile.
#[derive(Debug)]
pub struct SoftwareTile {
    cube: Arc<CubeImage>,
    face: CubeFace,
    rect: TileRect,
    source_encoding: TextureEncoding,
}

#[derive(Debug)]
struct TargetStorage {
    image: AtlasImage,
    format: PixelFormat,
    encoding: TextureEncoding,
}

/// CPU rasteriser with the same ambient-state model as a GPU renderer.
#[derive(Debug)]
pub struct SoftwareDevice {
    ambient: AmbientState,
    targets: HashMap<TargetId, TargetStorage>,
    next_target: u64,
    live_tiles: usize,
    live_quads: usize,
    quad_releases: usize,
    tile_allocations: usize,
    tile_allocation_limit: Option<usize>,
    fail_next_bind: bool,
    ignore_next_bind: bool,
}

/// Identity of the implicit default framebuffer.
const DEFAULT_FRAMEBUFFER: TargetId = TargetId(0);

impl Default for SoftwareDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareDevice {
    /// A device with default ambient settings bound to its default framebuffer.
    pub fn new() -> Self {
        Self {
            ambient: AmbientState {
                render_target: Some(DEFAULT_FRAMEBUFFER),
                ..AmbientState::default()
            },
            targets: HashMap::new(),
            next_target: DEFAULT_FRAMEBUFFER.0 + 1,
            live_tiles: 0,
            live_quads: 0,
            quad_releases: 0,
            tile_allocations: 0,
            tile_allocation_limit: None,
            fail_next_bind: false,
            ignore_next_bind: false,
        }
    }

    /// Identity of the framebuffer bound at creation.
    pub fn default_framebuffer(&self) -> Option<TargetId> {
        Some(DEFAULT_FRAMEBUFFER)
    }

    /// Contents of a target allocated by this device.
    pub fn image(&self, target: &SoftwareTarget) -> Option<&AtlasImage> {
        self.targets.get(&target.id).map(|t| &t.image)
    }

    /// Make the next [`bind_target`](CompositeDevice::bind_target) fail.
    pub fn fail_next_bind(&mut self) {
        self.fail_next_bind = true;
    }

    /// Make the next bind report success without switching targets.
    pub fn ignore_next_bind(&mut self) {
        self.ignore_next_bind = true;
    }

    /// Fail tile allocation once `limit` tiles have been created in total.
    pub fn limit_tile_allocations(&mut self, limit: Option<usize>) {
        self.tile_allocation_limit = limit;
    }

    pub fn live_tiles(&self) -> usize {
        self.live_tiles
    }

    pub fn live_quads(&self) -> usize {
        self.live_quads
    }

    /// Total number of quad releases over the device's lifetime.
    pub fn quad_releases(&self) -> usize {
        self.quad_releases
    }
}

impl CompositeDevice for SoftwareDevice {
    type Cube = Arc<CubeImage>;
    type Target = SoftwareTarget;
    type Quad = SoftwareQuad;
    type TileResource = SoftwareTile;

    fn ambient(&self) -> AmbientState {
        self.ambient
    }

    fn set_ambient(&mut self, state: &AmbientState) {
        self.ambient = *state;
    }

    fn create_target(
        &mut self,
        descriptor: &AtlasTargetDescriptor,
    ) -> Result<SoftwareTarget, CompositeError> {
        if descriptor.size == 0 {
            return Err(CompositeError::ResourceAllocation {
                what: "render target",
                reason: "zero-sized target".to_string(),
            });
        }
        let id = TargetId(self.next_target);
        self.next_target += 1;
        self.targets.insert(
            id,
            TargetStorage {
                image: AtlasImage::new(descriptor.size),
                format: descriptor.format,
                encoding: descriptor.encoding,
            },
        );
        log::debug!(
            "Allocated software target '{}' {id:?} ({}x{})",
            descriptor.name,
            descriptor.size,
            descriptor.size
        );
        Ok(SoftwareTarget {
            id,
            size: descriptor.size,
        })
    }

    fn target_id(&self, target: &SoftwareTarget) -> TargetId {
        target.id
    }

    fn bind_target(&mut self, target: &SoftwareTarget) -> Result<(), CompositeError> {
        if std::mem::take(&mut self.fail_next_bind) {
            return Err(CompositeError::TargetBind {
                reason: "injected bind failure".to_string(),
            });
        }
        if !self.targets.contains_key(&target.id) {
            return Err(CompositeError::TargetBind {
                reason: format!("unknown target {:?}", target.id),
            });
        }
        if !std::mem::take(&mut self.ignore_next_bind) {
            self.ambient.render_target = Some(target.id);
        }
        Ok(())
    }

    fn create_quad(&mut self) -> Result<SoftwareQuad, CompositeError> {
        self.live_quads += 1;
        Ok(SoftwareQuad)
    }

    fn create_tile(
        &mut self,
        binding: &TileBinding<'_, Arc<CubeImage>>,
        _target: &SoftwareTarget,
    ) -> Result<SoftwareTile, CompositeError> {
        if let Some(limit) = self.tile_allocation_limit {
            if self.tile_allocations >= limit {
                return Err(CompositeError::ResourceAllocation {
                    what: "tile",
                    reason: format!("allocation limit of {limit} tiles reached"),
                });
            }
        }
        self.tile_allocations += 1;
        self.live_tiles += 1;
        Ok(SoftwareTile {
            cube: Arc::clone(binding.cube),
            face: binding.tile.face,
            rect: binding.rect,
            source_encoding: binding.source.encoding,
        })
    }

    fn draw_tiles(
        &mut self,
        target: &SoftwareTarget,
        _quad: &SoftwareQuad,
        tiles: &[SoftwareTile],
        blend: wgpu::BlendState,
    ) -> Result<(), CompositeError> {
        if self.ambient.render_target != Some(target.id) {
            return Err(CompositeError::TargetBind {
                reason: format!("target {:?} is not bound", target.id),
            });
        }
        let ambient = self.ambient;
        let storage = self
            .targets
            .get_mut(&target.id)
            .ok_or_else(|| CompositeError::TargetBind {
                reason: format!("unknown target {:?}", target.id),
            })?;

        for tile in tiles {
            let inv = 1.0 / tile.rect.size as f32;
            for py in tile.rect.y..tile.rect.bottom().min(storage.image.size) {
                for px in tile.rect.x..tile.rect.right().min(storage.image.size) {
                    let u = (px - tile.rect.x) as f32 * inv + 0.5 * inv;
                    let v = (py - tile.rect.y) as f32 * inv + 0.5 * inv;
                    let dir = face_direction(tile.face, u, v);

                    let mut color = tile.source_encoding.decode(tile.cube.sample(dir));
                    if tile.source_encoding == TextureEncoding::Linear {
                        color = ambient.apply_input(color);
                    }
                    let color = storage.encoding.encode(ambient.apply_output(color));

                    let dst = Vec4::from_array(storage.image.pixel(px, py));
                    let out = apply_blend(&blend, color, dst)?;
                    storage
                        .image
                        .set_pixel(px, py, quantize(storage.format, out).to_array());
                }
            }
        }
        Ok(())
    }

    fn release_tile(&mut self, tile: SoftwareTile) {
        drop(tile);
        self.live_tiles = self.live_tiles.saturating_sub(1);
    }

    fn release_quad(&mut self, _quad: SoftwareQuad) {
        self.live_quads = self.live_quads.saturating_sub(1);
        self.quad_releases += 1;
    }
}

fn quantize(format: PixelFormat, value: Vec4) -> Vec4 {
    match format {
        PixelFormat::Rgba8Unorm => {
            (value.clamp(Vec4::ZERO, Vec4::ONE) * 255.0).round() / 255.0
        }
        PixelFormat::Rgba16Float => {
            Vec4::from_array(value.to_array().map(|c| half::f16::from_f32(c).to_f32()))
        }
    }
}

fn blend_factor(factor: wgpu::BlendFactor, src: Vec4, dst: Vec4) -> Option<Vec4> {
    use wgpu::BlendFactor as F;
    Some(match factor {
        F::Zero => Vec4::ZERO,
        F::One => Vec4::ONE,
        F::Src => src,
        F::OneMinusSrc => Vec4::ONE - src,
        F::SrcAlpha => Vec4::splat(src.w),
        F::OneMinusSrcAlpha => Vec4::splat(1.0 - src.w),
        F::Dst => dst,
        F::OneMinusDst => Vec4::ONE - dst,
        F::DstAlpha => Vec4::splat(dst.w),
        F::OneMinusDstAlpha => Vec4::splat(1.0 - dst.w),
        _ => return None,
    })
}

fn blend_component(
    component: &wgpu::BlendComponent,
    src: Vec4,
    dst: Vec4,
) -> Result<Vec4, CompositeError> {
    let unsupported = || CompositeError::TargetBind {
        reason: format!("unsupported blend component {component:?}"),
    };
    let s = src * blend_factor(component.src_factor, src, dst).ok_or_else(unsupported)?;
    let d = dst * blend_factor(component.dst_factor, src, dst).ok_or_else(unsupported)?;
    Ok(match component.operation {
        wgpu::BlendOperation::Add => s + d,
        wgpu::BlendOperation::Subtract => s - d,
        wgpu::BlendOperation::ReverseSubtract => d - s,
        wgpu::BlendOperation::Min => src.min(dst),
        wgpu::BlendOperation::Max => src.max(dst),
    })
}

fn apply_blend(blend: &wgpu::BlendState, src: Vec4, dst: Vec4) -> Result<Vec4, CompositeError> {
    let color = blend_component(&blend.color, src, dst)?;
    let alpha = blend_component(&blend.alpha, src, dst)?;
    Ok(Vec4::new(color.x, color.y, color.z, alpha.w))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::{CubeTextureInfo, Mapping, TextureFilter};
    use cubeuv_layout::Tile;
    use glam::Vec2;

    fn descriptor(size: u32, encoding: TextureEncoding) -> AtlasTargetDescriptor {
        AtlasTargetDescriptor {
            name: "test-atlas".to_string(),
            size,
            format: PixelFormat::Rgba16Float,
            mag_filter: TextureFilter::Linear,
            min_filter: TextureFilter::Linear,
            generate_mipmaps: false,
            anisotropy: 1,
            encoding,
            mapping: Mapping::CubeUvReflection,
        }
    }

    fn face_colored_cube(size: u32) -> Arc<CubeImage> {
        Arc::new(CubeImage::from_fn(size, |face, _, _| {
            Vec4::new(face.index() as f32 / 8.0, 0.0, 0.0, 1.0)
        }))
    }

    fn full_tile(face: CubeFace, size: u32) -> Tile {
        Tile {
            lod_index: 0,
            mip_sublevel: 0,
            face,
            center: Vec2::ZERO,
            extent: size as f32,
        }
    }

    #[test]
    fn test_cube_sample_hits_addressed_face() {
        let cube = face_colored_cube(8);
        for face in CubeFace::ALL {
            let c = cube.sample(face.normal());
            assert!((c.x - face.index() as f32 / 8.0).abs() < 1e-6, "{face:?}");
        }
    }

    #[test]
    fn test_cube_sample_reproduces_texel_centres() {
        let cube = CubeImage::from_fn(4, |face, x, y| {
            Vec4::new(x as f32, y as f32, face.index() as f32, 1.0)
        });
        for face in CubeFace::ALL {
            for y in 0..4 {
                for x in 0..4 {
                    let dir = face_direction(face, (x as f32 + 0.5) / 4.0, (y as f32 + 0.5) / 4.0);
                    let c = cube.sample(dir);
                    assert!((c - cube.texel(face, x, y)).abs().max_element() < 1e-4);
                }
            }
        }
    }

    #[test]
    fn test_cube_rejects_wrong_face_length() {
        let faces: [Vec<[f32; 4]>; 6] = std::array::from_fn(|i| vec![[0.0; 4]; 16 - i]);
        let err = CubeImage::new(4, faces).unwrap_err();
        assert!(matches!(err, ConfigurationError::FaceDataSize { expected: 16, .. }));
    }

    #[test]
    fn test_draw_requires_bound_target() {
        let mut device = SoftwareDevice::new();
        let target = device
            .create_target(&descriptor(8, TextureEncoding::Linear))
            .unwrap();
        let quad = device.create_quad().unwrap();
        let err = device
            .draw_tiles(&target, &quad, &[], wgpu::BlendState::REPLACE)
            .unwrap_err();
        assert!(matches!(err, CompositeError::TargetBind { .. }));
    }

    #[test]
    fn test_replace_blend_overwrites_tile() {
        let mut device = SoftwareDevice::new();
        let target = device
            .create_target(&descriptor(8, TextureEncoding::Linear))
            .unwrap();
        let quad = device.create_quad().unwrap();
        let cube = face_colored_cube(8);
        let info = CubeTextureInfo::default();
        let tile = full_tile(CubeFace::NegX, 4);
        let binding = TileBinding {
            tile,
            rect: TileRect { x: 2, y: 2, size: 4 },
            cube: &cube,
            source: &info,
            atlas_size: 8,
        };
        let resource = device.create_tile(&binding, &target).unwrap();
        device.bind_target(&target).unwrap();
        device
            .draw_tiles(&target, &quad, &[resource], wgpu::BlendState::REPLACE)
            .unwrap();

        let image = device.image(&target).unwrap();
        let inside = image.pixel(3, 3);
        assert!((inside[0] - 3.0 / 8.0).abs() < 1e-3);
        assert_eq!(inside[3], 1.0);
        assert_eq!(image.pixel(0, 0), [0.0; 4]);
        assert_eq!(image.pixel(6, 6), [0.0; 4]);
    }

    #[test]
    fn test_ambient_output_applies_outside_neutral_scope() {
        let mut device = SoftwareDevice::new();
        let target = device
            .create_target(&descriptor(4, TextureEncoding::Linear))
            .unwrap();
        let quad = device.create_quad().unwrap();
        let cube = Arc::new(CubeImage::from_fn(4, |_, _, _| Vec4::new(0.5, 0.5, 0.5, 1.0)));
        let info = CubeTextureInfo::default();
        let binding = TileBinding {
            tile: full_tile(CubeFace::PosX, 4),
            rect: TileRect { x: 0, y: 0, size: 4 },
            cube: &cube,
            source: &info,
            atlas_size: 4,
        };
        let resource = device.create_tile(&binding, &target).unwrap();
        device.set_ambient(&AmbientState {
            exposure: 2.0,
            ..AmbientState::neutral(None)
        });
        device.bind_target(&target).unwrap();
        device
            .draw_tiles(&target, &quad, &[resource], wgpu::BlendState::REPLACE)
            .unwrap();
        assert!((device.image(&target).unwrap().pixel(1, 1)[0] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_rgba8_targets_are_quantized() {
        let v = quantize(PixelFormat::Rgba8Unorm, Vec4::new(0.3, 1.7, -0.2, 0.5));
        assert!((v.x - 77.0 / 255.0).abs() < 1e-6);
        assert_eq!(v.y, 1.0);
        assert_eq!(v.z, 0.0);
    }

    #[test]
    fn test_alpha_blend_mixes_with_destination() {
        let src = Vec4::new(1.0, 0.0, 0.0, 0.25);
        let dst = Vec4::new(0.0, 0.0, 1.0, 1.0);
        let out = apply_blend(&wgpu::BlendState::ALPHA_BLENDING, src, dst).unwrap();
        assert!((out.x - 0.25).abs() < 1e-6);
        assert!((out.z - 0.75).abs() < 1e-6);
        let out = apply_blend(&wgpu::BlendState::REPLACE, src, dst).unwrap();
        assert_eq!(out, src);
    }

    #[test]
    fn test_rgba8_export_clamps() {
        let mut image = AtlasImage::new(1);
        image.set_pixel(0, 0, [2.0, 0.5, -1.0, 1.0]);
        assert_eq!(image.to_rgba8(), vec![255, 128, 0, 255]);
    }
}
