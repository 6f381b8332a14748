//! wgpu implementation of [`CompositeDevice`].
//!
//! Each tile is a unit quad scaled and translated into atlas space by an
//! orthographic projection whose vertical axis grows with atlas rows. The
//! fragment shader turns the quad coordinate into a cube direction, samples the
//! source cube and runs the same decode / ambient / encode chain as
//! [`SoftwareDevice`](crate::SoftwareDevice).

use bytemuck::{Pod, Zeroable};
use cubeuv_layout::CubeFace;
use glam::{Mat4, Vec3};

use crate::ambient::{AmbientState, TargetId};
use crate::device::{CompositeDevice, TileBinding};
use crate::encoding::{
    AtlasTargetDescriptor, CubeTextureInfo, PixelFormat, TextureEncoding, TextureFilter,
};
use crate::error::{CompositeError, ConfigurationError};
use crate::software::{AtlasImage, CubeImage};

/// Error type for headless device initialization.
#[derive(Debug, thiserror::Error)]
pub enum GpuInitError {
    /// No compatible GPU adapter found.
    #[error("no compatible GPU adapter found")]
    NoAdapter,

    /// Failed to request GPU device.
    #[error("failed to request GPU device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),
}

/// Per-tile uniform, matching `TileParams` in [`COMPOSITE_SHADER_SOURCE`].
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct TileParams {
    pub transform: [[f32; 4]; 4],
    pub face_index: u32,
    pub source_encoding: u32,
    pub output_encoding: u32,
    pub map_size: f32,
}

/// Ambient output uniform, matching `Ambient` in [`COMPOSITE_SHADER_SOURCE`].
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct AmbientUniform {
    pub exposure: f32,
    pub tone_mapping: u32,
    pub gamma_input: u32,
    pub gamma_output: u32,
}

impl From<&AmbientState> for AmbientUniform {
    fn from(state: &AmbientState) -> Self {
        Self {
            exposure: state.exposure,
            tone_mapping: state.tone_mapping.shader_id(),
            gamma_input: u32::from(state.gamma_input),
            gamma_output: u32::from(state.gamma_output),
        }
    }
}

/// WGSL source for the composite pass.
pub const COMPOSITE_SHADER_SOURCE: &str = r#"
struct Ambient {
    exposure: f32,
    tone_mapping: u32,
    gamma_input: u32,
    gamma_output: u32,
};

struct TileParams {
    transform: mat4x4<f32>,
    face_index: u32,
    source_encoding: u32,
    output_encoding: u32,
    map_size: f32,
};

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

const GAMMA_FACTOR: f32 = 2.0;
const RGBD_MAX_RANGE: f32 = 256.0;

@group(0) @binding(0) var<uniform> ambient: Ambient;
@group(1) @binding(0) var<uniform> tile: TileParams;
@group(1) @binding(1) var cube_tex: texture_cube<f32>;
@group(1) @binding(2) var cube_sampler: sampler;

@vertex
fn vs_main(@location(0) position: vec2<f32>) -> VertexOutput {
    var out: VertexOutput;
    out.position = tile.transform * vec4<f32>(position, 0.0, 1.0);
    out.uv = position + vec2<f32>(0.5, 0.5);
    return out;
}

fn face_direction(face: u32, uv: vec2<f32>) -> vec3<f32> {
    let s = 2.0 * uv.x - 1.0;
    let t = -(2.0 * uv.y - 1.0);
    var dir: vec3<f32>;
    switch face {
        case 0u: { dir = vec3<f32>(1.0, t, -s); }
        case 1u: { dir = vec3<f32>(s, 1.0, t); }
        case 2u: { dir = vec3<f32>(s, t, 1.0); }
        case 3u: { dir = vec3<f32>(-1.0, t, s); }
        case 4u: { dir = vec3<f32>(s, -1.0, -t); }
        default: { dir = vec3<f32>(-s, t, -1.0); }
    }
    return normalize(dir);
}

fn srgb_to_linear(c: vec3<f32>) -> vec3<f32> {
    let lo = c * 0.0773993808;
    let hi = pow(c * 0.9478672986 + vec3<f32>(0.0521327014), vec3<f32>(2.4));
    return select(hi, lo, c <= vec3<f32>(0.04045));
}

fn linear_to_srgb(c: vec3<f32>) -> vec3<f32> {
    let lo = c * 12.92;
    let hi = pow(c, vec3<f32>(0.41666)) * 1.055 - vec3<f32>(0.055);
    return select(hi, lo, c <= vec3<f32>(0.0031308));
}

fn decode(texel: vec4<f32>, encoding: u32) -> vec4<f32> {
    switch encoding {
        case 1u: { return vec4<f32>(srgb_to_linear(texel.rgb), texel.a); }
        case 2u: { return vec4<f32>(pow(max(texel.rgb, vec3<f32>(0.0)), vec3<f32>(GAMMA_FACTOR)), texel.a); }
        case 3u: { return vec4<f32>(texel.rgb * exp2(texel.a * 255.0 - 128.0), 1.0); }
        case 4u: { return vec4<f32>(texel.rgb * texel.a * 7.0, 1.0); }
        case 5u: { return vec4<f32>(texel.rgb * texel.a * 16.0, 1.0); }
        case 6u: {
            if (texel.a <= 0.0) {
                return vec4<f32>(0.0, 0.0, 0.0, 1.0);
            }
            return vec4<f32>(texel.rgb * ((RGBD_MAX_RANGE / 255.0) / texel.a), 1.0);
        }
        default: { return texel; }
    }
}

fn encode_rgbm(value: vec4<f32>, max_range: f32) -> vec4<f32> {
    let peak = max(max(value.r, value.g), value.b);
    let m = ceil(clamp(peak / max_range, 0.0, 1.0) * 255.0) / 255.0;
    if (m <= 0.0) {
        return vec4<f32>(0.0);
    }
    return vec4<f32>(value.rgb / (m * max_range), m);
}

fn encode(value: vec4<f32>, encoding: u32) -> vec4<f32> {
    switch encoding {
        case 1u: { return vec4<f32>(linear_to_srgb(value.rgb), value.a); }
        case 2u: { return vec4<f32>(pow(max(value.rgb, vec3<f32>(0.0)), vec3<f32>(1.0 / GAMMA_FACTOR)), value.a); }
        case 3u: {
            let peak = max(max(value.r, value.g), value.b);
            if (peak <= 0.0) {
                return vec4<f32>(0.0);
            }
            let e = clamp(ceil(log2(peak)), -128.0, 127.0);
            return vec4<f32>(value.rgb / exp2(e), (e + 128.0) / 255.0);
        }
        case 4u: { return encode_rgbm(value, 7.0); }
        case 5u: { return encode_rgbm(value, 16.0); }
        case 6u: {
            let peak = max(max(value.r, value.g), value.b);
            if (peak <= 0.0) {
                return vec4<f32>(0.0, 0.0, 0.0, 1.0);
            }
            let d = clamp(floor(max(RGBD_MAX_RANGE / peak, 1.0)) / 255.0, 0.0, 1.0);
            return vec4<f32>(value.rgb * (d * (255.0 / RGBD_MAX_RANGE)), d);
        }
        default: { return value; }
    }
}

fn tone_map(color: vec3<f32>) -> vec3<f32> {
    let c = color * ambient.exposure;
    switch ambient.tone_mapping {
        case 1u: { return c; }
        case 2u: { return c / (vec3<f32>(1.0) + c); }
        case 3u: {
            return clamp(
                (c * (2.51 * c + 0.03)) / (c * (2.43 * c + 0.59) + 0.14),
                vec3<f32>(0.0), vec3<f32>(1.0)
            );
        }
        default: { return color; }
    }
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let dir = face_direction(tile.face_index, in.uv);
    var color = decode(textureSampleLevel(cube_tex, cube_sampler, dir, 0.0), tile.source_encoding);
    if (tile.source_encoding == 0u && ambient.gamma_input != 0u) {
        color = vec4<f32>(pow(max(color.rgb, vec3<f32>(0.0)), vec3<f32>(GAMMA_FACTOR)), color.a);
    }
    var mapped = tone_map(color.rgb);
    if (ambient.gamma_output != 0u) {
        mapped = pow(max(mapped, vec3<f32>(0.0)), vec3<f32>(1.0 / GAMMA_FACTOR));
    }
    return encode(vec4<f32>(mapped, color.a), tile.output_encoding);
}
"#;

/// Unit quad as two triangles, centred on the origin.
const QUAD_VERTICES: [[f32; 2]; 6] = [
    [-0.5, -0.5],
    [0.5, -0.5],
    [0.5, 0.5],
    [-0.5, -0.5],
    [0.5, 0.5],
    [-0.5, 0.5],
];

/// Array layer of a face in a wgpu cube texture, and whether its rows are
/// stored bottom-up relative to [`CubeImage`].
fn gpu_layer(face: CubeFace) -> (u32, bool) {
    match face {
        CubeFace::PosX => (0, false),
        CubeFace::NegX => (1, false),
        CubeFace::PosY => (2, true),
        CubeFace::NegY => (3, true),
        CubeFace::PosZ => (4, false),
        CubeFace::NegZ => (5, false),
    }
}

/// Projection from atlas units (origin at the centre, `+y` down the rows) to clip space.
pub(crate) fn atlas_projection(atlas_size: u32) -> Mat4 {
    let h = atlas_size as f32 * 0.5;
    Mat4::orthographic_rh(-h, h, h, -h, -1.0, 1.0)
}

/// Source cube map uploaded to the GPU.
#[derive(Debug)]
pub struct GpuCube {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
    face_size: u32,
}

impl GpuCube {
    /// Upload a CPU cube image with the sampling parameters from `info`.
    pub fn from_image(
        device: &WgpuDevice,
        image: &CubeImage,
        info: &CubeTextureInfo,
        label: &str,
    ) -> Self {
        let size = image.face_size();
        let texture = device.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 6,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: info.format.to_wgpu(),
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        for face in CubeFace::ALL {
            let (layer, flip_rows) = gpu_layer(face);
            let mut bytes = Vec::with_capacity((size * size * info.format.block_size()) as usize);
            for row in 0..size {
                let y = if flip_rows { size - 1 - row } else { row };
                for x in 0..size {
                    push_texel(&mut bytes, info.format, image.texel(face, x, y).to_array());
                }
            }
            device.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d {
                        x: 0,
                        y: 0,
                        z: layer,
                    },
                    aspect: wgpu::TextureAspect::All,
                },
                &bytes,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(size * info.format.block_size()),
                    rows_per_image: Some(size),
                },
                wgpu::Extent3d {
                    width: size,
                    height: size,
                    depth_or_array_layers: 1,
                },
            );
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(label),
            dimension: Some(wgpu::TextureViewDimension::Cube),
            ..Default::default()
        });
        let sampler = create_sampler(&device.device, info, label);

        Self {
            texture,
            view,
            sampler,
            face_size: size,
        }
    }

    pub fn face_size(&self) -> u32 {
        self.face_size
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }
}

fn create_sampler(device: &wgpu::Device, info: &CubeTextureInfo, label: &str) -> wgpu::Sampler {
    let (mag_filter, _) = info.mag_filter.to_wgpu();
    let (min_filter, mipmap_filter) = info.min_filter.to_wgpu();
    // Anisotropic filtering is only valid with every filter linear.
    let anisotropy_clamp = if info.mag_filter == TextureFilter::Linear
        && info.min_filter == TextureFilter::LinearMipmapLinear
    {
        info.anisotropy.max(1)
    } else {
        1
    };
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some(label),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter,
        min_filter,
        mipmap_filter,
        anisotropy_clamp,
        ..Default::default()
    })
}

fn push_texel(bytes: &mut Vec<u8>, format: PixelFormat, texel: [f32; 4]) {
    match format {
        PixelFormat::Rgba8Unorm => {
            bytes.extend(texel.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8));
        }
        PixelFormat::Rgba16Float => {
            for c in texel {
                bytes.extend_from_slice(&half::f16::from_f32(c).to_bits().to_le_bytes());
            }
        }
    }
}

/// The atlas render target.
#[derive(Debug)]
pub struct GpuAtlas {
    id: TargetId,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: u32,
    format: PixelFormat,
    encoding: TextureEncoding,
}

impl GpuAtlas {
    pub fn id(&self) -> TargetId {
        self.id
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }
}

/// Shared unit-quad vertex buffer.
#[derive(Debug)]
pub struct GpuQuad {
    buffer: wgpu::Buffer,
}

/// Uniform buffer and bind group for one tile.
#[derive(Debug)]
pub struct GpuTile {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

/// A headless wgpu device with the composite pipeline state.
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    ambient: AmbientState,
    shader: wgpu::ShaderModule,
    tile_bgl: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    ambient_buffer: wgpu::Buffer,
    ambient_bind_group: wgpu::BindGroup,
    pipelines: Vec<(wgpu::TextureFormat, wgpu::BlendState, wgpu::RenderPipeline)>,
    next_target: u64,
}

impl WgpuDevice {
    /// Wrap an existing device and queue.
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("cubeuv-composite-shader"),
            source: wgpu::ShaderSource::Wgsl(COMPOSITE_SHADER_SOURCE.into()),
        });

        let ambient_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("cubeuv-ambient-bgl"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let tile_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("cubeuv-tile-bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::Cube,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("cubeuv-composite-layout"),
            bind_group_layouts: &[&ambient_bgl, &tile_bgl],
            immediate_size: 0,
        });

        let ambient_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("cubeuv-ambient"),
            size: std::mem::size_of::<AmbientUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let ambient_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("cubeuv-ambient-bg"),
            layout: &ambient_bgl,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: ambient_buffer.as_entire_binding(),
            }],
        });

        Self {
            device,
            queue,
            ambient: AmbientState::default(),
            shader,
            tile_bgl,
            pipeline_layout,
            ambient_buffer,
            ambient_bind_group,
            pipelines: Vec::new(),
            next_target: 1,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Index of the cached pipeline for `format` and `blend`, creating it on first use.
    fn pipeline_index(&mut self, format: wgpu::TextureFormat, blend: wgpu::BlendState) -> usize {
        match self
            .pipelines
            .iter()
            .position(|(f, b, _)| *f == format && *b == blend)
        {
            Some(index) => index,
            None => {
                let pipeline = self.create_pipeline(format, blend);
                self.pipelines.push((format, blend, pipeline));
                self.pipelines.len() - 1
            }
        }
    }

    fn create_pipeline(
        &self,
        format: wgpu::TextureFormat,
        blend: wgpu::BlendState,
    ) -> wgpu::RenderPipeline {
        log::debug!("Creating composite pipeline for {format:?}");
        self.device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("cubeuv-composite-pipeline"),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &self.shader,
                    entry_point: Some("vs_main"),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<[f32; 2]>() as u64,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &wgpu::vertex_attr_array![0 => Float32x2],
                    }],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                // The projection flips y, so winding depends on the tile; draw both sides.
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &self.shader,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: Some(blend),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                multiview_mask: None,
                cache: None,
            })
    }

    /// Copy the atlas back to host memory.
    pub fn read_atlas(&self, atlas: &GpuAtlas) -> Result<AtlasImage, CompositeError> {
        let size = atlas.size;
        let bpp = atlas.format.block_size();
        let unpadded = size * bpp;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = unpadded.div_ceil(align) * align;

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("cubeuv-atlas-readback"),
            size: u64::from(padded * size),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("cubeuv-readback-encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &atlas.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(size),
                },
            },
            wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: None,
            })
            .map_err(|e| CompositeError::Readback(e.to_string()))?;
        rx.recv()
            .map_err(|e| CompositeError::Readback(e.to_string()))?
            .map_err(|e| CompositeError::Readback(e.to_string()))?;

        let mapped = slice.get_mapped_range();
        let mut pixels = Vec::with_capacity((size * size) as usize);
        for row in 0..size {
            let start = (row * padded) as usize;
            let row_data = &mapped[start..start + unpadded as usize];
            for texel in row_data.chunks_exact(bpp as usize) {
                pixels.push(decode_texel(atlas.format, texel));
            }
        }
        drop(mapped);
        buffer.unmap();

        Ok(AtlasImage::from_pixels(size, pixels))
    }
}

/// Run `allocate` inside an out-of-memory error scope.
fn allocate_in_scope<T>(
    device: &wgpu::Device,
    what: &'static str,
    allocate: impl FnOnce() -> T,
) -> Result<T, CompositeError> {
    let scope = device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    let value = allocate();
    let error = pollster::block_on(scope.pop());
    allocation_result(what, value, error)
}

fn allocation_result<T>(
    what: &'static str,
    value: T,
    error: Option<wgpu::Error>,
) -> Result<T, CompositeError> {
    match error {
        Some(err) => {
            log::warn!("GPU allocation of {what} failed: {err}");
            Err(CompositeError::ResourceAllocation {
                what,
                reason: err.to_string(),
            })
        }
        None => Ok(value),
    }
}

fn decode_texel(format: PixelFormat, texel: &[u8]) -> [f32; 4] {
    match format {
        PixelFormat::Rgba8Unorm => [
            f32::from(texel[0]) / 255.0,
            f32::from(texel[1]) / 255.0,
            f32::from(texel[2]) / 255.0,
            f32::from(texel[3]) / 255.0,
        ],
        PixelFormat::Rgba16Float => {
            let channel = |i: usize| {
                half::f16::from_bits(u16::from_le_bytes([texel[2 * i], texel[2 * i + 1]])).to_f32()
            };
            [channel(0), channel(1), channel(2), channel(3)]
        }
    }
}

impl CompositeDevice for WgpuDevice {
    type Cube = GpuCube;
    type Target = GpuAtlas;
    type Quad = GpuQuad;
    type TileResource = GpuTile;

    fn ambient(&self) -> AmbientState {
        self.ambient
    }

    fn set_ambient(&mut self, state: &AmbientState) {
        self.ambient = *state;
    }

    fn create_target(
        &mut self,
        descriptor: &AtlasTargetDescriptor,
    ) -> Result<GpuAtlas, CompositeError> {
        let max = self.device.limits().max_texture_dimension_2d;
        if descriptor.size == 0 || descriptor.size > max {
            return Err(CompositeError::ResourceAllocation {
                what: "render target",
                reason: format!("size {} outside 1..={max}", descriptor.size),
            });
        }
        let texture = allocate_in_scope(&self.device, "render target", || {
            self.device.create_texture(&wgpu::TextureDescriptor {
                label: Some(&descriptor.name),
                size: wgpu::Extent3d {
                    width: descriptor.size,
                    height: descriptor.size,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: descriptor.format.to_wgpu(),
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_SRC,
                view_formats: &[],
            })
        })?;
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let id = TargetId(self.next_target);
        self.next_target += 1;
        log::info!(
            "Created atlas target '{}' ({}x{}, {:?})",
            descriptor.name,
            descriptor.size,
            descriptor.size,
            descriptor.format
        );
        Ok(GpuAtlas {
            id,
            texture,
            view,
            size: descriptor.size,
            format: descriptor.format,
            encoding: descriptor.encoding,
        })
    }

    fn target_id(&self, target: &GpuAtlas) -> TargetId {
        target.id
    }

    fn bind_target(&mut self, target: &GpuAtlas) -> Result<(), CompositeError> {
        self.ambient.render_target = Some(target.id);
        Ok(())
    }

    fn create_quad(&mut self) -> Result<GpuQuad, CompositeError> {
        let buffer = allocate_in_scope(&self.device, "quad", || {
            self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("cubeuv-quad"),
                size: std::mem::size_of_val(&QUAD_VERTICES) as u64,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        })?;
        self.queue
            .write_buffer(&buffer, 0, bytemuck::cast_slice(&QUAD_VERTICES));
        Ok(GpuQuad { buffer })
    }

    fn create_tile(
        &mut self,
        binding: &TileBinding<'_, GpuCube>,
        target: &GpuAtlas,
    ) -> Result<GpuTile, CompositeError> {
        let model = Mat4::from_translation(binding.tile.center.extend(0.0))
            * Mat4::from_scale(Vec3::new(binding.tile.extent, binding.tile.extent, 1.0));
        let params = TileParams {
            transform: (atlas_projection(binding.atlas_size) * model).to_cols_array_2d(),
            face_index: binding.tile.face.index(),
            source_encoding: binding.source.encoding.shader_id(),
            output_encoding: target.encoding.shader_id(),
            map_size: binding.cube.face_size as f32,
        };
        let buffer = allocate_in_scope(&self.device, "tile", || {
            self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("cubeuv-tile-params"),
                size: std::mem::size_of::<TileParams>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        })?;
        self.queue
            .write_buffer(&buffer, 0, bytemuck::cast_slice(&[params]));
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("cubeuv-tile-bg"),
            layout: &self.tile_bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&binding.cube.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&binding.cube.sampler),
                },
            ],
        });
        Ok(GpuTile { buffer, bind_group })
    }

    fn draw_tiles(
        &mut self,
        target: &GpuAtlas,
        quad: &GpuQuad,
        tiles: &[GpuTile],
        blend: wgpu::BlendState,
    ) -> Result<(), CompositeError> {
        if self.ambient.render_target != Some(target.id) {
            return Err(CompositeError::TargetBind {
                reason: format!("target {:?} is not bound", target.id),
            });
        }
        let uniform = AmbientUniform::from(&self.ambient);
        self.queue
            .write_buffer(&self.ambient_buffer, 0, bytemuck::cast_slice(&[uniform]));

        let index = self.pipeline_index(target.format.to_wgpu(), blend);
        let pipeline = &self.pipelines[index].2;

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("cubeuv-composite-encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("cubeuv-composite"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &self.ambient_bind_group, &[]);
            pass.set_vertex_buffer(0, quad.buffer.slice(..));
            for tile in tiles {
                pass.set_bind_group(1, &tile.bind_group, &[]);
                pass.draw(0..QUAD_VERTICES.len() as u32, 0..1);
            }
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn release_tile(&mut self, tile: GpuTile) {
        tile.buffer.destroy();
    }

    fn release_quad(&mut self, quad: GpuQuad) {
        quad.buffer.destroy();
    }
}

/// Request a headless device and queue.
pub async fn request_headless_device() -> Result<(wgpu::Device, wgpu::Queue), GpuInitError> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });

    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        })
        .await
        .map_err(|_| GpuInitError::NoAdapter)?;

    let info = adapter.get_info();
    log::info!(
        "Selected GPU: {} ({:?}, {:?})",
        info.name,
        info.backend,
        info.device_type
    );

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some("cubeuv-device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::default(),
            experimental_features: wgpu::ExperimentalFeatures::default(),
            trace: wgpu::Trace::Off,
        })
        .await?;
    Ok((device, queue))
}

/// Initialize a headless [`WgpuDevice`] synchronously using `pollster`.
pub fn init_wgpu_device_blocking() -> Result<WgpuDevice, GpuInitError> {
    let (device, queue) = pollster::block_on(request_headless_device())?;
    Ok(WgpuDevice::new(device, queue))
}

/// Upload every level of a CPU pyramid as [`GpuCube`]s.
pub fn upload_lod_set(
    device: &WgpuDevice,
    lods: &crate::CubeLodSet<std::sync::Arc<CubeImage>>,
) -> Result<crate::CubeLodSet<GpuCube>, ConfigurationError> {
    let info = *lods.info();
    let gpu = lods
        .iter()
        .enumerate()
        .map(|(i, lod)| crate::CubeLod {
            texture: GpuCube::from_image(device, &lod.texture, &info, &format!("cubeuv-lod{i}")),
            face_size: lod.face_size,
        })
        .collect();
    crate::CubeLodSet::new(gpu, info)
}
