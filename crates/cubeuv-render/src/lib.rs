//! Offscreen composite pass that resamples a cube-map LOD pyramid into a
//! single CubeUV atlas texture.
//!
//! [`CubeUvPacker`] drives any [`CompositeDevice`]. Two devices are provided:
//! [`WgpuDevice`] renders on the GPU, [`SoftwareDevice`] is a CPU reference
//! renderer used for offline baking and tests.

pub mod ambient;
pub mod device;
pub mod encoding;
pub mod error;
pub mod gpu;
pub mod packer;
pub mod software;
pub mod source;

pub use ambient::{AmbientScope, AmbientState, TargetId, ToneMapping};
pub use device::{CompositeDevice, TileBinding};
pub use encoding::{
    AtlasTargetDescriptor, CubeTextureInfo, Mapping, PixelFormat, TextureEncoding, TextureFilter,
};
pub use error::{CompositeError, ConfigurationError};
pub use gpu::{
    GpuAtlas, GpuCube, GpuInitError, WgpuDevice, init_wgpu_device_blocking, upload_lod_set,
};
pub use packer::{ATLAS_TEXTURE_NAME, CubeUvPacker};
pub use software::{AtlasImage, CubeImage, SoftwareDevice};
pub use source::{CubeLod, CubeLodSet};
