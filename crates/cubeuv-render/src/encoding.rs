//! Texel color encodings, source texture metadata, and the atlas target descriptor.

use std::str::FromStr;

use glam::{Vec3, Vec4, Vec4Swizzles};

use crate::error::ConfigurationError;

/// Exponent used by [`TextureEncoding::Gamma`] and the ambient gamma flags.
pub const GAMMA_FACTOR: f32 = 2.0;

/// Range multiplier for [`TextureEncoding::Rgbd`].
pub const RGBD_MAX_RANGE: f32 = 256.0;

/// How color values are stored in a texture's channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureEncoding {
    Linear,
    Srgb,
    Gamma,
    /// Shared 8-bit exponent in alpha.
    Rgbe,
    /// Alpha holds a multiplier with range 7.
    Rgbm7,
    /// Alpha holds a multiplier with range 16.
    Rgbm16,
    /// Alpha holds a divisor.
    Rgbd,
    LogLuv,
}

impl TextureEncoding {
    /// The encoding the atlas is written in when the source uses `self`.
    ///
    /// RGBE cannot survive filtered writes, so it is repacked as RGBM16.
    /// LogLuv has no writable equivalent.
    pub fn composite_safe(self) -> Result<TextureEncoding, ConfigurationError> {
        match self {
            TextureEncoding::Rgbe => Ok(TextureEncoding::Rgbm16),
            TextureEncoding::LogLuv => Err(ConfigurationError::UnsupportedEncoding(self)),
            other => Ok(other),
        }
    }

    /// Identifier shared with the WGSL composite shader.
    pub(crate) fn shader_id(self) -> u32 {
        match self {
            TextureEncoding::Linear => 0,
            TextureEncoding::Srgb => 1,
            TextureEncoding::Gamma => 2,
            TextureEncoding::Rgbe => 3,
            TextureEncoding::Rgbm7 => 4,
            TextureEncoding::Rgbm16 => 5,
            TextureEncoding::Rgbd => 6,
            TextureEncoding::LogLuv => 7,
        }
    }

    /// Decode a stored texel to linear RGBA.
    ///
    /// LogLuv sources are rejected before compositing; their texels pass through.
    pub fn decode(self, texel: Vec4) -> Vec4 {
        match self {
            TextureEncoding::Linear | TextureEncoding::LogLuv => texel,
            TextureEncoding::Srgb => srgb_to_linear(texel),
            TextureEncoding::Gamma => gamma_to_linear(texel),
            TextureEncoding::Rgbe => {
                let scale = (texel.w * 255.0 - 128.0).exp2();
                (texel.xyz() * scale).extend(1.0)
            }
            TextureEncoding::Rgbm7 => rgbm_to_linear(texel, 7.0),
            TextureEncoding::Rgbm16 => rgbm_to_linear(texel, 16.0),
            TextureEncoding::Rgbd => {
                if texel.w <= 0.0 {
                    return Vec4::new(0.0, 0.0, 0.0, 1.0);
                }
                (texel.xyz() * ((RGBD_MAX_RANGE / 255.0) / texel.w)).extend(1.0)
            }
        }
    }

    /// Encode a linear RGBA value for storage.
    ///
    /// LogLuv is never a composite target; it passes values through unchanged.
    pub fn encode(self, linear: Vec4) -> Vec4 {
        match self {
            TextureEncoding::Linear | TextureEncoding::LogLuv => linear,
            TextureEncoding::Srgb => linear_to_srgb(linear),
            TextureEncoding::Gamma => linear_to_gamma(linear),
            TextureEncoding::Rgbe => {
                let max = linear.xyz().max_element();
                if max <= 0.0 {
                    return Vec4::new(0.0, 0.0, 0.0, 0.0);
                }
                let exp = max.log2().ceil().clamp(-128.0, 127.0);
                (linear.xyz() / exp.exp2()).extend((exp + 128.0) / 255.0)
            }
            TextureEncoding::Rgbm7 => linear_to_rgbm(linear, 7.0),
            TextureEncoding::Rgbm16 => linear_to_rgbm(linear, 16.0),
            TextureEncoding::Rgbd => {
                let max = linear.xyz().max_element();
                if max <= 0.0 {
                    return Vec4::new(0.0, 0.0, 0.0, 1.0);
                }
                let d = (RGBD_MAX_RANGE / max).max(1.0);
                let d = (d.floor() / 255.0).clamp(0.0, 1.0);
                (linear.xyz() * (d * (255.0 / RGBD_MAX_RANGE))).extend(d)
            }
        }
    }
}

impl FromStr for TextureEncoding {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "linear" => Ok(TextureEncoding::Linear),
            "srgb" => Ok(TextureEncoding::Srgb),
            "gamma" => Ok(TextureEncoding::Gamma),
            "rgbe" => Ok(TextureEncoding::Rgbe),
            "rgbm7" => Ok(TextureEncoding::Rgbm7),
            "rgbm16" => Ok(TextureEncoding::Rgbm16),
            "rgbd" => Ok(TextureEncoding::Rgbd),
            "logluv" => Ok(TextureEncoding::LogLuv),
            _ => Err(ConfigurationError::UnknownEncoding(s.to_string())),
        }
    }
}

fn srgb_channel_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c * 0.077_399_38
    } else {
        (c * 0.947_867_3 + 0.052_132_7).powf(2.4)
    }
}

fn linear_channel_to_srgb(c: f32) -> f32 {
    if c <= 0.003_130_8 {
        c * 12.92
    } else {
        c.powf(0.416_666_66) * 1.055 - 0.055
    }
}

fn srgb_to_linear(v: Vec4) -> Vec4 {
    Vec4::new(
        srgb_channel_to_linear(v.x),
        srgb_channel_to_linear(v.y),
        srgb_channel_to_linear(v.z),
        v.w,
    )
}

fn linear_to_srgb(v: Vec4) -> Vec4 {
    Vec4::new(
        linear_channel_to_srgb(v.x),
        linear_channel_to_srgb(v.y),
        linear_channel_to_srgb(v.z),
        v.w,
    )
}

pub(crate) fn gamma_to_linear(v: Vec4) -> Vec4 {
    v.xyz().max(Vec3::ZERO).powf(GAMMA_FACTOR).extend(v.w)
}

pub(crate) fn linear_to_gamma(v: Vec4) -> Vec4 {
    v.xyz().max(Vec3::ZERO).powf(1.0 / GAMMA_FACTOR).extend(v.w)
}

fn rgbm_to_linear(v: Vec4, max_range: f32) -> Vec4 {
    (v.xyz() * v.w * max_range).extend(1.0)
}

fn linear_to_rgbm(v: Vec4, max_range: f32) -> Vec4 {
    let max = v.xyz().max_element();
    let m = (max / max_range).clamp(0.0, 1.0);
    let m = (m * 255.0).ceil() / 255.0;
    if m <= 0.0 {
        return Vec4::ZERO;
    }
    (v.xyz() / (m * max_range)).extend(m)
}

/// Texel storage format for cube sources and the atlas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Rgba8Unorm,
    Rgba16Float,
}

impl PixelFormat {
    pub fn to_wgpu(self) -> wgpu::TextureFormat {
        match self {
            PixelFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            PixelFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        }
    }

    /// Bytes per texel.
    pub fn block_size(self) -> u32 {
        match self {
            PixelFormat::Rgba8Unorm => 4,
            PixelFormat::Rgba16Float => 8,
        }
    }
}

/// Sampling filter, with or without a mip component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFilter {
    Nearest,
    Linear,
    NearestMipmapNearest,
    LinearMipmapLinear,
}

impl TextureFilter {
    pub fn to_wgpu(self) -> (wgpu::FilterMode, wgpu::MipmapFilterMode) {
        match self {
            TextureFilter::Nearest => (wgpu::FilterMode::Nearest, wgpu::MipmapFilterMode::Nearest),
            TextureFilter::Linear => (wgpu::FilterMode::Linear, wgpu::MipmapFilterMode::Nearest),
            TextureFilter::NearestMipmapNearest => {
                (wgpu::FilterMode::Nearest, wgpu::MipmapFilterMode::Nearest)
            }
            TextureFilter::LinearMipmapLinear => {
                (wgpu::FilterMode::Linear, wgpu::MipmapFilterMode::Linear)
            }
        }
    }
}

/// Metadata shared by every cube map in a LOD set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubeTextureInfo {
    pub format: PixelFormat,
    pub mag_filter: TextureFilter,
    pub min_filter: TextureFilter,
    pub generate_mipmaps: bool,
    pub anisotropy: u16,
    pub encoding: TextureEncoding,
}

impl Default for CubeTextureInfo {
    fn default() -> Self {
        Self {
            format: PixelFormat::Rgba16Float,
            mag_filter: TextureFilter::Linear,
            min_filter: TextureFilter::LinearMipmapLinear,
            generate_mipmaps: true,
            anisotropy: 1,
            encoding: TextureEncoding::Linear,
        }
    }
}

/// How consumers should address a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mapping {
    /// Plain 2D UV lookup.
    Uv,
    /// CubeUV atlas: addressed through the LOD/sublevel/face tile layout.
    CubeUvReflection,
}

/// Everything a device needs to allocate the atlas render target.
#[derive(Debug, Clone, PartialEq)]
pub struct AtlasTargetDescriptor {
    pub name: String,
    pub size: u32,
    pub format: PixelFormat,
    pub mag_filter: TextureFilter,
    pub min_filter: TextureFilter,
    pub generate_mipmaps: bool,
    pub anisotropy: u16,
    pub encoding: TextureEncoding,
    pub mapping: Mapping,
}

impl AtlasTargetDescriptor {
    /// Derive the atlas target from the source cube metadata.
    ///
    /// When the atlas ends up RGBM16 both filters are forced to linear, since
    /// mip filtering across RGBM texels mixes unrelated multipliers.
    pub fn for_source(
        name: impl Into<String>,
        size: u32,
        source: &CubeTextureInfo,
    ) -> Result<Self, ConfigurationError> {
        let encoding = source.encoding.composite_safe()?;
        let (mag_filter, min_filter) = if encoding == TextureEncoding::Rgbm16 {
            (TextureFilter::Linear, TextureFilter::Linear)
        } else {
            (source.mag_filter, source.min_filter)
        };
        if encoding != source.encoding {
            log::debug!(
                "Remapped atlas encoding {:?} -> {:?}",
                source.encoding,
                encoding
            );
        }
        Ok(Self {
            name: name.into(),
            size,
            format: source.format,
            mag_filter,
            min_filter,
            generate_mipmaps: source.generate_mipmaps,
            anisotropy: source.anisotropy,
            encoding,
            mapping: Mapping::CubeUvReflection,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Vec4, b: Vec4, eps: f32) -> bool {
        (a - b).abs().max_element() < eps
    }

    #[test]
    fn test_rgbe_is_repacked_as_rgbm16() {
        assert_eq!(
            TextureEncoding::Rgbe.composite_safe(),
            Ok(TextureEncoding::Rgbm16)
        );
        assert_eq!(
            TextureEncoding::Srgb.composite_safe(),
            Ok(TextureEncoding::Srgb)
        );
    }

    #[test]
    fn test_logluv_is_rejected() {
        assert_eq!(
            TextureEncoding::LogLuv.composite_safe(),
            Err(ConfigurationError::UnsupportedEncoding(
                TextureEncoding::LogLuv
            ))
        );
    }

    #[test]
    fn test_parse_encoding_names() {
        assert_eq!("sRGB".parse(), Ok(TextureEncoding::Srgb));
        assert_eq!("rgbm16".parse(), Ok(TextureEncoding::Rgbm16));
        assert_eq!(
            "rgbx".parse::<TextureEncoding>(),
            Err(ConfigurationError::UnknownEncoding("rgbx".to_string()))
        );
    }

    #[test]
    fn test_rgbm16_descriptor_forces_linear_filters() {
        let source = CubeTextureInfo {
            encoding: TextureEncoding::Rgbe,
            mag_filter: TextureFilter::Nearest,
            min_filter: TextureFilter::NearestMipmapNearest,
            ..Default::default()
        };
        let desc = AtlasTargetDescriptor::for_source("atlas", 512, &source).unwrap();
        assert_eq!(desc.encoding, TextureEncoding::Rgbm16);
        assert_eq!(desc.mag_filter, TextureFilter::Linear);
        assert_eq!(desc.min_filter, TextureFilter::Linear);
        assert_eq!(desc.mapping, Mapping::CubeUvReflection);
    }

    #[test]
    fn test_linear_descriptor_keeps_source_filters() {
        let source = CubeTextureInfo {
            mag_filter: TextureFilter::Nearest,
            anisotropy: 4,
            ..Default::default()
        };
        let desc = AtlasTargetDescriptor::for_source("atlas", 256, &source).unwrap();
        assert_eq!(desc.mag_filter, TextureFilter::Nearest);
        assert_eq!(desc.min_filter, TextureFilter::LinearMipmapLinear);
        assert_eq!(desc.anisotropy, 4);
        assert_eq!(desc.size, 256);
    }

    #[test]
    fn test_hdr_encodings_preserve_value() {
        let hdr = Vec4::new(3.5, 0.25, 9.0, 1.0);
        for encoding in [
            TextureEncoding::Rgbe,
            TextureEncoding::Rgbm16,
            TextureEncoding::Rgbd,
        ] {
            let back = encoding.decode(encoding.encode(hdr));
            assert!(approx(back, hdr, 0.05), "{encoding:?}: {back:?}");
        }
    }

    #[test]
    fn test_srgb_curve_endpoints() {
        let enc = TextureEncoding::Srgb;
        assert!(approx(enc.encode(Vec4::ONE), Vec4::ONE, 1e-4));
        assert!(approx(enc.encode(Vec4::new(0.0, 0.0, 0.0, 1.0)), Vec4::W, 1e-6));
        let mid = enc.encode(Vec4::splat(0.214));
        assert!((mid.x - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_black_encodes_without_nan() {
        for encoding in [
            TextureEncoding::Rgbe,
            TextureEncoding::Rgbm7,
            TextureEncoding::Rgbm16,
            TextureEncoding::Rgbd,
        ] {
            let black = encoding.encode(Vec4::new(0.0, 0.0, 0.0, 1.0));
            assert!(black.is_finite(), "{encoding:?}");
            assert!(encoding.decode(black).xyz().max_element() < 1e-6);
        }
    }
}
