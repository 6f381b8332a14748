//! Command-line argument parsing for the bake tool.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;
use crate::config::{AtlasFormat, BakeBackend};

/// Packs a cube-map LOD pyramid into a CubeUV atlas PNG.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "cubeuv-bake", about = "Pack cube-map LODs into a CubeUV atlas")]
pub struct CliArgs {
    /// Directory holding `lod{L}_{face}.png` images.
    #[arg(long, short)]
    pub input: Option<PathBuf>,

    /// Output PNG path.
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Base face width for the procedural sky (ignored with --input).
    #[arg(long)]
    pub base_size: Option<u32>,

    /// Number of LODs to pack.
    #[arg(long)]
    pub lod_count: Option<u32>,

    /// Source color encoding.
    #[arg(long)]
    pub encoding: Option<String>,

    /// Atlas texel format.
    #[arg(long, value_enum)]
    pub format: Option<AtlasFormat>,

    /// Composite backend.
    #[arg(long, value_enum)]
    pub backend: Option<BakeBackend>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref input) = args.input {
            self.bake.input_dir = Some(input.clone());
        }
        if let Some(ref output) = args.output {
            self.bake.output = output.clone();
        }
        if let Some(size) = args.base_size {
            self.atlas.base_face_size = size;
        }
        if let Some(count) = args.lod_count {
            self.atlas.lod_count = Some(count);
        }
        if let Some(ref encoding) = args.encoding {
            self.atlas.encoding = encoding.clone();
        }
        if let Some(format) = args.format {
            self.atlas.format = format;
        }
        if let Some(backend) = args.backend {
            self.bake.backend = backend;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            input: Some(PathBuf::from("sky")),
            base_size: Some(64),
            backend: Some(BakeBackend::Gpu),
            ..Default::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.bake.input_dir, Some(PathBuf::from("sky")));
        assert_eq!(config.atlas.base_face_size, 64);
        assert_eq!(config.bake.backend, BakeBackend::Gpu);
        // Non-overridden fields retain defaults
        assert_eq!(config.atlas.encoding, "linear");
        assert_eq!(config.bake.output, PathBuf::from("cubeuv_atlas.png"));
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config, original);
    }

    #[test]
    fn test_cli_parses_value_enums() {
        let args = CliArgs::parse_from([
            "cubeuv-bake",
            "--format",
            "rgba8",
            "--backend",
            "software",
            "--lod-count",
            "2",
        ]);
        assert_eq!(args.format, Some(AtlasFormat::Rgba8));
        assert_eq!(args.backend, Some(BakeBackend::Software));
        assert_eq!(args.lod_count, Some(2));
    }
}
