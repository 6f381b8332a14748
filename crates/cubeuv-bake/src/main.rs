//! `cubeuv-bake`: pack a cube-map LOD pyramid into a CubeUV atlas PNG.
//!
//! Faces are read from `<input>/lod{L}_{face}.png` (faces `px py pz nx ny nz`);
//! without an input directory a procedural test sky is packed instead.

mod bake;
mod error;
mod input;
mod output;

use std::path::PathBuf;

use clap::Parser;
use cubeuv_config::{CliArgs, Config, default_config_dir};

use crate::error::BakeError;

/// Resolve the config directory, load it, and apply CLI overrides.
///
/// An explicit `--config` directory must load cleanly; the default location
/// falls back to built-in defaults when its file is unreadable.
fn load_config(args: &CliArgs) -> Result<(Config, PathBuf), BakeError> {
    let (mut config, config_dir) = match &args.config {
        Some(dir) => (Config::load_or_create(dir)?, dir.clone()),
        None => {
            let dir = default_config_dir()?;
            let config = Config::load_or_create(&dir).unwrap_or_else(|e| {
                eprintln!("Failed to load config: {e}, using defaults");
                Config::default()
            });
            (config, dir)
        }
    };
    config.apply_cli_overrides(args);
    Ok((config, config_dir))
}

fn main() {
    let args = CliArgs::parse();

    let (config, config_dir) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };

    let log_dir = config_dir.join("logs");
    cubeuv_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    match bake::run(&config) {
        Ok(report) => log::info!(
            "Atlas {}x{} written to {}",
            report.atlas_size,
            report.atlas_size,
            config.bake.output.display()
        ),
        Err(e) => {
            log::error!("Bake failed: {e}");
            std::process::exit(1);
        }
    }
}
