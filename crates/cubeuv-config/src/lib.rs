//! Configuration for the CubeUV bake tool.
//!
//! Settings persist to disk as RON and can be overridden from the command line.
//! Unknown or missing fields fall back to defaults so older and newer config
//! files keep loading.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    AtlasConfig, AtlasFormat, BakeBackend, BakeConfig, CONFIG_FILE_NAME, Config, DebugConfig,
    default_config_dir,
};
pub use error::ConfigError;
