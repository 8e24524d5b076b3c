//! Configuration and device list input.

pub mod config;
pub mod inventory;
pub mod paths;

pub use config::{
    Config, ConfigSource, ConfigSources, ENV_CONFIG, ENV_NO_COLOR, ENV_NO_COLOR_STD, ENV_PACING,
    ENV_POLL_INTERVAL, ENV_QKVIEW_TIMEOUT, ENV_TIMEOUT, ENV_UCS_TIMEOUT, ResolvedConfig,
};
pub use inventory::{read_targets, targets_from_hosts};
pub use paths::AppPaths;
