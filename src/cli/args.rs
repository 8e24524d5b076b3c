//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};

use crate::error::{Result, ScanError};

/// Default result file.
pub const DEFAULT_OUTPUT: &str = "bigip_device_info.csv";

/// BIG-IP inventory scanner - collect device facts, QKViews and UCS backups.
#[derive(Parser, Debug)]
#[command(name = "bigscan")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    // === Devices and credentials ===
    /// Username used when a device row has none
    #[arg(short = 'u', long = "user", value_name = "USER")]
    pub user: Option<String>,

    /// Password used when a device row has none
    #[arg(
        short = 'p',
        long = "pass",
        visible_alias = "password",
        value_name = "PASS",
        env = "BIGSCAN_PASSWORD",
        hide_env_values = true
    )]
    pub password: Option<String>,

    /// Input CSV with one device per row (ip,username,password)
    #[arg(short = 'i', long = "in", visible_alias = "input", value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Device address to scan (repeatable)
    #[arg(long = "host", value_name = "ADDRESS", conflicts_with = "input")]
    pub hosts: Vec<String>,

    /// Result CSV path
    #[arg(short = 'o', long = "out", value_name = "FILE", default_value = DEFAULT_OUTPUT)]
    pub out: PathBuf,

    // === Captures ===
    /// Create and download a QKView from each device
    #[arg(short = 'q', long)]
    pub qkview: bool,

    /// Disable QKView creation (the default)
    #[arg(long, conflicts_with = "qkview")]
    pub no_qkview: bool,

    /// Seconds to wait for a QKView to finish
    #[arg(long, value_name = "SECONDS")]
    pub qkview_timeout: Option<u64>,

    /// Create and download a UCS backup from each device
    #[arg(long)]
    pub ucs: bool,

    /// Seconds to wait for a UCS backup to finish
    #[arg(long, value_name = "SECONDS")]
    pub ucs_timeout: Option<u64>,

    /// Seconds between capture status polls
    #[arg(long, value_name = "SECONDS")]
    pub poll_interval: Option<u64>,

    /// Seconds to pause between devices
    #[arg(long, value_name = "SECONDS")]
    pub pacing: Option<u64>,

    /// Never prompt; devices with missing credentials fail instead
    #[arg(long)]
    pub non_interactive: bool,

    // === Output ===
    /// Summary format
    #[arg(long, value_enum, default_value = "human")]
    pub format: OutputFormat,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Log level
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Emit JSONL logs to stderr
    #[arg(long)]
    pub json_output: bool,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Whether a QKView was asked for.
    #[must_use]
    pub const fn wants_qkview(&self) -> bool {
        self.qkview && !self.no_qkview
    }

    /// Validate argument combinations clap cannot express.
    ///
    /// # Errors
    ///
    /// Zero timeouts or a zero poll interval.
    pub fn validate(&self) -> Result<()> {
        for (flag, value) in [
            ("--qkview-timeout", self.qkview_timeout),
            ("--ucs-timeout", self.ucs_timeout),
            ("--poll-interval", self.poll_interval),
        ] {
            if value == Some(0) {
                return Err(ScanError::ConfigInvalid {
                    key: flag.to_string(),
                    value: "0".to_string(),
                    message: "must be greater than 0 seconds".to_string(),
                });
            }
        }
        if self.hosts.iter().any(|h| h.trim().is_empty()) {
            return Err(ScanError::Config("--host needs a non-empty address".to_string()));
        }
        Ok(())
    }
}

/// Summary format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable colored summary
    #[default]
    Human,
    /// JSON summary on stdout
    Json,
}
