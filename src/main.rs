//! bigscan - BIG-IP inventory scanner
//!
//! CLI entry point.

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]

use clap::Parser;

use bigscan::cli::Cli;
use bigscan::core::logging::{self, LogSettings};
use bigscan::util::env::should_use_color;

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    logging::init(&LogSettings::resolve(
        cli.log_level.as_deref(),
        cli.verbose,
        cli.json_output,
    ));

    match bigscan::cli::scan::execute(&cli).await {
        Ok(code) => std::process::ExitCode::from(code as u8),
        Err(e) => {
            tracing::error!(code = e.error_code(), "{e}");
            let no_color = !should_use_color(cli.no_color);
            eprintln!(
                "{}",
                bigscan::render::error::render_error(&e, cli.format, no_color)
            );
            std::process::ExitCode::from(e.exit_code() as u8)
        }
    }
}
