//! The scan command: load devices, scan them, write results.

use std::time::Instant;

use dialoguer::Input;
use dialoguer::console::Term;

use crate::cli::args::{Cli, OutputFormat};
use crate::core::capture::{CaptureKind, DiagnosticTaskOrchestrator};
use crate::core::credentials::{
    CredentialResolver, FallbackCredentials, NonInteractive, Prompter, TerminalPrompter,
};
use crate::core::extract::StandardExtractor;
use crate::core::http::build_client;
use crate::core::scan::{DeviceScanOrchestrator, ScanTarget};
use crate::core::session::SessionManager;
use crate::error::{ExitCode, Result, ScanError};
use crate::render::{self, ConsoleProgress, CsvSink, RunSummary};
use crate::storage::{ResolvedConfig, read_targets, targets_from_hosts};
use crate::util::env::{can_prompt, should_use_color};

/// Prompts with the spinner out of the way.
struct ProgressPrompter<'a> {
    inner: &'a dyn Prompter,
    progress: &'a ConsoleProgress,
}

impl Prompter for ProgressPrompter<'_> {
    fn is_interactive(&self) -> bool {
        self.inner.is_interactive()
    }

    fn prompt_username(&self, host: &str) -> Result<String> {
        self.progress.suspend(|| self.inner.prompt_username(host))
    }

    fn prompt_password(&self, host: &str, username: &str) -> Result<String> {
        self.progress
            .suspend(|| self.inner.prompt_password(host, username))
    }
}

/// Execute a scan. Returns the process exit code for a run that got as far
/// as scanning; fatal setup problems are returned as errors.
///
/// # Errors
///
/// Invalid flags or config, an unreadable device list, no devices, or an
/// output file that cannot be written.
pub async fn execute(cli: &Cli) -> Result<ExitCode> {
    cli.validate()?;
    let config = ResolvedConfig::resolve(cli)?;
    let no_color = config.no_color || !should_use_color(cli.no_color);
    let interactive = !cli.non_interactive && can_prompt();

    let targets = load_targets(cli, interactive)?;
    tracing::info!(devices = targets.len(), "Starting scan");

    let sessions = SessionManager::new(
        build_client(config.request_timeout)?,
        config.session_config(),
    );

    let progress = ConsoleProgress::new(no_color);
    let (terminal, non_interactive) = (TerminalPrompter, NonInteractive);
    let inner: &dyn Prompter = if interactive {
        &terminal
    } else {
        &non_interactive
    };
    let prompter = ProgressPrompter {
        inner,
        progress: &progress,
    };
    let resolver = CredentialResolver::new(
        FallbackCredentials::new(cli.user.clone(), cli.password.clone()),
        &prompter,
    );

    let mut orchestrator =
        DeviceScanOrchestrator::new(sessions.clone(), resolver, Box::new(StandardExtractor))
            .with_pacing(config.pacing);
    if cli.wants_qkview() {
        orchestrator = orchestrator.with_capture(DiagnosticTaskOrchestrator::new(
            sessions.clone(),
            CaptureKind::QkView,
            config.capture_config(CaptureKind::QkView),
        ));
    }
    if cli.ucs {
        orchestrator = orchestrator.with_capture(DiagnosticTaskOrchestrator::new(
            sessions,
            CaptureKind::Ucs,
            config.capture_config(CaptureKind::Ucs),
        ));
    }

    // Open the output before scanning so a bad path fails fast.
    let mut sink = CsvSink::create(&cli.out, &orchestrator.field_columns())?;

    let started = Instant::now();
    let results = orchestrator.run(&targets, &progress).await;
    progress.finish();

    render::write_all(&mut sink, &results)?;

    let summary = RunSummary::from_results(
        &results,
        cli.wants_qkview(),
        cli.ucs,
        &cli.out,
        started.elapsed(),
    );
    let output = render::render_summary(&summary, &results, cli.format, no_color)?;
    match cli.format {
        OutputFormat::Json => println!("{output}"),
        OutputFormat::Human => print!("{output}"),
    }

    Ok(if summary.failed > 0 {
        ExitCode::DeviceFailures
    } else {
        ExitCode::Success
    })
}

fn load_targets(cli: &Cli, interactive: bool) -> Result<Vec<ScanTarget>> {
    let targets = if let Some(path) = &cli.input {
        read_targets(path)?
    } else if !cli.hosts.is_empty() {
        targets_from_hosts(&cli.hosts)?
    } else if interactive {
        targets_from_hosts(&prompt_hosts()?)?
    } else {
        Vec::new()
    };

    if targets.is_empty() {
        return Err(ScanError::NoDevices);
    }
    Ok(targets)
}

/// Ask for addresses until a blank line or `quit`.
fn prompt_hosts() -> Result<Vec<String>> {
    let term = Term::stderr();
    let mut hosts = Vec::new();
    loop {
        let answer: String = Input::new()
            .with_prompt("BIG-IP address (blank to start scanning)")
            .allow_empty(true)
            .interact_text_on(&term)
            .map_err(|e| ScanError::Other(anyhow::anyhow!("address prompt failed: {e}")))?;
        let answer = answer.trim();
        if answer.is_empty() || answer.eq_ignore_ascii_case("quit") {
            break;
        }
        hosts.push(answer.to_string());
    }
    Ok(hosts)
}
