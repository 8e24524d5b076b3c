//! Terminal progress while a scan runs.
//!
//! A spinner on stderr names the device and phase; long capture polls update
//! it with the remote status and elapsed time. Each finished device is
//! printed above the spinner. Without a terminal the spinner is hidden and
//! only the device lines are written.

use std::sync::Mutex;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::core::capture::{PollObserver, PollTick};
use crate::core::scan::{ScanObserver, ScanResult};
use crate::render::human::render_device_line;
use crate::util::format_elapsed;

/// Spinner-backed [`ScanObserver`].
pub struct ConsoleProgress {
    bar: ProgressBar,
    no_color: bool,
    /// `[i/n]` for the device in flight.
    position: Mutex<String>,
}

impl ConsoleProgress {
    /// Spinner on stderr when it is a terminal, hidden otherwise.
    #[must_use]
    pub fn new(no_color: bool) -> Self {
        let bar = if crate::util::env::stderr_is_tty() {
            let bar = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
                bar.set_style(style);
            }
            bar.enable_steady_tick(Duration::from_millis(120));
            bar
        } else {
            ProgressBar::hidden()
        };
        Self {
            bar,
            no_color,
            position: Mutex::new(String::new()),
        }
    }

    /// Run `f` with the spinner cleared, e.g. around a terminal prompt.
    pub fn suspend<R>(&self, f: impl FnOnce() -> R) -> R {
        self.bar.suspend(f)
    }

    /// Remove the spinner.
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }

    fn position(&self) -> String {
        self.position
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    fn print(&self, line: &str) {
        if self.bar.is_hidden() {
            eprintln!("{line}");
        } else {
            self.bar.println(line);
        }
    }
}

impl PollObserver for ConsoleProgress {
    fn on_tick(&self, tick: &PollTick<'_>) {
        self.bar.set_message(format!(
            "{} {}: {} {} ({} / {})",
            self.position(),
            tick.host,
            tick.kind.label(),
            tick.remote_status,
            format_elapsed(tick.elapsed),
            format_elapsed(tick.timeout),
        ));
    }
}

impl ScanObserver for ConsoleProgress {
    fn device_started(&self, index: usize, total: usize, host: &str) {
        let position = format!("[{}/{total}]", index + 1);
        self.bar.set_message(format!("{position} {host}: starting"));
        if let Ok(mut slot) = self.position.lock() {
            *slot = position;
        }
    }

    fn phase(&self, host: &str, phase: &str) {
        self.bar
            .set_message(format!("{} {host}: {phase}", self.position()));
    }

    fn device_finished(&self, _index: usize, _total: usize, result: &ScanResult) {
        self.print(&render_device_line(result, self.no_color));
    }
}
