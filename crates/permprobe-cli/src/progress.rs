//! Per-case result lines and the verbose spinner.

use indicatif::{ProgressBar, ProgressStyle};
use permprobe::matrix::{ProgressCallback, ProgressEvent};
use permprobe::model::CaseStatus;
use std::io::{self, Write};
use std::sync::Mutex;

/// Prints `<case name> ... ok|FAILED|ERROR|TIMEOUT` as each case finishes.
///
/// Lines go to stdout, or to stderr when stdout carries the JSON report.
pub struct CaseLines {
    to_stderr: bool,
    color: bool,
    verbose: bool,
    spinner: Mutex<Option<ProgressBar>>,
    total_cases: Mutex<usize>,
}

impl CaseLines {
    pub fn new(to_stderr: bool, color: bool, verbose: bool) -> Self {
        Self {
            to_stderr,
            color,
            verbose,
            spinner: Mutex::new(None),
            total_cases: Mutex::new(0),
        }
    }

    fn line(&self, text: &str) {
        if self.to_stderr {
            let _ = writeln!(io::stderr(), "{text}");
        } else {
            let _ = writeln!(io::stdout(), "{text}");
        }
    }

    fn paint(&self, status: CaseStatus) -> String {
        let label = status.label();
        if !self.color {
            return label.to_string();
        }
        let code = match status {
            CaseStatus::Passed => "32",
            CaseStatus::Failed | CaseStatus::Errored => "31",
            CaseStatus::TimedOut | CaseStatus::Skipped => "33",
        };
        format!("\x1b[{code}m{label}\x1b[0m")
    }

    fn clear_spinner(&self) {
        if let Ok(mut spinner) = self.spinner.lock() {
            if let Some(pb) = spinner.take() {
                pb.finish_and_clear();
            }
        }
    }
}

impl ProgressCallback for CaseLines {
    fn on_progress(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::MatrixStarted {
                run_id,
                total_cases,
            } => {
                if let Ok(mut total) = self.total_cases.lock() {
                    *total = *total_cases;
                }
                if self.verbose {
                    let _ = writeln!(io::stderr(), "matrix started: {run_id} ({total_cases} cases)");
                }
            }
            ProgressEvent::CaseStarted { index, name } => {
                if !self.verbose {
                    return;
                }
                let total = self.total_cases.lock().map_or(0, |total| *total);
                let pb = ProgressBar::new_spinner();
                pb.set_style(
                    ProgressStyle::default_spinner()
                        .template("{spinner:.cyan} [{elapsed_precise}] {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                pb.set_message(format!("[{index}/{total}] {name}"));
                pb.enable_steady_tick(std::time::Duration::from_millis(100));
                if let Ok(mut spinner) = self.spinner.lock() {
                    *spinner = Some(pb);
                }
            }
            ProgressEvent::CaseCompleted {
                name,
                status,
                duration_ms,
                failures,
                error,
                ..
            } => {
                self.clear_spinner();
                let label = self.paint(*status);
                if self.verbose {
                    self.line(&format!("{name} ... {label} ({duration_ms}ms)"));
                } else {
                    self.line(&format!("{name} ... {label}"));
                }
                for failure in failures {
                    if let Some(message) = &failure.message {
                        self.line(&format!("    {}: {message}", failure.check));
                    }
                }
                if *status == CaseStatus::Errored {
                    if let Some(error) = error {
                        self.line(&format!("    {}: {}", error.code, error.message));
                    }
                }
            }
            ProgressEvent::MatrixCompleted {
                success,
                duration_ms,
                ..
            } => {
                self.clear_spinner();
                if self.verbose {
                    let outcome = if *success { "passed" } else { "failed" };
                    let _ = writeln!(io::stderr(), "matrix {outcome}: {duration_ms}ms total");
                }
            }
        }
    }
}
