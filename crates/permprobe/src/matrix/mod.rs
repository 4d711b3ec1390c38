//! The scenario matrix: every selected permission type crossed with every
//! selected response scenario, one isolated session per case.
//!
//! # Key Operations
//!
//! - [`Matrix::new`] - Validate the config and fix the case list
//! - [`Matrix::warm_up`] - One throwaway preauthorized session
//! - [`Matrix::run`] - Run every case and build a [`MatrixReport`]
//! - [`run_matrix`] - Convenience wrapper for the three steps above
//!
//! Cases run strictly one after another. Each session is torn down before
//! the next one starts, and a failing or erroring case never stops the
//! rest unless fail-fast is enabled, in which case the remaining cases are
//! reported as skipped.

mod progress;

pub use progress::{CollectingProgress, NoopProgress, ProgressCallback, ProgressEvent};

use crate::artifacts::{ArtifactsWriter, ArtifactsWriterConfig};
use crate::config::validate_config;
use crate::model::{
    build_matrix, CaseReport, CaseStatus, HarnessConfig, MatrixReport, PermissionType,
    ResponseScenario, RunId, TestCase,
};
use crate::runner::{capture_case, elapsed_ms, execute_case, RunnerError, RunnerResult};
use std::time::Instant;

#[derive(Default)]
pub struct MatrixOptions {
    pub artifacts: Option<ArtifactsWriterConfig>,
    pub progress: Option<Box<dyn ProgressCallback>>,
}

pub struct Matrix {
    executable: String,
    config: HarnessConfig,
    cases: Vec<TestCase>,
    run_id: RunId,
}

impl Matrix {
    /// # Errors
    /// - `E_CONFIG`: the config failed validation or selects no cases
    pub fn new(executable: impl Into<String>, config: HarnessConfig) -> RunnerResult<Self> {
        let executable = executable.into();
        if executable.is_empty() {
            return Err(RunnerError::config("target executable path is empty", None));
        }
        validate_config(&config)?;
        let cases = build_matrix(&config.permissions, &config.scenarios);
        if cases.is_empty() {
            return Err(RunnerError::config(
                "no cases selected",
                serde_json::json!({
                    "permissions": config.permissions.len(),
                    "scenarios": config.scenarios.len(),
                }),
            ));
        }
        Ok(Self {
            executable,
            config,
            cases,
            run_id: RunId::new(),
        })
    }

    #[must_use]
    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    #[must_use]
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    #[must_use]
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Launch the target once with write preauthorized and discard the result.
    ///
    /// Absorbs one-time startup output (such as a first compile) so it does
    /// not land in the first real case's capture. Failures are logged only.
    pub fn warm_up(&self) {
        let case = TestCase::new(PermissionType::Write, ResponseScenario::AllowFlag);
        let capture = self.config.capture.to_capture_config();
        match capture_case(&self.executable, &case, &self.config, &capture, self.run_id) {
            Ok(outcome) => tracing::debug!(
                exit = ?outcome.exit,
                timed_out = outcome.timed_out,
                "warm-up finished"
            ),
            Err(err) => tracing::warn!(error = %err, "warm-up failed"),
        }
    }

    /// Run every case in order and build the report.
    ///
    /// Case outcomes never surface as `Err`; only artifact writing can fail
    /// the run as a whole.
    ///
    /// # Errors
    /// - `E_CONFIG` / `E_IO`: the artifacts directory could not be prepared or written
    pub fn run(&self, options: MatrixOptions) -> RunnerResult<MatrixReport> {
        let progress: Box<dyn ProgressCallback> = match options.progress {
            Some(progress) => progress,
            None => Box::new(NoopProgress),
        };
        let mut artifacts = options
            .artifacts
            .map(|config| ArtifactsWriter::new(self.run_id, config))
            .transpose()?;

        let run_started = Instant::now();
        tracing::info!(
            run_id = %self.run_id,
            executable = %self.executable,
            cases = self.cases.len(),
            "matrix started"
        );
        progress.on_progress(&ProgressEvent::MatrixStarted {
            run_id: self.run_id,
            total_cases: self.cases.len(),
        });

        if self.config.warm_up {
            self.warm_up();
        }

        let mut reports: Vec<CaseReport> = Vec::with_capacity(self.cases.len());
        let mut stopped = false;
        for (position, case) in self.cases.iter().enumerate() {
            let index = position + 1;
            let (report, output) = if stopped {
                let skipped = CaseReport::without_capture(
                    case,
                    case.args(&self.config.entry, &self.config.selector_prefix),
                    CaseStatus::Skipped,
                    elapsed_ms(&run_started),
                    None,
                );
                (skipped, None)
            } else {
                progress.on_progress(&ProgressEvent::CaseStarted {
                    index,
                    name: case.name.clone(),
                });
                execute_case(&self.executable, case, &self.config, self.run_id, &run_started)
            };

            progress.on_progress(&ProgressEvent::CaseCompleted {
                index,
                name: report.name.clone(),
                status: report.status,
                duration_ms: report.ended_at_ms.saturating_sub(report.started_at_ms),
                failures: report.failed_checks().into_iter().cloned().collect(),
                error: report.error.clone(),
            });
            if let Some(writer) = artifacts.as_mut() {
                writer.write_case(&report, output.as_ref())?;
            }
            if self.config.fail_fast && !stopped && report.status != CaseStatus::Passed {
                tracing::info!(case = %report.name, "fail-fast: skipping remaining cases");
                stopped = true;
            }
            reports.push(report);
        }

        let duration_ms = elapsed_ms(&run_started);
        let report = MatrixReport::new(self.run_id, self.executable.clone(), reports, duration_ms);
        tracing::info!(
            run_id = %self.run_id,
            passed = report.passed,
            failed = report.failed,
            timed_out = report.timed_out,
            errored = report.errored,
            skipped = report.skipped,
            "matrix finished"
        );
        progress.on_progress(&ProgressEvent::MatrixCompleted {
            run_id: self.run_id,
            success: report.success(),
            duration_ms,
        });
        if let Some(writer) = artifacts.as_mut() {
            writer.write_report(&report)?;
        }
        Ok(report)
    }
}

/// Validate, build and run the matrix for `executable`.
///
/// # Errors
/// See [`Matrix::new`] and [`Matrix::run`].
pub fn run_matrix(
    executable: impl Into<String>,
    config: HarnessConfig,
    options: MatrixOptions,
) -> RunnerResult<MatrixReport> {
    Matrix::new(executable, config)?.run(options)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_selection() {
        let config = HarnessConfig {
            scenarios: Vec::new(),
            ..HarnessConfig::default()
        };
        let err = Matrix::new("/bin/true", config).err().unwrap();
        assert_eq!(err.code, crate::runner::ErrorCode::Config);
    }

    #[test]
    fn rejects_empty_executable() {
        assert!(Matrix::new("", HarnessConfig::default()).is_err());
    }

    #[test]
    fn cases_follow_selection() {
        let config = HarnessConfig {
            permissions: vec![PermissionType::Net, PermissionType::Run],
            scenarios: vec![ResponseScenario::Deny],
            ..HarnessConfig::default()
        };
        let matrix = Matrix::new("/bin/true", config).unwrap();
        let names: Vec<_> = matrix.cases().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["test_net_deny", "test_run_deny"]);
    }
}
