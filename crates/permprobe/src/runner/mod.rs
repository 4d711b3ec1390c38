//! Error taxonomy and single-case execution.
//!
//! [`run_case`] is one full session: launch the target with its streams on
//! three PTYs, type the scripted answers, capture until exit or deadline,
//! then evaluate the case's expectations against the capture.

use crate::assertions;
use crate::capture::{CaptureConfig, CaptureLoop, CaptureOutcome, CapturedOutput};
use crate::model::{CaseReport, CaseStatus, ErrorInfo, HarnessConfig, MarkerSummary, RunId, TestCase};
use crate::session::{Session, SessionConfig};
use miette::Diagnostic;
use serde_json::Value;
use std::fmt;
use std::time::Instant;

pub type RunnerResult<T> = Result<T, RunnerError>;

/// Stable error codes, each with its CLI exit status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// PTY allocation or configuration failed.
    Pty,
    /// The target could not be started.
    Spawn,
    /// Descriptor or file I/O failed.
    Io,
    /// A deadline elapsed.
    Timeout,
    /// Config file or option was invalid.
    Config,
    /// Output or exit code did not match expectations.
    AssertionFailed,
    /// Command-line arguments were invalid.
    CliInvalidArg,
    Internal,
}

impl ErrorCode {
    pub const ALL: [Self; 8] = [
        Self::Pty,
        Self::Spawn,
        Self::Io,
        Self::Timeout,
        Self::Config,
        Self::AssertionFailed,
        Self::CliInvalidArg,
        Self::Internal,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pty => "E_PTY",
            Self::Spawn => "E_SPAWN",
            Self::Io => "E_IO",
            Self::Timeout => "E_TIMEOUT",
            Self::Config => "E_CONFIG",
            Self::AssertionFailed => "E_ASSERTION_FAILED",
            Self::CliInvalidArg => "E_CLI_INVALID_ARG",
            Self::Internal => "E_INTERNAL",
        }
    }

    #[must_use]
    pub fn parse(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|candidate| candidate.as_str() == code)
    }

    /// Process exit status the CLI uses for this code.
    #[must_use]
    pub fn exit_code(self) -> i32 {
        match self {
            Self::AssertionFailed => 1,
            Self::Config | Self::CliInvalidArg => 2,
            Self::Pty | Self::Spawn | Self::Io => 3,
            Self::Timeout => 4,
            Self::Internal => 5,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{code}: {message}")]
pub struct RunnerError {
    pub code: ErrorCode,
    pub message: String,
    pub context: Option<Value>,
}

impl RunnerError {
    pub fn new(code: ErrorCode, message: impl Into<String>, context: impl Into<Option<Value>>) -> Self {
        Self {
            code,
            message: message.into(),
            context: context.into(),
        }
    }

    pub fn pty(message: impl Into<String>, err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::Pty, message, source_context(&err))
    }

    pub fn spawn(message: impl Into<String>, err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::Spawn, message, source_context(&err))
    }

    pub fn io(message: impl Into<String>, err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::Io, message, source_context(&err))
    }

    pub fn timeout(message: impl Into<String>, context: impl Into<Option<Value>>) -> Self {
        Self::new(ErrorCode::Timeout, message, context)
    }

    pub fn config(message: impl Into<String>, context: impl Into<Option<Value>>) -> Self {
        Self::new(ErrorCode::Config, message, context)
    }

    pub fn assertion(message: impl Into<String>, context: impl Into<Option<Value>>) -> Self {
        Self::new(ErrorCode::AssertionFailed, message, context)
    }

    pub fn cli_invalid_arg(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::CliInvalidArg, message, None)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message, None)
    }

    /// Attach a key to the context object, creating it if needed.
    #[must_use]
    pub fn with_context(mut self, key: &str, value: impl Into<Value>) -> Self {
        match self.context.as_mut() {
            Some(Value::Object(map)) => {
                map.insert(key.to_string(), value.into());
            }
            _ => {
                let mut map = serde_json::Map::new();
                if let Some(previous) = self.context.take() {
                    map.insert("previous".to_string(), previous);
                }
                map.insert(key.to_string(), value.into());
                self.context = Some(Value::Object(map));
            }
        }
        self
    }

    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.code.exit_code()
    }

    #[must_use]
    pub fn to_error_info(&self) -> ErrorInfo {
        ErrorInfo {
            code: self.code.as_str().to_string(),
            message: self.message.clone(),
            context: self.context.clone(),
        }
    }
}

fn source_context(err: &impl fmt::Display) -> Value {
    serde_json::json!({ "source": err.to_string() })
}

impl Diagnostic for RunnerError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(self.code))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        let hint = match self.code {
            ErrorCode::Pty => "PTY support may be unavailable; this is common in minimal containers",
            ErrorCode::Spawn => "check that the executable path is absolute and executable",
            ErrorCode::Timeout => "raise the capture timeout or check that the target is not waiting on input",
            _ => return None,
        };
        Some(Box::new(hint))
    }
}

/// Spawn the target for one case, type its script and capture its streams.
///
/// The session is torn down (descriptors closed, child reaped) before this
/// returns, on every path.
pub fn capture_case(
    executable: &str,
    case: &TestCase,
    config: &HarnessConfig,
    capture: &CaptureConfig,
    run_id: RunId,
) -> RunnerResult<CaptureOutcome> {
    let mut session = Session::spawn(SessionConfig {
        command: executable.to_string(),
        args: case.args(&config.entry, &config.selector_prefix),
        cwd: None,
        run_id,
        env: Vec::new(),
    })?;
    session.inject(&case.input())?;
    CaptureLoop::new(capture.clone()).run(session)
}

/// Run one case end to end and grade it.
///
/// Infrastructure failures come back as an `Errored` report rather than an
/// `Err`, so the caller can keep going with the next case.
pub fn run_case(
    executable: &str,
    case: &TestCase,
    config: &HarnessConfig,
    run_id: RunId,
    run_started: &Instant,
) -> CaseReport {
    execute_case(executable, case, config, run_id, run_started).0
}

/// [`run_case`], also handing back the raw captured bytes when the session
/// got far enough to capture anything.
pub(crate) fn execute_case(
    executable: &str,
    case: &TestCase,
    config: &HarnessConfig,
    run_id: RunId,
    run_started: &Instant,
) -> (CaseReport, Option<CapturedOutput>) {
    let capture = config.capture.to_capture_config();
    let args = case.args(&config.entry, &config.selector_prefix);
    let started_at_ms = elapsed_ms(run_started);

    match capture_case(executable, case, config, &capture, run_id) {
        Ok(outcome) => {
            let checks = assertions::evaluate(case, &config.markers, &outcome);
            let status = if outcome.timed_out {
                CaseStatus::TimedOut
            } else if checks.iter().all(|check| check.passed) {
                CaseStatus::Passed
            } else {
                CaseStatus::Failed
            };
            let error = match status {
                CaseStatus::TimedOut => Some(
                    RunnerError::timeout(
                        "target did not exit before the capture deadline",
                        serde_json::json!({ "timeout_ms": config.capture.timeout_ms }),
                    )
                    .to_error_info(),
                ),
                CaseStatus::Failed => Some(
                    RunnerError::assertion(
                        "one or more expectations failed",
                        serde_json::json!({
                            "failed": checks
                                .iter()
                                .filter(|check| !check.passed)
                                .map(|check| check.check.clone())
                                .collect::<Vec<_>>(),
                        }),
                    )
                    .to_error_info(),
                ),
                _ => None,
            };
            tracing::info!(case = %case.name, status = status.label(), "case finished");
            let report = CaseReport {
                name: case.name.clone(),
                permission: case.permission,
                scenario: case.scenario,
                session_id: Some(outcome.session_id),
                args,
                input: String::from_utf8_lossy(&case.input()).into_owned(),
                status,
                started_at_ms,
                ended_at_ms: elapsed_ms(run_started),
                exit_status: Some(outcome.exit.clone()),
                timed_out: outcome.timed_out,
                truncated: outcome.output.truncated,
                markers: Some(MarkerSummary::from_capture(&config.markers, &outcome)),
                checks,
                stdout: outcome.output.stdout_lossy(),
                stderr: outcome.output.stderr_lossy(),
                error,
            };
            (report, Some(outcome.output))
        }
        Err(err) => {
            tracing::warn!(case = %case.name, error = %err, "case errored");
            let mut report = CaseReport::without_capture(
                case,
                args,
                CaseStatus::Errored,
                started_at_ms,
                Some(err.with_context("case", case.name.clone()).to_error_info()),
            );
            report.ended_at_ms = elapsed_ms(run_started);
            (report, None)
        }
    }
}

// Elapsed time is always well under u64::MAX
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn elapsed_ms(started_at: &Instant) -> u64 {
    started_at.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_round_trip() {
        for code in ErrorCode::ALL {
            assert_eq!(ErrorCode::parse(code.as_str()), Some(code));
        }
        assert_eq!(ErrorCode::parse("E_NOPE"), None);
    }

    #[test]
    fn exit_codes_by_category() {
        assert_eq!(RunnerError::assertion("x", None).exit_code(), 1);
        assert_eq!(RunnerError::cli_invalid_arg("x").exit_code(), 2);
        assert_eq!(RunnerError::pty("x", "boom").exit_code(), 3);
        assert_eq!(RunnerError::timeout("x", None).exit_code(), 4);
        assert_eq!(RunnerError::internal("x").exit_code(), 5);
    }

    #[test]
    fn display_includes_code_and_message() {
        let err = RunnerError::spawn("failed to spawn command", "No such file");
        assert_eq!(err.to_string(), "E_SPAWN: failed to spawn command");
        let info = err.to_error_info();
        assert_eq!(info.code, "E_SPAWN");
        assert_eq!(
            info.context,
            Some(serde_json::json!({ "source": "No such file" }))
        );
    }

    #[test]
    fn with_context_extends_existing_object() {
        let err = RunnerError::io("read failed", "EBADF").with_context("case", "test_read_allow");
        assert_eq!(
            err.context,
            Some(serde_json::json!({ "source": "EBADF", "case": "test_read_allow" }))
        );

        let bare = RunnerError::internal("x").with_context("case", "c");
        assert_eq!(bare.context, Some(serde_json::json!({ "case": "c" })));
    }
}
