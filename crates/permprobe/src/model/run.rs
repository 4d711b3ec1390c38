use crate::model::case::{ResponseScenario, TestCase};
use crate::model::permission::PermissionType;
use crate::model::{RunId, SessionId};
use serde::{Deserialize, Serialize};

pub const REPORT_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitStatus {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    /// The harness signalled the child after the deadline passed.
    pub terminated_by_harness: bool,
}

impl ExitStatus {
    #[must_use]
    pub fn from_std(status: std::process::ExitStatus, terminated_by_harness: bool) -> Self {
        use std::os::unix::process::ExitStatusExt;
        Self {
            success: status.success(),
            exit_code: status.code(),
            signal: status.signal(),
            terminated_by_harness,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
    pub context: Option<serde_json::Value>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Passed,
    /// Exit code or marker mismatch.
    Failed,
    /// The child outlived the deadline.
    TimedOut,
    /// Harness infrastructure failed (PTY, spawn, descriptor I/O).
    Errored,
    /// Not run because an earlier case failed under fail-fast.
    Skipped,
}

impl CaseStatus {
    /// Short label printed after the case name.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Passed => "ok",
            Self::Failed => "FAILED",
            Self::TimedOut => "TIMEOUT",
            Self::Errored => "ERROR",
            Self::Skipped => "skipped",
        }
    }
}

/// Outcome of one expectation (exit code or one marker).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckResult {
    /// `exit_code`, `prompt`, `first_check_failed`, `denied`, `unrecognized`.
    pub check: String,
    pub passed: bool,
    pub message: Option<String>,
    pub details: Option<serde_json::Value>,
}

/// Exit code plus marker presence; the level at which repeated runs of a
/// case are expected to agree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerSummary {
    pub exit_code: Option<i32>,
    pub prompt: bool,
    pub first_check_failed: bool,
    pub denied: bool,
    pub unrecognized: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CaseReport {
    pub name: String,
    pub permission: PermissionType,
    pub scenario: ResponseScenario,
    pub session_id: Option<SessionId>,
    pub args: Vec<String>,
    /// Scripted keystrokes, newline terminated.
    pub input: String,
    pub status: CaseStatus,
    pub started_at_ms: u64,
    pub ended_at_ms: u64,
    pub exit_status: Option<ExitStatus>,
    pub timed_out: bool,
    pub truncated: bool,
    pub markers: Option<MarkerSummary>,
    pub checks: Vec<CheckResult>,
    /// Captured stdout, lossily decoded.
    pub stdout: String,
    /// Captured stderr, lossily decoded.
    pub stderr: String,
    pub error: Option<ErrorInfo>,
}

impl CaseReport {
    /// Report for a case that never produced a capture.
    #[must_use]
    pub fn without_capture(
        case: &TestCase,
        args: Vec<String>,
        status: CaseStatus,
        at_ms: u64,
        error: Option<ErrorInfo>,
    ) -> Self {
        Self {
            name: case.name.clone(),
            permission: case.permission,
            scenario: case.scenario,
            session_id: None,
            args,
            input: String::from_utf8_lossy(&case.input()).into_owned(),
            status,
            started_at_ms: at_ms,
            ended_at_ms: at_ms,
            exit_status: None,
            timed_out: false,
            truncated: false,
            markers: None,
            checks: Vec::new(),
            stdout: String::new(),
            stderr: String::new(),
            error,
        }
    }

    #[must_use]
    pub fn failed_checks(&self) -> Vec<&CheckResult> {
        self.checks.iter().filter(|check| !check.passed).collect()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MatrixReport {
    pub report_version: u32,
    pub run_id: RunId,
    pub executable: String,
    pub started_at_ms: u64,
    pub ended_at_ms: u64,
    pub cases: Vec<CaseReport>,
    pub passed: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub errored: usize,
    pub skipped: usize,
}

impl MatrixReport {
    #[must_use]
    pub fn new(run_id: RunId, executable: String, cases: Vec<CaseReport>, ended_at_ms: u64) -> Self {
        let count = |status| cases.iter().filter(|c| c.status == status).count();
        Self {
            report_version: REPORT_VERSION,
            run_id,
            executable,
            started_at_ms: 0,
            ended_at_ms,
            passed: count(CaseStatus::Passed),
            failed: count(CaseStatus::Failed),
            timed_out: count(CaseStatus::TimedOut),
            errored: count(CaseStatus::Errored),
            skipped: count(CaseStatus::Skipped),
            cases,
        }
    }

    /// True when every case passed. Skipped cases count against success.
    #[must_use]
    pub fn success(&self) -> bool {
        self.passed == self.cases.len()
    }
}
