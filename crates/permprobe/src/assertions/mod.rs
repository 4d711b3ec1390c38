use crate::capture::{CaptureOutcome, CapturedOutput, OutputStream};
use crate::model::{CheckResult, Expectations, Markers, MarkerSummary, TestCase};
use serde_json::json;

pub const CHECK_EXIT_CODE: &str = "exit_code";
pub const CHECK_PROMPT: &str = "prompt";
pub const CHECK_FIRST_CHECK_FAILED: &str = "first_check_failed";
pub const CHECK_DENIED: &str = "denied";
pub const CHECK_UNRECOGNIZED: &str = "unrecognized";

/// Grade a capture against a case's expectations.
///
/// Always yields one check for the exit code and one per marker; the
/// unrecognized-option marker is only checked when the case sets it.
#[must_use]
pub fn evaluate(case: &TestCase, markers: &Markers, outcome: &CaptureOutcome) -> Vec<CheckResult> {
    evaluate_output(&case.expect, markers, outcome.exit_code(), &outcome.output)
}

#[must_use]
pub fn evaluate_output(
    expect: &Expectations,
    markers: &Markers,
    exit_code: Option<i32>,
    output: &CapturedOutput,
) -> Vec<CheckResult> {
    let mut checks = vec![check_exit_code(expect.exit_code, exit_code)];
    checks.push(check_marker(
        CHECK_PROMPT,
        output,
        OutputStream::Stderr,
        &markers.prompt,
        expect.prompt,
    ));
    checks.push(check_marker(
        CHECK_FIRST_CHECK_FAILED,
        output,
        OutputStream::Stdout,
        &markers.first_check_failed,
        expect.first_check_failed,
    ));
    checks.push(check_marker(
        CHECK_DENIED,
        output,
        OutputStream::Stderr,
        &markers.denied,
        expect.denied,
    ));
    if let Some(unrecognized) = expect.unrecognized {
        checks.push(check_marker(
            CHECK_UNRECOGNIZED,
            output,
            OutputStream::Stderr,
            &markers.unrecognized,
            unrecognized,
        ));
    }
    checks
}

fn check_exit_code(expected: i32, actual: Option<i32>) -> CheckResult {
    let passed = actual == Some(expected);
    let message = if passed {
        None
    } else {
        Some(match actual {
            Some(code) => format!("expected exit code {expected}, got {code}"),
            None => format!("expected exit code {expected}, child was killed by a signal"),
        })
    };
    CheckResult {
        check: CHECK_EXIT_CODE.to_string(),
        passed,
        message,
        details: Some(json!({ "expected": expected, "actual": actual })),
    }
}

fn check_marker(
    check: &str,
    output: &CapturedOutput,
    stream: OutputStream,
    marker: &str,
    expected: bool,
) -> CheckResult {
    let found = output.contains(stream, marker);
    let passed = found == expected;
    let message = match (passed, expected) {
        (true, _) => None,
        (false, true) => Some(format!("expected {stream} to contain '{marker}'")),
        (false, false) => Some(format!("expected {stream} not to contain '{marker}'")),
    };
    CheckResult {
        check: check.to_string(),
        passed,
        message,
        details: Some(json!({
            "stream": stream,
            "marker": marker,
            "expected": expected,
            "found": found,
        })),
    }
}

impl MarkerSummary {
    /// Exit code and presence of every marker, regardless of what was expected.
    #[must_use]
    pub fn from_capture(markers: &Markers, outcome: &CaptureOutcome) -> Self {
        Self::from_output(markers, outcome.exit_code(), &outcome.output)
    }

    #[must_use]
    pub fn from_output(markers: &Markers, exit_code: Option<i32>, output: &CapturedOutput) -> Self {
        Self {
            exit_code,
            prompt: output.contains(OutputStream::Stderr, &markers.prompt),
            first_check_failed: output.contains(OutputStream::Stdout, &markers.first_check_failed),
            denied: output.contains(OutputStream::Stderr, &markers.denied),
            unrecognized: output.contains(OutputStream::Stderr, &markers.unrecognized),
        }
    }
}
