// Test module - relaxed lint rules
#![allow(clippy::indexing_slicing)]
#![allow(clippy::panic)]
#![allow(clippy::manual_assert)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(missing_docs)]

//! End-to-end matrix tests against the prompting fixture binary.

use permprobe::matrix::{run_matrix, MatrixOptions, ProgressCallback, ProgressEvent};
use permprobe::artifacts::ArtifactsWriterConfig;
use permprobe::model::{
    CaseReport, CaseStatus, HarnessConfig, MatrixReport, PermissionType, ResponseScenario,
    TestCase, DEFAULT_ENTRY,
};
use permprobe::run::run_case;
use permprobe_fixtures::{fixture_config, fixture_config_for, temp_dir};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Mutex;

const FIXTURE: &str = env!("CARGO_BIN_EXE_permprobe-prompt-fixture");

struct ChannelProgress(Mutex<mpsc::Sender<ProgressEvent>>);

impl ProgressCallback for ChannelProgress {
    fn on_progress(&self, event: &ProgressEvent) {
        if let Ok(sender) = self.0.lock() {
            let _ = sender.send(event.clone());
        }
    }
}

fn describe_failures(report: &MatrixReport) -> String {
    report
        .cases
        .iter()
        .filter(|case| case.status != CaseStatus::Passed)
        .map(|case| {
            format!(
                "{} {:?} checks={:?} error={:?}\nstdout={:?}\nstderr={:?}",
                case.name,
                case.status,
                case.failed_checks(),
                case.error,
                case.stdout,
                case.stderr
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn case<'a>(report: &'a MatrixReport, name: &str) -> &'a CaseReport {
    report
        .cases
        .iter()
        .find(|case| case.name == name)
        .unwrap_or_else(|| panic!("missing case {name}"))
}

// =============================================================================
// Full matrix
// =============================================================================

#[test]
fn full_matrix_passes_against_fixture() {
    let report = run_matrix(FIXTURE, fixture_config(), MatrixOptions::default()).unwrap();
    assert_eq!(report.cases.len(), 50);
    assert!(report.success(), "{}", describe_failures(&report));
    assert_eq!(report.passed, 50);
    assert_eq!(report.failed + report.errored + report.timed_out + report.skipped, 0);
}

#[test]
fn marker_presence_follows_scenario_table() {
    let config = fixture_config_for(&[PermissionType::Net], &ResponseScenario::ALL);
    let report = run_matrix(FIXTURE, config, MatrixOptions::default()).unwrap();
    assert!(report.success(), "{}", describe_failures(&report));

    let markers = |name: &str| case(&report, name).markers.unwrap();
    let no_yes = markers("test_net_no_yes");
    assert_eq!(no_yes.exit_code, Some(0));
    assert!(no_yes.prompt && no_yes.first_check_failed && !no_yes.denied);

    let yes_no = markers("test_net_yes_no");
    assert_eq!(yes_no.exit_code, Some(1));
    assert!(yes_no.prompt && !yes_no.first_check_failed && yes_no.denied);

    let no_prompt = markers("test_net_no_prompt");
    assert!(!no_prompt.prompt && no_prompt.first_check_failed && no_prompt.denied);

    assert!(markers("test_net_unrecognized_option").unrecognized);
    assert!(!markers("test_net_allow").unrecognized);
}

#[test]
fn repeated_runs_agree_at_marker_level() {
    let config = fixture_config();
    for scenario in [ResponseScenario::NoYes, ResponseScenario::Deny, ResponseScenario::UnrecognizedOption] {
        let test_case = TestCase::new(PermissionType::Run, scenario);
        let first = run_case(FIXTURE, &test_case, &config);
        let second = run_case(FIXTURE, &test_case, &config);
        assert_eq!(first.status, CaseStatus::Passed, "{:?}", first.checks);
        assert_eq!(first.markers, second.markers, "{}", test_case.name);
        assert_ne!(first.session_id, second.session_id);
    }
}

// =============================================================================
// Failure isolation and reporting
// =============================================================================

#[test]
fn failing_expectations_do_not_stop_the_matrix() {
    let mut config = fixture_config_for(
        &[PermissionType::Read],
        &[ResponseScenario::YesNo, ResponseScenario::AllowFlag, ResponseScenario::Deny],
    );
    // The fixture never prints this, so every case expecting a denial fails
    config.markers.denied = "NotTheDenialText".to_string();
    let report = run_matrix(FIXTURE, config, MatrixOptions::default()).unwrap();

    assert!(!report.success());
    assert_eq!(report.cases.len(), 3);
    assert_eq!(report.failed, 2);
    assert_eq!(report.passed, 1);

    let yes_no = case(&report, "test_read_yes_no");
    assert_eq!(yes_no.status, CaseStatus::Failed);
    let failed = yes_no.failed_checks();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].check, "denied");
    assert_eq!(
        failed[0].message.as_deref(),
        Some("expected stderr to contain 'NotTheDenialText'")
    );
    assert_eq!(
        yes_no.error.as_ref().map(|error| error.code.as_str()),
        Some("E_ASSERTION_FAILED")
    );
    assert_eq!(case(&report, "test_read_allow_flag").status, CaseStatus::Passed);
}

#[test]
fn fail_fast_skips_remaining_cases() {
    let mut config = fixture_config_for(
        &[PermissionType::Env],
        &[ResponseScenario::YesNo, ResponseScenario::Allow, ResponseScenario::AllowFlag],
    );
    config.markers.denied = "NotTheDenialText".to_string();
    config.fail_fast = true;
    let report = run_matrix(FIXTURE, config, MatrixOptions::default()).unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(report.skipped, 2);
    assert_eq!(case(&report, "test_env_allow").status, CaseStatus::Skipped);
    assert!(case(&report, "test_env_allow").session_id.is_none());
}

#[test]
fn missing_executable_errors_every_case() {
    let config = fixture_config_for(
        &[PermissionType::Write],
        &[ResponseScenario::AllowFlag, ResponseScenario::Deny],
    );
    let report = run_matrix("/nonexistent/permprobe-target", config, MatrixOptions::default()).unwrap();
    assert_eq!(report.errored, 2);
    for case in &report.cases {
        let error = case.error.as_ref().unwrap();
        assert_eq!(error.code, "E_SPAWN");
        assert_eq!(
            error.context.as_ref().and_then(|ctx| ctx.get("case")).and_then(|v| v.as_str()),
            Some(case.name.as_str())
        );
    }
}

#[test]
fn unanswered_prompt_times_out() {
    let mut config = fixture_config();
    config.capture.timeout_ms = 300;
    let mut test_case = TestCase::new(PermissionType::Read, ResponseScenario::YesYes);
    test_case.responses.clear();

    let report = run_case(FIXTURE, &test_case, &config);
    assert_eq!(report.status, CaseStatus::TimedOut);
    assert!(report.timed_out);
    assert!(report.exit_status.as_ref().unwrap().terminated_by_harness);
    assert!(report.stderr.contains("⚠️  Deno requests"));
    assert_eq!(
        report.error.as_ref().map(|error| error.code.as_str()),
        Some("E_TIMEOUT")
    );
}

// =============================================================================
// Progress and artifacts
// =============================================================================

#[test]
fn progress_events_bracket_every_case() {
    let (sender, receiver) = mpsc::channel();
    let config = fixture_config_for(
        &[PermissionType::Read, PermissionType::Write],
        &[ResponseScenario::Allow],
    );
    let options = MatrixOptions {
        progress: Some(Box::new(ChannelProgress(Mutex::new(sender)))),
        ..MatrixOptions::default()
    };
    let report = run_matrix(FIXTURE, config, options).unwrap();
    let events: Vec<ProgressEvent> = receiver.try_iter().collect();

    assert_eq!(events.len(), 6);
    assert!(matches!(
        events[0],
        ProgressEvent::MatrixStarted { total_cases: 2, .. }
    ));
    assert!(matches!(&events[1], ProgressEvent::CaseStarted { index: 1, name } if name == "test_read_allow"));
    assert!(matches!(
        &events[2],
        ProgressEvent::CaseCompleted { status: CaseStatus::Passed, .. }
    ));
    assert!(matches!(&events[3], ProgressEvent::CaseStarted { index: 2, .. }));
    assert!(matches!(
        events[5],
        ProgressEvent::MatrixCompleted { success: true, .. }
    ));
    assert!(report.success());
}

#[test]
fn artifacts_are_written_per_case() {
    let root = temp_dir("artifacts");
    let dir = root.join("out");
    let config = fixture_config_for(&[PermissionType::Net], &[ResponseScenario::NoNo]);
    let options = MatrixOptions {
        artifacts: Some(ArtifactsWriterConfig {
            dir: dir.clone(),
            overwrite: false,
        }),
        ..MatrixOptions::default()
    };
    let report = run_matrix(FIXTURE, config, options).unwrap();
    assert!(report.success(), "{}", describe_failures(&report));

    let case_dir = dir.join("test_net_no_no");
    let stdout = std::fs::read_to_string(case_dir.join("stdout.log")).unwrap();
    let stderr = std::fs::read_to_string(case_dir.join("stderr.log")).unwrap();
    assert!(stdout.contains("First check failed"));
    assert!(stderr.contains("PermissionDenied: permission denied"));
    assert!(case_dir.join("case.json").exists());

    let saved: serde_json::Value =
        serde_json::from_slice(&std::fs::read(dir.join("report.json")).unwrap()).unwrap();
    assert_eq!(saved["passed"], 1);
    assert_eq!(saved["run_id"], report.run_id.to_string());

    let _ = std::fs::remove_dir_all(&root);
}

/// Wrap the fixture in a `/bin/sh` script that logs each launch, returning
/// a config whose entry is that script and the launch log path.
fn counting_config(dir: &Path) -> (HarnessConfig, PathBuf) {
    let log = dir.join("launches.log");
    let script = dir.join("count_launches.sh");
    std::fs::write(
        &script,
        format!(
            "echo launch >> '{}'\nexec '{}' {} \"$@\"\n",
            log.display(),
            FIXTURE,
            DEFAULT_ENTRY
        ),
    )
    .unwrap();
    let mut config = fixture_config_for(
        &[PermissionType::Write, PermissionType::Net],
        &[ResponseScenario::AllowFlag],
    );
    config.entry = script.display().to_string();
    (config, log)
}

fn launches(log: &Path) -> usize {
    std::fs::read_to_string(log).map_or(0, |text| text.lines().count())
}

#[test]
fn matrix_run_launches_warm_up_only_when_enabled() {
    let root = temp_dir("warm-up");

    let enabled = root.join("enabled");
    std::fs::create_dir_all(&enabled).unwrap();
    let (mut config, log) = counting_config(&enabled);
    config.warm_up = true;
    let report = run_matrix("/bin/sh", config, MatrixOptions::default()).unwrap();
    assert!(report.success(), "{}", describe_failures(&report));
    assert_eq!(launches(&log), report.cases.len() + 1);

    let disabled = root.join("disabled");
    std::fs::create_dir_all(&disabled).unwrap();
    let (mut config, log) = counting_config(&disabled);
    config.warm_up = false;
    let report = run_matrix("/bin/sh", config, MatrixOptions::default()).unwrap();
    assert!(report.success(), "{}", describe_failures(&report));
    assert_eq!(launches(&log), report.cases.len());

    let _ = std::fs::remove_dir_all(&root);
}
