//! Test helpers shared by the permprobe test suites.
//!
//! The fixture binary itself lives in `src/bin/prompt_fixture.rs`; tests in
//! this crate find it through `CARGO_BIN_EXE_permprobe-prompt-fixture`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use permprobe::model::{CaptureSettings, HarnessConfig, PermissionType, ResponseScenario};

/// Name of the prompting fixture binary.
pub const PROMPT_FIXTURE_BIN: &str = "permprobe-prompt-fixture";

/// Create a unique temporary directory for a test.
///
/// The name carries the process id and a timestamp so parallel test runs
/// do not collide. The directory is created immediately.
///
/// # Panics
///
/// Panics if the directory cannot be created.
#[must_use]
pub fn temp_dir(prefix: &str) -> PathBuf {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!(
        "permprobe-{prefix}-{}-{stamp}",
        std::process::id()
    ));

    #[allow(clippy::expect_used)]
    fs::create_dir_all(&dir).expect("failed to create temp directory");

    dir
}

/// Harness config suited to the fixture: no warm-up, short poll interval.
#[must_use]
pub fn fixture_config() -> HarnessConfig {
    HarnessConfig {
        warm_up: false,
        capture: CaptureSettings {
            poll_interval_ms: 20,
            ..CaptureSettings::default()
        },
        ..HarnessConfig::default()
    }
}

/// [`fixture_config`] narrowed to the given permissions and scenarios.
#[must_use]
pub fn fixture_config_for(
    permissions: &[PermissionType],
    scenarios: &[ResponseScenario],
) -> HarnessConfig {
    HarnessConfig {
        permissions: permissions.to_vec(),
        scenarios: scenarios.to_vec(),
        ..fixture_config()
    }
}

/// Write a harness config as pretty JSON.
///
/// # Panics
///
/// Panics if serialization or file writing fails.
pub fn write_config(path: &Path, config: &HarnessConfig) {
    #[allow(clippy::expect_used)]
    let data = serde_json::to_vec_pretty(config).expect("failed to serialize config");

    #[allow(clippy::expect_used)]
    fs::write(path, data).expect("failed to write config file");
}
