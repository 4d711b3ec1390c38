use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::capture::CaptureConfig;
use crate::model::case::ResponseScenario;
use crate::model::permission::PermissionType;

/// Current harness config format version.
pub const CONFIG_VERSION: u32 = 1;

/// Default protocol-test entry argument passed before the selector.
pub const DEFAULT_ENTRY: &str = "tools/permission_prompt_test.ts";
/// Default selector prefix; the capitalized permission name is appended.
pub const DEFAULT_SELECTOR_PREFIX: &str = "needs";

/// Literal substrings the target program writes for each prompt event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Markers {
    /// Written to stderr when a prompt is shown.
    pub prompt: String,
    /// Written to stdout when the first check of a pair fails.
    pub first_check_failed: String,
    /// Written to stderr when permission is ultimately denied.
    pub denied: String,
    /// Written to stderr when a prompt answer is not understood.
    pub unrecognized: String,
}

impl Default for Markers {
    fn default() -> Self {
        Self {
            prompt: "⚠️  Deno requests".to_string(),
            first_check_failed: "First check failed".to_string(),
            denied: "PermissionDenied: permission denied".to_string(),
            unrecognized: "Unrecognized option".to_string(),
        }
    }
}

/// Capture timing and limits, in config-file units.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Readiness wait per loop iteration.
    pub poll_interval_ms: u64,
    /// Wall-clock bound per session, measured from spawn.
    pub timeout_ms: u64,
    /// Upper bound on a single read from a master descriptor.
    pub read_chunk_bytes: usize,
    /// Bytes kept per stream; the rest is read and discarded.
    pub max_output_bytes: usize,
    /// Time between SIGTERM and SIGKILL for a child that outlived the deadline.
    pub kill_grace_ms: u64,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 40,
            timeout_ms: 5_000,
            read_chunk_bytes: 512,
            max_output_bytes: 1024 * 1024,
            kill_grace_ms: 200,
        }
    }
}

impl CaptureSettings {
    #[must_use]
    pub fn to_capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            timeout: Duration::from_millis(self.timeout_ms),
            read_chunk_bytes: self.read_chunk_bytes,
            max_output_bytes: self.max_output_bytes,
            kill_grace: Duration::from_millis(self.kill_grace_ms),
        }
    }
}

/// Everything the matrix needs besides the executable path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub config_version: u32,
    /// Protocol-test entry argument.
    pub entry: String,
    /// Prefix of the scenario selector argument.
    pub selector_prefix: String,
    pub markers: Markers,
    pub capture: CaptureSettings,
    /// Run one throwaway preauthorized session before the matrix.
    pub warm_up: bool,
    /// Stop scheduling cases after the first non-passing one.
    pub fail_fast: bool,
    pub permissions: Vec<PermissionType>,
    pub scenarios: Vec<ResponseScenario>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            config_version: CONFIG_VERSION,
            entry: DEFAULT_ENTRY.to_string(),
            selector_prefix: DEFAULT_SELECTOR_PREFIX.to_string(),
            markers: Markers::default(),
            capture: CaptureSettings::default(),
            warm_up: true,
            fail_fast: false,
            permissions: PermissionType::ALL.to_vec(),
            scenarios: ResponseScenario::ALL.to_vec(),
        }
    }
}
