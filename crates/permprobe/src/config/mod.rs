use crate::model::{HarnessConfig, CONFIG_VERSION};
use crate::runner::{RunnerError, RunnerResult};
use serde_json::json;
use std::fs;
use std::path::Path;

/// Load a harness config, YAML for `.yaml`/`.yml` and JSON otherwise.
///
/// Missing fields take their defaults. The result is validated.
pub fn load_config_file(path: &Path) -> RunnerResult<HarnessConfig> {
    let data = fs::read_to_string(path).map_err(|err| {
        RunnerError::io("failed to read config file", err)
            .with_context("path", path.display().to_string())
    })?;
    let name = path.to_string_lossy();
    let config: HarnessConfig = if name.ends_with(".yaml") || name.ends_with(".yml") {
        serde_yml::from_str(&data).map_err(|err| {
            RunnerError::config(
                "failed to parse yaml config",
                json!({ "path": name, "source": err.to_string() }),
            )
        })?
    } else {
        serde_json::from_str(&data).map_err(|err| {
            RunnerError::config(
                "failed to parse json config",
                json!({ "path": name, "source": err.to_string() }),
            )
        })?
    };
    validate_config(&config)?;
    Ok(config)
}

/// Reject configs the capture loop or matrix cannot run with.
pub fn validate_config(config: &HarnessConfig) -> RunnerResult<()> {
    if config.config_version != CONFIG_VERSION {
        return Err(RunnerError::config(
            "unsupported config_version",
            json!({ "expected": CONFIG_VERSION, "received": config.config_version }),
        ));
    }
    if config.entry.is_empty() {
        return Err(RunnerError::config("entry must not be empty", None));
    }
    if config.selector_prefix.is_empty() {
        return Err(RunnerError::config("selector_prefix must not be empty", None));
    }
    let capture = &config.capture;
    for (field, value) in [
        ("capture.poll_interval_ms", capture.poll_interval_ms),
        ("capture.timeout_ms", capture.timeout_ms),
    ] {
        if value == 0 {
            return Err(RunnerError::config(
                format!("{field} must be greater than zero"),
                json!({ "field": field }),
            ));
        }
    }
    if capture.read_chunk_bytes == 0 {
        return Err(RunnerError::config(
            "capture.read_chunk_bytes must be greater than zero",
            json!({ "field": "capture.read_chunk_bytes" }),
        ));
    }
    let markers = &config.markers;
    for (field, value) in [
        ("markers.prompt", &markers.prompt),
        ("markers.first_check_failed", &markers.first_check_failed),
        ("markers.denied", &markers.denied),
        ("markers.unrecognized", &markers.unrecognized),
    ] {
        if value.is_empty() {
            return Err(RunnerError::config(
                format!("{field} must not be empty"),
                json!({ "field": field }),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{PermissionType, ResponseScenario};
    use std::io::Write;

    fn write_temp(suffix: &str, body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn yaml_config_overrides_defaults() {
        let file = write_temp(
            ".yaml",
            "permissions: [net]\nscenarios: [deny, allow_flag]\ncapture:\n  timeout_ms: 2500\nwarm_up: false\n",
        );
        let config = load_config_file(file.path()).unwrap();
        assert_eq!(config.permissions, vec![PermissionType::Net]);
        assert_eq!(
            config.scenarios,
            vec![ResponseScenario::Deny, ResponseScenario::AllowFlag]
        );
        assert_eq!(config.capture.timeout_ms, 2500);
        assert_eq!(config.capture.poll_interval_ms, 40);
        assert!(!config.warm_up);
        assert_eq!(config.markers.denied, "PermissionDenied: permission denied");
    }

    #[test]
    fn json_config_is_default_format() {
        let file = write_temp(".json", r#"{"entry": "probe.ts", "fail_fast": true}"#);
        let config = load_config_file(file.path()).unwrap();
        assert_eq!(config.entry, "probe.ts");
        assert!(config.fail_fast);
        assert_eq!(config.permissions.len(), 5);
    }

    #[test]
    fn parse_errors_are_config_errors() {
        let file = write_temp(".json", "{ not json");
        let err = load_config_file(file.path()).err().unwrap();
        assert_eq!(err.code, crate::runner::ErrorCode::Config);
    }

    #[test]
    fn unknown_permission_is_rejected() {
        let file = write_temp(".yml", "permissions: [ffi]\n");
        assert!(load_config_file(file.path()).is_err());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let mut config = HarnessConfig::default();
        config.capture.timeout_ms = 0;
        let err = validate_config(&config).err().unwrap();
        assert!(err.message.contains("capture.timeout_ms"));
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let config = HarnessConfig {
            config_version: 99,
            ..HarnessConfig::default()
        };
        assert!(validate_config(&config).is_err());
    }
}
