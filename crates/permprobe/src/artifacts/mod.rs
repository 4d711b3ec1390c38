//! On-disk capture dumps for a matrix run.
//!
//! Layout under the artifacts directory:
//!
//! ```text
//! report.json
//! checksums.json
//! test_read_allow_flag/stdout.log
//! test_read_allow_flag/stderr.log
//! test_read_allow_flag/case.json
//! ...
//! ```

use crate::capture::{CapturedOutput, OutputStream};
use crate::model::{CaseReport, MatrixReport, RunId};
use crate::runner::{RunnerError, RunnerResult};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug)]
pub struct ArtifactsWriterConfig {
    pub dir: PathBuf,
    pub overwrite: bool,
}

pub struct ArtifactsWriter {
    dir: PathBuf,
    run_id: RunId,
    checksums: BTreeMap<String, String>,
}

impl ArtifactsWriter {
    /// Prepare the artifacts directory.
    ///
    /// # Errors
    /// - `E_CONFIG`: the directory exists and `overwrite` is off
    /// - `E_IO`: the directory could not be created
    pub fn new(run_id: RunId, config: ArtifactsWriterConfig) -> RunnerResult<Self> {
        if config.dir.exists() {
            if !config.overwrite {
                return Err(RunnerError::config(
                    "artifacts directory exists and overwrite is disabled",
                    serde_json::json!({ "dir": config.dir }),
                ));
            }
        } else {
            fs::create_dir_all(&config.dir)
                .map_err(|err| RunnerError::io("failed to create artifacts dir", err))?;
        }
        Ok(Self {
            dir: config.dir,
            run_id,
            checksums: BTreeMap::new(),
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the captured streams and the result record for one case.
    ///
    /// The `.log` files hold the bytes exactly as captured; cases that never
    /// ran get empty logs.
    pub fn write_case(
        &mut self,
        report: &CaseReport,
        output: Option<&CapturedOutput>,
    ) -> RunnerResult<()> {
        for stream in OutputStream::ALL {
            let bytes = output.map_or(&[][..], |output| output.get(stream));
            self.write_bytes(&format!("{}/{stream}.log", report.name), bytes)?;
        }
        self.write_json(&format!("{}/case.json", report.name), report)?;
        tracing::debug!(run_id = %self.run_id, case = %report.name, "wrote case artifacts");
        Ok(())
    }

    pub fn write_report(&mut self, report: &MatrixReport) -> RunnerResult<()> {
        self.write_json("report.json", report)?;
        self.write_checksums()
    }

    fn write_json<T: Serialize>(&mut self, name: &str, value: &T) -> RunnerResult<()> {
        let data = serde_json::to_vec_pretty(value)
            .map_err(|err| RunnerError::internal(format!("failed to serialize {name}: {err}")))?;
        self.write_bytes(name, &data)
    }

    fn write_bytes(&mut self, name: &str, data: &[u8]) -> RunnerResult<()> {
        let path = self.dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| RunnerError::io("failed to create artifacts dir", err))?;
        }
        fs::write(&path, data).map_err(|err| {
            RunnerError::io("failed to write artifact", err).with_context("path", path.display().to_string())
        })?;
        self.checksums
            .insert(name.to_string(), format!("{:016x}", fnv1a_hash(data)));
        Ok(())
    }

    fn write_checksums(&mut self) -> RunnerResult<()> {
        let data = serde_json::to_vec_pretty(&self.checksums)
            .map_err(|err| RunnerError::internal(format!("failed to serialize checksums: {err}")))?;
        fs::write(self.dir.join("checksums.json"), data)
            .map_err(|err| RunnerError::io("failed to write checksums", err))
    }
}

fn fnv1a_hash(data: &[u8]) -> u64 {
    // FNV-1a constants (64-bit)
    const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0100_0000_01b3;

    data.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}
