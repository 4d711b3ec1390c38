//! permprobe: drive a permission-prompting CLI through pseudo-terminals and
//! verify every prompt interaction.
//!
//! The target program only prompts when its standard streams are
//! terminals, so each case runs the target with stdin, stdout and stderr
//! on three separate PTYs, types a scripted answer sequence, captures both
//! output streams under a wall-clock deadline, and checks the exit code
//! and marker strings the target is expected to print.

#![forbid(unsafe_code)]
// Library documentation is in progress. Public API types have docs;
// internal types will be documented in future releases.
#![allow(missing_docs)]

pub mod artifacts;
pub mod assertions;
pub mod capture;
pub mod config;
pub mod matrix;
pub mod model;
pub mod pty;
pub mod runner;
pub mod session;

pub use crate::model::*;

pub mod run {
    use super::matrix::{run_matrix, MatrixOptions};
    use super::runner::{run_case as run_case_impl, RunnerResult};
    use super::{CaseReport, HarnessConfig, MatrixReport, RunId, TestCase};
    use std::time::Instant;

    /// Run the whole matrix selected by `config` with default options.
    pub fn run_all(executable: &str, config: HarnessConfig) -> RunnerResult<MatrixReport> {
        run_matrix(executable, config, MatrixOptions::default())
    }

    pub fn run_all_with_options(
        executable: &str,
        config: HarnessConfig,
        options: MatrixOptions,
    ) -> RunnerResult<MatrixReport> {
        run_matrix(executable, config, options)
    }

    /// Run a single case outside any matrix.
    #[must_use]
    pub fn run_case(executable: &str, case: &TestCase, config: &HarnessConfig) -> CaseReport {
        run_case_impl(executable, case, config, RunId::new(), &Instant::now())
    }
}
