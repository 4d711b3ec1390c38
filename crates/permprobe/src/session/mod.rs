//! Child process lifecycle on three pseudo-terminals.
//!
//! This module provides [`Session`] for spawning the target with stdin,
//! stdout and stderr each bound to the slave end of its own PTY, typing
//! scripted input into the stdin master, and tearing everything down.
//!
//! # Key Operations
//!
//! - [`Session::spawn`] - Allocate PTYs and start the child
//! - [`Session::inject`] - Write scripted keystrokes to the stdin master
//! - [`Session::close_descriptors`] - Release all six descriptors
//! - [`Session::terminate_process_group`] - SIGTERM, grace, SIGKILL
//! - [`Session::kill_process_group`] - SIGKILL anything left in the group
//! - [`Session::reap`] - Wait for the child and record its exit status
//!
//! # Example
//!
//! ```no_run
//! use permprobe::capture::{CaptureConfig, CaptureLoop};
//! use permprobe::model::RunId;
//! use permprobe::session::{Session, SessionConfig};
//!
//! # fn example() -> Result<(), permprobe::runner::RunnerError> {
//! let mut session = Session::spawn(SessionConfig {
//!     command: "/bin/sh".to_string(),
//!     args: vec!["-c".to_string(), "read answer; echo got $answer".to_string()],
//!     cwd: None,
//!     run_id: RunId::new(),
//!     env: Vec::new(),
//! })?;
//! session.inject(b"y\n")?;
//! let outcome = CaptureLoop::new(CaptureConfig::default()).run(session)?;
//! assert!(outcome.output.stdout_lossy().contains("got y"));
//! # Ok(())
//! # }
//! ```
//!
//! # Process Management
//!
//! The child leads its own process group so a hung target (and anything
//! it started) can be signalled without touching the harness. Teardown
//! kills the whole group even when the child exited on its own, so
//! background processes it left behind do not outlive the session.
//! Dropping a session that was never reaped does the same and waits.

use crate::capture::OutputStream;
use crate::model::{ExitStatus, RunId, SessionId};
use crate::pty::{allocate_stdio, StdioPtys};
use crate::runner::{RunnerError, RunnerResult};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::fs::File;
use std::io::Write;
use std::os::unix::process::CommandExt;
use std::process::{Child, Command};
use std::time::{Duration, Instant};

/// Poll period while waiting for a signalled child to exit.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Configuration for spawning a session.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Executable to run (absolute path recommended).
    pub command: String,
    /// Arguments after the executable.
    pub args: Vec<String>,
    /// Working directory; inherits the harness's when unset.
    pub cwd: Option<String>,
    /// Matrix run this session belongs to.
    pub run_id: RunId,
    /// Extra environment variables for the child.
    pub env: Vec<(String, String)>,
}

/// One child process and the PTYs its standard streams live on.
pub struct Session {
    run_id: RunId,
    session_id: SessionId,
    ptys: Option<StdioPtys>,
    child: Child,
    exit: Option<ExitStatus>,
    started_at: Instant,
}

impl Session {
    /// Allocate three PTY pairs and spawn the child on their slave ends.
    ///
    /// The duplicates handed to the child are released as soon as it has
    /// been spawned; the session's own slave descriptors stay open until
    /// [`close_descriptors`](Self::close_descriptors).
    ///
    /// # Errors
    /// - `E_PTY`: PTY allocation failed
    /// - `E_SPAWN`: the executable could not be started
    pub fn spawn(config: SessionConfig) -> RunnerResult<Self> {
        let ptys = allocate_stdio()?;

        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .envs(config.env.iter().map(|(key, value)| (key, value)))
            .stdin(ptys.stdin.slave_stdio()?)
            .stdout(ptys.stdout.slave_stdio()?)
            .stderr(ptys.stderr.slave_stdio()?)
            .process_group(0);
        if let Some(cwd) = &config.cwd {
            cmd.current_dir(cwd);
        }

        let child = cmd.spawn().map_err(|err| {
            RunnerError::spawn("failed to spawn command", err)
                .with_context("command", config.command.clone())
        })?;
        drop(cmd);

        let session_id = SessionId::new();
        tracing::debug!(
            run_id = %config.run_id,
            %session_id,
            pid = child.id(),
            command = %config.command,
            args = ?config.args,
            "spawned session"
        );

        Ok(Self {
            run_id: config.run_id,
            session_id,
            ptys: Some(ptys),
            child,
            exit: None,
            started_at: Instant::now(),
        })
    }

    /// Write scripted keystrokes to the stdin master.
    ///
    /// The bytes sit in the terminal's input queue until the child reads
    /// them; a handful of short lines fits well within the PTY buffer.
    ///
    /// # Errors
    /// - `E_IO`: the write failed
    /// - `E_INTERNAL`: the descriptors are already closed
    pub fn inject(&mut self, bytes: &[u8]) -> RunnerResult<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        let ptys = self.open_ptys()?;
        let mut master = &ptys.stdin.master;
        master
            .write_all(bytes)
            .map_err(|err| RunnerError::io("failed to write input", err))?;
        master
            .flush()
            .map_err(|err| RunnerError::io("failed to flush input", err))?;
        tracing::debug!(session_id = %self.session_id, bytes = bytes.len(), "injected input");
        Ok(())
    }

    /// Master end of an output stream, while descriptors are open.
    #[must_use]
    pub fn master(&self, stream: OutputStream) -> Option<&File> {
        self.ptys.as_ref().map(|ptys| match stream {
            OutputStream::Stdout => &ptys.stdout.master,
            OutputStream::Stderr => &ptys.stderr.master,
        })
    }

    fn open_ptys(&self) -> RunnerResult<&StdioPtys> {
        self.ptys
            .as_ref()
            .ok_or_else(|| RunnerError::internal("session descriptors already closed"))
    }

    /// Non-blocking exit check. Returns the raw status once the child is gone.
    ///
    /// # Errors
    /// - `E_IO`: the status query itself failed
    pub fn try_wait(&mut self) -> RunnerResult<Option<std::process::ExitStatus>> {
        self.child
            .try_wait()
            .map_err(|err| RunnerError::io("failed to check child status", err))
    }

    /// Close all six descriptors. Idempotent.
    pub fn close_descriptors(&mut self) {
        if let Some(ptys) = self.ptys.take() {
            ptys.close();
            tracing::debug!(session_id = %self.session_id, "closed session descriptors");
        }
    }

    /// Whether [`close_descriptors`](Self::close_descriptors) has run.
    #[must_use]
    pub fn descriptors_closed(&self) -> bool {
        self.ptys.is_none()
    }

    /// SIGTERM the child's process group, wait up to `grace`, then SIGKILL.
    ///
    /// # Errors
    /// - `E_IO`: signalling or status checks failed
    pub fn terminate_process_group(&mut self, grace: Duration) -> RunnerResult<()> {
        let pgid = self.pgid()?;
        signal_process_group(pgid, Signal::SIGTERM)?;
        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if self.try_wait()?.is_some() {
                return Ok(());
            }
            std::thread::sleep(EXIT_POLL_INTERVAL);
        }
        tracing::warn!(session_id = %self.session_id, "child ignored SIGTERM; sending SIGKILL");
        signal_process_group(pgid, Signal::SIGKILL)
    }

    /// SIGKILL whatever is left in the child's process group.
    ///
    /// Background processes the child forked keep its group after it exits;
    /// an empty group is not an error.
    ///
    /// # Errors
    /// - `E_IO`: signalling failed
    pub fn kill_process_group(&self) -> RunnerResult<()> {
        let pgid = self.pgid()?;
        signal_process_group(pgid, Signal::SIGKILL)
    }

    /// Wait for the child and record its exit status.
    ///
    /// Blocks; only call once the child has exited or been killed.
    ///
    /// # Errors
    /// - `E_IO`: waiting on the child failed
    pub fn reap(&mut self, terminated_by_harness: bool) -> RunnerResult<ExitStatus> {
        if let Some(exit) = &self.exit {
            return Ok(exit.clone());
        }
        let status = self
            .child
            .wait()
            .map_err(|err| RunnerError::io("failed to wait for child", err))?;
        let exit = ExitStatus::from_std(status, terminated_by_harness);
        tracing::debug!(session_id = %self.session_id, ?exit, "reaped child");
        self.exit = Some(exit.clone());
        Ok(exit)
    }

    /// Exit status recorded by [`reap`](Self::reap), if any.
    #[must_use]
    pub fn exit_status(&self) -> Option<&ExitStatus> {
        self.exit.as_ref()
    }

    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    #[must_use]
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    #[must_use]
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    #[must_use]
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    fn pgid(&self) -> RunnerResult<Pid> {
        let pid = i32::try_from(self.child.id())
            .map_err(|_| RunnerError::internal("child pid does not fit in pid_t"))?;
        Ok(Pid::from_raw(pid))
    }

    /// Best-effort cleanup for sessions dropped before teardown ran.
    fn cleanup_best_effort(&mut self) {
        self.close_descriptors();
        if self.exit.is_some() {
            return;
        }
        let _ = self.kill_process_group();
        let _ = self.child.wait();
    }
}

fn signal_process_group(pgid: Pid, signal: Signal) -> RunnerResult<()> {
    match killpg(pgid, signal) {
        // ESRCH means the group is already gone, which is fine
        Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
        Err(err) => Err(RunnerError::io("failed to signal process group", err)),
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cleanup_best_effort();
    }
}
