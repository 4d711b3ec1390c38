//! Readiness-polling capture of a session's stdout and stderr.
//!
//! [`CaptureLoop::run`] owns a [`Session`] for its whole lifetime: it polls
//! both output masters, appends whatever arrives to per-stream buffers,
//! stops once the child has exited and the masters are quiet (or the
//! deadline passes), and tears the session down before returning.
//!
//! The loop is single threaded. The only suspension point is the poll
//! wait, which is never longer than the poll interval or the time left
//! until the deadline, whichever is shorter.

use crate::model::{CaptureSettings, ExitStatus, SessionId};
use crate::runner::{RunnerError, RunnerResult};
use crate::session::Session;
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::os::fd::AsFd;
use std::time::{Duration, Instant};

/// The child's output streams, as seen from the master side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    pub const ALL: [Self; 2] = [Self::Stdout, Self::Stderr];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bytes captured per stream, in the order the child produced them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Some output was discarded because a stream exceeded its budget.
    pub truncated: bool,
}

impl CapturedOutput {
    #[must_use]
    pub fn get(&self, stream: OutputStream) -> &[u8] {
        match stream {
            OutputStream::Stdout => &self.stdout,
            OutputStream::Stderr => &self.stderr,
        }
    }

    /// Append `bytes` to a stream, keeping at most `limit` bytes in total.
    pub fn append(&mut self, stream: OutputStream, bytes: &[u8], limit: usize) {
        let buffer = match stream {
            OutputStream::Stdout => &mut self.stdout,
            OutputStream::Stderr => &mut self.stderr,
        };
        let room = limit.saturating_sub(buffer.len());
        let kept = bytes.len().min(room);
        buffer.extend(bytes.iter().take(kept));
        if kept < bytes.len() {
            self.truncated = true;
        }
    }

    /// Whether `needle` occurs anywhere in the stream, compared as raw bytes.
    #[must_use]
    pub fn contains(&self, stream: OutputStream, needle: &str) -> bool {
        let haystack = self.get(stream);
        let needle = needle.as_bytes();
        if needle.is_empty() {
            return true;
        }
        haystack.windows(needle.len()).any(|window| window == needle)
    }

    #[must_use]
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    #[must_use]
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Timing and size limits for one capture.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptureConfig {
    pub poll_interval: Duration,
    /// Measured from spawn, not from the start of the loop.
    pub timeout: Duration,
    pub read_chunk_bytes: usize,
    pub max_output_bytes: usize,
    pub kill_grace: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        CaptureSettings::default().to_capture_config()
    }
}

/// Final result of a capture; the session is already torn down.
#[derive(Clone, Debug)]
pub struct CaptureOutcome {
    pub session_id: SessionId,
    pub exit: ExitStatus,
    pub output: CapturedOutput,
    /// The deadline passed before the child exited.
    pub timed_out: bool,
    pub elapsed: Duration,
}

impl CaptureOutcome {
    /// Exit code, or `None` when the child died from a signal.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        self.exit.exit_code
    }
}

/// Which output masters have not yet reported end of file.
#[derive(Clone, Copy, Debug)]
struct OpenStreams {
    stdout: bool,
    stderr: bool,
}

impl OpenStreams {
    fn is_open(self, stream: OutputStream) -> bool {
        match stream {
            OutputStream::Stdout => self.stdout,
            OutputStream::Stderr => self.stderr,
        }
    }

    fn close(&mut self, stream: OutputStream) {
        match stream {
            OutputStream::Stdout => self.stdout = false,
            OutputStream::Stderr => self.stderr = false,
        }
    }
}

enum ChunkRead {
    Data(usize),
    Empty,
    Closed,
}

pub struct CaptureLoop {
    config: CaptureConfig,
}

impl CaptureLoop {
    #[must_use]
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Capture until the child exits or the deadline passes, then close all
    /// descriptors, kill anything left in the child's process group and reap
    /// the child.
    ///
    /// A child still running at the deadline has its process group
    /// terminated; the outcome then carries `timed_out` and whatever output
    /// arrived before the deadline.
    ///
    /// # Errors
    /// - `E_IO`: polling, reading or reaping failed
    pub fn run(&self, mut session: Session) -> RunnerResult<CaptureOutcome> {
        let deadline = session.started_at() + self.config.timeout;
        let mut output = CapturedOutput::default();
        let mut open = OpenStreams {
            stdout: true,
            stderr: true,
        };
        let mut buf = vec![0u8; self.config.read_chunk_bytes.max(1)];

        let timed_out = loop {
            let Some(wait) = self.next_wait(deadline) else {
                break true;
            };
            let progressed = self.poll_once(&session, &mut open, &mut buf, &mut output, wait)?;
            if !progressed && session.try_wait()?.is_some() {
                self.drain(&session, &mut open, &mut buf, &mut output, deadline)?;
                break false;
            }
        };

        // Decided before closing: a child blocked on stdin may exit on its
        // own once the masters go away.
        let terminated = timed_out && session.try_wait()?.is_none();
        session.close_descriptors();
        if terminated {
            tracing::warn!(
                session_id = %session.session_id(),
                timeout = ?self.config.timeout,
                "deadline passed; terminating process group"
            );
            session.terminate_process_group(self.config.kill_grace)?;
        }
        // The group outlives the child when it left background jobs running
        session.kill_process_group()?;
        let exit = session.reap(terminated)?;

        Ok(CaptureOutcome {
            session_id: session.session_id(),
            exit,
            output,
            timed_out,
            elapsed: session.started_at().elapsed(),
        })
    }

    /// Time to wait in the next poll, or `None` once the deadline has passed.
    fn next_wait(&self, deadline: Instant) -> Option<Duration> {
        let remaining = deadline.checked_duration_since(Instant::now())?;
        if remaining.is_zero() {
            return None;
        }
        Some(self.config.poll_interval.min(remaining))
    }

    /// Read whatever is left once the child has exited.
    ///
    /// Data the child wrote just before exiting can reach the master a
    /// moment later, so keep polling until one interval passes quietly.
    fn drain(
        &self,
        session: &Session,
        open: &mut OpenStreams,
        buf: &mut [u8],
        output: &mut CapturedOutput,
        deadline: Instant,
    ) -> RunnerResult<()> {
        while let Some(wait) = self.next_wait(deadline) {
            if !self.poll_once(session, open, buf, output, wait)? {
                break;
            }
        }
        Ok(())
    }

    /// One poll over the open output masters. Returns whether any bytes
    /// were read or a stream reached end of file.
    fn poll_once(
        &self,
        session: &Session,
        open: &mut OpenStreams,
        buf: &mut [u8],
        output: &mut CapturedOutput,
        wait: Duration,
    ) -> RunnerResult<bool> {
        let mut targets: Vec<(OutputStream, &File)> = Vec::with_capacity(2);
        for stream in OutputStream::ALL {
            if open.is_open(stream) {
                if let Some(master) = session.master(stream) {
                    targets.push((stream, master));
                }
            }
        }

        let mut fds: Vec<PollFd<'_>> = targets
            .iter()
            .map(|(_, master)| PollFd::new(master.as_fd(), PollFlags::POLLIN))
            .collect();
        match poll(&mut fds, poll_timeout(wait)) {
            Ok(0) | Err(Errno::EINTR) => return Ok(false),
            Ok(_) => {}
            Err(err) => return Err(RunnerError::io("failed to poll pty masters", err)),
        }
        let ready: Vec<bool> = fds
            .iter()
            .map(|fd| {
                fd.revents().is_some_and(|events| {
                    events.intersects(PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR)
                })
            })
            .collect();
        drop(fds);

        let mut progressed = false;
        for ((stream, master), is_ready) in targets.into_iter().zip(ready) {
            if !is_ready {
                continue;
            }
            match read_chunk(master, buf)? {
                ChunkRead::Data(count) => {
                    tracing::trace!(%stream, bytes = count, "read chunk");
                    let chunk = buf.get(..count).unwrap_or_default();
                    output.append(stream, chunk, self.config.max_output_bytes);
                    progressed = true;
                }
                ChunkRead::Closed => {
                    tracing::debug!(%stream, "stream closed");
                    open.close(stream);
                    progressed = true;
                }
                ChunkRead::Empty => {}
            }
        }
        Ok(progressed)
    }
}

fn read_chunk(master: &File, buf: &mut [u8]) -> RunnerResult<ChunkRead> {
    let mut reader = master;
    match reader.read(buf) {
        Ok(0) => Ok(ChunkRead::Closed),
        Ok(count) => Ok(ChunkRead::Data(count)),
        Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
            Ok(ChunkRead::Empty)
        }
        // Linux reports a hung-up slave as EIO on the master
        Err(err) if err.raw_os_error() == Some(Errno::EIO as i32) => Ok(ChunkRead::Closed),
        Err(err) => Err(RunnerError::io("failed to read pty master", err)),
    }
}

fn poll_timeout(wait: Duration) -> PollTimeout {
    let millis = u16::try_from(wait.as_millis()).unwrap_or(u16::MAX);
    PollTimeout::from(millis)
}
