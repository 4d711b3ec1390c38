//! Pseudo-terminal allocation for the child's standard streams.
//!
//! Each of stdin, stdout and stderr gets its own master/slave pair so the
//! child sees three terminals (and `isatty` holds on every stream) while
//! the harness can still tell stdout and stderr apart on the master side.
//!
//! # Key Types
//!
//! - [`PtyPair`] - One master/slave pair
//! - [`StdioPtys`] - The three pairs for one session
//!
//! # Key Operations
//!
//! - [`open_pair`] - Allocate a single pair
//! - [`allocate_stdio`] - Allocate all three pairs, masters of the output
//!   pairs switched to non-blocking
//! - [`StdioPtys::close`] - Release all six descriptors in a fixed order

use crate::runner::{RunnerError, RunnerResult};
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::pty::{openpty, Winsize};
use std::fs::File;
use std::os::fd::{AsRawFd, OwnedFd};
use std::process::Stdio;

/// Window size reported to the child (standard VT100 24x80).
const DEFAULT_WINSIZE: Winsize = Winsize {
    ws_row: 24,
    ws_col: 80,
    ws_xpixel: 0,
    ws_ypixel: 0,
};

/// A master/slave pseudo-terminal pair.
///
/// The slave end is what the child reads or writes; the master end stays
/// with the harness. Line discipline is left at the kernel default
/// (canonical mode, echo on), which is what a login terminal looks like.
#[derive(Debug)]
pub struct PtyPair {
    pub master: File,
    pub slave: OwnedFd,
}

impl PtyPair {
    /// A fresh duplicate of the slave end, suitable for binding to a child
    /// stream. The pair keeps its own slave descriptor.
    pub fn slave_stdio(&self) -> RunnerResult<Stdio> {
        let slave = self
            .slave
            .try_clone()
            .map_err(|err| RunnerError::pty("failed to duplicate pty slave", err))?;
        Ok(Stdio::from(slave))
    }

    /// Put the master end in non-blocking mode so reads return
    /// `WouldBlock` instead of stalling the capture loop.
    pub fn set_master_nonblocking(&self) -> RunnerResult<()> {
        let fd = self.master.as_raw_fd();
        let flags = OFlag::from_bits_truncate(
            fcntl(fd, FcntlArg::F_GETFL)
                .map_err(|err| RunnerError::pty("failed to get fd flags", err))?,
        );
        fcntl(fd, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK))
            .map_err(|err| RunnerError::pty("failed to set nonblocking", err))?;
        Ok(())
    }
}

/// Allocate one pseudo-terminal pair.
///
/// # Errors
/// Returns `E_PTY` when the system is out of PTYs or `/dev/ptmx` is missing.
pub fn open_pair() -> RunnerResult<PtyPair> {
    let pty = openpty(Some(&DEFAULT_WINSIZE), None)
        .map_err(|err| RunnerError::pty("failed to open pty", err))?;
    Ok(PtyPair {
        master: File::from(pty.master),
        slave: pty.slave,
    })
}

/// The three pairs backing one child's standard streams.
#[derive(Debug)]
pub struct StdioPtys {
    pub stdin: PtyPair,
    pub stdout: PtyPair,
    pub stderr: PtyPair,
}

/// Allocate a pair per standard stream.
///
/// On failure every pair opened so far is dropped, so a failed allocation
/// leaks nothing into the next session.
pub fn allocate_stdio() -> RunnerResult<StdioPtys> {
    let stdin = open_pair()?;
    let stdout = open_pair()?;
    let stderr = open_pair()?;
    stdout.set_master_nonblocking()?;
    stderr.set_master_nonblocking()?;
    tracing::debug!(
        stdin = stdin.master.as_raw_fd(),
        stdout = stdout.master.as_raw_fd(),
        stderr = stderr.master.as_raw_fd(),
        "allocated stdio ptys"
    );
    Ok(StdioPtys {
        stdin,
        stdout,
        stderr,
    })
}

impl StdioPtys {
    /// Close all six descriptors: slaves (in, out, err) then masters
    /// (in, out, err).
    ///
    /// Must only run once polling is over; a master closed while the child
    /// still writes its slave turns those writes into `EIO`.
    pub fn close(self) {
        let Self {
            stdin,
            stdout,
            stderr,
        } = self;
        drop(stdin.slave);
        drop(stdout.slave);
        drop(stderr.slave);
        drop(stdin.master);
        drop(stdout.master);
        drop(stderr.master);
    }
}
