//! One-shot result channel between a forked child and its parent
//!
//! Probes that time `fork`, process exit or signal delivery need the child
//! to report a timestamp. The child writes a single `Span` into a pipe and
//! exits; the parent reaps it (bounded by a timeout) and only then reads the
//! pipe. Exactly one write and one read, so no synchronisation is needed
//! beyond the reap itself.
//!
//! The child runs in a process forked from a possibly multi-threaded parent,
//! so the body passed to `spawn` must stick to async-signal-safe work:
//! reading the clock and issuing raw syscalls.

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitid, waitpid, Id, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, pipe2, ForkResult, Pid};
use std::fs::File;
use std::io::{Read, Write};
use std::time::{Duration, Instant};
use tracing::warn;

/// Default limit on how long a probe waits for its child
pub const REAP_TIMEOUT: Duration = Duration::from_secs(1);

const POLL_INTERVAL: Duration = Duration::from_micros(20);

/// Timestamp pair reported by a child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: u64,
    pub end: u64,
}

impl Span {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    fn encode(self) -> [u8; 16] {
        let mut buf = [0u8; 16];
        buf[..8].copy_from_slice(&self.start.to_ne_bytes());
        buf[8..].copy_from_slice(&self.end.to_ne_bytes());
        buf
    }

    fn decode(buf: &[u8; 16]) -> Self {
        let mut start = [0u8; 8];
        let mut end = [0u8; 8];
        start.copy_from_slice(&buf[..8]);
        end.copy_from_slice(&buf[8..]);
        Self {
            start: u64::from_ne_bytes(start),
            end: u64::from_ne_bytes(end),
        }
    }
}

/// A live child process plus the read end of its result pipe
#[derive(Debug)]
pub struct Spawned {
    pid: Pid,
    reader: File,
    reaped: bool,
}

/// Fork a child that runs `body`, sends what it returns, and exits
///
/// The parent gets back a handle immediately; the child's result becomes
/// readable once `reap` has collected it.
pub fn spawn<F>(body: F) -> Result<Spawned, Errno>
where
    F: FnOnce() -> Option<Span>,
{
    // Non-blocking: the parent only reads after reaping, so an empty pipe
    // means the child sent nothing.
    let (read_fd, write_fd) = pipe2(OFlag::O_CLOEXEC | OFlag::O_NONBLOCK)?;
    let reader = File::from(read_fd);
    let mut writer = File::from(write_fd);

    match unsafe { fork() }? {
        ForkResult::Child => {
            drop(reader);
            let status = match body() {
                Some(span) => match writer.write_all(&span.encode()) {
                    Ok(()) => 0,
                    Err(_) => 1,
                },
                None => 0,
            };
            unsafe { libc::_exit(status) }
        }
        ForkResult::Parent { child } => {
            drop(writer);
            Ok(Spawned {
                pid: child,
                reader,
                reaped: false,
            })
        }
    }
}

/// `spawn` followed by `reap` with the default timeout
pub fn run_in_child<F>(body: F) -> Result<Option<Span>, Errno>
where
    F: FnOnce() -> Option<Span>,
{
    spawn(body)?.reap(REAP_TIMEOUT)
}

impl Spawned {
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Wait until the child has exited without reaping it
    ///
    /// Returns `false` if it is still running when `timeout` expires.
    pub fn wait_exited(&self, timeout: Duration) -> Result<bool, Errno> {
        let deadline = Instant::now() + timeout;
        let flags = WaitPidFlag::WEXITED | WaitPidFlag::WNOHANG | WaitPidFlag::WNOWAIT;
        loop {
            match waitid(Id::Pid(self.pid), flags) {
                Ok(WaitStatus::StillAlive) => {}
                Ok(_) => return Ok(true),
                Err(Errno::EINTR) => {}
                Err(e) => return Err(e),
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Mark the child as collected by the caller's own wait call
    pub fn mark_reaped(&mut self) {
        self.reaped = true;
    }

    /// Collect the child (killing it if it overstays `timeout`) and read
    /// back the span it sent, if any
    pub fn reap(mut self, timeout: Duration) -> Result<Option<Span>, Errno> {
        if !self.reaped {
            self.reap_bounded(timeout)?;
        }

        let mut buf = [0u8; 16];
        match self.reader.read_exact(&mut buf) {
            Ok(()) => Ok(Some(Span::decode(&buf))),
            Err(_) => Ok(None),
        }
    }

    fn reap_bounded(&mut self, timeout: Duration) -> Result<(), Errno> {
        let deadline = Instant::now() + timeout;
        loop {
            match waitpid(self.pid, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) => {}
                Ok(_) => {
                    self.reaped = true;
                    return Ok(());
                }
                Err(Errno::EINTR) => {}
                Err(e) => {
                    self.reaped = true;
                    return Err(e);
                }
            }
            if Instant::now() >= deadline {
                warn!("child {} overran {:?}, killing it", self.pid, timeout);
                self.kill_and_wait();
                return Err(Errno::ETIMEDOUT);
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn kill_and_wait(&mut self) {
        let _ = kill(self.pid, Signal::SIGKILL);
        let _ = waitpid(self.pid, None);
        self.reaped = true;
    }
}

impl Drop for Spawned {
    fn drop(&mut self) {
        if !self.reaped {
            self.kill_and_wait();
        }
    }
}
