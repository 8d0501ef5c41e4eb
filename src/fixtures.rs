//! Shared read-only context handed to every probe
//!
//! Built once before the first round. Failing to build any part of it is
//! fatal for the run (`BenchError::NoResource`).

use crate::error::{BenchError, Result};
use memmap2::{MmapMut, MmapOptions};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::fd::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

/// Size of the scratch file probes read from and write to
pub const SCRATCH_FILE_SIZE: usize = 4096;

/// Name of the scratch file inside the temp directory
pub const SCRATCH_FILE_NAME: &str = "scratch";

/// Probe fixtures: identity, a scratch file, a scratch directory, two pages
#[derive(Debug)]
pub struct Fixtures {
    pub pid: libc::pid_t,
    pub ppid: libc::pid_t,
    pub uid: libc::uid_t,
    pub gid: libc::gid_t,
    pub page_size: usize,
    dir: TempDir,
    dir_handle: File,
    file_path: PathBuf,
    file: File,
    pages: MmapMut,
}

impl Fixtures {
    /// Create the temp directory, scratch file and scratch pages
    pub fn new() -> Result<Self> {
        let page_size = page_size()?;

        let dir = tempfile::Builder::new()
            .prefix("sysrank-")
            .tempdir()
            .map_err(|e| BenchError::NoResource(format!("temp directory: {}", e)))?;
        let dir_handle = File::open(dir.path())
            .map_err(|e| BenchError::NoResource(format!("open temp directory: {}", e)))?;

        let file_path = dir.path().join(SCRATCH_FILE_NAME);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&file_path)
            .map_err(|e| BenchError::NoResource(format!("scratch file: {}", e)))?;
        file.write_all(&[0xa5; SCRATCH_FILE_SIZE])
            .map_err(|e| BenchError::NoResource(format!("fill scratch file: {}", e)))?;

        let mut pages = MmapOptions::new()
            .len(page_size * 2)
            .map_anon()
            .map_err(|e| BenchError::NoResource(format!("scratch pages: {}", e)))?;
        // Touch both pages so the first probe does not pay for the faults
        pages.fill(0);

        debug!(
            "fixtures ready: dir={} page_size={}",
            dir.path().display(),
            page_size
        );

        Ok(Self {
            pid: nix::unistd::getpid().as_raw(),
            ppid: nix::unistd::getppid().as_raw(),
            uid: nix::unistd::getuid().as_raw(),
            gid: nix::unistd::getgid().as_raw(),
            page_size,
            dir,
            dir_handle,
            file_path,
            file,
            pages,
        })
    }

    pub fn dir_path(&self) -> &Path {
        self.dir.path()
    }

    /// Descriptor of the temp directory, for the `*at()` family
    pub fn dir_fd(&self) -> RawFd {
        self.dir_handle.as_raw_fd()
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn file_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    /// Start of the two pre-faulted pages
    pub fn pages_ptr(&self) -> *mut libc::c_void {
        self.pages.as_ptr() as *mut libc::c_void
    }

    pub fn pages_len(&self) -> usize {
        self.pages.len()
    }

    /// A path inside the temp directory that probes may create and remove
    pub fn scratch_path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

fn page_size() -> Result<usize> {
    match nix::unistd::sysconf(nix::unistd::SysconfVar::PAGE_SIZE) {
        Ok(Some(size)) if size > 0 => Ok(size as usize),
        _ => Err(BenchError::NoResource("cannot determine page size".to_string())),
    }
}
