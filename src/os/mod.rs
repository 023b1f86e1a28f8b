//! OS process-introspection capability surface.
//!
//! Everything the engine needs from the host is behind [`ProcessView`]:
//! enumerate live process identifiers, read a process's command line, fetch
//! its address-space map text, perform positioned memory reads, and peek at
//! its executable header. The scanning/range/event/error logic is written
//! against this trait so it stays portable and unit-testable; [`fake`]
//! provides a deterministic in-memory implementation, [`linux`] the real
//! `/proc` adapter.

use std::io;

pub mod fake;
#[cfg(target_os = "linux")]
pub mod linux;

/// A process identifier as reported by the host.
pub type Pid = u32;

/// Read-only view of the host's live processes.
pub trait ProcessView {
    /// Enumerate the identifiers of all live processes.
    fn pids(&self) -> io::Result<Vec<Pid>>;

    /// The process's command line; argv entries are NUL-separated.
    fn cmdline(&self, pid: Pid) -> io::Result<String>;

    /// The full address-space map text for the process.
    fn maps(&self, pid: Pid) -> io::Result<String>;

    /// Read bytes at an absolute virtual address in the process's address
    /// space. Returns the number of bytes actually read, which may be short
    /// at a mapping boundary.
    fn read_memory(&self, pid: Pid, addr: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// Read a prefix of the process's executable image, enough to inspect
    /// its header identification bytes.
    fn exe_header(&self, pid: Pid, buf: &mut [u8]) -> io::Result<usize>;
}
