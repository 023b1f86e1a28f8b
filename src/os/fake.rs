//! Deterministic in-memory [`ProcessView`] for tests.
//!
//! A `FakeView` is a cheap clonable handle onto shared state, so a test can
//! keep one handle to mutate the simulated process table (spawn, kill,
//! rewrite memory) while the session under test holds another. Memory reads
//! are counted, which lets tests assert that scanning stopped early.

use super::{Pid, ProcessView};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io;
use std::rc::Rc;

/// A synthetic mapped region: bytes at a base address plus a perms string
/// and optional backing path, rendered into map-text form on demand.
#[derive(Debug, Clone)]
struct FakeRegion {
    start: u64,
    perms: String,
    path: Option<String>,
    bytes: Vec<u8>,
}

impl FakeRegion {
    fn end(&self) -> u64 {
        self.start + self.bytes.len() as u64
    }
}

#[derive(Debug, Clone, Default)]
struct FakeProcess {
    cmdline: String,
    exe_header: Vec<u8>,
    regions: Vec<FakeRegion>,
}

#[derive(Debug, Default)]
struct State {
    processes: BTreeMap<Pid, FakeProcess>,
    mem_reads: u64,
}

/// Shared-handle fake process table.
#[derive(Debug, Clone, Default)]
pub struct FakeView {
    state: Rc<RefCell<State>>,
}

/// A minimal but valid ELF identification prefix.
pub fn elf_ident(class: u8) -> Vec<u8> {
    let mut ident = vec![0u8; 16];
    ident[..4].copy_from_slice(b"\x7fELF");
    ident[crate::session::EI_CLASS] = class;
    ident
}

impl FakeView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a live process with the given command line and a 64-bit ELF
    /// executable header.
    pub fn spawn(&self, pid: Pid, cmdline: &str) {
        self.state.borrow_mut().processes.insert(
            pid,
            FakeProcess {
                cmdline: cmdline.to_string(),
                exe_header: elf_ident(object::elf::ELFCLASS64),
                regions: Vec::new(),
            },
        );
    }

    /// Remove a process, simulating its death.
    pub fn kill(&self, pid: Pid) {
        self.state.borrow_mut().processes.remove(&pid);
    }

    /// Replace a process's executable header bytes.
    pub fn set_exe_header(&self, pid: Pid, header: Vec<u8>) {
        if let Some(proc) = self.state.borrow_mut().processes.get_mut(&pid) {
            proc.exe_header = header;
        }
    }

    /// Map a region of bytes into a process at `start`, with a `rwxp`-style
    /// perms field and optional backing path.
    pub fn map_region(&self, pid: Pid, start: u64, perms: &str, path: Option<&str>, bytes: Vec<u8>) {
        if let Some(proc) = self.state.borrow_mut().processes.get_mut(&pid) {
            proc.regions.push(FakeRegion {
                start,
                perms: perms.to_string(),
                path: path.map(str::to_string),
                bytes,
            });
        }
    }

    /// Overwrite bytes inside an existing region.
    pub fn poke(&self, pid: Pid, addr: u64, bytes: &[u8]) {
        if let Some(proc) = self.state.borrow_mut().processes.get_mut(&pid) {
            for region in &mut proc.regions {
                if addr >= region.start && addr + bytes.len() as u64 <= region.end() {
                    let offset = (addr - region.start) as usize;
                    region.bytes[offset..offset + bytes.len()].copy_from_slice(bytes);
                    return;
                }
            }
        }
    }

    /// Number of positioned memory reads performed so far.
    pub fn mem_reads(&self) -> u64 {
        self.state.borrow().mem_reads
    }

    fn not_found(pid: Pid) -> io::Error {
        io::Error::new(io::ErrorKind::NotFound, format!("no such process: {}", pid))
    }
}

impl ProcessView for FakeView {
    fn pids(&self) -> io::Result<Vec<Pid>> {
        Ok(self.state.borrow().processes.keys().copied().collect())
    }

    fn cmdline(&self, pid: Pid) -> io::Result<String> {
        self.state
            .borrow()
            .processes
            .get(&pid)
            .map(|proc| proc.cmdline.clone())
            .ok_or_else(|| Self::not_found(pid))
    }

    fn maps(&self, pid: Pid) -> io::Result<String> {
        let state = self.state.borrow();
        let proc = state.processes.get(&pid).ok_or_else(|| Self::not_found(pid))?;
        let mut text = String::new();
        for region in &proc.regions {
            let line = match &region.path {
                Some(path) => format!(
                    "{:x}-{:x} {} 00000000 00:00 0 {}\n",
                    region.start,
                    region.end(),
                    region.perms,
                    path
                ),
                None => format!(
                    "{:x}-{:x} {} 00000000 00:00 0\n",
                    region.start,
                    region.end(),
                    region.perms
                ),
            };
            text.push_str(&line);
        }
        Ok(text)
    }

    fn read_memory(&self, pid: Pid, addr: u64, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.borrow_mut();
        state.mem_reads += 1;
        let proc = state.processes.get(&pid).ok_or_else(|| Self::not_found(pid))?;
        for region in &proc.regions {
            if addr >= region.start && addr < region.end() {
                let offset = (addr - region.start) as usize;
                let n = buf.len().min(region.bytes.len() - offset);
                buf[..n].copy_from_slice(&region.bytes[offset..offset + n]);
                return Ok(n);
            }
        }
        Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("unmapped address {:#x}", addr),
        ))
    }

    fn exe_header(&self, pid: Pid, buf: &mut [u8]) -> io::Result<usize> {
        let state = self.state.borrow();
        let proc = state.processes.get(&pid).ok_or_else(|| Self::not_found(pid))?;
        let n = buf.len().min(proc.exe_header.len());
        buf[..n].copy_from_slice(&proc.exe_header[..n]);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_and_enumerate() {
        let view = FakeView::new();
        view.spawn(42, "/opt/app/target.bin");
        view.spawn(7, "/bin/other");
        assert_eq!(view.pids().unwrap(), vec![7, 42]);
        assert_eq!(view.cmdline(42).unwrap(), "/opt/app/target.bin");
        assert!(view.cmdline(99).is_err());
    }

    #[test]
    fn test_maps_rendering_round_trips() {
        let view = FakeView::new();
        view.spawn(1, "a");
        view.map_region(1, 0x1000, "r-xp", None, vec![0; 0x100]);
        view.map_region(1, 0x8000, "rw-p", Some("/lib/x.so"), vec![0; 0x10]);
        let text = view.maps(1).unwrap();
        let regions: Vec<crate::maps::Region> = crate::maps::regions(&text).collect();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].start, 0x1000);
        assert_eq!(regions[0].end, 0x1100);
        assert_eq!(regions[1].path.as_deref(), Some("/lib/x.so"));
    }

    #[test]
    fn test_read_memory_and_counter() {
        let view = FakeView::new();
        view.spawn(1, "a");
        view.map_region(1, 0x1000, "r-xp", None, vec![1, 2, 3, 4]);
        let mut buf = [0u8; 2];
        let n = view.read_memory(1, 0x1001, &mut buf).unwrap();
        assert_eq!(n, 2);
        assert_eq!(buf, [2, 3]);
        assert!(view.read_memory(1, 0x9999, &mut buf).is_err());
        assert_eq!(view.mem_reads(), 2);
    }

    #[test]
    fn test_poke() {
        let view = FakeView::new();
        view.spawn(1, "a");
        view.map_region(1, 0x1000, "rw-p", None, vec![0; 8]);
        view.poke(1, 0x1004, &[0xaa, 0xbb]);
        let mut buf = [0u8; 8];
        view.read_memory(1, 0x1000, &mut buf).unwrap();
        assert_eq!(buf, [0, 0, 0, 0, 0xaa, 0xbb, 0, 0]);
    }
}
