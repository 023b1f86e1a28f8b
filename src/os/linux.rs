//! `/proc`-based [`ProcessView`] adapter.
//!
//! Consumes the kernel's text and byte interfaces directly:
//! `/proc/<pid>/cmdline`, `/proc/<pid>/maps`, `/proc/<pid>/mem` (positioned
//! reads at absolute virtual addresses) and `/proc/<pid>/exe`.

use super::{Pid, ProcessView};
use std::fs::{self, File};
use std::io::{self, Read};
use std::os::unix::fs::FileExt;
use std::path::PathBuf;

/// The live `/proc` filesystem.
#[derive(Debug, Default, Clone)]
pub struct ProcFs;

impl ProcFs {
    pub fn new() -> Self {
        ProcFs
    }

    fn proc_path(pid: Pid, entry: &str) -> PathBuf {
        PathBuf::from(format!("/proc/{}/{}", pid, entry))
    }
}

impl ProcessView for ProcFs {
    fn pids(&self) -> io::Result<Vec<Pid>> {
        let mut pids = Vec::new();
        for entry in fs::read_dir("/proc")? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                if let Ok(pid) = name.parse::<Pid>() {
                    pids.push(pid);
                }
            }
        }
        Ok(pids)
    }

    fn cmdline(&self, pid: Pid) -> io::Result<String> {
        let raw = fs::read(Self::proc_path(pid, "cmdline"))?;
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }

    fn maps(&self, pid: Pid) -> io::Result<String> {
        fs::read_to_string(Self::proc_path(pid, "maps"))
    }

    fn read_memory(&self, pid: Pid, addr: u64, buf: &mut [u8]) -> io::Result<usize> {
        let file = File::open(Self::proc_path(pid, "mem"))?;
        file.read_at(buf, addr)
    }

    fn exe_header(&self, pid: Pid, buf: &mut [u8]) -> io::Result<usize> {
        let mut file = File::open(Self::proc_path(pid, "exe"))?;
        let mut total = 0;
        while total < buf.len() {
            match file.read(&mut buf[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_own_process_visible() {
        let view = ProcFs::new();
        let own = std::process::id();
        let pids = view.pids().unwrap();
        assert!(pids.contains(&own));
    }

    #[test]
    fn test_own_cmdline_and_maps() {
        let view = ProcFs::new();
        let own = std::process::id();
        let cmdline = view.cmdline(own).unwrap();
        assert!(!cmdline.is_empty());
        let maps = view.maps(own).unwrap();
        assert!(maps.lines().next().is_some());
    }

    #[test]
    fn test_exe_header_is_elf() {
        let view = ProcFs::new();
        let own = std::process::id();
        let mut ident = [0u8; 16];
        let n = view.exe_header(own, &mut ident).unwrap();
        assert!(n >= 5);
        assert_eq!(&ident[..4], b"\x7fELF");
    }
}
