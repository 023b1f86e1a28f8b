//! The session aggregate: one process-attachment lifecycle and all the
//! scanner state that hangs off it.
//!
//! A [`Session`] owns the configured process-name criterion, the registered
//! patterns and scan ranges, the lifecycle event queue and the sticky error
//! code. Any operation that needs the target first ensures attachment,
//! blocking in the discovery loop until a matching process shows up or the
//! timeout elapses. All failures are folded into the sticky code: while it
//! is set, active operations are no-ops returning default values, and only
//! configuration calls stay live so the caller can fix inputs, clear the
//! code and retry.
//!
//! Sessions are single-threaded; nothing here locks.

use crate::config::SessionConfig;
use crate::error::{describe, ErrorCode, MemscoutError, Result};
use crate::event::{Event, EventQueue};
use crate::maps::{self, Region, RegionPerms};
use crate::os::{Pid, ProcessView};
use crate::pattern::Pattern;
use crate::range::{self, ScanRange};
use bitflags::bitflags;
use memchr::memmem;
use std::time::Duration;
use tracing::{debug, info, warn};

bitflags! {
    /// Session option flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SessionOptions: u32 {
        /// Suppress the session's own per-failure diagnostics.
        const SILENT = 1 << 0;
        /// Scan readable non-executable regions too.
        const ALL_MEMORY = 1 << 1;
    }
}

const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];

/// Offset of the class byte in the ELF identification array (`e_ident`).
pub(crate) const EI_CLASS: usize = 4;

/// One attachment lifecycle against a [`ProcessView`].
#[derive(Debug)]
pub struct Session<V: ProcessView> {
    view: V,
    config: SessionConfig,
    options: SessionOptions,
    process_name: Option<String>,
    pid: Option<Pid>,
    ptr_width: usize,
    timeout_secs: u64,
    error: Option<ErrorCode>,
    scratch: Vec<u8>,
    patterns: Vec<Pattern>,
    ranges: Vec<ScanRange>,
    events: EventQueue,
}

impl<V: ProcessView> Session<V> {
    /// Create a session over the given view with default configuration.
    pub fn new(view: V) -> Self {
        Self::with_config(view, SessionConfig::default())
    }

    pub fn with_config(view: V, config: SessionConfig) -> Self {
        let events = EventQueue::new(config.event_capacity);
        Self {
            view,
            config,
            options: SessionOptions::empty(),
            process_name: None,
            pid: None,
            ptr_width: 8,
            timeout_secs: 0,
            error: None,
            scratch: Vec::new(),
            patterns: Vec::new(),
            ranges: Vec::new(),
            events,
        }
    }

    // ---- configuration surface (never gated on the sticky error) ----

    /// Set the process-name criterion: the executable basename extracted
    /// from the target's command line must equal this exactly. Resets any
    /// current attachment so the next active call rediscovers.
    pub fn set_process_name(&mut self, name: &str) {
        self.process_name = Some(name.to_string());
        self.pid = None;
    }

    pub fn process_name(&self) -> Option<&str> {
        self.process_name.as_deref()
    }

    /// Register a wildcard byte pattern. Malformed text or a full registry
    /// sets the sticky code and leaves the registry unchanged.
    pub fn add_pattern(&mut self, text: &str) {
        if let Err(err) = self.try_add_pattern(text) {
            self.fail(err);
        }
    }

    /// `add_pattern` sugar for callers that key results off the returned
    /// text instead of repeating the literal at lookup time.
    pub fn bind_pattern(&mut self, text: &str) -> String {
        self.add_pattern(text);
        text.to_string()
    }

    fn try_add_pattern(&mut self, text: &str) -> Result<()> {
        if self.patterns.len() >= self.config.max_patterns {
            return Err(MemscoutError::CapacityExceeded {
                resource: "patterns",
                used: self.patterns.len(),
                limit: self.config.max_patterns,
            });
        }
        let pattern = Pattern::parse(text)?;
        if pattern.is_empty() {
            return Err(MemscoutError::InvalidPattern {
                text: text.to_string(),
                message: "pattern holds no bytes".to_string(),
            });
        }
        if pattern.len() > self.config.chunk_capacity {
            return Err(MemscoutError::InvalidPattern {
                text: text.to_string(),
                message: format!(
                    "pattern length {} exceeds chunk capacity {}",
                    pattern.len(),
                    self.config.chunk_capacity
                ),
            });
        }
        self.patterns.push(pattern);
        Ok(())
    }

    /// Remove the pattern whose registration text matches exactly.
    pub fn remove_pattern(&mut self, text: &str) {
        self.patterns.retain(|pattern| pattern.text() != text);
    }

    pub fn clear_patterns(&mut self) {
        self.patterns.clear();
    }

    /// Reset every pattern's match result without removing the patterns.
    pub fn clear_results(&mut self) {
        for pattern in &mut self.patterns {
            pattern.result = None;
        }
    }

    /// The bound result address for a pattern, by exact text.
    pub fn result(&self, text: &str) -> Option<u64> {
        self.patterns
            .iter()
            .find(|pattern| pattern.text() == text)
            .and_then(Pattern::result)
    }

    /// Restrict scanning to regions overlapping `[start, end)`.
    pub fn add_range(&mut self, start: u64, end: u64) {
        if let Err(err) = self.try_add_range(start, Some(end)) {
            self.fail(err);
        }
    }

    fn try_add_range(&mut self, start: u64, end: Option<u64>) -> Result<()> {
        if self.ranges.len() >= self.config.max_ranges {
            return Err(MemscoutError::CapacityExceeded {
                resource: "ranges",
                used: self.ranges.len(),
                limit: self.config.max_ranges,
            });
        }
        self.ranges.push(ScanRange::new(start, end));
        Ok(())
    }

    pub fn clear_ranges(&mut self) {
        self.ranges.clear();
    }

    pub fn set_timeout(&mut self, seconds: u64) {
        self.timeout_secs = seconds;
    }

    pub fn timeout(&self) -> u64 {
        self.timeout_secs
    }

    pub fn set_options(&mut self, options: SessionOptions) {
        self.options |= options;
    }

    pub fn clear_options(&mut self, options: SessionOptions) {
        self.options &= !options;
    }

    pub fn options(&self) -> SessionOptions {
        self.options
    }

    // ---- error surface ----

    /// The pending sticky code, if any.
    pub fn last_error(&self) -> Option<ErrorCode> {
        self.error
    }

    /// Human-readable text for the pending code ("no error" when clear).
    pub fn error_message(&self) -> &'static str {
        describe(self.error)
    }

    /// Clear the sticky code, re-enabling active operations.
    pub fn clear_error(&mut self) {
        self.error = None;
    }

    fn fail(&mut self, err: MemscoutError) {
        if !self.options.contains(SessionOptions::SILENT) {
            warn!(error = %err, "operation failed");
        }
        self.error = Some(err.code());
    }

    // ---- process locator ----

    /// Currently attached process id, if any.
    pub fn pid(&self) -> Option<Pid> {
        self.pid
    }

    /// Detected pointer width in bytes; meaningful only while attached.
    pub fn ptr_width(&self) -> usize {
        self.ptr_width
    }

    fn criterion_matches(&self, pid: Pid) -> bool {
        let Some(name) = self.process_name.as_deref() else {
            return false;
        };
        let Ok(cmdline) = self.view.cmdline(pid) else {
            return false;
        };
        let argv0 = cmdline.split('\0').next().unwrap_or("");
        let basename = argv0.rsplit('/').next().unwrap_or(argv0);
        basename == name
    }

    /// Drop the attachment if the current pid no longer satisfies the
    /// criterion (died, or was replaced by an unrelated process).
    fn check_alive(&mut self) {
        if let Some(pid) = self.pid {
            if !self.criterion_matches(pid) {
                info!(pid, "attached process no longer matches, detaching");
                self.pid = None;
            }
        }
    }

    /// Ensure a live attachment, blocking in the discovery loop if needed.
    ///
    /// Every fresh attachment re-derives the pointer width and enqueues
    /// exactly one ProcessChanged event.
    fn ensure_attached(&mut self) -> Result<Pid> {
        self.check_alive();
        if let Some(pid) = self.pid {
            return Ok(pid);
        }
        if self.process_name.is_none() {
            return Err(MemscoutError::MissingCriterion);
        }
        let interval = self.config.discovery_interval(self.timeout_secs);
        let deadline = Duration::from_secs(self.timeout_secs);
        let mut waited = Duration::ZERO;
        debug!("scanning for a matching process");
        loop {
            let found = self
                .view
                .pids()?
                .into_iter()
                .find(|&pid| self.criterion_matches(pid));
            if let Some(pid) = found {
                self.pid = Some(pid);
                self.ptr_width = self.probe_ptr_width(pid);
                info!(pid, ptr_width = self.ptr_width, "attached");
                self.events.push(Event::ProcessChanged);
                return Ok(pid);
            }
            if self.timeout_secs != 0 && waited >= deadline {
                return Err(MemscoutError::Timeout {
                    seconds: self.timeout_secs,
                });
            }
            std::thread::sleep(interval);
            waited += interval;
        }
    }

    /// Pointer width from the executable header's class byte. Unreadable or
    /// non-ELF images fall back to 8 bytes.
    fn probe_ptr_width(&self, pid: Pid) -> usize {
        let mut ident = [0u8; 16];
        match self.view.exe_header(pid, &mut ident) {
            Ok(n) if n > EI_CLASS && ident[..4] == ELF_MAGIC => {
                if ident[EI_CLASS] == object::elf::ELFCLASS32 {
                    4
                } else {
                    8
                }
            }
            Ok(_) => {
                warn!(pid, "executable is not an ELF image, assuming 8-byte pointers");
                8
            }
            Err(err) => {
                warn!(pid, error = %err, "cannot read executable header, assuming 8-byte pointers");
                8
            }
        }
    }

    /// Fetch the address-space map text, rediscovering the process if the
    /// map vanished out from under us.
    fn maps_text(&mut self) -> Result<(Pid, String)> {
        loop {
            let pid = self.ensure_attached()?;
            match self.view.maps(pid) {
                Ok(text) => return Ok((pid, text)),
                Err(err) => {
                    debug!(pid, error = %err, "address-space map unavailable, rediscovering");
                    self.pid = None;
                }
            }
        }
    }

    // ---- event queue ----

    /// Pop one lifecycle event, re-validating liveness first (which may
    /// itself enqueue a ProcessChanged on reattachment). Drain in a loop
    /// until `None`.
    pub fn poll_event(&mut self) -> Option<Event> {
        if self.error.is_some() {
            return None;
        }
        if let Err(err) = self.ensure_attached() {
            self.fail(err);
            return None;
        }
        self.events.pop()
    }

    // ---- range resolution against the live map ----

    /// Add a range whose bounds are resolved from backing-file substrings:
    /// the start comes from the first region whose path contains
    /// `start_substr`, the end from the first whose path contains
    /// `end_substr`. The two may name different backing files. A substring
    /// matching nothing yields a null bound (start 0 / no upper bound).
    pub fn add_range_by_substr(&mut self, start_substr: &str, end_substr: &str) {
        if self.error.is_some() {
            return;
        }
        if let Err(err) = self.try_add_range_by_substr(start_substr, end_substr) {
            self.fail(err);
        }
    }

    fn try_add_range_by_substr(&mut self, start_substr: &str, end_substr: &str) -> Result<()> {
        let start = self
            .region_by_substr(start_substr)?
            .map(|region| region.start)
            .unwrap_or(0);
        let end = self.region_by_substr(end_substr)?.map(|region| region.end);
        self.try_add_range(start, end)
    }

    /// First region whose backing-file path contains the substring.
    fn region_by_substr(&mut self, needle: &str) -> Result<Option<Region>> {
        let (_, text) = self.maps_text()?;
        let finder = memmem::Finder::new(needle.as_bytes());
        let mut found = None;
        maps::walk(&text, |region| {
            let hit = region
                .path
                .as_deref()
                .is_some_and(|path| finder.find(path.as_bytes()).is_some());
            if hit {
                found = Some(region.clone());
            }
            hit
        });
        Ok(found)
    }

    // ---- scanner ----

    /// Scan the target's address space for all registered patterns in one
    /// buffered pass.
    ///
    /// Regions must be readable, executable unless ALL_MEMORY is set, and
    /// admitted by the configured ranges. Each pattern records the first
    /// address it matches at; the pass stops the instant every pattern has
    /// a result. Returns the first registered pattern's address (in
    /// registration order) or `None` if nothing matched.
    pub fn find_patterns(&mut self) -> Option<u64> {
        if self.error.is_some() {
            return None;
        }
        match self.scan_all() {
            Ok(found) => found,
            Err(err) => {
                self.fail(err);
                None
            }
        }
    }

    fn scan_all(&mut self) -> Result<Option<u64>> {
        let max_len = self.patterns.iter().map(Pattern::len).max().unwrap_or(0);
        let (pid, text) = self.maps_text()?;
        if max_len > 0 && !self.all_matched() {
            for region in maps::regions(&text) {
                if self.all_matched() {
                    break;
                }
                if !self.scannable(&region) {
                    continue;
                }
                debug!(start = region.start, end = region.end, "scanning region");
                self.scan_region(pid, &region, max_len);
            }
        }
        Ok(self.patterns.iter().find_map(Pattern::result))
    }

    fn scannable(&self, region: &Region) -> bool {
        if !region.perms.contains(RegionPerms::READ) {
            return false;
        }
        if !self.options.contains(SessionOptions::ALL_MEMORY)
            && !region.perms.contains(RegionPerms::EXEC)
        {
            return false;
        }
        range::admits(&self.ranges, region)
    }

    /// Chunked scan of one region. Chunks are sized to the scratch capacity
    /// and always hold at least `max_len` bytes, with successive chunks
    /// overlapping by `max_len - 1` so a window straddling a chunk boundary
    /// is still tested. Read failures end the region, not the pass: the
    /// target may have unmapped it mid-scan.
    fn scan_region(&mut self, pid: Pid, region: &Region, max_len: usize) {
        let chunk_cap = self.config.chunk_capacity.max(max_len);
        let mut pos = region.start;
        while pos + max_len as u64 <= region.end {
            let want = chunk_cap.min((region.end - pos) as usize);
            self.scratch.resize(want, 0);
            let got = match self.view.read_memory(pid, pos, &mut self.scratch[..want]) {
                Ok(n) => n,
                Err(err) => {
                    debug!(addr = pos, error = %err, "region read failed, skipping rest");
                    return;
                }
            };
            if got < max_len {
                return;
            }
            for offset in 0..got {
                let addr = pos + offset as u64;
                let window = &self.scratch[offset..got];
                for pattern in &mut self.patterns {
                    if pattern.result.is_none() && pattern.matches(window) {
                        pattern.result = Some(addr);
                        info!(addr, pattern = pattern.text(), "pattern matched");
                    }
                }
            }
            if self.all_matched() {
                return;
            }
            // Step so the next chunk re-covers the last max_len - 1 bytes.
            pos += (got - (max_len - 1)) as u64;
        }
    }

    fn all_matched(&self) -> bool {
        !self.patterns.is_empty() && self.patterns.iter().all(|pattern| pattern.result.is_some())
    }

    // ---- reads ----

    /// Copy `dst.len()` bytes from the target's live address space into
    /// `dst`. On failure the sticky code is set and `dst` is untouched.
    pub fn read(&mut self, addr: u64, dst: &mut [u8]) {
        if self.error.is_some() {
            return;
        }
        match self.read_into_scratch(addr, dst.len()) {
            Ok(()) => dst.copy_from_slice(&self.scratch[..dst.len()]),
            Err(err) => self.fail(err),
        }
    }

    fn read_into_scratch(&mut self, addr: u64, len: usize) -> Result<()> {
        let pid = self.ensure_attached()?;
        self.scratch.resize(len, 0);
        let got = self.view.read_memory(pid, addr, &mut self.scratch[..len])?;
        if got < len {
            return Err(MemscoutError::ShortRead {
                addr,
                wanted: len,
                got,
            });
        }
        Ok(())
    }

    /// Fixed-width read of a little-endian 32-bit integer.
    pub fn read_i32(&mut self, addr: u64) -> i32 {
        let mut bytes = [0u8; 4];
        self.read(addr, &mut bytes);
        i32::from_le_bytes(bytes)
    }

    /// Read one pointer at the session's detected pointer width,
    /// zero-extended to 64 bits.
    pub fn read_ptr(&mut self, addr: u64) -> u64 {
        let mut bytes = [0u8; 8];
        let width = self.ptr_width.min(8);
        self.read(addr, &mut bytes[..width]);
        u64::from_le_bytes(bytes)
    }

    /// Walk a multi-level pointer chain: for each offset in order,
    /// dereference the pointer at `current + offset`, starting from `base`.
    /// Performs exactly `offsets.len()` pointer reads.
    pub fn read_chain(&mut self, base: u64, offsets: &[i64]) -> u64 {
        let mut value = base;
        for &offset in offsets {
            value = self.read_ptr(value.wrapping_add_signed(offset));
        }
        value
    }
}

#[cfg(target_os = "linux")]
impl Session<crate::os::linux::ProcFs> {
    /// A session over the live `/proc` filesystem.
    pub fn system() -> Self {
        Self::new(crate::os::linux::ProcFs::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::os::fake::{elf_ident, FakeView};

    fn fast_config() -> SessionConfig {
        SessionConfig {
            poll_interval: Some(Duration::from_millis(1)),
            ..Default::default()
        }
    }

    fn attached_session(view: &FakeView) -> Session<FakeView> {
        let mut session = Session::with_config(view.clone(), fast_config());
        session.set_process_name("target.bin");
        session.set_timeout(1);
        session
    }

    #[test]
    fn test_missing_criterion_is_invalid_argument() {
        let view = FakeView::new();
        let mut session = Session::with_config(view, fast_config());
        assert_eq!(session.find_patterns(), None);
        assert_eq!(session.last_error(), Some(ErrorCode::InvalidArgument));
        assert_eq!(session.error_message(), "invalid parameter(s)");
    }

    #[test]
    fn test_attach_and_pid() {
        let view = FakeView::new();
        view.spawn(42, "/opt/app/target.bin");
        let mut session = attached_session(&view);
        assert_eq!(session.pid(), None);
        assert_eq!(session.poll_event(), Some(Event::ProcessChanged));
        assert_eq!(session.poll_event(), None);
        assert_eq!(session.pid(), Some(42));
        assert_eq!(session.ptr_width(), 8);
    }

    #[test]
    fn test_ptr_width_from_class_byte() {
        let view = FakeView::new();
        view.spawn(42, "/opt/app/target.bin");
        view.set_exe_header(42, elf_ident(object::elf::ELFCLASS32));
        let mut session = attached_session(&view);
        session.poll_event();
        assert_eq!(session.ptr_width(), 4);
    }

    #[test]
    fn test_non_elf_header_falls_back_to_eight() {
        let view = FakeView::new();
        view.spawn(42, "/opt/app/target.bin");
        view.set_exe_header(42, b"MZ\x90\x00".to_vec());
        let mut session = attached_session(&view);
        session.poll_event();
        assert_eq!(session.ptr_width(), 8);
        assert_eq!(session.last_error(), None);
    }

    #[test]
    fn test_timeout_when_nothing_matches() {
        let view = FakeView::new();
        view.spawn(7, "/bin/unrelated");
        let mut session = attached_session(&view);
        assert_eq!(session.poll_event(), None);
        assert_eq!(session.last_error(), Some(ErrorCode::Timeout));
        assert_eq!(session.pid(), None);
    }

    #[test]
    fn test_sticky_error_gates_active_ops() {
        let view = FakeView::new();
        let mut session = attached_session(&view);
        assert_eq!(session.poll_event(), None); // times out
        assert_eq!(session.last_error(), Some(ErrorCode::Timeout));

        // Active ops are suppressed and read destinations untouched.
        let mut buf = [0xcc; 4];
        session.read(0x1000, &mut buf);
        assert_eq!(buf, [0xcc; 4]);
        assert_eq!(session.read_i32(0x1000), 0);
        assert_eq!(session.find_patterns(), None);

        // Configuration stays live.
        session.add_pattern("DE AD");
        assert_eq!(session.result("DE AD"), None);
        session.add_range(0, 0x1000);
        session.set_process_name("other.bin");

        session.clear_error();
        assert_eq!(session.last_error(), None);
        assert_eq!(session.error_message(), "no error");
    }

    #[test]
    fn test_bad_pattern_leaves_registry_unchanged() {
        let view = FakeView::new();
        let mut session = Session::with_config(view, fast_config());
        session.add_pattern("DE AD");
        session.add_pattern("not hex");
        assert_eq!(session.last_error(), Some(ErrorCode::InvalidArgument));
        session.clear_error();
        // Only the good pattern is present; removal by text works.
        assert_eq!(session.result("not hex"), None);
        session.remove_pattern("DE AD");
        session.add_pattern("11 22");
        assert_eq!(session.last_error(), None);
    }

    #[test]
    fn test_pattern_capacity() {
        let view = FakeView::new();
        let config = SessionConfig {
            max_patterns: 2,
            ..fast_config()
        };
        let mut session = Session::with_config(view, config);
        session.add_pattern("11");
        session.add_pattern("22");
        session.add_pattern("33");
        assert_eq!(session.last_error(), Some(ErrorCode::OutOfMemory));
        assert_eq!(session.error_message(), "out of memory");
    }

    #[test]
    fn test_range_capacity() {
        let view = FakeView::new();
        let config = SessionConfig {
            max_ranges: 1,
            ..fast_config()
        };
        let mut session = Session::with_config(view, config);
        session.add_range(0, 0x1000);
        session.add_range(0x2000, 0x3000);
        assert_eq!(session.last_error(), Some(ErrorCode::OutOfMemory));
    }

    #[test]
    fn test_read_chain_composes_read_ptr() {
        let view = FakeView::new();
        view.spawn(42, "/opt/app/target.bin");
        // 0x1000: ptr -> 0x2000; 0x2010: ptr -> 0x3000; 0x3004: value
        let mut region = vec![0u8; 0x3000];
        region[0x0000..0x0008].copy_from_slice(&0x2000u64.to_le_bytes());
        region[0x1010..0x1018].copy_from_slice(&0x3000u64.to_le_bytes());
        region[0x2004..0x200c].copy_from_slice(&0xdeadbeefu64.to_le_bytes());
        view.map_region(42, 0x1000, "rw-p", None, region);

        let mut session = attached_session(&view);
        let chained = session.read_chain(0x1000, &[0, 0x10, 0x04]);

        let mut v = session.read_ptr(0x1000);
        v = session.read_ptr(v + 0x10);
        v = session.read_ptr(v + 0x04);
        assert_eq!(chained, v);
        assert_eq!(chained, 0xdeadbeef);
        assert_eq!(session.last_error(), None);
    }

    #[test]
    fn test_read_failure_sets_io() {
        let view = FakeView::new();
        view.spawn(42, "/opt/app/target.bin");
        view.map_region(42, 0x1000, "rw-p", None, vec![0; 16]);
        let mut session = attached_session(&view);
        let mut buf = [0xaa; 4];
        session.read(0xdead0000, &mut buf);
        assert_eq!(session.last_error(), Some(ErrorCode::Io));
        assert_eq!(buf, [0xaa; 4]);
    }
}
