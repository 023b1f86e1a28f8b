//! Address-space map parsing.
//!
//! The target's address space is described as text, one region per line:
//! two hyphen-separated hex addresses, a permission flag field, then
//! offset/device/inode fields and an optional backing-file path.
//! `7f50a000-7f50b000 r-xp 00000000 08:01 42 /usr/lib/libfoo.so`

use crate::error::{MemscoutError, Result};
use bitflags::bitflags;
use tracing::warn;

bitflags! {
    /// Permission flags for one mapped region.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RegionPerms: u8 {
        const READ = 1;
        const WRITE = 2;
        const EXEC = 4;
        const PRIVATE = 8;
    }
}

impl RegionPerms {
    /// Parse a `rwxp`-style flag field. Unknown characters are ignored so
    /// shared (`s`) mappings simply come out without PRIVATE.
    pub fn parse(field: &str) -> Self {
        let mut perms = RegionPerms::empty();
        for (index, c) in field.chars().enumerate() {
            match (index, c) {
                (0, 'r') => perms |= RegionPerms::READ,
                (1, 'w') => perms |= RegionPerms::WRITE,
                (2, 'x') => perms |= RegionPerms::EXEC,
                (3, 'p') => perms |= RegionPerms::PRIVATE,
                _ => {}
            }
        }
        perms
    }
}

/// One contiguous span of the target's address space.
///
/// Half-open: `start` inclusive, `end` exclusive. Produced and consumed
/// within a single map pass, never retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub start: u64,
    pub end: u64,
    pub perms: RegionPerms,
    /// Backing-file path, when the mapping names one.
    pub path: Option<String>,
}

impl Region {
    /// Region length in bytes.
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Parse one map line into a region descriptor.
    pub fn parse_line(line: &str) -> Result<Self> {
        let malformed = || MemscoutError::MalformedRegion(line.to_string());

        let mut fields = line.split_whitespace();
        let addrs = fields.next().ok_or_else(malformed)?;
        let (start, end) = addrs.split_once('-').ok_or_else(malformed)?;
        let start = u64::from_str_radix(start, 16).map_err(|_| malformed())?;
        let end = u64::from_str_radix(end, 16).map_err(|_| malformed())?;

        let perms = RegionPerms::parse(fields.next().unwrap_or(""));

        // Skip offset, device and inode; whatever remains is the path.
        let rest: Vec<&str> = fields.skip(3).collect();
        let path = if rest.is_empty() {
            None
        } else {
            Some(rest.join(" "))
        };

        Ok(Region {
            start,
            end,
            perms,
            path,
        })
    }
}

/// Iterate the regions of a full address-space map text.
///
/// Malformed lines are reported with a warning and skipped; iteration
/// continues to end-of-input.
pub fn regions(maps_text: &str) -> impl Iterator<Item = Region> + '_ {
    maps_text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match Region::parse_line(line) {
            Ok(region) => Some(region),
            Err(err) => {
                warn!(error = %err, "skipping unparseable map line");
                None
            }
        })
}

/// Feed each region to a visitor; the visitor returns true to stop early.
pub fn walk<F>(maps_text: &str, mut visit: F)
where
    F: FnMut(&Region) -> bool,
{
    for region in regions(maps_text) {
        if visit(&region) {
            break;
        }
    }
}
