//! memscout: signature scanning over a live process's address space.
//!
//! Attaches to a running process by executable name, with no debugger API
//! involved, using the operating system's text-based process introspection
//! surfaces. Consumers register wildcard byte patterns, optionally restrict
//! the scan to address ranges (literal or resolved from backing-file
//! substrings), run a buffered scan pass, then follow multi-level pointer
//! chains from the matched addresses with positioned reads.
//!
//! ```no_run
//! use memscout::{Event, Session};
//!
//! let mut session = Session::system();
//! session.set_process_name("target.bin");
//! session.add_pattern("DE AD ? BE EF");
//! while let Some(Event::ProcessChanged) = session.poll_event() {
//!     session.clear_results();
//!     if let Some(addr) = session.find_patterns() {
//!         let value = session.read_i32(addr + 0x10);
//!         println!("{value}");
//!     }
//! }
//! ```
//!
//! A session is single-threaded and must not be shared across threads
//! without external synchronization. The target may die or respawn at any
//! point; lifecycle changes surface through [`Session::poll_event`], and
//! failures through the session's sticky error code rather than panics.

pub mod config;
pub mod error;
pub mod event;
pub mod logging;
pub mod maps;
pub mod os;
pub mod pattern;
pub mod range;
pub mod session;

pub use config::SessionConfig;
pub use error::{ErrorCode, MemscoutError, Result};
pub use event::Event;
pub use session::{Session, SessionOptions};

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Major component of [`VERSION`].
pub fn version_major() -> u32 {
    env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or(0)
}

/// Minor component of [`VERSION`].
pub fn version_minor() -> u32 {
    env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or(0)
}

/// Patch component of [`VERSION`].
pub fn version_patch() -> u32 {
    env!("CARGO_PKG_VERSION_PATCH").parse().unwrap_or(0)
}
