//! Chronicle - folder mirroring with a summarized change log
//!
//! Watches a local directory tree, coalesces edits between periodic sync
//! passes, and mirrors eligible files to a remote repository using version
//! tokens. Each pass appends a natural-language summary of what changed to a
//! log file in the same repository.

pub mod config;
pub mod error;
pub mod remote;
pub mod server;
pub mod session;
pub mod sync;
pub mod types;
pub mod watch;

pub use config::ChronicleConfig;
pub use error::{ChronicleError, Result};
pub use session::{Session, SessionManager};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
