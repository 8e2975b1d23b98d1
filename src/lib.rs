//! davmirror library
//!
//! Mirrors a WebDAV tree into a local directory, keeping a bounded number of
//! older generations of the mirror next to it.

pub mod cli;
pub mod config;
pub mod connection;
pub mod dav;
pub mod error;
pub mod journal;
pub mod logger;
pub mod progress;
pub mod propfind;
pub mod remote;
pub mod rotate;
pub mod run;
pub mod transfer;
pub mod url;
pub mod walker;

pub use error::{ConfigError, MirrorError, RemoteError};
pub use run::{Orchestrator, RunOptions, RunResult, RunStatus};
