//! Matrix rooms as named file buffers.
//!
//! Process-level pieces around the session engine: the configuration file,
//! the directory-backed buffer store and the line-oriented command source.
//! The binary wires them to a [`roomfs_matrix::MatrixClient`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod stdin;
pub mod store;

pub use config::{Config, ConfigError, DEFAULT_ADDRESS};
pub use stdin::{LINE_SENDER, LineSource};
pub use store::{DirectoryStore, STATUS_BUFFER};
