//! Deterministic test harness for the roomfs session engine.
//!
//! Doubles for both external seams of `roomfs-core`:
//!
//! - [`ScriptedClient`]: a [`roomfs_core::ProtocolClient`] that replays
//!   queued event batches and records every outbound call
//! - [`MemoryController`]: a [`roomfs_core::BufferController`] that keeps
//!   buffers in memory and records every write
//!
//! [`EventFactory`] builds protocol events with unique identifiers and
//! [`LogCapture`] records log entries for assertions.
//!
//! # Invariant Testing
//!
//! The `invariants` module checks behavioral properties of dispatcher runs
//! (names never regress, writes only reach named buffers, writers are always
//! released). Use [`InvariantRegistry::standard()`] for the common set.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod events;
pub mod invariants;
pub mod logs;
pub mod memory_controller;
pub mod scripted_client;

pub use events::EventFactory;
pub use invariants::{
    Invariant, InvariantRegistry, InvariantResult, NamesNeverRegress, ResolvedRoomsHaveBuffers,
    SystemSnapshot, Violation, WritersReleased, WritesTargetNamedBuffers,
};
pub use logs::{LogCapture, LogEntry};
pub use memory_controller::{BufferContents, MemoryController, MemoryWriter, Stream, WriteRecord};
pub use scripted_client::{ClientCall, ScriptedClient};

/// Lock, recovering the data of a poisoned mutex.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
