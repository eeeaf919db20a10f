//! Matrix transport for the roomfs session engine.
//!
//! [`MatrixClient`] implements [`roomfs_core::ProtocolClient`] over the
//! client-server HTTP API: password login and guest registration, long-poll
//! `/sync`, message and emote sends, read receipts, `/messages` history,
//! joins and logout.
//!
//! Sync responses are flattened into engine events room by room, state before
//! timeline. Event types the engine does not handle never leave this crate.

mod api;
mod client;
mod decode;

pub use client::{MatrixClient, SYNC_TIMEOUT};
