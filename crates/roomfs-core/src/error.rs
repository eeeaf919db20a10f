//! Error types for the session engine.
//!
//! The taxonomy follows how far a failure is allowed to travel:
//!
//! - [`SessionError`]: fatal to the session, returned from [`crate::Session::run`]
//! - [`EventError`]: fatal to a single event, logged and dropped
//! - [`CommandError`]: fatal to a single command, reported to its originator
//! - [`ClientError`]: raised by the protocol client, classified by the caller
//!
//! Best-effort side effects (mark-read, avatar handling) have no error type of
//! their own: their [`ClientError`]s are logged where they occur.

use thiserror::Error;

use crate::{EventId, RoomId, SessionState};

/// Errors raised by a [`crate::ProtocolClient`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Network or HTTP layer failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Server rejected the request.
    #[error("request rejected ({status}): {message}")]
    Rejected {
        /// Protocol status code.
        status: u16,
        /// Server-provided explanation.
        message: String,
    },

    /// Response could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// Request requires an authenticated session.
    #[error("not authenticated")]
    NotAuthenticated,

    /// Sync was stopped; no further events will be produced.
    #[error("sync stopped")]
    Stopped,
}

impl ClientError {
    /// Returns true if this error ends the sync loop.
    ///
    /// Authentication loss and an explicit stop cannot recover by polling
    /// again. Transport hiccups are also surfaced as terminal: retry belongs
    /// to the transport client, not to this engine.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::NotAuthenticated | Self::Stopped | Self::Transport(_) | Self::Rejected { .. }
        )
    }
}

/// Errors raised by the [`crate::RoomRegistry`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A second creation event was observed for a registered room.
    #[error("duplicate create event for room {room}")]
    DuplicateCreate {
        /// Room that was already registered.
        room: RoomId,
    },
}

/// Reasons a single event was dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// Room has no resolved buffer name yet.
    #[error("room {0} has no resolved name")]
    UnresolvedRoom(RoomId),

    /// Registry rejected the event.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Presentation layer refused a writer or the write failed.
    #[error("buffer {buffer} unavailable: {reason}")]
    BufferUnavailable {
        /// Buffer name.
        buffer: String,
        /// Underlying I/O failure.
        reason: String,
    },

    /// History lookup for a redaction failed.
    #[error("history fetch for {target} failed: {source}")]
    HistoryFetch {
        /// Redacted event that was being looked up.
        target: EventId,
        /// Client failure.
        source: ClientError,
    },

    /// Session was cancelled while the event was in flight.
    #[error("cancelled")]
    Cancelled,
}

/// Errors reported back to the originator of a command.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Command name is not recognized.
    #[error("unknown command: {0}")]
    Unknown(String),

    /// A required argument is missing.
    #[error("{command}: missing argument {argument}")]
    MissingArgument {
        /// Command name.
        command: &'static str,
        /// Argument placeholder, e.g. `<msg>`.
        argument: &'static str,
    },

    /// Command line could not be parsed.
    #[error("malformed command line: {0}")]
    Malformed(String),

    /// Target buffer does not map to any room.
    #[error("no room for buffer {0}")]
    UnknownTarget(String),

    /// Outbound request failed.
    #[error("client error: {0}")]
    Client(#[from] ClientError),

    /// Session is no longer accepting commands.
    #[error("session closed")]
    SessionClosed,
}

/// Errors that end a session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Guest registration or password login failed.
    #[error("authentication failed: {0}")]
    Authentication(ClientError),

    /// Sync loop stopped with a terminal error.
    #[error("sync failed: {0}")]
    Sync(ClientError),

    /// Sync task panicked or was aborted.
    #[error("sync task failed: {0}")]
    SyncTaskFailed(String),

    /// Lifecycle transition not permitted from the current state.
    #[error("invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        /// State the session was in.
        from: SessionState,
        /// State that was requested.
        to: SessionState,
    },
}
