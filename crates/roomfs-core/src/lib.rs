//! Session event-synchronization engine.
//!
//! Bridges a remote chat protocol (rooms, messages, membership, topics,
//! redactions) to a presentation layer that exposes every conversation as a
//! named buffer. The engine owns the session lifecycle, resolves opaque room
//! identifiers into stable buffer names, routes protocol events to buffers and
//! carries user commands back to the protocol.
//!
//! # Components
//!
//! - [`RoomRegistry`]: room identifier to buffer name resolution
//! - [`EventDispatcher`]: routes each [`Event`] to its handler
//! - [`RedactionResolver`]: recovers the original text of a retracted message
//! - [`BufferBridge`]: the only writer into the [`BufferController`]
//! - [`CommandBridge`]: turns [`Command`]s into outbound protocol requests
//! - [`Session`]: lifecycle state machine, sync loop and supervisor
//!
//! # Seams
//!
//! The protocol transport and the presentation service are external. They are
//! consumed through [`ProtocolClient`], [`BufferController`] and
//! [`CommandSource`], so the same engine runs against a real homeserver in
//! production and against scripted doubles in tests.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod buffer;
mod client;
mod command;
mod config;
mod dispatcher;
mod error;
mod event;
mod redaction;
mod registry;
mod session;

pub use buffer::{BufferBridge, BufferController, MemberChange, Notice};
pub use client::{Direction, HistoryPage, LoginInfo, ProtocolClient};
pub use command::{
    COMMANDS, Command, CommandBridge, CommandDescriptor, CommandKind, CommandRequest,
    CommandSource, RoomDirectory,
};
pub use config::{
    DEFAULT_REDACTION_WINDOW, DEFAULT_RETRY_DELAY, Identity, InvitePolicy, MAX_RETRY_DELAY,
    SessionConfig,
};
pub use dispatcher::{Disposition, EventDispatcher};
pub use error::{ClientError, CommandError, EventError, RegistryError, SessionError};
pub use event::{
    Event, EventHeader, EventId, EventKind, Membership, MessageContent, MessageKind, NameSource,
    RoomId, UserId,
};
pub use redaction::{RedactionResolver, Resolution};
pub use registry::{NameUpdate, RoomName, RoomRegistry};
pub use session::{Session, SessionHandle, SessionState};
