//! Presentation layer bridge.
//!
//! The [`BufferBridge`] is the only component that writes into the external
//! presentation layer. Every write acquires a writer from the
//! [`BufferController`], writes, and drops it before returning, so the writer
//! is released on every path including a failed write.
//!
//! Writes are fire-and-forget for the dispatcher: a failure surfaces as an
//! [`EventError::BufferUnavailable`] that the dispatcher logs before dropping
//! the event. Nothing is retried.

use std::{fmt, io, sync::Arc};

use crate::{EventError, Membership, RoomId, UserId};

/// Membership change forwarded to the presentation layer's roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberChange {
    /// User whose membership changed.
    pub user: UserId,
    /// New membership.
    pub membership: Membership,
}

/// Notices addressed to the local user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Local user was invited to a room.
    Invited {
        /// Room the invite is for.
        room: RoomId,
        /// Buffer name of the room, if already resolved.
        name: Option<String>,
        /// User who sent the invite.
        inviter: UserId,
    },
    /// Local user was banned from a room.
    Banned {
        /// Room the ban applies to.
        room: RoomId,
        /// Buffer name of the room, if already resolved.
        name: Option<String>,
        /// User who issued the ban.
        by: UserId,
    },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invited { room, name, inviter } => {
                write!(f, "invited to {} by {inviter}", name.as_deref().unwrap_or(room.as_str()))
            },
            Self::Banned { room, name, by } => {
                write!(f, "banned from {} by {by}", name.as_deref().unwrap_or(room.as_str()))
            },
        }
    }
}

/// Presentation service exposing named buffers.
///
/// Implementations provide storage for buffers (files on disk, memory,
/// network filesystems). Writers are scoped: the bridge drops each writer as
/// soon as its write completes.
pub trait BufferController: Send + Sync + 'static {
    /// Writer handed out for a single write.
    type Writer: io::Write;

    /// Create buffer `name` if it does not exist.
    fn create_buffer(&self, name: &str) -> io::Result<()>;

    /// Writer for the main content stream of `name`.
    fn main_writer(&self, name: &str) -> io::Result<Self::Writer>;

    /// Writer for the title stream of `name`.
    fn title_writer(&self, name: &str) -> io::Result<Self::Writer>;

    /// Forward a membership change for buffer `name`.
    ///
    /// The roster is owned by the presentation layer. The default does
    /// nothing.
    fn member_changed(&self, _name: &str, _change: &MemberChange) -> io::Result<()> {
        Ok(())
    }

    /// Surface a notice to the local user. The default does nothing.
    fn notify(&self, _notice: &Notice) -> io::Result<()> {
        Ok(())
    }

    /// Buffer names the controller uses itself and rooms must not take.
    fn reserved_names(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Writes dispatcher output into a [`BufferController`].
pub struct BufferBridge<B: BufferController> {
    controller: Arc<B>,
}

impl<B: BufferController> Clone for BufferBridge<B> {
    fn clone(&self) -> Self {
        Self { controller: Arc::clone(&self.controller) }
    }
}

impl<B: BufferController> BufferBridge<B> {
    /// Bridge writing into `controller`.
    pub fn new(controller: Arc<B>) -> Self {
        Self { controller }
    }

    /// Make sure buffer `name` exists.
    pub fn ensure_buffer(&self, name: &str) -> Result<(), EventError> {
        self.controller.create_buffer(name).map_err(|e| unavailable(name, &e))?;
        tracing::info!(buffer = name, "buffer ready");
        Ok(())
    }

    /// Append a line to the main stream of `name`.
    pub fn write_main(&self, name: &str, text: &str) -> Result<(), EventError> {
        let writer = self.controller.main_writer(name).map_err(|e| unavailable(name, &e))?;
        write_line(writer, text).map_err(|e| unavailable(name, &e))
    }

    /// Replace the title of `name`.
    pub fn write_title(&self, name: &str, text: &str) -> Result<(), EventError> {
        let writer = self.controller.title_writer(name).map_err(|e| unavailable(name, &e))?;
        write_line(writer, text).map_err(|e| unavailable(name, &e))
    }

    /// Forward a roster change for buffer `name`.
    pub fn forward_membership(&self, name: &str, change: &MemberChange) -> Result<(), EventError> {
        self.controller.member_changed(name, change).map_err(|e| unavailable(name, &e))
    }

    /// Surface a notice to the local user.
    pub fn notify(&self, notice: &Notice) -> Result<(), EventError> {
        self.controller.notify(notice).map_err(|e| unavailable("notice", &e))
    }
}

/// Write `text` and a newline, then release the writer.
fn write_line<W: io::Write>(mut writer: W, text: &str) -> io::Result<()> {
    writer.write_all(text.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()
}

fn unavailable(buffer: &str, err: &io::Error) -> EventError {
    EventError::BufferUnavailable { buffer: buffer.to_string(), reason: err.to_string() }
}
