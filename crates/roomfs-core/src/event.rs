//! Protocol events.
//!
//! This module defines [`Event`], the closed set of protocol notifications the
//! engine reacts to. Each variant carries only the fields its handler needs;
//! the common addressing data lives in [`EventHeader`].
//!
//! Events are produced by the transport and are read-only inputs here.

use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(String);

        impl $name {
            /// Wrap a protocol-assigned identifier.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Opaque, server-assigned room identifier. Immutable for the room's
    /// lifetime.
    RoomId
);

string_id!(
    /// Opaque, server-assigned event identifier.
    EventId
);

string_id!(
    /// Protocol-level user identity.
    UserId
);

/// Addressing data shared by every event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventHeader {
    /// Event identifier, used for mark-read and redaction lookup.
    pub event_id: EventId,
    /// Room the event belongs to.
    pub room_id: RoomId,
    /// Author of the event.
    pub sender: UserId,
}

impl EventHeader {
    /// Build a header from its three identifiers.
    pub fn new(
        event_id: impl Into<EventId>,
        room_id: impl Into<RoomId>,
        sender: impl Into<UserId>,
    ) -> Self {
        Self { event_id: event_id.into(), room_id: room_id.into(), sender: sender.into() }
    }
}

/// Where a room name came from.
///
/// Explicit names always win; a canonical alias only fills a room that has no
/// name yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameSource {
    /// Authoritative room-name state event.
    RoomName,
    /// Canonical alias fallback.
    CanonicalAlias,
}

/// Membership value of a membership-change event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Membership {
    /// User joined the room.
    Join,
    /// User left (or was kicked from) the room.
    Leave,
    /// User was invited to the room.
    Invite,
    /// User was banned from the room.
    Ban,
    /// User asked to join the room.
    Knock,
}

impl Membership {
    /// Parse the protocol's membership string. `None` for unknown values.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "join" => Some(Self::Join),
            "leave" => Some(Self::Leave),
            "invite" => Some(Self::Invite),
            "ban" => Some(Self::Ban),
            "knock" => Some(Self::Knock),
            _ => None,
        }
    }

    /// Protocol string for this membership.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Join => "join",
            Self::Leave => "leave",
            Self::Invite => "invite",
            Self::Ban => "ban",
            Self::Knock => "knock",
        }
    }
}

/// Kind of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Plain text.
    Text,
    /// Emote ("/me").
    Emote,
    /// Automated notice.
    Notice,
    /// Anything else (media, files, locations).
    Other,
}

/// Body of a message event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContent {
    /// Message kind.
    pub kind: MessageKind,
    /// Plain-text body.
    pub body: String,
    /// Rich body, if the sender provided one.
    pub formatted_body: Option<String>,
}

impl MessageContent {
    /// Plain text message.
    pub fn text(body: impl Into<String>) -> Self {
        Self { kind: MessageKind::Text, body: body.into(), formatted_body: None }
    }

    /// Emote message.
    pub fn emote(body: impl Into<String>) -> Self {
        Self { kind: MessageKind::Emote, body: body.into(), formatted_body: None }
    }

    /// Text written to a buffer for this message.
    ///
    /// Emotes render as `* <sender> <body>`. Everything else renders the
    /// formatted body, falling back to the plain body.
    pub fn display_text(&self, sender: &UserId) -> String {
        match self.kind {
            MessageKind::Emote => format!("* {sender} {}", self.body),
            MessageKind::Text | MessageKind::Notice | MessageKind::Other => {
                self.formatted_body.clone().unwrap_or_else(|| self.body.clone())
            },
        }
    }
}

/// Discriminant of [`Event`], used for logging and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Room creation.
    Create,
    /// Room name or canonical alias.
    Name,
    /// Room topic.
    Topic,
    /// Room avatar.
    Avatar,
    /// Membership change.
    Membership,
    /// Chat message.
    Message,
    /// Redaction of an earlier event.
    Redaction,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Create => "create",
            Self::Name => "name",
            Self::Topic => "topic",
            Self::Avatar => "avatar",
            Self::Membership => "membership",
            Self::Message => "message",
            Self::Redaction => "redaction",
        };
        f.write_str(name)
    }
}

/// Protocol events recognized by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Room created.
    Create {
        /// Event addressing.
        header: EventHeader,
    },

    /// Room named, either explicitly or through its canonical alias.
    Name {
        /// Event addressing.
        header: EventHeader,
        /// New display name.
        name: String,
        /// Which naming path produced the name.
        source: NameSource,
    },

    /// Room topic changed.
    Topic {
        /// Event addressing.
        header: EventHeader,
        /// Topic text.
        topic: String,
    },

    /// Room avatar changed.
    Avatar {
        /// Event addressing.
        header: EventHeader,
        /// Avatar location. `None` when the avatar was removed.
        url: Option<String>,
    },

    /// Membership of `target` changed.
    Membership {
        /// Event addressing.
        header: EventHeader,
        /// User whose membership changed.
        target: UserId,
        /// New membership.
        membership: Membership,
    },

    /// Chat message.
    Message {
        /// Event addressing.
        header: EventHeader,
        /// Message body.
        content: MessageContent,
    },

    /// Retraction of an earlier event.
    Redaction {
        /// Event addressing.
        header: EventHeader,
        /// Event being retracted.
        redacts: EventId,
        /// History pagination token at the redaction's position. `None` when
        /// the transport did not provide one.
        page_token: Option<String>,
    },
}

impl Event {
    /// Addressing data of this event.
    pub fn header(&self) -> &EventHeader {
        match self {
            Self::Create { header }
            | Self::Name { header, .. }
            | Self::Topic { header, .. }
            | Self::Avatar { header, .. }
            | Self::Membership { header, .. }
            | Self::Message { header, .. }
            | Self::Redaction { header, .. } => header,
        }
    }

    /// Kind of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Create { .. } => EventKind::Create,
            Self::Name { .. } => EventKind::Name,
            Self::Topic { .. } => EventKind::Topic,
            Self::Avatar { .. } => EventKind::Avatar,
            Self::Membership { .. } => EventKind::Membership,
            Self::Message { .. } => EventKind::Message,
            Self::Redaction { .. } => EventKind::Redaction,
        }
    }

    /// Room this event belongs to.
    pub fn room_id(&self) -> &RoomId {
        &self.header().room_id
    }

    /// Event identifier.
    pub fn event_id(&self) -> &EventId {
        &self.header().event_id
    }

    /// Author of this event.
    pub fn sender(&self) -> &UserId {
        &self.header().sender
    }
}
