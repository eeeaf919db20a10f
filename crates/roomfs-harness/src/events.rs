//! Event construction for tests.

use roomfs_core::{Event, EventHeader, EventId, Membership, MessageContent, NameSource, UserId};

/// Builds events with unique, sequential event identifiers.
#[derive(Debug, Default)]
pub struct EventFactory {
    next: u64,
}

impl EventFactory {
    /// Factory starting at `$1`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Next header for an event in `room` sent by `sender`.
    pub fn header(&mut self, room: &str, sender: &str) -> EventHeader {
        self.next += 1;
        EventHeader::new(format!("${}", self.next), room, sender)
    }

    /// Room creation.
    pub fn create(&mut self, room: &str, sender: &str) -> Event {
        Event::Create { header: self.header(room, sender) }
    }

    /// Explicit room name.
    pub fn name(&mut self, room: &str, sender: &str, name: &str) -> Event {
        Event::Name {
            header: self.header(room, sender),
            name: name.into(),
            source: NameSource::RoomName,
        }
    }

    /// Canonical alias.
    pub fn alias(&mut self, room: &str, sender: &str, alias: &str) -> Event {
        Event::Name {
            header: self.header(room, sender),
            name: alias.into(),
            source: NameSource::CanonicalAlias,
        }
    }

    /// Topic change.
    pub fn topic(&mut self, room: &str, sender: &str, topic: &str) -> Event {
        Event::Topic { header: self.header(room, sender), topic: topic.into() }
    }

    /// Avatar change.
    pub fn avatar(&mut self, room: &str, sender: &str) -> Event {
        Event::Avatar { header: self.header(room, sender), url: Some("mxc://hs/avatar".into()) }
    }

    /// Membership change of `target`.
    pub fn member(
        &mut self,
        room: &str,
        sender: &str,
        target: &str,
        membership: Membership,
    ) -> Event {
        let header = self.header(room, sender);
        Event::Membership { header, target: UserId::from(target), membership }
    }

    /// Plain text message.
    pub fn message(&mut self, room: &str, sender: &str, body: &str) -> Event {
        Event::Message { header: self.header(room, sender), content: MessageContent::text(body) }
    }

    /// Emote.
    pub fn emote(&mut self, room: &str, sender: &str, body: &str) -> Event {
        Event::Message { header: self.header(room, sender), content: MessageContent::emote(body) }
    }

    /// Redaction of `redacts`, positioned at page token `t<seq>`.
    pub fn redaction(&mut self, room: &str, sender: &str, redacts: &EventId) -> Event {
        let header = self.header(room, sender);
        let page_token = Some(format!("t{}", self.next));
        Event::Redaction { header, redacts: redacts.clone(), page_token }
    }
}
