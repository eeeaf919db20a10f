//! Translation from wire events to engine [`Event`]s.
//!
//! Event types the engine has no handler for, and events missing a field
//! their handler needs, are skipped here rather than failing the batch.

use roomfs_core::{
    Event, EventHeader, Membership, MessageContent, MessageKind, NameSource, RoomId, UserId,
};
use serde_json::Value;

use crate::api::{RawEvent, SyncResponse};

/// Flatten a sync response into engine events.
///
/// Rooms are visited in identifier order. Within a room, state precedes the
/// timeline, which keeps a room's create and name ahead of its messages on the
/// initial sync. Redactions carry the batch's `next_batch` token, from which a
/// backward history walk covers the whole batch. Only the local user's own
/// membership event is taken from an invite's stripped state.
pub(crate) fn sync_events(response: &SyncResponse, local_user: &UserId) -> Vec<Event> {
    let mut events = Vec::new();
    let rooms = &response.rooms;
    let page_token = Some(response.next_batch.as_str());

    for (room, joined) in rooms.join.iter().chain(&rooms.leave) {
        let room = RoomId::from(room.as_str());
        let raw = joined.state.events.iter().chain(&joined.timeline.events);
        events.extend(raw.filter_map(|raw| decode(&room, raw, page_token)));
    }

    for (room, invited) in &rooms.invite {
        let room = RoomId::from(room.as_str());
        events.extend(
            invited
                .invite_state
                .events
                .iter()
                .filter(|raw| {
                    raw.kind == "m.room.member"
                        && raw.state_key.as_deref() == Some(local_user.as_str())
                })
                .filter_map(|raw| decode(&room, raw, None)),
        );
    }

    events
}

/// Decode one event of `room`.
///
/// `page_token` is attached to redactions so their target can be looked up
/// in history from the redaction's position.
pub(crate) fn decode(room: &RoomId, raw: &RawEvent, page_token: Option<&str>) -> Option<Event> {
    let header = EventHeader::new(
        raw.event_id.clone().unwrap_or_default(),
        room.clone(),
        raw.sender.as_str(),
    );
    let content = &raw.content;

    let event = match raw.kind.as_str() {
        "m.room.create" => Event::Create { header },
        "m.room.name" => Event::Name {
            header,
            name: non_empty(content, "name")?,
            source: NameSource::RoomName,
        },
        "m.room.canonical_alias" => Event::Name {
            header,
            name: non_empty(content, "alias")?,
            source: NameSource::CanonicalAlias,
        },
        "m.room.topic" => {
            Event::Topic { header, topic: string(content, "topic").unwrap_or_default() }
        },
        "m.room.avatar" => Event::Avatar { header, url: non_empty(content, "url") },
        "m.room.member" => Event::Membership {
            header,
            target: UserId::from(raw.state_key.clone()?),
            membership: Membership::parse(content.get("membership")?.as_str()?)?,
        },
        "m.room.message" => Event::Message { header, content: message(content)? },
        "m.room.redaction" => Event::Redaction {
            header,
            redacts: raw.redacts.clone().or_else(|| string(content, "redacts"))?.into(),
            page_token: page_token.map(str::to_string),
        },
        other => {
            tracing::trace!(room = %room, kind = other, "skipping unhandled event type");
            return None;
        },
    };
    Some(event)
}

fn message(content: &Value) -> Option<MessageContent> {
    let kind = match content.get("msgtype")?.as_str()? {
        "m.text" => MessageKind::Text,
        "m.emote" => MessageKind::Emote,
        "m.notice" => MessageKind::Notice,
        _ => MessageKind::Other,
    };
    Some(MessageContent {
        kind,
        body: string(content, "body")?,
        formatted_body: string(content, "formatted_body"),
    })
}

fn string(content: &Value, field: &str) -> Option<String> {
    content.get(field)?.as_str().map(str::to_string)
}

fn non_empty(content: &Value, field: &str) -> Option<String> {
    string(content, field).filter(|value| !value.is_empty())
}
