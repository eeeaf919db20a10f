//! Wire types for the client-server API.
//!
//! Only the fields the engine reads are modelled. Unknown fields are ignored
//! by serde, so newer servers decode without changes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `POST /login` body.
#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub identifier: UserIdentifier<'a>,
    pub password: &'a str,
    pub device_id: &'a str,
    pub initial_device_display_name: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct UserIdentifier<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub user: &'a str,
}

/// `POST /register?kind=guest` body.
#[derive(Debug, Serialize)]
pub(crate) struct GuestRequest<'a> {
    pub initial_device_display_name: &'a str,
}

/// Response to login and registration.
#[derive(Debug, Deserialize)]
pub(crate) struct AuthResponse {
    pub user_id: String,
    pub access_token: String,
    #[serde(default)]
    pub device_id: Option<String>,
}

/// Error body returned with non-success statuses.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub errcode: String,
    #[serde(default)]
    pub error: String,
}

/// `PUT /rooms/{room}/send/m.room.message/{txn}` body.
#[derive(Debug, Serialize)]
pub(crate) struct MessageBody<'a> {
    pub msgtype: &'static str,
    pub body: &'a str,
}

/// Response to a send.
#[derive(Debug, Deserialize)]
pub(crate) struct SendResponse {
    pub event_id: String,
}

/// `GET /directory/room/{alias}` response.
#[derive(Debug, Deserialize)]
pub(crate) struct AliasResponse {
    pub room_id: String,
}

/// `POST /createRoom` body for a direct chat.
#[derive(Debug, Serialize)]
pub(crate) struct CreateDirectRequest<'a> {
    pub is_direct: bool,
    pub preset: &'static str,
    pub invite: [&'a str; 1],
}

/// Response to `createRoom`.
#[derive(Debug, Deserialize)]
pub(crate) struct CreateRoomResponse {
    pub room_id: String,
}

/// `GET /rooms/{room}/messages` response.
#[derive(Debug, Deserialize)]
pub(crate) struct MessagesResponse {
    #[serde(default)]
    pub chunk: Vec<RawEvent>,
    #[serde(default)]
    pub end: Option<String>,
}

/// `GET /sync` response.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct SyncResponse {
    pub next_batch: String,
    #[serde(default)]
    pub rooms: Rooms,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Rooms {
    #[serde(default)]
    pub join: BTreeMap<String, JoinedRoom>,
    #[serde(default)]
    pub invite: BTreeMap<String, InvitedRoom>,
    #[serde(default)]
    pub leave: BTreeMap<String, JoinedRoom>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct JoinedRoom {
    #[serde(default)]
    pub state: EventList,
    #[serde(default)]
    pub timeline: Timeline,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct InvitedRoom {
    #[serde(default)]
    pub invite_state: EventList,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct EventList {
    #[serde(default)]
    pub events: Vec<RawEvent>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Timeline {
    #[serde(default)]
    pub events: Vec<RawEvent>,
}

/// A client event as the server sends it.
///
/// Stripped invite state carries no `event_id`; `redacts` moved into
/// `content` in room version 11, so both locations are read.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub state_key: Option<String>,
    #[serde(default)]
    pub redacts: Option<String>,
    #[serde(default)]
    pub content: Value,
}
