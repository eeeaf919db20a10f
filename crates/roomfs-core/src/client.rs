//! Protocol client seam.
//!
//! The [`ProtocolClient`] trait decouples the session engine from the wire
//! protocol. Implementations own authentication, HTTP or socket transport,
//! TLS and transport-level retry; the engine only sees typed [`Event`]s and
//! issues outbound requests.
//!
//! # Implementations
//!
//! - **Matrix**: `roomfs-matrix` speaks the client-server HTTP API
//! - **Simulation**: `roomfs-harness` replays scripted event batches

use std::future::Future;

use crate::{ClientError, Event, EventId, Identity, RoomId, UserId};

/// Credentials recorded after a successful login or guest registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginInfo {
    /// Identity the server assigned to this session.
    pub user_id: UserId,
    /// Device the session is bound to.
    pub device_id: String,
}

/// Pagination direction for history requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Towards older events.
    Backward,
    /// Towards newer events.
    Forward,
}

/// One page of room history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryPage {
    /// Events in the order the server returned them.
    pub events: Vec<Event>,
    /// Token to continue paginating. `None` at the end of history.
    pub end: Option<String>,
}

/// Authenticated connection to the chat protocol.
///
/// Every method is a blocking operation bounded by the implementation's own
/// timeout. Failures are ordinary [`ClientError`] results.
pub trait ProtocolClient: Send + Sync + 'static {
    /// Log in with a password.
    fn login(
        &self,
        identity: &Identity,
    ) -> impl Future<Output = Result<LoginInfo, ClientError>> + Send;

    /// Register a guest account.
    fn register_guest(
        &self,
        identity: &Identity,
    ) -> impl Future<Output = Result<LoginInfo, ClientError>> + Send;

    /// Wait for the next batch of events.
    ///
    /// May block for a long time; callers race it against cancellation.
    fn next_events(&self) -> impl Future<Output = Result<Vec<Event>, ClientError>> + Send;

    /// Send a text message to a room, user or alias.
    fn send_message(
        &self,
        target: &str,
        body: &str,
    ) -> impl Future<Output = Result<EventId, ClientError>> + Send;

    /// Send an emote to a room.
    fn send_emote(
        &self,
        room: &RoomId,
        body: &str,
    ) -> impl Future<Output = Result<EventId, ClientError>> + Send;

    /// Acknowledge that `event` has been processed locally.
    fn mark_read(
        &self,
        room: &RoomId,
        event: &EventId,
    ) -> impl Future<Output = Result<(), ClientError>> + Send;

    /// Fetch up to `limit` events of room history starting at `from`.
    fn fetch_history(
        &self,
        room: &RoomId,
        from: Option<&str>,
        direction: Direction,
        limit: usize,
    ) -> impl Future<Output = Result<HistoryPage, ClientError>> + Send;

    /// Join a room the local user was invited to.
    fn join_room(&self, room: &RoomId) -> impl Future<Output = Result<(), ClientError>> + Send;

    /// Invalidate the session's credentials.
    fn logout(&self) -> impl Future<Output = Result<(), ClientError>> + Send;

    /// Stop producing events. Later [`ProtocolClient::next_events`] calls fail
    /// with [`ClientError::Stopped`].
    fn stop_sync(&self);
}
