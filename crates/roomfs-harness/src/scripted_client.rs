//! Scripted protocol client.
//!
//! `ScriptedClient` implements [`ProtocolClient`] for deterministic tests.
//! Event batches are queued ahead of time and handed out one per
//! [`ProtocolClient::next_events`] call; once the script runs dry the call
//! blocks forever, like an idle long-poll. Every call is recorded so tests can
//! assert on exactly which outbound requests were issued.

use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use roomfs_core::{
    ClientError, Direction, Event, EventId, HistoryPage, Identity, LoginInfo, ProtocolClient,
    RoomId, UserId,
};
use tokio::sync::mpsc;

use crate::lock;

/// An outbound request observed by the [`ScriptedClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCall {
    /// Password login.
    Login {
        /// User name presented.
        user: String,
    },
    /// Guest registration.
    RegisterGuest,
    /// Text message.
    SendMessage {
        /// Room, user or alias.
        target: String,
        /// Message body.
        body: String,
    },
    /// Emote.
    SendEmote {
        /// Destination room.
        room: RoomId,
        /// Emote body.
        body: String,
    },
    /// Read receipt.
    MarkRead {
        /// Room of the event.
        room: RoomId,
        /// Acknowledged event.
        event: EventId,
    },
    /// History page request.
    FetchHistory {
        /// Room paged.
        room: RoomId,
        /// Page token.
        from: Option<String>,
        /// Requested window.
        limit: usize,
    },
    /// Join after an invite.
    JoinRoom {
        /// Joined room.
        room: RoomId,
    },
    /// Logout.
    Logout,
    /// Sync stopped.
    StopSync,
}

type Batch = Result<Vec<Event>, ClientError>;

/// Deterministic [`ProtocolClient`] driven by a pre-recorded script.
pub struct ScriptedClient {
    user: UserId,
    login_error: Option<ClientError>,
    send_error: Option<ClientError>,
    sync_error: Option<ClientError>,
    script: mpsc::UnboundedSender<Batch>,
    batches: tokio::sync::Mutex<mpsc::UnboundedReceiver<Batch>>,
    history: Mutex<HashMap<RoomId, Vec<Event>>>,
    calls: Mutex<Vec<ClientCall>>,
    stopped: AtomicBool,
    next_event: AtomicU64,
    polls: AtomicUsize,
}

impl ScriptedClient {
    /// Client that authenticates as `user`.
    pub fn new(user: impl Into<UserId>) -> Self {
        let (script, batches) = mpsc::unbounded_channel();
        Self {
            user: user.into(),
            login_error: None,
            send_error: None,
            sync_error: None,
            script,
            batches: tokio::sync::Mutex::new(batches),
            history: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            stopped: AtomicBool::new(false),
            next_event: AtomicU64::new(1),
            polls: AtomicUsize::new(0),
        }
    }

    /// Fail login and guest registration with `error`.
    pub fn with_login_error(mut self, error: ClientError) -> Self {
        self.login_error = Some(error);
        self
    }

    /// Fail every send with `error`.
    pub fn with_send_error(mut self, error: ClientError) -> Self {
        self.send_error = Some(error);
        self
    }

    /// Fail every sync poll with `error`, ignoring the script.
    pub fn with_sync_error(mut self, error: ClientError) -> Self {
        self.sync_error = Some(error);
        self
    }

    /// Number of [`ProtocolClient::next_events`] calls so far.
    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    /// Queue a batch for the next [`ProtocolClient::next_events`] call.
    pub fn push_batch(&self, events: impl IntoIterator<Item = Event>) {
        self.push(Ok(events.into_iter().collect()));
    }

    /// Queue a sync failure.
    pub fn push_error(&self, error: ClientError) {
        self.push(Err(error));
    }

    /// Set the history returned for `room`, newest first.
    pub fn set_history(&self, room: impl Into<RoomId>, events: Vec<Event>) {
        lock(&self.history).insert(room.into(), events);
    }

    /// All calls recorded so far.
    pub fn calls(&self) -> Vec<ClientCall> {
        lock(&self.calls).clone()
    }

    /// Number of recorded calls matching `pred`.
    pub fn count(&self, pred: impl Fn(&ClientCall) -> bool) -> usize {
        lock(&self.calls).iter().filter(|call| pred(call)).count()
    }

    /// Wait until a recorded call matches `pred`.
    ///
    /// Returns false if none does within `timeout`.
    pub async fn wait_for_call(
        &self,
        timeout: Duration,
        pred: impl Fn(&ClientCall) -> bool,
    ) -> bool {
        let poll = async {
            while self.count(&pred) == 0 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        };
        tokio::time::timeout(timeout, poll).await.is_ok()
    }

    fn push(&self, batch: Batch) {
        // The receiver lives as long as `self`.
        if self.script.send(batch).is_err() {
            tracing::warn!("script receiver closed");
        }
    }

    fn record(&self, call: ClientCall) {
        lock(&self.calls).push(call);
    }

    fn login_result(&self) -> Result<LoginInfo, ClientError> {
        match &self.login_error {
            Some(e) => Err(e.clone()),
            None => Ok(LoginInfo { user_id: self.user.clone(), device_id: "harness".into() }),
        }
    }

    fn sent_event(&self) -> Result<EventId, ClientError> {
        match &self.send_error {
            Some(e) => Err(e.clone()),
            None => {
                let seq = self.next_event.fetch_add(1, Ordering::SeqCst);
                Ok(EventId::new(format!("$sent{seq}")))
            },
        }
    }
}

impl ProtocolClient for ScriptedClient {
    async fn login(&self, identity: &Identity) -> Result<LoginInfo, ClientError> {
        self.record(ClientCall::Login { user: identity.user.clone() });
        self.login_result()
    }

    async fn register_guest(&self, _identity: &Identity) -> Result<LoginInfo, ClientError> {
        self.record(ClientCall::RegisterGuest);
        self.login_result()
    }

    async fn next_events(&self) -> Result<Vec<Event>, ClientError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(ClientError::Stopped);
        }
        self.polls.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = &self.sync_error {
            return Err(e.clone());
        }
        // `self.script` keeps the channel open, so an exhausted script parks
        // here until the caller gives up.
        let mut batches = self.batches.lock().await;
        batches.recv().await.unwrap_or(Err(ClientError::Stopped))
    }

    async fn send_message(&self, target: &str, body: &str) -> Result<EventId, ClientError> {
        self.record(ClientCall::SendMessage { target: target.to_string(), body: body.to_string() });
        self.sent_event()
    }

    async fn send_emote(&self, room: &RoomId, body: &str) -> Result<EventId, ClientError> {
        self.record(ClientCall::SendEmote { room: room.clone(), body: body.to_string() });
        self.sent_event()
    }

    async fn mark_read(&self, room: &RoomId, event: &EventId) -> Result<(), ClientError> {
        self.record(ClientCall::MarkRead { room: room.clone(), event: event.clone() });
        Ok(())
    }

    async fn fetch_history(
        &self,
        room: &RoomId,
        from: Option<&str>,
        _direction: Direction,
        limit: usize,
    ) -> Result<HistoryPage, ClientError> {
        self.record(ClientCall::FetchHistory {
            room: room.clone(),
            from: from.map(str::to_string),
            limit,
        });
        let events = lock(&self.history)
            .get(room)
            .map(|events| events.iter().take(limit).cloned().collect())
            .unwrap_or_default();
        Ok(HistoryPage { events, end: None })
    }

    async fn join_room(&self, room: &RoomId) -> Result<(), ClientError> {
        self.record(ClientCall::JoinRoom { room: room.clone() });
        Ok(())
    }

    async fn logout(&self) -> Result<(), ClientError> {
        self.record(ClientCall::Logout);
        Ok(())
    }

    fn stop_sync(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.record(ClientCall::StopSync);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use roomfs_core::EventHeader;

    use super::*;

    #[tokio::test]
    async fn batches_delivered_in_order() {
        let client = ScriptedClient::new("@me:hs");
        let create = Event::Create { header: EventHeader::new("$1", "!r", "@a:hs") };
        client.push_batch([create.clone()]);
        client.push_error(ClientError::Decode("bad".into()));

        assert_eq!(client.next_events().await, Ok(vec![create]));
        assert_eq!(client.next_events().await, Err(ClientError::Decode("bad".into())));
        assert_eq!(client.polls(), 2);
    }

    #[tokio::test]
    async fn sync_error_repeats() {
        let client = ScriptedClient::new("@me:hs").with_sync_error(ClientError::Decode("x".into()));
        for _ in 0..3 {
            assert_eq!(client.next_events().await, Err(ClientError::Decode("x".into())));
        }
        assert_eq!(client.polls(), 3);
    }

    #[tokio::test]
    async fn exhausted_script_blocks() {
        let client = ScriptedClient::new("@me:hs");
        let result = tokio::time::timeout(Duration::from_millis(20), client.next_events()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn stop_sync_fails_later_polls() {
        let client = ScriptedClient::new("@me:hs");
        client.stop_sync();
        assert_eq!(client.next_events().await, Err(ClientError::Stopped));
        assert_eq!(client.calls(), vec![ClientCall::StopSync]);
    }
}
