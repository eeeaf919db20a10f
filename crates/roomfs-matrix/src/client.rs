//! HTTP client for the Matrix client-server API.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use roomfs_core::{
    ClientError, Direction, Event, EventId, HistoryPage, Identity, LoginInfo, ProtocolClient,
    RoomId, UserId,
};
use serde::de::DeserializeOwned;

use crate::{
    api::{
        AliasResponse, AuthResponse, CreateDirectRequest, CreateRoomResponse, ErrorBody,
        GuestRequest, LoginRequest, MessageBody, MessagesResponse, SendResponse, SyncResponse,
        UserIdentifier,
    },
    decode,
};

/// Server-side long-poll bound for `/sync`.
pub const SYNC_TIMEOUT: Duration = Duration::from_secs(30);

/// Extra time the HTTP request is given beyond the long-poll bound.
const REQUEST_MARGIN: Duration = Duration::from_secs(15);

const API_PREFIX: [&str; 3] = ["_matrix", "client", "v3"];

const DEVICE_DISPLAY_NAME: &str = "roomfs";

#[derive(Clone)]
struct Credentials {
    user_id: UserId,
    access_token: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials").field("user_id", &self.user_id).finish_non_exhaustive()
    }
}

/// [`ProtocolClient`] over the Matrix client-server HTTP API.
///
/// Credentials and the sync position live behind short-lived locks that are
/// never held across a request.
#[derive(Debug)]
pub struct MatrixClient {
    http: Client,
    base: Url,
    credentials: Mutex<Option<Credentials>>,
    since: Mutex<Option<String>>,
    direct_rooms: Mutex<HashMap<String, RoomId>>,
    txn_prefix: u64,
    txn_counter: AtomicU64,
    stopped: AtomicBool,
}

impl MatrixClient {
    /// Client for the homeserver at `address`.
    pub fn new(address: &str) -> Result<Self, ClientError> {
        let base = Url::parse(address)
            .map_err(|e| ClientError::Transport(format!("invalid address {address}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(ClientError::Transport(format!("invalid address {address}")));
        }

        let http = Client::builder()
            .timeout(SYNC_TIMEOUT + REQUEST_MARGIN)
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let txn_prefix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX));

        Ok(Self {
            http,
            base,
            credentials: Mutex::new(None),
            since: Mutex::new(None),
            direct_rooms: Mutex::new(HashMap::new()),
            txn_prefix,
            txn_counter: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
        })
    }

    /// Homeserver base URL.
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| ClientError::Transport(format!("invalid base url {}", self.base)))?
            .pop_if_empty()
            .extend(API_PREFIX)
            .extend(segments);
        Ok(url)
    }

    fn next_txn_id(&self) -> String {
        let n = self.txn_counter.fetch_add(1, Ordering::Relaxed);
        format!("roomfs.{}.{n}", self.txn_prefix)
    }

    fn credentials(&self) -> Result<Credentials, ClientError> {
        lock(&self.credentials).clone().ok_or(ClientError::NotAuthenticated)
    }

    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder, ClientError> {
        Ok(request.bearer_auth(self.credentials()?.access_token))
    }

    fn store_credentials(&self, auth: AuthResponse, identity: &Identity) -> LoginInfo {
        let user_id = UserId::from(auth.user_id);
        let device_id = auth.device_id.unwrap_or_else(|| identity.device_id.clone());
        *lock(&self.credentials) =
            Some(Credentials { user_id: user_id.clone(), access_token: auth.access_token });
        LoginInfo { user_id, device_id }
    }

    fn ensure_running(&self) -> Result<(), ClientError> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(ClientError::Stopped);
        }
        Ok(())
    }

    /// Resolve a send target to a room.
    ///
    /// Room IDs are used as given, aliases are looked up in the room
    /// directory, and users get a direct chat that is created on first use.
    /// A bare name is taken as a user on the local user's server.
    async fn resolve_target(&self, target: &str) -> Result<RoomId, ClientError> {
        match target.chars().next() {
            Some('!') => Ok(RoomId::from(target)),
            Some('#') => {
                let url = self.endpoint(&["directory", "room", target])?;
                let response =
                    self.authorized(self.http.get(url))?.send().await.map_err(transport)?;
                let alias: AliasResponse = json_response(response).await?;
                Ok(RoomId::from(alias.room_id))
            },
            Some('@') => self.direct_room(target).await,
            Some(_) => {
                let user = qualify_user(target, &self.credentials()?.user_id);
                self.direct_room(&user).await
            },
            None => Err(ClientError::Rejected { status: 400, message: "empty target".into() }),
        }
    }

    async fn direct_room(&self, user: &str) -> Result<RoomId, ClientError> {
        if let Some(room) = lock(&self.direct_rooms).get(user) {
            return Ok(room.clone());
        }

        let url = self.endpoint(&["createRoom"])?;
        let body =
            CreateDirectRequest { is_direct: true, preset: "trusted_private_chat", invite: [user] };
        let response =
            self.authorized(self.http.post(url))?.json(&body).send().await.map_err(transport)?;
        let created: CreateRoomResponse = json_response(response).await?;

        let room = RoomId::from(created.room_id);
        tracing::info!(user, room = %room, "created direct room");
        lock(&self.direct_rooms).insert(user.to_string(), room.clone());
        Ok(room)
    }

    async fn send(
        &self,
        room: &RoomId,
        msgtype: &'static str,
        body: &str,
    ) -> Result<EventId, ClientError> {
        let txn = self.next_txn_id();
        let url = self.endpoint(&["rooms", room.as_str(), "send", "m.room.message", &txn])?;
        let response = self
            .authorized(self.http.put(url))?
            .json(&MessageBody { msgtype, body })
            .send()
            .await
            .map_err(transport)?;
        let sent: SendResponse = json_response(response).await?;
        Ok(EventId::from(sent.event_id))
    }

    async fn post_empty(&self, segments: &[&str]) -> Result<(), ClientError> {
        let url = self.endpoint(segments)?;
        let response = self
            .authorized(self.http.post(url))?
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(transport)?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(parse_error(response).await)
        }
    }
}

impl ProtocolClient for MatrixClient {
    async fn login(&self, identity: &Identity) -> Result<LoginInfo, ClientError> {
        let url = self.endpoint(&["login"])?;
        let body = LoginRequest {
            kind: "m.login.password",
            identifier: UserIdentifier { kind: "m.id.user", user: &identity.user },
            password: &identity.password,
            device_id: &identity.device_id,
            initial_device_display_name: DEVICE_DISPLAY_NAME,
        };
        let response = self.http.post(url).json(&body).send().await.map_err(transport)?;
        let auth: AuthResponse = json_response(response).await?;
        Ok(self.store_credentials(auth, identity))
    }

    async fn register_guest(&self, identity: &Identity) -> Result<LoginInfo, ClientError> {
        let mut url = self.endpoint(&["register"])?;
        url.query_pairs_mut().append_pair("kind", "guest");
        let body = GuestRequest { initial_device_display_name: DEVICE_DISPLAY_NAME };
        let response = self.http.post(url).json(&body).send().await.map_err(transport)?;
        let auth: AuthResponse = json_response(response).await?;
        Ok(self.store_credentials(auth, identity))
    }

    async fn next_events(&self) -> Result<Vec<Event>, ClientError> {
        self.ensure_running()?;
        let credentials = self.credentials()?;

        let mut url = self.endpoint(&["sync"])?;
        {
            let since = lock(&self.since).clone();
            let mut query = url.query_pairs_mut();
            query.append_pair("timeout", &SYNC_TIMEOUT.as_millis().to_string());
            if let Some(since) = since.as_deref() {
                query.append_pair("since", since);
            }
        }

        let response = self
            .http
            .get(url)
            .bearer_auth(&credentials.access_token)
            .send()
            .await
            .map_err(transport)?;
        let sync: SyncResponse = json_response(response).await?;
        self.ensure_running()?;

        let events = decode::sync_events(&sync, &credentials.user_id);
        tracing::trace!(since = %sync.next_batch, count = events.len(), "sync batch");
        *lock(&self.since) = Some(sync.next_batch);
        Ok(events)
    }

    async fn send_message(&self, target: &str, body: &str) -> Result<EventId, ClientError> {
        let room = self.resolve_target(target).await?;
        self.send(&room, "m.text", body).await
    }

    async fn send_emote(&self, room: &RoomId, body: &str) -> Result<EventId, ClientError> {
        self.send(room, "m.emote", body).await
    }

    async fn mark_read(&self, room: &RoomId, event: &EventId) -> Result<(), ClientError> {
        self.post_empty(&["rooms", room.as_str(), "receipt", "m.read", event.as_str()]).await
    }

    async fn fetch_history(
        &self,
        room: &RoomId,
        from: Option<&str>,
        direction: Direction,
        limit: usize,
    ) -> Result<HistoryPage, ClientError> {
        let mut url = self.endpoint(&["rooms", room.as_str(), "messages"])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("dir", match direction {
                Direction::Backward => "b",
                Direction::Forward => "f",
            });
            query.append_pair("limit", &limit.to_string());
            if let Some(from) = from {
                query.append_pair("from", from);
            }
        }

        let response = self.authorized(self.http.get(url))?.send().await.map_err(transport)?;
        let page: MessagesResponse = json_response(response).await?;
        let events = page.chunk.iter().filter_map(|raw| decode::decode(room, raw, None)).collect();
        Ok(HistoryPage { events, end: page.end })
    }

    async fn join_room(&self, room: &RoomId) -> Result<(), ClientError> {
        self.post_empty(&["join", room.as_str()]).await
    }

    async fn logout(&self) -> Result<(), ClientError> {
        self.post_empty(&["logout"]).await?;
        *lock(&self.credentials) = None;
        Ok(())
    }

    fn stop_sync(&self) {
        self.stopped.store(true, Ordering::Release);
    }
}

/// Qualify a bare user name with the server part of `local`.
fn qualify_user(name: &str, local: &UserId) -> String {
    match local.as_str().split_once(':') {
        Some((_, server)) => format!("@{name}:{server}"),
        None => format!("@{name}"),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn transport(err: reqwest::Error) -> ClientError {
    if err.is_decode() {
        ClientError::Decode(err.to_string())
    } else {
        ClientError::Transport(err.to_string())
    }
}

/// Decode a successful JSON response or convert the error response.
async fn json_response<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    if response.status().is_success() {
        response.json().await.map_err(|e| ClientError::Decode(e.to_string()))
    } else {
        Err(parse_error(response).await)
    }
}

async fn parse_error(response: Response) -> ClientError {
    let status = response.status();
    let body = response.json::<ErrorBody>().await.unwrap_or_default();
    classify(status, &body)
}

/// Map an error status and body to a [`ClientError`].
fn classify(status: StatusCode, body: &ErrorBody) -> ClientError {
    if status == StatusCode::UNAUTHORIZED || body.errcode == "M_UNKNOWN_TOKEN" {
        return ClientError::NotAuthenticated;
    }
    let message = match (body.errcode.is_empty(), body.error.is_empty()) {
        (true, true) => format!("HTTP {}", status.as_u16()),
        (false, true) => body.errcode.clone(),
        (true, false) => body.error.clone(),
        (false, false) => format!("{}: {}", body.errcode, body.error),
    };
    ClientError::Rejected { status: status.as_u16(), message }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_encodes_segments() {
        let client = MatrixClient::new("https://matrix.example.org/").unwrap();
        let url = client.endpoint(&["rooms", "!abc:hs", "send", "m.room.message", "1"]);
        assert_eq!(
            url.unwrap().as_str(),
            "https://matrix.example.org/_matrix/client/v3/rooms/!abc:hs/send/m.room.message/1"
        );

        let url = client.endpoint(&["directory", "room", "#lobby:example.org"]).unwrap();
        assert_eq!(url.path(), "/_matrix/client/v3/directory/room/%23lobby:example.org");
    }

    #[test]
    fn rejects_relative_address() {
        assert!(matches!(MatrixClient::new("matrix.example.org"), Err(ClientError::Transport(_))));
    }

    #[test]
    fn transaction_ids_are_unique() {
        let client = MatrixClient::new("https://hs").unwrap();
        assert_ne!(client.next_txn_id(), client.next_txn_id());
    }

    #[test]
    fn requests_need_credentials() {
        let client = MatrixClient::new("https://hs").unwrap();
        assert_eq!(client.credentials().unwrap_err(), ClientError::NotAuthenticated);
    }

    #[test]
    fn stopped_client_refuses_sync() {
        let client = MatrixClient::new("https://hs").unwrap();
        client.stop_sync();
        assert_eq!(client.ensure_running(), Err(ClientError::Stopped));
    }

    #[test]
    fn bare_name_uses_local_server() {
        assert_eq!(qualify_user("alice", &UserId::from("@me:example.org")), "@alice:example.org");
    }

    #[test]
    fn error_classification() {
        let body = ErrorBody { errcode: "M_FORBIDDEN".into(), error: "not allowed".into() };
        assert_eq!(classify(StatusCode::FORBIDDEN, &body), ClientError::Rejected {
            status: 403,
            message: "M_FORBIDDEN: not allowed".into()
        });

        let body = ErrorBody { errcode: "M_UNKNOWN_TOKEN".into(), error: String::new() };
        assert_eq!(classify(StatusCode::FORBIDDEN, &body), ClientError::NotAuthenticated);
        assert_eq!(
            classify(StatusCode::UNAUTHORIZED, &ErrorBody::default()),
            ClientError::NotAuthenticated
        );
        assert_eq!(classify(StatusCode::BAD_GATEWAY, &ErrorBody::default()), ClientError::Rejected {
            status: 502,
            message: "HTTP 502".into()
        });
    }
}
