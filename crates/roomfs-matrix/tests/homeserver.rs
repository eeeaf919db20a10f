//! MatrixClient against a stub homeserver.
//!
//! The stub implements just enough of the client-server API to drive one
//! session: login, two sync batches, sends, receipts, history, alias lookup
//! and logout. Every request it sees is recorded for assertions.

#![allow(clippy::unwrap_used)]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post, put},
};
use roomfs_core::{ClientError, Direction, Event, Identity, MessageKind, ProtocolClient, RoomId};
use roomfs_matrix::MatrixClient;
use serde_json::{Value, json};

const TOKEN: &str = "syt_token";

#[derive(Default)]
struct Stub {
    sync_since: Vec<Option<String>>,
    sent: Vec<(String, Value)>,
    receipts: Vec<(String, String)>,
    history_queries: Vec<HashMap<String, String>>,
    logged_out: bool,
}

type Shared = Arc<Mutex<Stub>>;

fn authorized(headers: &HeaderMap, stub: &Stub) -> Result<(), (StatusCode, Json<Value>)> {
    let bearer = format!("Bearer {TOKEN}");
    let presented = headers.get("authorization").and_then(|v| v.to_str().ok());
    if stub.logged_out || presented != Some(bearer.as_str()) {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "errcode": "M_UNKNOWN_TOKEN", "error": "Invalid access token" })),
        ));
    }
    Ok(())
}

async fn login(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if body["password"] != "hunter2" {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({ "errcode": "M_FORBIDDEN", "error": "Invalid password" })),
        );
    }
    assert_eq!(body["type"], "m.login.password");
    assert_eq!(body["identifier"]["user"], "me");
    let user = json!({ "user_id": "@me:hs", "access_token": TOKEN, "device_id": "DEV" });
    (StatusCode::OK, Json(user))
}

async fn sync(
    State(stub): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let mut stub = stub.lock().unwrap();
    authorized(&headers, &stub)?;
    assert_eq!(query.get("timeout").map(String::as_str), Some("30000"));

    let since = query.get("since").cloned();
    stub.sync_since.push(since.clone());
    let body = match since {
        None => json!({
            "next_batch": "s1",
            "rooms": { "join": { "!r:hs": {
                "state": { "events": [
                    { "type": "m.room.create", "event_id": "$1", "sender": "@alice:hs",
                      "state_key": "", "content": {} },
                    { "type": "m.room.name", "event_id": "$2", "sender": "@alice:hs",
                      "state_key": "", "content": { "name": "lobby" } }
                ] },
                "timeline": { "events": [
                    { "type": "m.room.message", "event_id": "$3", "sender": "@alice:hs",
                      "content": { "msgtype": "m.emote", "body": "waves" } },
                    { "type": "m.reaction", "event_id": "$4", "sender": "@alice:hs",
                      "content": {} }
                ] }
            } } }
        }),
        Some(_) => json!({ "next_batch": "s2" }),
    };
    Ok(Json(body))
}

async fn send(
    State(stub): State<Shared>,
    headers: HeaderMap,
    Path((room, kind, _txn)): Path<(String, String, String)>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let mut stub = stub.lock().unwrap();
    authorized(&headers, &stub)?;
    assert_eq!(kind, "m.room.message");
    stub.sent.push((room, body));
    Ok(Json(json!({ "event_id": format!("$sent{}", stub.sent.len()) })))
}

async fn receipt(
    State(stub): State<Shared>,
    headers: HeaderMap,
    Path((room, _kind, event)): Path<(String, String, String)>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let mut stub = stub.lock().unwrap();
    authorized(&headers, &stub)?;
    stub.receipts.push((room, event));
    Ok(Json(json!({})))
}

async fn messages(
    State(stub): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let mut stub = stub.lock().unwrap();
    authorized(&headers, &stub)?;
    stub.history_queries.push(query);
    Ok(Json(json!({
        "chunk": [
            { "type": "m.room.message", "event_id": "$old", "sender": "@bob:hs",
              "content": { "msgtype": "m.text", "body": "secret" } }
        ],
        "end": "t0"
    })))
}

async fn alias(Path(alias): Path<String>) -> (StatusCode, Json<Value>) {
    if alias == "#lobby:hs" {
        (StatusCode::OK, Json(json!({ "room_id": "!r:hs", "servers": ["hs"] })))
    } else {
        (StatusCode::NOT_FOUND, Json(json!({ "errcode": "M_NOT_FOUND", "error": "no alias" })))
    }
}

async fn logout(
    State(stub): State<Shared>,
    headers: HeaderMap,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let mut stub = stub.lock().unwrap();
    authorized(&headers, &stub)?;
    stub.logged_out = true;
    Ok(Json(json!({})))
}

async fn homeserver() -> (MatrixClient, Shared) {
    let stub = Shared::default();
    let app = Router::new()
        .route("/_matrix/client/v3/login", post(login))
        .route("/_matrix/client/v3/sync", get(sync))
        .route("/_matrix/client/v3/rooms/:room/send/:kind/:txn", put(send))
        .route("/_matrix/client/v3/rooms/:room/receipt/:kind/:event", post(receipt))
        .route("/_matrix/client/v3/rooms/:room/messages", get(messages))
        .route("/_matrix/client/v3/directory/room/:alias", get(alias))
        .route("/_matrix/client/v3/logout", post(logout))
        .with_state(Arc::clone(&stub));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move { axum::serve(listener, app).await });

    (MatrixClient::new(&address).unwrap(), stub)
}

#[tokio::test]
async fn full_session_round_trip() {
    let (client, stub) = homeserver().await;

    let login = client.login(&Identity::password("me", "hunter2")).await.unwrap();
    assert_eq!(login.user_id.as_str(), "@me:hs");
    assert_eq!(login.device_id, "DEV");

    let batch = client.next_events().await.unwrap();
    let ids: Vec<_> = batch.iter().map(|e| e.event_id().as_str()).collect();
    assert_eq!(ids, ["$1", "$2", "$3"]);
    assert!(matches!(
        &batch[2],
        Event::Message { content, .. } if content.kind == MessageKind::Emote
    ));

    assert!(client.next_events().await.unwrap().is_empty());
    assert_eq!(stub.lock().unwrap().sync_since, vec![None, Some("s1".to_string())]);

    let room = RoomId::from("!r:hs");
    let sent = client.send_emote(&room, "waves back").await.unwrap();
    assert_eq!(sent.as_str(), "$sent1");
    client.mark_read(&room, batch[2].event_id()).await.unwrap();

    client.logout().await.unwrap();
    assert_eq!(client.next_events().await, Err(ClientError::NotAuthenticated));

    let stub = stub.lock().unwrap();
    assert_eq!(stub.sent, vec![(
        "!r:hs".to_string(),
        json!({ "msgtype": "m.emote", "body": "waves back" })
    )]);
    assert_eq!(stub.receipts, vec![("!r:hs".to_string(), "$3".to_string())]);
}

#[tokio::test]
async fn wrong_password_is_rejected() {
    let (client, _stub) = homeserver().await;

    let result = client.login(&Identity::password("me", "wrong")).await;

    assert_eq!(
        result,
        Err(ClientError::Rejected { status: 403, message: "M_FORBIDDEN: Invalid password".into() })
    );
    assert_eq!(client.next_events().await, Err(ClientError::NotAuthenticated));
}

#[tokio::test]
async fn alias_target_resolves_through_directory() {
    let (client, stub) = homeserver().await;
    client.login(&Identity::password("me", "hunter2")).await.unwrap();

    client.send_message("#lobby:hs", "hello").await.unwrap();
    let missing = client.send_message("#nowhere:hs", "hello").await;

    assert!(matches!(missing, Err(ClientError::Rejected { status: 404, .. })));
    let stub = stub.lock().unwrap();
    assert_eq!(stub.sent.len(), 1);
    assert_eq!(stub.sent[0].0, "!r:hs");
    assert_eq!(stub.sent[0].1["msgtype"], "m.text");
}

#[tokio::test]
async fn history_request_carries_position() {
    let (client, stub) = homeserver().await;
    client.login(&Identity::password("me", "hunter2")).await.unwrap();

    let page = client
        .fetch_history(&RoomId::from("!r:hs"), Some("s9"), Direction::Backward, 50)
        .await
        .unwrap();

    assert_eq!(page.end.as_deref(), Some("t0"));
    assert_eq!(page.events.len(), 1);
    let stub = stub.lock().unwrap();
    let query = &stub.history_queries[0];
    assert_eq!(query.get("dir").map(String::as_str), Some("b"));
    assert_eq!(query.get("limit").map(String::as_str), Some("50"));
    assert_eq!(query.get("from").map(String::as_str), Some("s9"));
}

#[tokio::test]
async fn stopped_client_produces_no_events() {
    let (client, stub) = homeserver().await;
    client.login(&Identity::password("me", "hunter2")).await.unwrap();

    client.stop_sync();

    assert_eq!(client.next_events().await, Err(ClientError::Stopped));
    assert!(stub.lock().unwrap().sync_since.is_empty());
}
