//! Dispatcher scenarios.
//!
//! Each test drives an [`EventDispatcher`] directly with a scripted client
//! and an in-memory controller, then asserts on the exact writes and client
//! calls observed.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use roomfs_core::{
    Disposition, EventDispatcher, EventError, EventId, InvitePolicy, MemberChange, Membership,
    Notice, RegistryError, RoomId, RoomName, SessionConfig, UserId,
};
use roomfs_harness::{
    ClientCall, EventFactory, LogCapture, MemoryController, ScriptedClient, Stream,
};
use tracing::Level;

const ME: &str = "@me:hs";
const ALICE: &str = "@alice:hs";
const R1: &str = "!r1:hs";

struct Fixture {
    client: Arc<ScriptedClient>,
    controller: MemoryController,
    dispatcher: EventDispatcher<ScriptedClient, MemoryController>,
    events: EventFactory,
}

impl Fixture {
    fn new() -> Self {
        Self::with_config(&SessionConfig::default())
    }

    fn with_config(config: &SessionConfig) -> Self {
        let client = Arc::new(ScriptedClient::new(ME));
        let controller = MemoryController::new();
        let dispatcher = EventDispatcher::new(
            Arc::clone(&client),
            Arc::new(controller.clone()),
            UserId::from(ME),
            config,
        );
        Self { client, controller, dispatcher, events: EventFactory::new() }
    }

    /// Create `R1` and name it `lobby`.
    async fn lobby(&mut self) {
        let create = self.events.create(R1, ALICE);
        let name = self.events.name(R1, ALICE, "lobby");
        assert_eq!(self.dispatcher.on_event(create).await, Disposition::Handled);
        assert_eq!(self.dispatcher.on_event(name).await, Disposition::Handled);
    }

    fn marked_read(&self, event: &EventId) -> bool {
        let count = self
            .client
            .count(|call| matches!(call, ClientCall::MarkRead { event: e, .. } if e == event));
        count == 1
    }
}

#[tokio::test]
async fn create_name_message() {
    let mut fx = Fixture::new();

    let create = fx.events.create(R1, ALICE);
    let create_id = create.event_id().clone();
    assert_eq!(fx.dispatcher.on_event(create).await, Disposition::Handled);
    assert_eq!(fx.dispatcher.registry().resolve(&RoomId::from(R1)), Some(&RoomName::Unresolved));
    assert!(fx.marked_read(&create_id));
    assert!(fx.controller.create_calls().is_empty());

    let name = fx.events.name(R1, ALICE, "lobby");
    assert_eq!(fx.dispatcher.on_event(name).await, Disposition::Handled);
    assert_eq!(fx.dispatcher.registry().name_of(&RoomId::from(R1)), Some("lobby"));
    assert_eq!(fx.controller.create_calls(), vec!["lobby"]);

    let message = fx.events.message(R1, ALICE, "hi");
    let message_id = message.event_id().clone();
    assert_eq!(fx.dispatcher.on_event(message).await, Disposition::Handled);

    assert_eq!(fx.controller.main_lines("lobby"), vec!["hi"]);
    assert_eq!(fx.controller.writes().len(), 1);
    assert_eq!(fx.client.calls().last(), Some(&ClientCall::MarkRead {
        room: RoomId::from(R1),
        event: message_id,
    }));
}

#[tokio::test]
async fn topic_for_unregistered_room_dropped() {
    let mut fx = Fixture::new();
    let logs = LogCapture::new();
    let _guard = logs.install();

    let topic = fx.events.topic("!unknown:hs", ALICE, "welcome");
    let topic_id = topic.event_id().clone();
    let disposition = fx.dispatcher.on_event(topic).await;

    assert_eq!(
        disposition,
        Disposition::Dropped(EventError::UnresolvedRoom(RoomId::from("!unknown:hs")))
    );
    assert!(fx.controller.writes().is_empty());

    let entries = logs.entries();
    assert_eq!(entries.len(), 1, "{entries:?}");
    assert_eq!(entries[0].level, Level::WARN);
    assert_eq!(entries[0].field("event"), Some(topic_id.as_str()));
    assert_eq!(entries[0].field("room"), Some("!unknown:hs"));
}

#[tokio::test]
async fn every_drop_logs_one_warning() {
    let mut fx = Fixture::new();
    fx.lobby().await;
    fx.controller.fail_buffer("lobby");
    let logs = LogCapture::new();
    let _guard = logs.install();

    let dropped = [
        fx.events.message("!unknown:hs", ALICE, "lost"),
        fx.events.message(R1, ALICE, "unwritable"),
        fx.events.create(R1, ALICE),
    ];
    let ids: Vec<_> = dropped.iter().map(|e| e.event_id().to_string()).collect();
    for event in dropped {
        assert!(matches!(fx.dispatcher.on_event(event).await, Disposition::Dropped(_)));
    }

    let warnings = logs.at(Level::WARN);
    let warned: Vec<_> = warnings.iter().filter_map(|w| w.field("event")).collect();
    assert_eq!(warned, ids);
}

#[tokio::test]
async fn failed_buffer_leaves_room_unnamed() {
    let mut fx = Fixture::new();
    let directory = fx.dispatcher.directory();
    fx.controller.fail_buffer("lobby");
    let create = fx.events.create(R1, ALICE);
    fx.dispatcher.on_event(create).await;

    let name = fx.events.name(R1, ALICE, "lobby");
    assert!(matches!(
        fx.dispatcher.on_event(name).await,
        Disposition::Dropped(EventError::BufferUnavailable { .. })
    ));
    assert_eq!(fx.dispatcher.registry().resolve(&RoomId::from(R1)), Some(&RoomName::Unresolved));
    assert_eq!(directory.borrow().room_for("lobby"), None);

    // The next naming event tries again.
    fx.controller.heal_buffer("lobby");
    let name = fx.events.name(R1, ALICE, "lobby");
    assert_eq!(fx.dispatcher.on_event(name).await, Disposition::Handled);
    assert_eq!(fx.controller.create_calls(), vec!["lobby", "lobby"]);
    assert_eq!(fx.dispatcher.registry().name_of(&RoomId::from(R1)), Some("lobby"));
    assert_eq!(directory.borrow().room_for("lobby"), Some(&RoomId::from(R1)));

    let message = fx.events.message(R1, ALICE, "hi");
    assert_eq!(fx.dispatcher.on_event(message).await, Disposition::Handled);
    assert_eq!(fx.controller.main_lines("lobby"), vec!["hi"]);
}

#[tokio::test]
async fn rooms_sharing_a_name_get_separate_buffers() {
    let mut fx = Fixture::new();
    fx.lobby().await;
    let directory = fx.dispatcher.directory();

    let create = fx.events.create("!r2:hs", ALICE);
    let name = fx.events.name("!r2:hs", ALICE, "lobby");
    fx.dispatcher.on_event(create).await;
    assert_eq!(fx.dispatcher.on_event(name).await, Disposition::Handled);

    let first = fx.events.message(R1, ALICE, "one");
    let second = fx.events.message("!r2:hs", ALICE, "two");
    fx.dispatcher.on_event(first).await;
    fx.dispatcher.on_event(second).await;

    assert_eq!(fx.controller.main_lines("lobby"), vec!["one"]);
    assert_eq!(fx.controller.main_lines("lobby!r2:hs"), vec!["two"]);
    let directory = directory.borrow();
    assert_eq!(directory.room_for("lobby"), Some(&RoomId::from(R1)));
    assert_eq!(directory.room_for("lobby!r2:hs"), Some(&RoomId::from("!r2:hs")));
}

#[tokio::test]
async fn topic_written_to_title() {
    let mut fx = Fixture::new();
    fx.lobby().await;

    let topic = fx.events.topic(R1, ALICE, "all things lobby");
    assert_eq!(fx.dispatcher.on_event(topic).await, Disposition::Handled);

    let writes = fx.controller.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].stream, Stream::Title);
    assert_eq!(fx.controller.contents("lobby").unwrap().title, "all things lobby");
}

#[tokio::test]
async fn message_for_unresolved_room_dropped() {
    let mut fx = Fixture::new();
    let create = fx.events.create(R1, ALICE);
    fx.dispatcher.on_event(create).await;

    let message = fx.events.message(R1, ALICE, "hi");
    let message_id = message.event_id().clone();
    assert!(matches!(
        fx.dispatcher.on_event(message).await,
        Disposition::Dropped(EventError::UnresolvedRoom(_))
    ));

    assert!(fx.controller.writes().is_empty());
    assert!(!fx.marked_read(&message_id));
}

#[tokio::test]
async fn self_authored_message_suppressed() {
    let mut fx = Fixture::new();
    fx.lobby().await;

    let message = fx.events.message(R1, ME, "echo");
    assert_eq!(fx.dispatcher.on_event(message).await, Disposition::Ignored("self-authored"));
    assert!(fx.controller.main_lines("lobby").is_empty());
}

#[tokio::test]
async fn emote_renders_with_sender() {
    let mut fx = Fixture::new();
    fx.lobby().await;

    let emote = fx.events.emote(R1, ALICE, "waves");
    fx.dispatcher.on_event(emote).await;
    assert_eq!(fx.controller.main_lines("lobby"), vec!["* @alice:hs waves"]);
}

#[tokio::test]
async fn alias_fills_unresolved_but_never_overwrites() {
    let mut fx = Fixture::new();
    let create = fx.events.create(R1, ALICE);
    fx.dispatcher.on_event(create).await;

    let alias = fx.events.alias(R1, ALICE, "#lobby:hs");
    assert_eq!(fx.dispatcher.on_event(alias).await, Disposition::Handled);

    let name = fx.events.name(R1, ALICE, "Lobby");
    assert_eq!(fx.dispatcher.on_event(name).await, Disposition::Handled);

    let alias = fx.events.alias(R1, ALICE, "#other:hs");
    assert_eq!(fx.dispatcher.on_event(alias).await, Disposition::Ignored("alias for named room"));

    assert_eq!(fx.dispatcher.registry().name_of(&RoomId::from(R1)), Some("Lobby"));
    assert_eq!(fx.controller.create_calls(), vec!["#lobby:hs", "Lobby"]);
}

#[tokio::test]
async fn repeated_name_creates_buffer_once() {
    let mut fx = Fixture::new();
    fx.lobby().await;

    let name = fx.events.name(R1, ALICE, "lobby");
    assert_eq!(fx.dispatcher.on_event(name).await, Disposition::Ignored("name unchanged"));
    assert_eq!(fx.controller.create_calls(), vec!["lobby"]);
}

#[tokio::test]
async fn duplicate_create_dropped() {
    let mut fx = Fixture::new();
    fx.lobby().await;

    let create = fx.events.create(R1, ALICE);
    assert_eq!(
        fx.dispatcher.on_event(create).await,
        Disposition::Dropped(EventError::Registry(RegistryError::DuplicateCreate {
            room: RoomId::from(R1)
        }))
    );
    assert_eq!(fx.dispatcher.registry().name_of(&RoomId::from(R1)), Some("lobby"));
}

#[tokio::test]
async fn failing_buffer_drops_event_and_continues() {
    let mut fx = Fixture::new();
    fx.lobby().await;
    fx.controller.fail_buffer("lobby");

    let message = fx.events.message(R1, ALICE, "lost");
    assert!(matches!(
        fx.dispatcher.on_event(message).await,
        Disposition::Dropped(EventError::BufferUnavailable { .. })
    ));
    assert_eq!(fx.controller.live_writers(), 0);

    // Other rooms keep working.
    let create = fx.events.create("!r2:hs", ALICE);
    let name = fx.events.name("!r2:hs", ALICE, "random");
    let message = fx.events.message("!r2:hs", ALICE, "still here");
    fx.dispatcher.on_event(create).await;
    fx.dispatcher.on_event(name).await;
    assert_eq!(fx.dispatcher.on_event(message).await, Disposition::Handled);
    assert_eq!(fx.controller.main_lines("random"), vec!["still here"]);
}

#[tokio::test]
async fn redaction_annotates_original() {
    let mut fx = Fixture::new();
    fx.lobby().await;

    let original = fx.events.message(R1, ALICE, "secret plans");
    let target = original.event_id().clone();
    let filler = fx.events.message(R1, ALICE, "later");
    fx.client.set_history(R1, vec![filler, original]);

    let redaction = fx.events.redaction(R1, ALICE, &target);
    let redaction_id = redaction.event_id().clone();
    assert_eq!(fx.dispatcher.on_event(redaction).await, Disposition::Handled);

    assert_eq!(fx.controller.main_lines("lobby"), vec!["s/secret plans/[redacted]/"]);
    assert!(fx.marked_read(&redaction_id));
    assert_eq!(
        fx.client.count(|call| matches!(
            call,
            ClientCall::FetchHistory { from: Some(_), limit: 50, .. }
        )),
        1
    );
}

#[tokio::test]
async fn redaction_outside_window_is_silent() {
    let config = SessionConfig::default().with_redaction_window(3);
    let mut fx = Fixture::with_config(&config);
    fx.lobby().await;

    let original = fx.events.message(R1, ALICE, "old news");
    let target = original.event_id().clone();
    let mut history: Vec<_> =
        (0..5).map(|i| fx.events.message(R1, ALICE, &format!("m{i}"))).collect();
    history.push(original);
    fx.client.set_history(R1, history);

    let redaction = fx.events.redaction(R1, ALICE, &target);
    let redaction_id = redaction.event_id().clone();
    assert!(matches!(fx.dispatcher.on_event(redaction).await, Disposition::Ignored(_)));

    assert!(fx.controller.writes().is_empty());
    assert!(!fx.marked_read(&redaction_id));
}

#[tokio::test]
async fn self_authored_redaction_suppressed() {
    let mut fx = Fixture::new();
    fx.lobby().await;

    let redaction = fx.events.redaction(R1, ME, &EventId::from("$gone"));
    assert_eq!(fx.dispatcher.on_event(redaction).await, Disposition::Ignored("self-authored"));
    assert_eq!(fx.client.count(|call| matches!(call, ClientCall::FetchHistory { .. })), 0);
}

#[tokio::test]
async fn join_and_leave_forwarded_to_roster() {
    let mut fx = Fixture::new();
    fx.lobby().await;

    let join = fx.events.member(R1, "@bob:hs", "@bob:hs", Membership::Join);
    let leave = fx.events.member(R1, "@bob:hs", "@bob:hs", Membership::Leave);
    fx.dispatcher.on_event(join).await;
    fx.dispatcher.on_event(leave).await;

    let members = fx.controller.contents("lobby").unwrap().members;
    assert_eq!(members, vec![
        MemberChange { user: UserId::from("@bob:hs"), membership: Membership::Join },
        MemberChange { user: UserId::from("@bob:hs"), membership: Membership::Leave },
    ]);
}

#[tokio::test]
async fn self_membership_suppressed() {
    let mut fx = Fixture::new();
    fx.lobby().await;

    let join = fx.events.member(R1, ME, ME, Membership::Join);
    assert_eq!(fx.dispatcher.on_event(join).await, Disposition::Ignored("self-authored"));
    assert!(fx.controller.contents("lobby").unwrap().members.is_empty());
    assert!(fx.controller.notices().is_empty());
}

#[tokio::test]
async fn invite_for_local_user_notifies_by_default() {
    let mut fx = Fixture::new();

    let invite = fx.events.member("!new:hs", ALICE, ME, Membership::Invite);
    assert_eq!(fx.dispatcher.on_event(invite).await, Disposition::Handled);

    assert_eq!(fx.controller.notices(), vec![Notice::Invited {
        room: RoomId::from("!new:hs"),
        name: None,
        inviter: UserId::from(ALICE),
    }]);
    assert_eq!(fx.client.count(|call| matches!(call, ClientCall::JoinRoom { .. })), 0);
}

#[tokio::test]
async fn invite_policy_auto_join() {
    let config = SessionConfig::default().with_invite_policy(InvitePolicy::AutoJoin);
    let mut fx = Fixture::with_config(&config);

    let invite = fx.events.member("!new:hs", ALICE, ME, Membership::Invite);
    fx.dispatcher.on_event(invite).await;

    assert_eq!(fx.client.calls(), vec![ClientCall::JoinRoom { room: RoomId::from("!new:hs") }]);
    assert!(fx.controller.notices().is_empty());
}

#[tokio::test]
async fn invite_policy_ignore() {
    let config = SessionConfig::default().with_invite_policy(InvitePolicy::Ignore);
    let mut fx = Fixture::with_config(&config);

    let invite = fx.events.member("!new:hs", ALICE, ME, Membership::Invite);
    assert!(matches!(fx.dispatcher.on_event(invite).await, Disposition::Ignored(_)));
    assert!(fx.client.calls().is_empty());
    assert!(fx.controller.notices().is_empty());
}

#[tokio::test]
async fn invite_for_other_user_is_informational() {
    let mut fx = Fixture::new();
    fx.lobby().await;

    let invite = fx.events.member(R1, ALICE, "@bob:hs", Membership::Invite);
    assert!(matches!(fx.dispatcher.on_event(invite).await, Disposition::Ignored(_)));
    assert!(fx.controller.notices().is_empty());
}

#[tokio::test]
async fn ban_of_local_user_notifies() {
    let mut fx = Fixture::new();
    fx.lobby().await;

    let ban = fx.events.member(R1, ALICE, ME, Membership::Ban);
    fx.dispatcher.on_event(ban).await;

    assert_eq!(fx.controller.notices(), vec![Notice::Banned {
        room: RoomId::from(R1),
        name: Some("lobby".into()),
        by: UserId::from(ALICE),
    }]);
}

#[tokio::test]
async fn avatar_marked_read_only() {
    let mut fx = Fixture::new();
    fx.lobby().await;

    let avatar = fx.events.avatar(R1, ALICE);
    let avatar_id = avatar.event_id().clone();
    assert_eq!(fx.dispatcher.on_event(avatar).await, Disposition::Handled);
    assert!(fx.marked_read(&avatar_id));
    assert!(fx.controller.writes().is_empty());
}

#[tokio::test]
async fn directory_tracks_named_rooms() {
    let mut fx = Fixture::new();
    let directory = fx.dispatcher.directory();
    assert!(directory.borrow().is_empty());

    fx.lobby().await;
    assert_eq!(directory.borrow().room_for("lobby"), Some(&RoomId::from(R1)));

    let rename = fx.events.name(R1, ALICE, "hall");
    fx.dispatcher.on_event(rename).await;
    assert_eq!(directory.borrow().room_for("lobby"), None);
    assert_eq!(directory.borrow().room_for("hall"), Some(&RoomId::from(R1)));
}
