//! Event routing.
//!
//! The [`EventDispatcher`] is the single entry point for protocol events. It
//! owns the [`RoomRegistry`] and is the only thing that mutates it, so it must
//! run on exactly one task (the sync loop).
//!
//! Every event ends in a [`Disposition`]. Handlers never log their own drops:
//! [`EventDispatcher::on_event`] emits exactly one `warn` entry per dropped
//! event, and a dropped event never stops the loop.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::{
    BufferBridge, BufferController, Event, EventError, EventHeader, EventId, EventKind,
    InvitePolicy, MemberChange, Membership, MessageContent, NameSource, NameUpdate, Notice,
    ProtocolClient, RedactionResolver, Resolution, RoomDirectory, RoomId, RoomRegistry,
    SessionConfig, UserId,
};

/// Outcome of dispatching one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Event fully handled.
    Handled,
    /// Event deliberately not acted on.
    Ignored(&'static str),
    /// Event dropped because of a fatal-to-event condition.
    Dropped(EventError),
}

/// Routes protocol events to the registry, the buffers and the client.
pub struct EventDispatcher<C: ProtocolClient, B: BufferController> {
    registry: RoomRegistry,
    client: Arc<C>,
    bridge: BufferBridge<B>,
    resolver: RedactionResolver<C>,
    local_user: UserId,
    invite_policy: InvitePolicy,
    directory: watch::Sender<RoomDirectory>,
    cancel: CancellationToken,
}

impl<C: ProtocolClient, B: BufferController> EventDispatcher<C, B> {
    /// Dispatcher for the session of `local_user`.
    pub fn new(
        client: Arc<C>,
        controller: Arc<B>,
        local_user: UserId,
        config: &SessionConfig,
    ) -> Self {
        let (directory, _) = watch::channel(RoomDirectory::default());
        Self {
            registry: RoomRegistry::with_reserved(controller.reserved_names()),
            resolver: RedactionResolver::new(Arc::clone(&client), config.redaction_window),
            client,
            bridge: BufferBridge::new(controller),
            local_user,
            invite_policy: config.invite_policy,
            directory,
            cancel: CancellationToken::new(),
        }
    }

    /// Observe `cancel` during long operations.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Subscribe to snapshots of resolved buffer names.
    pub fn directory(&self) -> watch::Receiver<RoomDirectory> {
        self.directory.subscribe()
    }

    /// Registry of rooms seen so far.
    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    /// Handle one event.
    pub async fn on_event(&mut self, event: Event) -> Disposition {
        let kind = event.kind();
        let header = event.header().clone();

        let disposition = match event {
            Event::Create { header } => self.on_create(header).await,
            Event::Name { header, name, source } => self.on_name(header, name, source).await,
            Event::Topic { header, topic } => self.on_topic(&header, &topic),
            Event::Avatar { header, url } => {
                tracing::debug!(room = %header.room_id, url = ?url, "avatar changed");
                self.mark_read(&header).await;
                Disposition::Handled
            },
            Event::Membership { header, target, membership } => {
                self.on_membership(&header, target, membership).await
            },
            Event::Message { header, content } => self.on_message(&header, &content).await,
            Event::Redaction { header, redacts, page_token } => {
                self.on_redaction(&header, &redacts, page_token.as_deref()).await
            },
        };

        log(kind, &header, disposition)
    }

    async fn on_create(&mut self, header: EventHeader) -> Disposition {
        if let Err(e) = self.registry.register(header.room_id.clone()) {
            return Disposition::Dropped(e.into());
        }
        tracing::debug!(room = %header.room_id, "room registered");
        self.mark_read(&header).await;
        Disposition::Handled
    }

    async fn on_name(
        &mut self,
        header: EventHeader,
        name: String,
        source: NameSource,
    ) -> Disposition {
        // Commit the name only once its buffer exists.
        let update = self.registry.plan_name(&header.room_id, &name, source);

        let disposition = match &update {
            NameUpdate::Resolved { name: buffer, previous } => {
                if let Err(e) = self.bridge.ensure_buffer(buffer) {
                    return Disposition::Dropped(e);
                }
                if *buffer != name {
                    tracing::info!(
                        room = %header.room_id,
                        requested = %name,
                        %buffer,
                        "buffer name taken, qualified with room"
                    );
                }
                tracing::info!(room = %header.room_id, name = %buffer, ?previous, "room named");
                self.registry.commit_name(header.room_id.clone(), name, &update);
                self.directory.send_replace(RoomDirectory::from_registry(&self.registry));
                Disposition::Handled
            },
            NameUpdate::Unchanged => Disposition::Ignored("name unchanged"),
            NameUpdate::Ignored => Disposition::Ignored("alias for named room"),
        };

        self.mark_read(&header).await;
        disposition
    }

    async fn on_message(&self, header: &EventHeader, content: &MessageContent) -> Disposition {
        if header.sender == self.local_user {
            return Disposition::Ignored("self-authored");
        }
        let Some(name) = self.registry.name_of(&header.room_id) else {
            return unresolved(&header.room_id);
        };
        let text = content.display_text(&header.sender);
        match self.bridge.write_main(name, &text) {
            Ok(()) => {
                self.mark_read(header).await;
                Disposition::Handled
            },
            Err(e) => Disposition::Dropped(e),
        }
    }

    fn on_topic(&self, header: &EventHeader, topic: &str) -> Disposition {
        let Some(name) = self.registry.name_of(&header.room_id) else {
            return unresolved(&header.room_id);
        };
        match self.bridge.write_title(name, topic) {
            Ok(()) => Disposition::Handled,
            Err(e) => Disposition::Dropped(e),
        }
    }

    async fn on_membership(
        &self,
        header: &EventHeader,
        target: UserId,
        membership: Membership,
    ) -> Disposition {
        if header.sender == self.local_user {
            return Disposition::Ignored("self-authored");
        }
        let name = self.registry.name_of(&header.room_id);

        match membership {
            Membership::Join | Membership::Leave => {
                let Some(name) = name else {
                    return Disposition::Ignored("roster change for unresolved room");
                };
                let change = MemberChange { user: target, membership };
                match self.bridge.forward_membership(name, &change) {
                    Ok(()) => Disposition::Handled,
                    Err(e) => Disposition::Dropped(e),
                }
            },
            Membership::Invite if target == self.local_user => match self.invite_policy {
                InvitePolicy::Notify => {
                    let notice = Notice::Invited {
                        room: header.room_id.clone(),
                        name: name.map(str::to_string),
                        inviter: header.sender.clone(),
                    };
                    match self.bridge.notify(&notice) {
                        Ok(()) => Disposition::Handled,
                        Err(e) => Disposition::Dropped(e),
                    }
                },
                InvitePolicy::AutoJoin => {
                    match self.client.join_room(&header.room_id).await {
                        Ok(()) => tracing::info!(room = %header.room_id, "joined on invite"),
                        Err(e) => {
                            tracing::warn!(room = %header.room_id, error = %e, "auto-join failed");
                        },
                    }
                    Disposition::Handled
                },
                InvitePolicy::Ignore => Disposition::Ignored("invite policy is ignore"),
            },
            Membership::Ban if target == self.local_user => {
                let notice = Notice::Banned {
                    room: header.room_id.clone(),
                    name: name.map(str::to_string),
                    by: header.sender.clone(),
                };
                match self.bridge.notify(&notice) {
                    Ok(()) => Disposition::Handled,
                    Err(e) => Disposition::Dropped(e),
                }
            },
            Membership::Invite | Membership::Ban | Membership::Knock => {
                Disposition::Ignored("informational membership change")
            },
        }
    }

    async fn on_redaction(
        &self,
        header: &EventHeader,
        redacts: &EventId,
        page_token: Option<&str>,
    ) -> Disposition {
        if header.sender == self.local_user {
            return Disposition::Ignored("self-authored");
        }
        let Some(name) = self.registry.name_of(&header.room_id) else {
            return unresolved(&header.room_id);
        };

        let resolution =
            match self.resolver.resolve(&header.room_id, redacts, page_token, &self.cancel).await {
                Ok(resolution) => resolution,
                Err(e) => return Disposition::Dropped(e),
            };

        match resolution {
            Resolution::Found { text } => match self.bridge.write_main(name, &text) {
                Ok(()) => {
                    self.mark_read(header).await;
                    Disposition::Handled
                },
                Err(e) => Disposition::Dropped(e),
            },
            Resolution::NotFound { scanned } => {
                tracing::debug!(
                    redacts = %redacts,
                    scanned,
                    "redacted event outside history window"
                );
                Disposition::Ignored("redaction target outside history window")
            },
        }
    }

    /// Best effort: failures are logged and otherwise ignored.
    async fn mark_read(&self, header: &EventHeader) {
        if let Err(e) = self.client.mark_read(&header.room_id, &header.event_id).await {
            tracing::warn!(
                room = %header.room_id,
                event = %header.event_id,
                error = %e,
                "mark-read failed"
            );
        }
    }
}

fn unresolved(room: &RoomId) -> Disposition {
    Disposition::Dropped(EventError::UnresolvedRoom(room.clone()))
}

fn log(kind: EventKind, header: &EventHeader, disposition: Disposition) -> Disposition {
    match &disposition {
        Disposition::Handled => {
            tracing::trace!(
                kind = %kind,
                room = %header.room_id,
                event = %header.event_id,
                "event handled"
            );
        },
        Disposition::Ignored(reason) => {
            tracing::debug!(
                kind = %kind,
                room = %header.room_id,
                event = %header.event_id,
                reason = %reason,
                "event ignored"
            );
        },
        Disposition::Dropped(e) => {
            tracing::warn!(
                kind = %kind,
                room = %header.room_id,
                event = %header.event_id,
                error = %e,
                "event dropped"
            );
        },
    }
    disposition
}
