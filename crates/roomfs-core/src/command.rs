//! Outbound command path.
//!
//! Commands arrive from the presentation layer through a [`CommandSource`] and
//! are executed by the [`CommandBridge`], which maps each recognized command
//! onto an outbound [`ProtocolClient`] request. A bad command is reported back
//! to its originator and never affects the session.
//!
//! The bridge never touches the [`crate::RoomRegistry`]. It resolves buffer
//! names through a [`RoomDirectory`] snapshot that the dispatcher publishes on
//! a `watch` channel, so no lock is shared with the sync loop.

use std::{collections::BTreeMap, future::Future, sync::Arc};

use tokio::sync::{mpsc, oneshot, watch};

use crate::{CommandError, ProtocolClient, RoomId, RoomRegistry};

/// Recognized command families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Emote into the command's target buffer.
    Action,
    /// Text message to a buffer, user, alias or room.
    Msg,
}

/// Static description of a recognized command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandDescriptor {
    /// Command family.
    pub kind: CommandKind,
    /// Canonical name.
    pub name: &'static str,
    /// Alternative names.
    pub aliases: &'static [&'static str],
    /// Argument synopsis.
    pub args: &'static str,
    /// One-line help text.
    pub description: &'static str,
}

impl CommandDescriptor {
    /// Returns true if `name` is this command's name or one of its aliases.
    pub fn matches(&self, name: &str) -> bool {
        self.name == name || self.aliases.contains(&name)
    }

    /// Descriptor for `name`, searching names and aliases.
    pub fn lookup(name: &str) -> Option<&'static Self> {
        COMMANDS.iter().find(|desc| desc.matches(name))
    }
}

/// Commands understood by the [`CommandBridge`].
pub const COMMANDS: &[CommandDescriptor] = &[
    CommandDescriptor {
        kind: CommandKind::Action,
        name: "action",
        aliases: &["me", "act"],
        args: "<msg>",
        description: "send an emote to the current buffer",
    },
    CommandDescriptor {
        kind: CommandKind::Msg,
        name: "msg",
        aliases: &["query", "m", "q"],
        args: "<name> <msg>",
        description: "send a message to a buffer, user or room",
    },
];

/// A user command issued from the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Command name or alias.
    pub name: String,
    /// Whitespace-separated arguments.
    pub args: Vec<String>,
    /// Presentation-layer client that issued the command.
    pub sender: String,
    /// Buffer the command was issued in.
    pub target: String,
}

impl Command {
    /// Build a command issued in buffer `target`.
    pub fn new(
        target: impl Into<String>,
        name: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            args: args.into_iter().map(Into::into).collect(),
            sender: String::new(),
            target: target.into(),
        }
    }

    /// Record which client issued the command.
    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = sender.into();
        self
    }

    /// Parse a `<buffer> <command> [args...]` line.
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let mut words = line.split_whitespace();
        let (Some(target), Some(name)) = (words.next(), words.next()) else {
            return Err(CommandError::Malformed(line.trim().to_string()));
        };
        Ok(Self::new(target, name, words))
    }
}

/// Read-only snapshot of resolved buffer names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomDirectory {
    rooms: BTreeMap<String, RoomId>,
}

impl RoomDirectory {
    /// Snapshot the resolved rooms of `registry`.
    pub fn from_registry(registry: &RoomRegistry) -> Self {
        let rooms =
            registry.named_rooms().map(|(room, name)| (name.to_string(), room.clone())).collect();
        Self { rooms }
    }

    /// Room currently shown as buffer `name`.
    pub fn room_for(&self, name: &str) -> Option<&RoomId> {
        self.rooms.get(name)
    }

    /// Buffer names in the snapshot.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rooms.keys().map(String::as_str)
    }

    /// Number of resolved rooms.
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Returns true if no room is resolved.
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

/// A command together with the channel its result is reported on.
#[derive(Debug)]
pub struct CommandRequest {
    /// Command to execute.
    pub command: Command,
    reply: oneshot::Sender<Result<(), CommandError>>,
}

impl CommandRequest {
    /// Wrap `command`, returning the receiver for its result.
    pub fn new(command: Command) -> (Self, oneshot::Receiver<Result<(), CommandError>>) {
        let (reply, rx) = oneshot::channel();
        (Self { command, reply }, rx)
    }

    /// Report the command's outcome to its originator.
    pub fn respond(self, result: Result<(), CommandError>) {
        if self.reply.send(result).is_err() {
            tracing::debug!(command = %self.command.name, "command originator went away");
        }
    }
}

/// Inbound channel of user commands.
pub trait CommandSource: Send + 'static {
    /// Next command. `None` once the source is exhausted.
    fn next_command(&mut self) -> impl Future<Output = Option<CommandRequest>> + Send;
}

impl CommandSource for mpsc::Receiver<CommandRequest> {
    async fn next_command(&mut self) -> Option<CommandRequest> {
        self.recv().await
    }
}

/// Executes [`Command`]s against the protocol client.
pub struct CommandBridge<C: ProtocolClient> {
    client: Arc<C>,
    directory: watch::Receiver<RoomDirectory>,
}

impl<C: ProtocolClient> CommandBridge<C> {
    /// Bridge sending through `client`, resolving names from `directory`.
    pub fn new(client: Arc<C>, directory: watch::Receiver<RoomDirectory>) -> Self {
        Self { client, directory }
    }

    /// Execute `command`.
    ///
    /// Exactly one outbound request is issued for a well-formed command and
    /// none for an unknown or malformed one.
    pub async fn dispatch(&self, command: &Command) -> Result<(), CommandError> {
        let desc = CommandDescriptor::lookup(&command.name)
            .ok_or_else(|| CommandError::Unknown(command.name.clone()))?;

        match desc.kind {
            CommandKind::Action => {
                if command.args.is_empty() {
                    return Err(CommandError::MissingArgument {
                        command: desc.name,
                        argument: "<msg>",
                    });
                }
                let room = self
                    .resolve(&command.target)
                    .ok_or_else(|| CommandError::UnknownTarget(command.target.clone()))?;
                let body = command.args.join(" ");

                let event = self.client.send_emote(&room, &body).await?;
                tracing::debug!(room = %room, event = %event, "emote sent");
            },
            CommandKind::Msg => {
                let Some((name, words)) = command.args.split_first() else {
                    return Err(CommandError::MissingArgument {
                        command: desc.name,
                        argument: "<name>",
                    });
                };
                if words.is_empty() {
                    return Err(CommandError::MissingArgument {
                        command: desc.name,
                        argument: "<msg>",
                    });
                }
                // Known buffers map to their room; anything else is handed to
                // the client as a user id, alias or room id.
                let target =
                    self.resolve(name).map_or_else(|| name.clone(), |room| room.to_string());
                let body = words.join(" ");

                let event = self.client.send_message(&target, &body).await?;
                tracing::debug!(to = %target, event = %event, "message sent");
            },
        }
        Ok(())
    }

    fn resolve(&self, name: &str) -> Option<RoomId> {
        self.directory.borrow().room_for(name).cloned()
    }
}
