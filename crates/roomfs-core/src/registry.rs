//! Room identifier to buffer name resolution.
//!
//! The [`RoomRegistry`] is the single source of truth for which buffer a room
//! maps to. It is owned and mutated by exactly one [`crate::EventDispatcher`];
//! nothing else holds a mutable reference.
//!
//! # Invariants
//!
//! - A room never regresses from a concrete name back to
//!   [`RoomName::Unresolved`].
//! - An explicit room name always overwrites; a canonical alias only fills an
//!   unresolved slot.
//! - A second creation event never overwrites an existing entry.
//! - No two rooms share a buffer name, and no room takes a reserved name. A
//!   name already in use gets the room ID appended.

use std::collections::{HashMap, HashSet};

use crate::{NameSource, RoomId, error::RegistryError};

/// Resolution state of a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomName {
    /// Room exists but no naming event has arrived yet.
    Unresolved,
    /// Room resolved to a buffer name.
    Named(String),
}

impl RoomName {
    /// Buffer name, if resolved.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Self::Unresolved => None,
            Self::Named(name) => Some(name),
        }
    }

    /// Returns true if the room has a concrete name.
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Named(_))
    }
}

/// Outcome of [`RoomRegistry::set_name`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameUpdate {
    /// The room gained a name it did not have before.
    Resolved {
        /// New buffer name. Differs from the requested name when that one is
        /// held by another room or reserved.
        name: String,
        /// Name the room had before, if any.
        previous: Option<String>,
    },
    /// The room already had exactly this name.
    Unchanged,
    /// Lower-priority alias ignored because the room is already named.
    Ignored,
}

#[derive(Debug, Clone)]
struct RoomEntry {
    name: RoomName,
    /// Name asked for by the naming event that produced `name`.
    requested: Option<String>,
    /// Creation event observed. Entries can exist without one when a naming
    /// event arrives first.
    created: bool,
}

/// Registry of rooms known to this session.
#[derive(Debug, Clone, Default)]
pub struct RoomRegistry {
    rooms: HashMap<RoomId, RoomEntry>,
    reserved: HashSet<String>,
}

impl RoomRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty registry that never hands out any of `names`.
    pub fn with_reserved<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { rooms: HashMap::new(), reserved: names.into_iter().map(Into::into).collect() }
    }

    /// Current resolution state of `room`. `None` if the room is unknown.
    pub fn resolve(&self, room: &RoomId) -> Option<&RoomName> {
        self.rooms.get(room).map(|entry| &entry.name)
    }

    /// Buffer name of `room`, if it is known and resolved.
    pub fn name_of(&self, room: &RoomId) -> Option<&str> {
        self.resolve(room).and_then(RoomName::as_name)
    }

    /// Room currently mapped to buffer `name`.
    pub fn room_for(&self, name: &str) -> Option<&RoomId> {
        self.rooms
            .iter()
            .find(|(_, entry)| entry.name.as_name() == Some(name))
            .map(|(room, _)| room)
    }

    /// Register a room from its creation event.
    ///
    /// New rooms start [`RoomName::Unresolved`]. A room already named by an
    /// earlier naming event keeps its name. A second creation event is a
    /// protocol violation and leaves the entry untouched.
    pub fn register(&mut self, room: RoomId) -> Result<(), RegistryError> {
        match self.rooms.get_mut(&room) {
            Some(entry) if entry.created => Err(RegistryError::DuplicateCreate { room }),
            Some(entry) => {
                entry.created = true;
                Ok(())
            },
            None => {
                self.rooms.insert(room, RoomEntry {
                    name: RoomName::Unresolved,
                    requested: None,
                    created: true,
                });
                Ok(())
            },
        }
    }

    /// Apply a naming event.
    ///
    /// [`NameSource::RoomName`] is authoritative and always applies.
    /// [`NameSource::CanonicalAlias`] only fills a room that has no name yet.
    /// Unknown rooms are added as a side effect.
    pub fn set_name(&mut self, room: RoomId, name: String, source: NameSource) -> NameUpdate {
        let update = self.plan_name(&room, &name, source);
        self.commit_name(room, name, &update);
        update
    }

    /// What [`RoomRegistry::set_name`] would do, without doing it.
    pub fn plan_name(&self, room: &RoomId, name: &str, source: NameSource) -> NameUpdate {
        let (current, requested) = match self.rooms.get(room) {
            Some(entry) => (&entry.name, entry.requested.as_deref()),
            None => (&RoomName::Unresolved, None),
        };

        match (current, source) {
            (RoomName::Named(_), _) if requested == Some(name) => NameUpdate::Unchanged,
            (RoomName::Named(_), NameSource::CanonicalAlias) => NameUpdate::Ignored,
            (RoomName::Named(previous), NameSource::RoomName) => NameUpdate::Resolved {
                name: self.unique_name(room, name),
                previous: Some(previous.clone()),
            },
            (RoomName::Unresolved, _) => {
                NameUpdate::Resolved { name: self.unique_name(room, name), previous: None }
            },
        }
    }

    /// Record the outcome of [`RoomRegistry::plan_name`] for `requested`.
    ///
    /// Only [`NameUpdate::Resolved`] changes anything.
    pub fn commit_name(&mut self, room: RoomId, requested: String, update: &NameUpdate) {
        let NameUpdate::Resolved { name, .. } = update else {
            return;
        };
        let entry = self.rooms.entry(room).or_insert(RoomEntry {
            name: RoomName::Unresolved,
            requested: None,
            created: false,
        });
        entry.name = RoomName::Named(name.clone());
        entry.requested = Some(requested);
    }

    /// `name`, or a variant of it no other room holds.
    fn unique_name(&self, room: &RoomId, name: &str) -> String {
        let taken = |candidate: &str| {
            self.reserved.contains(candidate)
                || self.room_for(candidate).is_some_and(|holder| holder != room)
        };
        if !taken(name) {
            return name.to_string();
        }
        let qualified = format!("{name}{room}");
        let mut candidate = qualified.clone();
        let mut n = 2;
        while taken(&candidate) {
            candidate = format!("{qualified}~{n}");
            n += 1;
        }
        candidate
    }

    /// Every known room with its resolution state.
    pub fn rooms(&self) -> impl Iterator<Item = (&RoomId, &RoomName)> {
        self.rooms.iter().map(|(room, entry)| (room, &entry.name))
    }

    /// Resolved `(room, name)` pairs.
    pub fn named_rooms(&self) -> impl Iterator<Item = (&RoomId, &str)> {
        self.rooms.iter().filter_map(|(room, entry)| entry.name.as_name().map(|n| (room, n)))
    }

    /// Number of known rooms.
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Returns true if no rooms are known.
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}
