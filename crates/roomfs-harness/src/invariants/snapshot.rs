//! Observable state snapshots for invariant checking.
//!
//! A [`SystemSnapshot`] accumulates what the dispatcher did across a run: the
//! registry's current state, every name each room has held, and everything
//! the presentation layer observed. Invariants read snapshots, never live
//! state.

use std::collections::{BTreeMap, BTreeSet};

use roomfs_core::{RoomId, RoomName, RoomRegistry};

use crate::{MemoryController, WriteRecord};

/// Snapshot of the registry and the presentation layer.
#[derive(Debug, Clone, Default)]
pub struct SystemSnapshot {
    /// Current resolution state per room.
    pub rooms: BTreeMap<RoomId, RoomName>,
    /// Resolution state per room at every capture, oldest first.
    pub name_history: BTreeMap<RoomId, Vec<RoomName>>,
    /// Buffers that exist.
    pub buffers: BTreeSet<String>,
    /// Completed writes, in order.
    pub writes: Vec<WriteRecord>,
    /// Writers not yet released.
    pub live_writers: usize,
}

impl SystemSnapshot {
    /// Empty snapshot.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Capture the current state, extending the name history.
    pub fn record(&mut self, registry: &RoomRegistry, controller: &MemoryController) {
        self.rooms = registry.rooms().map(|(room, name)| (room.clone(), name.clone())).collect();
        for (room, name) in &self.rooms {
            self.name_history.entry(room.clone()).or_default().push(name.clone());
        }
        self.buffers = controller.buffers().into_iter().collect();
        self.writes = controller.writes();
        self.live_writers = controller.live_writers();
    }

    /// Every name any room has held.
    pub fn names_ever_held(&self) -> BTreeSet<&str> {
        self.name_history.values().flatten().filter_map(RoomName::as_name).collect()
    }
}
