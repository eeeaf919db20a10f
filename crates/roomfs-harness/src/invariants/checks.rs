//! Standard invariant checks.
//!
//! These capture what must hold after any sequence of events, not what a
//! particular scenario produces.

use roomfs_core::RoomName;

use super::{Invariant, InvariantResult, SystemSnapshot, Violation};

/// A room never goes back from a concrete name to unresolved.
pub struct NamesNeverRegress;

impl Invariant for NamesNeverRegress {
    fn name(&self) -> &'static str {
        "names_never_regress"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for (room, history) in &state.name_history {
            for window in history.windows(2) {
                if let [RoomName::Named(before), RoomName::Unresolved] = window {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!("room {room}: {before:?} regressed to unresolved"),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Every resolved room has a buffer.
///
/// Holds as long as the presentation layer never refuses `create_buffer`.
pub struct ResolvedRoomsHaveBuffers;

impl Invariant for ResolvedRoomsHaveBuffers {
    fn name(&self) -> &'static str {
        "resolved_rooms_have_buffers"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for (room, name) in &state.rooms {
            if let Some(name) = name.as_name() {
                if !state.buffers.contains(name) {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!("room {room} named {name:?} has no buffer"),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Writes only go to buffers some room has been named after.
pub struct WritesTargetNamedBuffers;

impl Invariant for WritesTargetNamedBuffers {
    fn name(&self) -> &'static str {
        "writes_target_named_buffers"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        let names = state.names_ever_held();
        match state.writes.iter().find(|write| !names.contains(write.buffer.as_str())) {
            Some(write) => Err(Violation {
                invariant: self.name(),
                message: format!("write to {:?} which no room was named", write.buffer),
            }),
            None => Ok(()),
        }
    }
}

/// Every writer handed out has been released.
pub struct WritersReleased;

impl Invariant for WritersReleased {
    fn name(&self) -> &'static str {
        "writers_released"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        if state.live_writers == 0 {
            Ok(())
        } else {
            Err(Violation {
                invariant: self.name(),
                message: format!("{} writers still held", state.live_writers),
            })
        }
    }
}
