//! Session configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// History window searched for the target of a redaction.
pub const DEFAULT_REDACTION_WINDOW: usize = 50;

/// Time allowed for the sync task to wind down after cancellation.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// First pause after a sync batch is skipped. Doubles per consecutive failure.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Ceiling on the pause between failed sync polls.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// User name that selects guest registration instead of password login.
const GUEST_USER: &str = "guest";

/// Account the session authenticates as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Identity {
    /// User name. `"guest"` registers a guest account.
    pub user: String,
    /// Password for password login. Ignored for guests.
    pub password: String,
    /// Device identifier presented to the server.
    pub device_id: String,
}

impl Identity {
    /// Password identity.
    pub fn password(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self { user: user.into(), password: password.into(), ..Self::default() }
    }

    /// Guest identity.
    pub fn guest() -> Self {
        Self::default()
    }

    /// Returns true if this identity registers a guest account.
    pub fn is_guest(&self) -> bool {
        self.user == GUEST_USER
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self { user: GUEST_USER.to_string(), password: String::new(), device_id: "roomfs".into() }
    }
}

/// What to do when the local user is invited to a room.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvitePolicy {
    /// Tell the user through the presentation layer; joining is manual.
    #[default]
    Notify,
    /// Join the room immediately.
    AutoJoin,
    /// Log the invite and do nothing else.
    Ignore,
}

/// Configuration for a [`crate::Session`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Account to authenticate as.
    pub identity: Identity,
    /// Number of history events searched for a redacted message.
    pub redaction_window: usize,
    /// Handling of invites addressed to the local user.
    pub invite_policy: InvitePolicy,
    /// Bound on waiting for the sync task after cancellation, in milliseconds.
    pub shutdown_grace_ms: u64,
    /// Pause after the first skipped sync batch, in milliseconds.
    pub retry_delay_ms: u64,
}

impl SessionConfig {
    /// Configuration for `identity` with default policies.
    pub fn new(identity: Identity) -> Self {
        Self { identity, ..Self::default() }
    }

    /// Override the redaction window.
    pub fn with_redaction_window(mut self, window: usize) -> Self {
        self.redaction_window = window;
        self
    }

    /// Override the invite policy.
    pub fn with_invite_policy(mut self, policy: InvitePolicy) -> Self {
        self.invite_policy = policy;
        self
    }

    /// Override the pause after a skipped sync batch.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Pause before polling again after `failures` consecutive skipped batches.
    ///
    /// Doubles from the configured delay up to [`MAX_RETRY_DELAY`].
    pub fn retry_delay(&self, failures: u32) -> Duration {
        let base = Duration::from_millis(self.retry_delay_ms);
        let factor = 1u32.checked_shl(failures.saturating_sub(1)).unwrap_or(u32::MAX);
        base.saturating_mul(factor).min(MAX_RETRY_DELAY)
    }

    /// Shutdown grace period.
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            identity: Identity::default(),
            redaction_window: DEFAULT_REDACTION_WINDOW,
            invite_policy: InvitePolicy::default(),
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE.as_millis() as u64,
            retry_delay_ms: DEFAULT_RETRY_DELAY.as_millis() as u64,
        }
    }
}
