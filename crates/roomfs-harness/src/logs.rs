//! Captured log output.
//!
//! `LogCapture` is a `tracing_subscriber` layer that records every event
//! emitted while it is installed, so tests can assert on how many entries an
//! operation produced and at which level.

use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, Mutex},
};

use tracing::{
    Event, Level, Subscriber,
    field::{Field, Visit},
    subscriber::DefaultGuard,
};
use tracing_subscriber::{
    Registry,
    layer::{Context, Layer, SubscriberExt},
};

use crate::lock;

/// One recorded log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Level the entry was emitted at.
    pub level: Level,
    /// Message text.
    pub message: String,
    /// Structured fields, rendered with `Display` where the macro used `%`.
    pub fields: BTreeMap<String, String>,
}

impl LogEntry {
    /// Value of `field`, if present.
    pub fn field(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }
}

/// Layer recording every log entry it sees.
#[derive(Debug, Clone, Default)]
pub struct LogCapture {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl LogCapture {
    /// Empty capture.
    pub fn new() -> Self {
        Self::default()
    }

    /// Route this thread's logs into the capture until the guard is dropped.
    ///
    /// Works for `#[tokio::test]` on the default current-thread runtime,
    /// where every task runs on the installing thread.
    pub fn install(&self) -> DefaultGuard {
        tracing::subscriber::set_default(Registry::default().with(self.clone()))
    }

    /// Everything recorded so far.
    pub fn entries(&self) -> Vec<LogEntry> {
        lock(&self.entries).clone()
    }

    /// Entries at exactly `level`.
    pub fn at(&self, level: Level) -> Vec<LogEntry> {
        lock(&self.entries).iter().filter(|entry| entry.level == level).cloned().collect()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        lock(&self.entries).clear();
    }
}

impl<S: Subscriber> Layer<S> for LogCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        lock(&self.entries).push(LogEntry {
            level: *event.metadata().level(),
            message: visitor.message,
            fields: visitor.fields,
        });
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: BTreeMap<String, String>,
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.record(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.record(field, format!("{value:?}"));
    }
}

impl FieldVisitor {
    fn record(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = value;
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}
