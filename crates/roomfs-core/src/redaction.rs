//! Redaction lookup.
//!
//! A redaction only names the event it retracts. To show the reader what was
//! retracted, the [`RedactionResolver`] pages backwards through the room's
//! history from the redaction's position and looks for the target message
//! within a bounded window. A target older than the window is not an error:
//! the redaction is simply not rendered.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{Direction, Event, EventError, EventId, ProtocolClient, RoomId};

/// Outcome of a redaction lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Target found; `text` is the annotation to write.
    Found {
        /// Substitution-style annotation, `s/<body>/[redacted]/`.
        text: String,
    },
    /// Target not within the searched window.
    NotFound {
        /// Number of history events searched.
        scanned: usize,
    },
}

/// Recovers the original text of a redacted message.
pub struct RedactionResolver<C: ProtocolClient> {
    client: Arc<C>,
    window: usize,
}

impl<C: ProtocolClient> RedactionResolver<C> {
    /// Resolver searching the most recent `window` events.
    pub fn new(client: Arc<C>, window: usize) -> Self {
        Self { client, window }
    }

    /// History window size.
    pub fn window(&self) -> usize {
        self.window
    }

    /// Find `target` in the history of `room` before `page_token`.
    ///
    /// The history fetch is raced against `cancel`; cancellation yields
    /// [`EventError::Cancelled`].
    pub async fn resolve(
        &self,
        room: &RoomId,
        target: &EventId,
        page_token: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Resolution, EventError> {
        let fetch = self.client.fetch_history(room, page_token, Direction::Backward, self.window);

        let page = tokio::select! {
            _ = cancel.cancelled() => return Err(EventError::Cancelled),
            page = fetch => page,
        }
        .map_err(|source| EventError::HistoryFetch { target: target.clone(), source })?;

        let scanned = page.events.len().min(self.window);
        let original = page.events.iter().take(self.window).find_map(|event| match event {
            Event::Message { header, content } if header.event_id == *target => Some(content),
            _ => None,
        });

        Ok(match original {
            Some(content) => Resolution::Found { text: annotate(&content.body) },
            None => Resolution::NotFound { scanned },
        })
    }
}

/// `s/<body>/[redacted]/`
fn annotate(body: &str) -> String {
    format!("s/{body}/[redacted]/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annotation_format() {
        assert_eq!(annotate("secret plans"), "s/secret plans/[redacted]/");
    }
}
