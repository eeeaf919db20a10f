//! Line-oriented command input.
//!
//! Each line is `<buffer> <command> [args...]`. The outcome of every command
//! is reported through the log, tagged with the line that issued it.

use roomfs_core::{Command, CommandRequest, CommandSource};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};

/// Sender recorded on commands read from a [`LineSource`].
pub const LINE_SENDER: &str = "stdin";

/// [`CommandSource`] reading commands from lines of text.
///
/// Blank lines are skipped and malformed lines are logged and skipped. End of
/// input or a read error closes the source.
pub struct LineSource<R> {
    lines: Lines<R>,
}

impl<R: AsyncBufRead + Unpin + Send + 'static> LineSource<R> {
    /// Source reading from `input`.
    pub fn new(input: R) -> Self {
        Self { lines: input.lines() }
    }
}

impl<R: AsyncBufRead + Unpin + Send + 'static> CommandSource for LineSource<R> {
    async fn next_command(&mut self) -> Option<CommandRequest> {
        loop {
            let line = match self.lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    tracing::debug!("command input closed");
                    return None;
                },
                Err(e) => {
                    tracing::warn!(error = %e, "command input failed");
                    return None;
                },
            };
            if line.trim().is_empty() {
                continue;
            }

            let command = match Command::parse(&line) {
                Ok(command) => command.with_sender(LINE_SENDER),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping command line");
                    continue;
                },
            };

            let (request, reply) = CommandRequest::new(command);
            tokio::spawn(async move {
                match reply.await {
                    Ok(Ok(())) => tracing::info!(line = %line, "command done"),
                    Ok(Err(e)) => tracing::warn!(line = %line, error = %e, "command failed"),
                    Err(_) => tracing::warn!(line = %line, "command abandoned"),
                }
            });
            return Some(request);
        }
    }
}
