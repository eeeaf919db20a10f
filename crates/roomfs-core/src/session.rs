//! Session lifecycle.
//!
//! A [`Session`] walks `Created → Authenticating → Syncing → ShuttingDown →
//! Closed`. While syncing it runs three concurrent activities:
//!
//! - the sync loop, a spawned task that owns the [`EventDispatcher`] and
//!   feeds it every batch from [`ProtocolClient::next_events`]
//! - the supervisor, a spawned task that waits for the sync loop, forwards its
//!   outcome and cancels the session so everything unwinds together
//! - the command loop, on the caller's task, that executes commands from the
//!   [`CommandSource`]
//!
//! One [`CancellationToken`] governs all three. [`SessionHandle::quit`]
//! cancels it from outside; a terminal sync failure cancels it from inside.

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{oneshot, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    BufferController, ClientError, CommandBridge, CommandError, CommandSource, EventDispatcher,
    Identity, LoginInfo, ProtocolClient, SessionConfig, SessionError,
};

/// Lifecycle states of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed, not yet authenticated.
    Created,
    /// Guest registration or password login in flight.
    Authenticating,
    /// Sync loop running.
    Syncing,
    /// Logging out and stopping sync.
    ShuttingDown,
    /// Terminal.
    Closed,
}

impl SessionState {
    fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Authenticating)
                | (Self::Authenticating, Self::Syncing | Self::Closed)
                | (Self::Syncing, Self::ShuttingDown)
                | (Self::ShuttingDown, Self::Closed)
        )
    }
}

/// Cloneable control handle for a running [`Session`].
#[derive(Debug, Clone)]
pub struct SessionHandle {
    cancel: CancellationToken,
    state: watch::Receiver<SessionState>,
}

impl SessionHandle {
    /// Begin an orderly shutdown.
    pub fn quit(&self) {
        self.cancel.cancel();
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Wait until the session reaches `state`.
    ///
    /// Returns immediately if it already has. Returns when the session is
    /// dropped without ever reaching it.
    pub async fn wait_for(&mut self, state: SessionState) {
        if self.state.wait_for(|current| *current == state).await.is_err() {
            tracing::debug!(?state, "session dropped before reaching state");
        }
    }
}

/// A live connection between the protocol and the presentation layer.
pub struct Session<C: ProtocolClient, B: BufferController, S: CommandSource> {
    client: Arc<C>,
    controller: Arc<B>,
    commands: S,
    config: SessionConfig,
    cancel: CancellationToken,
    state: watch::Sender<SessionState>,
}

impl<C, B, S> Session<C, B, S>
where
    C: ProtocolClient,
    B: BufferController,
    S: CommandSource,
{
    /// Session in state [`SessionState::Created`].
    pub fn new(client: Arc<C>, controller: Arc<B>, commands: S, config: SessionConfig) -> Self {
        let (state, _) = watch::channel(SessionState::Created);
        Self { client, controller, commands, config, cancel: CancellationToken::new(), state }
    }

    /// Control handle for this session.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle { cancel: self.cancel.clone(), state: self.state.subscribe() }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Run the session until it is closed.
    ///
    /// Returns `Ok` after an explicit quit and the fatal error after an
    /// authentication failure or a terminal sync failure.
    pub async fn run(mut self) -> Result<(), SessionError> {
        self.transition(SessionState::Authenticating)?;

        let login = tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                tracing::info!("cancelled during authentication");
                return self.transition(SessionState::Closed);
            },
            login = authenticate(self.client.as_ref(), &self.config.identity) => login,
        };
        let login = match login {
            Ok(login) => login,
            Err(e) => {
                tracing::error!(error = %e, "authentication failed");
                self.transition(SessionState::Closed)?;
                return Err(SessionError::Authentication(e));
            },
        };
        tracing::info!(user = %login.user_id, device = %login.device_id, "authenticated");

        self.transition(SessionState::Syncing)?;
        let dispatcher = EventDispatcher::new(
            Arc::clone(&self.client),
            Arc::clone(&self.controller),
            login.user_id,
            &self.config,
        )
        .with_cancellation(self.cancel.clone());
        let bridge = CommandBridge::new(Arc::clone(&self.client), dispatcher.directory());

        let sync = tokio::spawn(sync_loop(
            Arc::clone(&self.client),
            dispatcher,
            self.config.clone(),
            self.cancel.clone(),
        ));
        let abort = sync.abort_handle();
        let (outcome_tx, outcome_rx) = oneshot::channel();
        tokio::spawn(supervise(sync, outcome_tx, self.cancel.clone()));

        self.serve_commands(&bridge).await;

        self.transition(SessionState::ShuttingDown)?;
        teardown(self.client.as_ref(), self.config.shutdown_grace()).await;

        let grace = self.config.shutdown_grace();
        let outcome = match tokio::time::timeout(grace, outcome_rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(SessionError::SyncTaskFailed("supervisor exited early".into())),
            Err(_) => {
                tracing::warn!(?grace, "sync task did not stop, aborting");
                abort.abort();
                Ok(())
            },
        };

        self.transition(SessionState::Closed)?;
        outcome
    }

    /// Execute commands until the session is cancelled.
    async fn serve_commands(&mut self, bridge: &CommandBridge<C>) {
        let mut open = true;
        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return,
                request = self.commands.next_command(), if open => {
                    let Some(request) = request else {
                        tracing::debug!("command source closed");
                        open = false;
                        continue;
                    };
                    let result = tokio::select! {
                        biased;
                        () = self.cancel.cancelled() => Err(CommandError::SessionClosed),
                        result = bridge.dispatch(&request.command) => result,
                    };
                    if let Err(e) = &result {
                        tracing::warn!(
                            command = %request.command.name,
                            error = %e,
                            "command failed"
                        );
                    }
                    request.respond(result);
                },
            }
        }
    }

    fn transition(&self, next: SessionState) -> Result<(), SessionError> {
        let from = self.state();
        if !from.can_transition_to(next) {
            return Err(SessionError::InvalidTransition { from, to: next });
        }
        self.state.send_replace(next);
        tracing::info!(?from, to = ?next, "session state");
        Ok(())
    }
}

async fn authenticate<C: ProtocolClient>(
    client: &C,
    identity: &Identity,
) -> Result<LoginInfo, ClientError> {
    if identity.is_guest() {
        tracing::info!("registering guest account");
        client.register_guest(identity).await
    } else {
        tracing::info!(user = %identity.user, "logging in");
        client.login(identity).await
    }
}

/// Log out and stop sync. Runs exactly once per session.
async fn teardown<C: ProtocolClient>(client: &C, grace: Duration) {
    match tokio::time::timeout(grace, client.logout()).await {
        Ok(Ok(())) => tracing::info!("logged out"),
        Ok(Err(e)) => tracing::warn!(error = %e, "logout failed"),
        Err(_) => tracing::warn!(?grace, "logout timed out"),
    }
    client.stop_sync();
}

/// Feed event batches to the dispatcher until cancelled or the client fails.
///
/// A skipped batch pauses the loop for [`SessionConfig::retry_delay`] before
/// the next poll. The pause grows with each consecutive failure and resets
/// after a good batch.
async fn sync_loop<C: ProtocolClient, B: BufferController>(
    client: Arc<C>,
    mut dispatcher: EventDispatcher<C, B>,
    config: SessionConfig,
    cancel: CancellationToken,
) -> Result<(), ClientError> {
    let mut failures: u32 = 0;
    loop {
        let batch = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            batch = client.next_events() => batch,
        };

        match batch {
            Ok(events) => {
                failures = 0;
                tracing::trace!(count = events.len(), "sync batch");
                for event in events {
                    if cancel.is_cancelled() {
                        return Ok(());
                    }
                    dispatcher.on_event(event).await;
                }
            },
            // Stop requested by our own shutdown.
            Err(_) if cancel.is_cancelled() => return Ok(()),
            Err(e) if e.is_terminal() => return Err(e),
            Err(e) => {
                failures = failures.saturating_add(1);
                let delay = config.retry_delay(failures);
                tracing::warn!(error = %e, failures, ?delay, "sync batch skipped");
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Ok(()),
                    () = tokio::time::sleep(delay) => {},
                }
            },
        }
    }
}

/// Wait for the sync loop, report how it ended and cancel the session.
async fn supervise(
    sync: JoinHandle<Result<(), ClientError>>,
    outcome: oneshot::Sender<Result<(), SessionError>>,
    cancel: CancellationToken,
) {
    let result = match sync.await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "sync loop failed");
            Err(SessionError::Sync(e))
        },
        Err(e) => {
            tracing::error!(error = %e, "sync task failed");
            Err(SessionError::SyncTaskFailed(e.to_string()))
        },
    };
    cancel.cancel();
    if outcome.send(result).is_err() {
        tracing::debug!("session gone before sync outcome");
    }
}
