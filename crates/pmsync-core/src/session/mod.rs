//! Sync session: one long-lived connection to the sync peer.
//!
//! [`SyncSession::start`] spawns a task that owns the transport, the timers,
//! the reconnect counter and the in-memory pending queue. The returned handle
//! talks to it over a command channel and observes it through a status watch.
//!
//! While connected the task sends a `sync_request` and drains pending changes
//! on every sync interval, drains immediately when a local mutation commits,
//! and answers inbound requests and heartbeats. When the channel fails it
//! reconnects with exponential backoff until the attempt limit is reached.

mod backoff;
mod queue;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch, Notify};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use uuid::Uuid;

pub use backoff::Backoff;
pub use queue::PendingQueue;

use crate::applier::ChangeApplier;
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::events::{EventBus, SyncEvent};
use crate::models::{ChangeRecord, SyncWatermark};
use crate::state::{SessionState, SessionStatus};
use crate::store::LocalStore;
use crate::transport::{ConnectParams, Transport, WireMessage};
use crate::util::unix_millis_now;

const COMMAND_CAPACITY: usize = 32;

enum Command {
    Connect {
        params: ConnectParams,
        reply: oneshot::Sender<Result<()>>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    SyncNow {
        reply: oneshot::Sender<Result<usize>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a running sync session task.
///
/// Dropping every handle stops the task and closes the transport.
#[derive(Clone)]
pub struct SyncSession {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<SessionStatus>,
}

impl SyncSession {
    /// Spawn the session task. Must be called inside a Tokio runtime.
    ///
    /// `wake` is the notifier the change recorder signals after each commit.
    /// Fails with `InvalidInput` when `config` does not validate.
    pub fn start(
        store: LocalStore,
        applier: ChangeApplier,
        transport: Box<dyn Transport>,
        config: SessionConfig,
        wake: Arc<Notify>,
    ) -> Result<Self> {
        config.validate()?;
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (status_tx, status_rx) = watch::channel(SessionStatus::default());

        let task = SessionTask::new(
            store,
            applier,
            transport,
            &config,
            wake,
            commands_rx,
            status_tx,
        );
        tokio::spawn(task.run());

        Ok(Self {
            commands: commands_tx,
            status: status_rx,
        })
    }

    /// Open the channel with `params`. Resolves once connected; on failure
    /// the error is returned and a reconnect is scheduled.
    pub async fn connect(&self, params: ConnectParams) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.request(Command::Connect { params, reply }, response)
            .await?
    }

    /// Close the channel and cancel timers. No reconnect follows.
    pub async fn disconnect(&self) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.request(Command::Disconnect { reply }, response).await
    }

    /// Run one sync cycle now. Returns the number of changes pushed.
    pub async fn sync_now(&self) -> Result<usize> {
        let (reply, response) = oneshot::channel();
        self.request(Command::SyncNow { reply }, response).await?
    }

    /// Stop the task for good.
    pub async fn shutdown(&self) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.request(Command::Shutdown { reply }, response).await
    }

    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    async fn request<T>(&self, command: Command, response: oneshot::Receiver<T>) -> Result<T> {
        self.commands
            .send(command)
            .await
            .map_err(|_| Error::SessionClosed)?;
        response.await.map_err(|_| Error::SessionClosed)
    }
}

struct SessionTask {
    store: LocalStore,
    applier: ChangeApplier,
    events: EventBus,
    transport: Box<dyn Transport>,
    wake: Arc<Notify>,
    commands: mpsc::Receiver<Command>,
    status: watch::Sender<SessionStatus>,

    state: SessionState,
    params: Option<ConnectParams>,
    backoff: Backoff,
    queue: PendingQueue,
    last_error: Option<String>,

    connect_timeout: Duration,
    sync_timer: Interval,
    reconnect_at: Option<Instant>,
    heartbeat_interval: Option<Duration>,
    heartbeat_timeout: Duration,
    heartbeat_timer: Interval,
    last_inbound: Instant,
    /// When our last unanswered heartbeat went out
    heartbeat_sent_at: Option<Instant>,
}

impl SessionTask {
    fn new(
        store: LocalStore,
        applier: ChangeApplier,
        transport: Box<dyn Transport>,
        config: &SessionConfig,
        wake: Arc<Notify>,
        commands: mpsc::Receiver<Command>,
        status: watch::Sender<SessionStatus>,
    ) -> Self {
        let sync_interval = config.sync_interval();
        let heartbeat_interval = config.heartbeat_interval();

        Self {
            store,
            events: applier.events().clone(),
            applier,
            transport,
            wake,
            commands,
            status,
            state: SessionState::Disconnected,
            params: None,
            backoff: Backoff::new(
                config.reconnect_base_delay(),
                config.reconnect_max_delay(),
                config.max_reconnect_attempts,
            ),
            queue: PendingQueue::default(),
            last_error: None,
            connect_timeout: config.connect_timeout(),
            sync_timer: timer(sync_interval),
            reconnect_at: None,
            heartbeat_interval,
            heartbeat_timeout: config.heartbeat_timeout(),
            heartbeat_timer: timer(heartbeat_interval.unwrap_or(sync_interval)),
            last_inbound: Instant::now(),
            heartbeat_sent_at: None,
        }
    }

    async fn run(mut self) {
        tracing::debug!("Sync session started ({} transport)", self.transport.name());

        loop {
            let connected = self.state == SessionState::Connected;
            let heartbeats = connected && self.heartbeat_interval.is_some();
            let reconnect_at = self.reconnect_at;

            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        tracing::debug!("All session handles dropped, stopping");
                        self.stop().await;
                        break;
                    };
                    if self.handle_command(command).await {
                        break;
                    }
                }
                inbound = self.transport.next_message(), if connected => {
                    self.handle_inbound(inbound).await;
                }
                () = self.wake.notified(), if connected => {
                    if let Err(error) = self.drain_pending().await {
                        tracing::debug!("Push after local change failed: {error}");
                    }
                }
                _ = self.sync_timer.tick(), if connected => {
                    if let Err(error) = self.sync_cycle().await {
                        tracing::debug!("Periodic sync failed: {error}");
                    }
                }
                _ = self.heartbeat_timer.tick(), if heartbeats => {
                    self.check_liveness().await;
                }
                () = tokio::time::sleep_until(reconnect_at.unwrap_or_else(Instant::now)),
                    if reconnect_at.is_some() =>
                {
                    self.reconnect().await;
                }
            }
        }

        tracing::debug!("Sync session stopped");
    }

    /// Returns `true` when the task should exit.
    async fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Connect { params, reply } => {
                let result = self.connect(params).await;
                let _ = reply.send(result);
                false
            }
            Command::Disconnect { reply } => {
                self.disconnect().await;
                let _ = reply.send(());
                false
            }
            Command::SyncNow { reply } => {
                let result = if self.state == SessionState::Connected {
                    self.sync_cycle().await
                } else {
                    Err(Error::Transport(format!(
                        "cannot sync while {}",
                        self.state
                    )))
                };
                let _ = reply.send(result);
                false
            }
            Command::Shutdown { reply } => {
                self.stop().await;
                let _ = reply.send(());
                true
            }
        }
    }

    async fn connect(&mut self, params: ConnectParams) -> Result<()> {
        tracing::info!(
            "Connecting as {} over {}",
            params.user_id,
            self.transport.name()
        );
        if self.state == SessionState::Connected {
            self.transport.close().await;
        }

        self.backoff.reset();
        self.reconnect_at = None;
        self.params = Some(params);

        match self.open().await {
            Ok(()) => Ok(()),
            Err(error) => {
                self.connection_lost(&error).await;
                Err(error)
            }
        }
    }

    async fn disconnect(&mut self) {
        self.reconnect_at = None;
        self.params = None;
        self.transport.close().await;
        self.backoff.reset();
        self.set_state(SessionState::Disconnected);
        tracing::info!("Disconnected");
    }

    async fn stop(&mut self) {
        self.reconnect_at = None;
        self.transport.close().await;
        self.set_state(SessionState::Stopped);
    }

    async fn reconnect(&mut self) {
        self.reconnect_at = None;
        tracing::info!(
            "Reconnect attempt {} over {}",
            self.backoff.attempts(),
            self.transport.name()
        );

        match self.open().await {
            Ok(()) => tracing::info!("Reconnected"),
            Err(error) => self.connection_lost(&error).await,
        }
    }

    /// Open the transport with the stored identity, bounded by the connect timeout.
    async fn open(&mut self) -> Result<()> {
        let Some(params) = self.params.clone() else {
            return Err(Error::InvalidInput(
                "no identity to connect with".to_string(),
            ));
        };

        self.set_state(SessionState::Connecting);
        let opened = tokio::time::timeout(self.connect_timeout, self.transport.open(&params))
            .await
            .unwrap_or_else(|_| {
                Err(Error::Transport(format!(
                    "connect timed out after {} ms",
                    self.connect_timeout.as_millis()
                )))
            });
        opened?;

        self.backoff.reset();
        self.last_error = None;
        self.heartbeat_sent_at = None;
        self.last_inbound = Instant::now();
        self.sync_timer.reset();
        self.heartbeat_timer.reset();
        self.set_state(SessionState::Connected);

        // Flush work accumulated while offline
        if let Err(error) = self.sync_cycle().await {
            tracing::debug!("Initial sync failed: {error}");
        }
        Ok(())
    }

    /// Close the channel and schedule the next attempt, or give up.
    async fn connection_lost(&mut self, error: &Error) {
        tracing::warn!("Sync connection failed: {error}");
        self.transport.close().await;
        self.last_error = Some(error.to_string());

        if let Some(delay) = self.backoff.next_delay() {
            tracing::warn!(
                "Reconnecting in {} ms (attempt {})",
                delay.as_millis(),
                self.backoff.attempts()
            );
            self.reconnect_at = Some(Instant::now() + delay);
            self.set_state(SessionState::Reconnecting);
        } else {
            let attempts = self.backoff.attempts();
            let exhausted = Error::ExhaustedRetries { attempts };
            tracing::error!("{exhausted}");
            self.reconnect_at = None;
            self.last_error = Some(exhausted.to_string());
            self.set_state(SessionState::Stopped);
            self.events.publish(SyncEvent::Offline { attempts });
        }
    }

    /// Ask the peer for changes since the watermark, then push pending ones.
    async fn sync_cycle(&mut self) -> Result<usize> {
        let watermark = self.store.load_watermark().await?;
        let request = WireMessage::SyncRequest {
            id: Uuid::now_v7().to_string(),
            last_sync_time: watermark.last_sync_time,
            timestamp: unix_millis_now(),
        };
        self.send(&request).await?;
        self.drain_pending().await
    }

    /// Send every pending change as a `data_change`, marking each synced
    /// after it was delivered.
    async fn drain_pending(&mut self) -> Result<usize> {
        let records = self.store.changes_since(0).await?;
        self.queue.refill(records);

        let mut pushed = 0;
        while let Some(change) = self.queue.pop() {
            let message = WireMessage::DataChange {
                change: change.clone(),
            };
            if let Err(error) = self.send(&message).await {
                self.queue.restore(change);
                return Err(error);
            }
            self.applier.acknowledge(&change.id).await?;
            pushed += 1;
        }

        if pushed > 0 {
            tracing::debug!("Pushed {pushed} pending change(s)");
            self.events.publish(SyncEvent::ChangesPushed { changes: pushed });
        }
        Ok(pushed)
    }

    /// Send on the open channel; a failure drops the connection.
    async fn send(&mut self, message: &WireMessage) -> Result<()> {
        match self.transport.send(message).await {
            Ok(()) => Ok(()),
            Err(error) => {
                if self.state == SessionState::Connected {
                    self.connection_lost(&error).await;
                }
                Err(error)
            }
        }
    }

    async fn handle_inbound(&mut self, inbound: Option<Result<WireMessage>>) {
        let message = match inbound {
            Some(Ok(message)) => message,
            Some(Err(error)) if error.is_transport() => {
                self.connection_lost(&error).await;
                return;
            }
            Some(Err(error)) => {
                tracing::warn!("Ignoring malformed message: {error}");
                self.last_inbound = Instant::now();
                return;
            }
            None => {
                let error = Error::Transport("connection closed by peer".to_string());
                self.connection_lost(&error).await;
                return;
            }
        };

        self.last_inbound = Instant::now();
        tracing::trace!("Received {}", message.kind());
        let is_heartbeat = matches!(message, WireMessage::Heartbeat { .. });

        let result = match message {
            WireMessage::SyncRequest {
                id, last_sync_time, ..
            } => self.answer_sync_request(id, last_sync_time).await,
            WireMessage::SyncResponse {
                changes, timestamp, ..
            } => self.apply_sync_response(&changes, timestamp).await,
            WireMessage::DataChange { change } => self.applier.apply_remote_change(&change).await,
            WireMessage::Heartbeat { .. } => self.answer_heartbeat().await,
        };
        if !is_heartbeat {
            // Any traffic proves liveness; a later peer heartbeat needs an answer.
            self.heartbeat_sent_at = None;
        }

        if let Err(error) = result {
            tracing::warn!("Handling inbound message failed: {error}");
        }
    }

    /// Pending changes are offered to the requester but stay pending until
    /// delivered as `data_change`.
    async fn answer_sync_request(&mut self, request_id: String, since: i64) -> Result<()> {
        let changes = self.store.changes_since(since).await?;
        tracing::debug!(
            "Answering sync request {request_id} with {} change(s)",
            changes.len()
        );
        let response = WireMessage::SyncResponse {
            request_id,
            changes,
            timestamp: unix_millis_now(),
        };
        self.send(&response).await
    }

    async fn apply_sync_response(&mut self, changes: &[ChangeRecord], timestamp: i64) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }

        let applied = self.applier.apply_batch(changes).await?;
        self.store
            .save_watermark(&SyncWatermark::advanced(
                timestamp,
                u64::try_from(applied).unwrap_or(u64::MAX),
            ))
            .await?;
        tracing::info!("Applied {applied} remote change(s)");
        self.events.publish(SyncEvent::BatchApplied {
            changes: applied,
            watermark: timestamp,
        });
        Ok(())
    }

    /// A heartbeat arriving within one interval of our own heartbeat is its
    /// reply and is not echoed back; anything else gets answered.
    async fn answer_heartbeat(&mut self) -> Result<()> {
        if let Some(sent_at) = self.heartbeat_sent_at.take() {
            let window = self.heartbeat_interval.unwrap_or(self.heartbeat_timeout);
            if sent_at.elapsed() <= window {
                return Ok(());
            }
        }
        self.send(&WireMessage::Heartbeat {
            timestamp: unix_millis_now(),
        })
        .await
    }

    /// Ping an idle channel; drop a bidirectional one that stayed silent
    /// past the heartbeat timeout.
    async fn check_liveness(&mut self) {
        let Some(interval) = self.heartbeat_interval else {
            return;
        };
        let idle = self.last_inbound.elapsed();

        if self.transport.is_bidirectional() && idle >= self.heartbeat_timeout {
            let error = Error::Transport(format!(
                "no traffic from peer for {} ms",
                idle.as_millis()
            ));
            self.connection_lost(&error).await;
            return;
        }

        if idle >= interval {
            let ping = WireMessage::Heartbeat {
                timestamp: unix_millis_now(),
            };
            if self.send(&ping).await.is_ok() {
                self.heartbeat_sent_at = Some(Instant::now());
            }
        }
    }

    fn set_state(&mut self, state: SessionState) {
        let changed = self.state != state;
        self.state = state;
        self.status.send_replace(SessionStatus {
            state,
            reconnect_attempts: self.backoff.attempts(),
            last_error: self.last_error.clone(),
        });

        if changed {
            tracing::debug!("Session state: {state}");
            self.events.publish(SyncEvent::StateChanged(state));
        }
    }
}

fn timer(period: Duration) -> Interval {
    let mut timer = tokio::time::interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}
