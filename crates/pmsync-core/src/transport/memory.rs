//! In-process transport pair for tests and embedding.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{ConnectParams, Transport, WireMessage};
use crate::error::{Error, Result};

#[derive(Default)]
struct PeerState {
    inbound: Option<mpsc::UnboundedSender<WireMessage>>,
    fail_opens: u32,
    fail_sends: u32,
    opens: Vec<ConnectParams>,
    sent: Vec<WireMessage>,
}

fn lock(state: &Mutex<PeerState>) -> MutexGuard<'_, PeerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Session side of an in-memory channel.
pub struct MemoryTransport {
    state: Arc<Mutex<PeerState>>,
    inbound: Option<mpsc::UnboundedReceiver<WireMessage>>,
    outbound: mpsc::UnboundedSender<WireMessage>,
    bidirectional: bool,
}

/// Scripted remote end of a [`MemoryTransport`].
pub struct MemoryPeer {
    state: Arc<Mutex<PeerState>>,
    outbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<WireMessage>>,
}

impl MemoryTransport {
    pub fn pair() -> (Self, MemoryPeer) {
        let state = Arc::new(Mutex::new(PeerState::default()));
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        (
            Self {
                state: state.clone(),
                inbound: None,
                outbound: outbound_tx,
                bidirectional: true,
            },
            MemoryPeer {
                state,
                outbound: tokio::sync::Mutex::new(outbound_rx),
            },
        )
    }

    /// Behave like a push transport (no heartbeat liveness checks).
    #[must_use]
    pub const fn one_way(mut self) -> Self {
        self.bidirectional = false;
        self
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(&mut self, params: &ConnectParams) -> Result<()> {
        let mut state = lock(&self.state);
        state.opens.push(params.clone());
        if state.fail_opens > 0 {
            state.fail_opens -= 1;
            return Err(Error::Transport("connection refused".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        state.inbound = Some(tx);
        self.inbound = Some(rx);
        Ok(())
    }

    async fn send(&mut self, message: &WireMessage) -> Result<()> {
        let mut state = lock(&self.state);
        if self.inbound.is_none() || state.inbound.is_none() {
            return Err(Error::Transport("memory channel is not open".to_string()));
        }
        if state.fail_sends > 0 {
            state.fail_sends -= 1;
            return Err(Error::Transport(format!("send {} rejected", message.kind())));
        }

        state.sent.push(message.clone());
        let _ = self.outbound.send(message.clone());
        Ok(())
    }

    async fn next_message(&mut self) -> Option<Result<WireMessage>> {
        self.inbound.as_mut()?.recv().await.map(Ok)
    }

    async fn close(&mut self) {
        self.inbound = None;
        lock(&self.state).inbound = None;
    }

    fn is_bidirectional(&self) -> bool {
        self.bidirectional
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

impl MemoryPeer {
    pub fn is_connected(&self) -> bool {
        lock(&self.state).inbound.is_some()
    }

    /// Deliver a message to the session. Returns `false` when not connected.
    pub fn inject(&self, message: WireMessage) -> bool {
        lock(&self.state)
            .inbound
            .as_ref()
            .is_some_and(|inbound| inbound.send(message).is_ok())
    }

    /// Close the channel from the remote side.
    pub fn drop_connection(&self) {
        lock(&self.state).inbound = None;
    }

    pub fn fail_next_opens(&self, count: u32) {
        lock(&self.state).fail_opens = count;
    }

    pub fn fail_next_sends(&self, count: u32) {
        lock(&self.state).fail_sends = count;
    }

    /// Number of open attempts seen, successful or not.
    pub fn open_count(&self) -> usize {
        lock(&self.state).opens.len()
    }

    pub fn last_params(&self) -> Option<ConnectParams> {
        lock(&self.state).opens.last().cloned()
    }

    /// Every message delivered so far, oldest first.
    pub fn sent(&self) -> Vec<WireMessage> {
        lock(&self.state).sent.clone()
    }

    /// Wait for the next delivered message.
    pub async fn next_sent(&self, timeout: Duration) -> Option<WireMessage> {
        let mut outbound = self.outbound.lock().await;
        tokio::time::timeout(timeout, outbound.recv())
            .await
            .ok()
            .flatten()
    }

    /// Wait until a delivered message matches `predicate`, skipping others.
    pub async fn wait_for<F>(&self, timeout: Duration, mut predicate: F) -> Option<WireMessage>
    where
        F: FnMut(&WireMessage) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let message = self.next_sent(remaining).await?;
            if predicate(&message) {
                return Some(message);
            }
        }
    }
}
