//! Connection to the sync peer.
//!
//! A session talks to exactly one [`Transport`]. Bidirectional transports
//! (WebSocket, in-memory) carry both directions on one channel; the push
//! transport receives server-sent events and posts outbound messages over
//! HTTP.

mod memory;
mod message;
mod push;
mod websocket;

use async_trait::async_trait;

use crate::error::Result;

pub use memory::{MemoryPeer, MemoryTransport};
pub use message::WireMessage;
pub use push::PushTransport;
pub use websocket::WebSocketTransport;

/// Identity presented when opening a channel.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectParams {
    pub user_id: String,
    /// Opaque bearer credential
    pub credential: String,
}

impl ConnectParams {
    pub fn new(user_id: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            credential: credential.into(),
        }
    }
}

impl std::fmt::Debug for ConnectParams {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ConnectParams")
            .field("user_id", &self.user_id)
            .field("credential", &"[REDACTED]")
            .finish()
    }
}

/// Channel capabilities the sync session relies on.
#[async_trait]
pub trait Transport: Send {
    /// Open the channel, replacing any previous one.
    async fn open(&mut self, params: &ConnectParams) -> Result<()>;

    /// Deliver one message. Fails when the channel is not open.
    async fn send(&mut self, message: &WireMessage) -> Result<()>;

    /// Next inbound message; `None` once the channel closed.
    ///
    /// Must be cancel safe: the session polls it inside `select!`.
    async fn next_message(&mut self) -> Option<Result<WireMessage>>;

    /// Close the channel. Closing a closed transport is a no-op.
    async fn close(&mut self);

    /// Whether the peer can also answer on the inbound channel.
    fn is_bidirectional(&self) -> bool;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Query string carrying the connect identity, shared by URL-based transports.
pub(crate) fn identity_query(params: &ConnectParams) -> String {
    format!(
        "user={}&token={}",
        urlencoding::encode(&params.user_id),
        urlencoding::encode(&params.credential)
    )
}

/// Append `query` to `url`, respecting an existing query string.
pub(crate) fn with_query(url: &str, query: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{query}")
}
