//! Event channel bridge: transport seam and channel naming
//!
//! The backend publishes per-conversation events over a named-channel
//! transport (a websocket bridge in web builds, an IPC event bus in native
//! builds). The transport is abstracted behind [`EventTransport`] so the
//! session layer can be driven by a mock in tests, the same way the
//! conversation runtime abstracts its storage and LLM dependencies.
//!
//! The transport is assumed to deliver at least once and in order within a
//! single channel; nothing is assumed about ordering across channels.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

/// Per-conversation event categories, each carried on its own channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelCategory {
    /// Raw I/O trace frames (plus JSON-RPC sniffing input).
    Io,
    /// Assistant text stream chunks.
    Text,
    /// Assistant thinking/reasoning stream chunks.
    Thought,
    /// Unified session updates (tool-call lifecycle, chunk fallbacks).
    SessionUpdate,
    /// Backend error strings.
    Error,
    /// Permission requests.
    Permission,
    /// Turn-finished marker (payload ignored, presence is the signal).
    TurnFinished,
}

impl ChannelCategory {
    pub const ALL: [ChannelCategory; 7] = [
        ChannelCategory::Io,
        ChannelCategory::Text,
        ChannelCategory::Thought,
        ChannelCategory::SessionUpdate,
        ChannelCategory::Error,
        ChannelCategory::Permission,
        ChannelCategory::TurnFinished,
    ];

    fn slug(self) -> &'static str {
        match self {
            ChannelCategory::Io => "io",
            ChannelCategory::Text => "text",
            ChannelCategory::Thought => "thought",
            ChannelCategory::SessionUpdate => "session-update",
            ChannelCategory::Error => "error",
            ChannelCategory::Permission => "permission",
            ChannelCategory::TurnFinished => "turn-finished",
        }
    }

    /// Channel name templated with the conversation id.
    pub fn channel_name(self, conversation_id: &str) -> String {
        format!("acp-{}-{conversation_id}", self.slug())
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport not connected: {0}")]
    NotConnected(String),
    #[error("subscription failed: {0}")]
    Subscribe(String),
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("failed to register listener on {channel}: {source}")]
    Register {
        channel: String,
        source: TransportError,
    },
    #[error("no session for conversation {0}")]
    UnknownConversation(String),
    #[error("session for conversation {0} has shut down")]
    SessionClosed(String),
}

/// Asynchronous named-channel subscribe primitive.
///
/// `subscribe` registers a listener for a channel and hands back the
/// receiving end; events keep flowing for the life of the receiver. The
/// readiness handshake must be awaited before registering channels so the
/// first server events are not dropped.
#[async_trait]
pub trait EventTransport: Send + Sync + 'static {
    /// Wait until the transport is ready to register listeners. For
    /// transports without a handshake this resolves immediately.
    async fn wait_for_connection(&self) -> Result<(), TransportError>;

    /// Register a listener on a named channel.
    async fn subscribe(&self, channel: &str) -> Result<mpsc::Receiver<Value>, TransportError>;
}
