//! Conversation state core bridging an ACP agent backend to a client UI
//!
//! The backend publishes per-conversation events over named channels; this
//! crate subscribes to those channels, normalizes the loosely-typed wire
//! payloads into a typed model, and applies them to an in-memory
//! conversation aggregate through one serial queue per conversation.
//!
//! Layering, bottom to top:
//! - [`protocol`]: wire payload decoding (fails closed on unknown shapes)
//! - [`conversation`]: the typed conversation aggregate
//! - [`normalize`]: wire payloads to typed model values
//! - [`reducer`]: pure state transitions over the aggregate
//! - [`bridge`]: the transport seam and channel naming
//! - [`session`]: per-conversation tasks and the public manager API

#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)] // panics are lock poisoning only
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]

pub mod bridge;
pub mod conversation;
pub mod normalize;
pub mod protocol;
pub mod reducer;
pub mod session;

pub use bridge::{BridgeError, ChannelCategory, EventTransport, TransportError};
pub use conversation::{
    ConfirmationRequest, Conversation, Message, MessagePart, Sender, ToolCall, ToolName,
    ToolResult, ToolStatus,
};
pub use reducer::{apply, Effect, SessionEvent};
pub use session::{ConversationEvent, IoDirection, IoLogEntry, SessionManager};
