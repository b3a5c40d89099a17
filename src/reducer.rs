//! Conversation state updater
//!
//! One entry point, [`apply`], takes the conversation aggregate and a
//! normalized session event and mutates the aggregate in place. Every
//! mutation in the crate routes through this function via the session
//! task's serial queue, which is what makes the read-modify-write cycle
//! atomic with respect to other updates.
//!
//! The function is total over all event shapes: malformed or unmatched
//! updates degrade to logged no-ops, never panics or errors.

#[cfg(test)]
mod proptests;

use crate::conversation::{
    ConfirmationRequest, Conversation, Message, MessagePart, ToolCall, ToolResult, ToolStatus,
};

/// A normalized event ready to be applied to a conversation.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Streamed assistant text.
    TextChunk { text: String },
    /// Streamed assistant reasoning.
    ThoughtChunk { text: String },
    /// A new tool call, already normalized.
    ToolCallStart { call: ToolCall },
    /// Status/result update for an existing tool call.
    ToolCallUpdate {
        id: String,
        status: ToolStatus,
        result: Option<ToolResult>,
    },
    /// Permission request; `fallback` is the synthesized tool call to
    /// append when the referenced id is unknown.
    PermissionRequest {
        request: ConfirmationRequest,
        fallback: ToolCall,
    },
    /// Error reported by the backend; rendered as an assistant message.
    BackendError { message: String },
    /// The agent's turn ended.
    TurnFinished,
}

/// Side effect the caller must execute after a successful apply.
#[derive(Debug, Clone)]
pub enum Effect {
    /// Mirror a confirmation request into the side compatibility map.
    PublishConfirmation {
        tool_call_id: String,
        request: ConfirmationRequest,
    },
}

/// Outcome of applying one event.
#[derive(Debug, Default)]
pub struct ApplyOutcome {
    /// Whether observers should be notified of a new snapshot.
    pub changed: bool,
    pub effect: Option<Effect>,
}

impl ApplyOutcome {
    fn changed() -> Self {
        Self {
            changed: true,
            effect: None,
        }
    }

    fn unchanged() -> Self {
        Self::default()
    }

    fn with_effect(mut self, effect: Effect) -> Self {
        self.effect = Some(effect);
        self
    }
}

/// Apply one normalized event to the conversation.
pub fn apply(conv: &mut Conversation, event: SessionEvent) -> ApplyOutcome {
    match event {
        SessionEvent::TextChunk { text } => {
            conv.append_text(&text);
            conv.is_streaming = true;
            conv.touch();
            ApplyOutcome::changed()
        }

        SessionEvent::ThoughtChunk { text } => {
            conv.append_thought(&text);
            conv.is_streaming = true;
            conv.touch();
            ApplyOutcome::changed()
        }

        SessionEvent::ToolCallStart { call } => {
            tracing::debug!(
                conv_id = %conv.id,
                tool_call_id = %call.id,
                tool = %call.name,
                "tool call started"
            );
            conv.push_tool_call(call);
            conv.is_streaming = true;
            conv.touch();
            ApplyOutcome::changed()
        }

        SessionEvent::ToolCallUpdate { id, status, result } => {
            let Some(call) = conv.tool_call_mut(&id) else {
                tracing::error!(conv_id = %conv.id, tool_call_id = %id, "update for unknown tool call");
                return ApplyOutcome::unchanged();
            };

            // Sticky rejection: a user-rejected call keeps its status and
            // result no matter what the backend reports afterwards. The
            // attached confirmation request survives either way.
            if call.is_rejected() {
                tracing::debug!(tool_call_id = %id, "skipping update for rejected tool call");
                return ApplyOutcome::unchanged();
            }

            call.status = status;
            if let Some(result) = result {
                call.result = Some(result);
            }
            conv.touch();
            ApplyOutcome::changed()
        }

        SessionEvent::PermissionRequest { request, fallback } => {
            // A permission request always means generation has paused.
            conv.is_streaming = false;

            let tool_call_id = request.tool_call_id.clone();
            let effect = Effect::PublishConfirmation {
                tool_call_id: tool_call_id.clone(),
                request: request.clone(),
            };

            if let Some(call) = conv.tool_call_mut(&tool_call_id) {
                call.status = fallback.status;
                call.confirmation_request = Some(request);
            } else {
                let mut call = fallback;
                call.confirmation_request = Some(request);
                conv.push_tool_call(call);
            }
            conv.touch();
            ApplyOutcome::changed().with_effect(effect)
        }

        SessionEvent::BackendError { message } => {
            let mut error_message = Message::assistant();
            error_message.parts.push(MessagePart::Text {
                text: format!("❌ **Error**: {message}"),
            });
            conv.push_message(error_message);
            conv.is_streaming = false;
            conv.touch();
            ApplyOutcome::changed()
        }

        SessionEvent::TurnFinished => {
            // Non-structural: observers still get the cleared streaming
            // flag, but `last_updated` tracks message/tool-call changes
            // only, so an empty turn does not look like new content.
            conv.is_streaming = false;
            ApplyOutcome::changed()
        }
    }
}
