//! Per-conversation session tasks and the manager that owns them
//!
//! Every conversation gets one task that exclusively owns its
//! [`Conversation`] aggregate and drains a single command queue. Bridge
//! events, consumer mutations, and snapshot queries all travel through
//! that queue, so each read-modify-write cycle completes before the next
//! begins — including updates that raced in from different channels. This
//! serial queue is the ordering barrier between a `tool_call` start and a
//! fast-following `tool_call_update`.

use crate::bridge::{BridgeError, ChannelCategory, EventTransport};
use crate::conversation::{ConfirmationRequest, Conversation, Message};
use crate::normalize::{
    map_status, normalize_confirmation, normalize_tool_result, tool_call_from_wire,
};
use crate::protocol::{
    IoTracePayload, JsonRpcFrame, PermissionRequestPayload, SessionUpdatePayload,
    METHOD_REQUEST_CONFIRMATION, METHOD_UPDATE_TOOL_CALL,
};
use crate::reducer::{apply, Effect, SessionEvent};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

/// Settle delay after all channel listeners are registered, before setup
/// resolves. Preserved from the source client's setup contract.
const REGISTRATION_SETTLE: Duration = Duration::from_millis(50);

const COMMAND_QUEUE_DEPTH: usize = 64;
const BROADCAST_DEPTH: usize = 128;

/// Direction of a raw I/O trace entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IoDirection {
    Input,
    Output,
}

#[derive(Debug, Clone, Serialize)]
pub struct IoLogEntry {
    pub timestamp: DateTime<Utc>,
    pub direction: IoDirection,
    pub data: String,
}

/// Append-only sink for raw I/O trace entries, shared across conversations.
#[derive(Debug, Clone, Default)]
pub struct IoLogs(Arc<Mutex<Vec<IoLogEntry>>>);

impl IoLogs {
    fn append(&self, direction: IoDirection, data: String) {
        let entry = IoLogEntry {
            timestamp: Utc::now(),
            direction,
            data,
        };
        self.0.lock().expect("io log lock poisoned").push(entry);
    }

    pub fn entries(&self) -> Vec<IoLogEntry> {
        self.0.lock().expect("io log lock poisoned").clone()
    }
}

/// Side compatibility map: tool-call id to its latest published
/// confirmation request. Written on publication only (last-write-wins);
/// it does not track later mutation of the copy attached to the tool call.
#[derive(Debug, Clone, Default)]
pub struct ConfirmationRequests(Arc<Mutex<HashMap<String, ConfirmationRequest>>>);

impl ConfirmationRequests {
    fn insert(&self, tool_call_id: String, request: ConfirmationRequest) {
        self.0
            .lock()
            .expect("confirmation map lock poisoned")
            .insert(tool_call_id, request);
    }

    pub fn get(&self, tool_call_id: &str) -> Option<ConfirmationRequest> {
        self.0
            .lock()
            .expect("confirmation map lock poisoned")
            .get(tool_call_id)
            .cloned()
    }

    pub fn remove(&self, tool_call_id: &str) -> Option<ConfirmationRequest> {
        self.0
            .lock()
            .expect("confirmation map lock poisoned")
            .remove(tool_call_id)
    }
}

/// Snapshot notification sent to observers after each applied change.
#[derive(Debug, Clone)]
pub enum ConversationEvent {
    Updated { conversation: Conversation },
}

enum SessionCommand {
    Event(SessionEvent),
    /// Raw output frame for JSON-RPC sniffing.
    OutputFrame { data: String },
    Mutate(Box<dyn FnOnce(&mut Conversation) + Send>),
    UserMessage { text: String },
    Snapshot { reply: oneshot::Sender<Conversation> },
}

struct SessionHandle {
    command_tx: mpsc::Sender<SessionCommand>,
    broadcast_tx: broadcast::Sender<ConversationEvent>,
}

/// The task that owns one conversation's state.
struct ConversationSession {
    conversation: Conversation,
    command_rx: mpsc::Receiver<SessionCommand>,
    broadcast_tx: broadcast::Sender<ConversationEvent>,
    confirmations: ConfirmationRequests,
    /// Most recent raw frame whose JSON-RPC method announced a pending
    /// permission request; consumed by the next confirmation. Scoped to
    /// this conversation (the source kept one process-global slot, which
    /// races under concurrent conversations).
    pending_input_frame: Option<String>,
}

impl ConversationSession {
    async fn run(mut self) {
        tracing::debug!(conv_id = %self.conversation.id, "conversation session started");
        while let Some(command) = self.command_rx.recv().await {
            self.handle_command(command);
        }
        tracing::debug!(conv_id = %self.conversation.id, "conversation session stopped");
    }

    fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Event(event) => {
                let event = self.correlate(event);
                let outcome = apply(&mut self.conversation, event);
                if let Some(Effect::PublishConfirmation {
                    tool_call_id,
                    request,
                }) = outcome.effect
                {
                    self.confirmations.insert(tool_call_id, request);
                }
                if outcome.changed {
                    self.notify();
                }
            }

            SessionCommand::OutputFrame { data } => self.sniff_output_frame(&data),

            SessionCommand::Mutate(mutate) => {
                mutate(&mut self.conversation);
                self.conversation.touch();
                self.notify();
            }

            SessionCommand::UserMessage { text } => {
                self.conversation.push_message(Message::user(text));
                self.conversation.touch();
                self.notify();
            }

            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.conversation.clone());
            }
        }
    }

    /// Attach the correlated raw input frame to an inbound confirmation.
    fn correlate(&mut self, event: SessionEvent) -> SessionEvent {
        match event {
            SessionEvent::PermissionRequest {
                mut request,
                fallback,
            } => {
                request.input_json_rpc = self.pending_input_frame.take();
                SessionEvent::PermissionRequest { request, fallback }
            }
            other => other,
        }
    }

    /// Most output frames are terminal noise; the two JSON-RPC methods we
    /// care about correlate permission requests and capture raw tool-call
    /// updates for debugging. Parse failure is expected and silent.
    fn sniff_output_frame(&mut self, data: &str) {
        let Some(frame) = JsonRpcFrame::sniff(data) else {
            return;
        };
        match frame.method.as_deref() {
            Some(METHOD_REQUEST_CONFIRMATION) => {
                self.pending_input_frame = Some(data.to_string());
            }
            Some(METHOD_UPDATE_TOOL_CALL) => {
                let Some(id) = frame.tool_call_id() else {
                    return;
                };
                if let Some(call) = self.conversation.tool_call_mut(id) {
                    call.output_json_rpc = Some(data.to_string());
                }
            }
            _ => {}
        }
    }

    fn notify(&self) {
        // Send errors just mean nobody is subscribed right now.
        let _ = self.broadcast_tx.send(ConversationEvent::Updated {
            conversation: self.conversation.clone(),
        });
    }
}

/// Owns the per-conversation sessions, the side confirmation map, and the
/// raw I/O log sink.
pub struct SessionManager<T: EventTransport> {
    transport: Arc<T>,
    sessions: RwLock<HashMap<String, SessionHandle>>,
    confirmations: ConfirmationRequests,
    io_logs: IoLogs,
}

impl<T: EventTransport> SessionManager<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport: Arc::new(transport),
            sessions: RwLock::new(HashMap::new()),
            confirmations: ConfirmationRequests::default(),
            io_logs: IoLogs::default(),
        }
    }

    /// Handle to the side confirmation-request compatibility map.
    pub fn confirmation_requests(&self) -> ConfirmationRequests {
        self.confirmations.clone()
    }

    /// Handle to the raw I/O trace log.
    pub fn io_logs(&self) -> IoLogs {
        self.io_logs.clone()
    }

    /// Register listeners for every event category of a conversation.
    ///
    /// Resolves only after the transport readiness handshake completes,
    /// all channels are registered, and a short settle delay has elapsed.
    /// Callers must await this before sending the first user message of a
    /// brand-new conversation or early server events may be dropped.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Register`] naming the failing channel if any
    /// registration fails. Listeners registered before the failure are not
    /// torn down; the caller decides whether to retry or abandon the
    /// conversation.
    pub async fn setup_event_listeners(&self, conversation_id: &str) -> Result<(), BridgeError> {
        let command_tx = self.get_or_create(conversation_id).await;

        self.transport.wait_for_connection().await?;

        for category in ChannelCategory::ALL {
            let channel = category.channel_name(conversation_id);
            let receiver =
                self.transport
                    .subscribe(&channel)
                    .await
                    .map_err(|source| {
                        tracing::error!(conv_id = %conversation_id, %channel, %source, "channel registration failed");
                        BridgeError::Register {
                            channel: channel.clone(),
                            source,
                        }
                    })?;
            spawn_forwarder(category, receiver, command_tx.clone(), self.io_logs.clone());
        }

        tokio::time::sleep(REGISTRATION_SETTLE).await;
        tracing::info!(conv_id = %conversation_id, "event listeners registered");
        Ok(())
    }

    async fn get_or_create(&self, conversation_id: &str) -> mpsc::Sender<SessionCommand> {
        {
            let sessions = self.sessions.read().await;
            if let Some(handle) = sessions.get(conversation_id) {
                return handle.command_tx.clone();
            }
        }

        let mut sessions = self.sessions.write().await;
        if let Some(handle) = sessions.get(conversation_id) {
            return handle.command_tx.clone();
        }

        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let (broadcast_tx, _) = broadcast::channel(BROADCAST_DEPTH);
        let session = ConversationSession {
            conversation: Conversation::new(conversation_id, String::new()),
            command_rx,
            broadcast_tx: broadcast_tx.clone(),
            confirmations: self.confirmations.clone(),
            pending_input_frame: None,
        };
        tokio::spawn(session.run());

        sessions.insert(
            conversation_id.to_string(),
            SessionHandle {
                command_tx: command_tx.clone(),
                broadcast_tx,
            },
        );
        command_tx
    }

    async fn handle(&self, conversation_id: &str) -> Result<mpsc::Sender<SessionCommand>, BridgeError> {
        let sessions = self.sessions.read().await;
        sessions
            .get(conversation_id)
            .map(|handle| handle.command_tx.clone())
            .ok_or_else(|| BridgeError::UnknownConversation(conversation_id.to_string()))
    }

    async fn send(
        &self,
        conversation_id: &str,
        command: SessionCommand,
    ) -> Result<(), BridgeError> {
        self.handle(conversation_id)
            .await?
            .send(command)
            .await
            .map_err(|_| BridgeError::SessionClosed(conversation_id.to_string()))
    }

    /// The sole sanctioned external mutation path: the closure runs inside
    /// the conversation's serial queue, after every previously enqueued
    /// update has been applied.
    ///
    /// # Errors
    ///
    /// Fails if the conversation has no session or its session stopped.
    pub async fn update_conversation<F>(
        &self,
        conversation_id: &str,
        mutate: F,
    ) -> Result<(), BridgeError>
    where
        F: FnOnce(&mut Conversation) + Send + 'static,
    {
        self.send(conversation_id, SessionCommand::Mutate(Box::new(mutate)))
            .await
    }

    /// Append a user message through the serialized update path.
    ///
    /// # Errors
    ///
    /// Fails if the conversation has no session or its session stopped.
    pub async fn push_user_message(
        &self,
        conversation_id: &str,
        text: impl Into<String> + Send,
    ) -> Result<(), BridgeError> {
        self.send(
            conversation_id,
            SessionCommand::UserMessage { text: text.into() },
        )
        .await
    }

    /// Current snapshot of the conversation aggregate.
    ///
    /// # Errors
    ///
    /// Fails if the conversation has no session or its session stopped.
    pub async fn snapshot(&self, conversation_id: &str) -> Result<Conversation, BridgeError> {
        let (reply, rx) = oneshot::channel();
        self.send(conversation_id, SessionCommand::Snapshot { reply })
            .await?;
        rx.await
            .map_err(|_| BridgeError::SessionClosed(conversation_id.to_string()))
    }

    /// Subscribe to snapshot notifications for a conversation.
    ///
    /// # Errors
    ///
    /// Fails if the conversation has no session.
    pub async fn subscribe(
        &self,
        conversation_id: &str,
    ) -> Result<broadcast::Receiver<ConversationEvent>, BridgeError> {
        let sessions = self.sessions.read().await;
        sessions
            .get(conversation_id)
            .map(|handle| handle.broadcast_tx.subscribe())
            .ok_or_else(|| BridgeError::UnknownConversation(conversation_id.to_string()))
    }

    /// Snapshot notifications as a stream; lagged observers skip ahead.
    ///
    /// # Errors
    ///
    /// Fails if the conversation has no session.
    pub async fn updates(
        &self,
        conversation_id: &str,
    ) -> Result<impl Stream<Item = ConversationEvent>, BridgeError> {
        let receiver = self.subscribe(conversation_id).await?;
        Ok(BroadcastStream::new(receiver).filter_map(Result::ok))
    }
}

/// Spawn the task that decodes one channel's payloads into session
/// commands. Per-channel delivery order is preserved by the forwarding
/// queue; cross-channel ordering is resolved by the session's own queue.
fn spawn_forwarder(
    category: ChannelCategory,
    mut receiver: mpsc::Receiver<Value>,
    command_tx: mpsc::Sender<SessionCommand>,
    io_logs: IoLogs,
) {
    tokio::spawn(async move {
        while let Some(payload) = receiver.recv().await {
            let Some(command) = decode(category, payload, &io_logs) else {
                continue;
            };
            if command_tx.send(command).await.is_err() {
                // Session stopped; nothing left to forward to.
                break;
            }
        }
    });
}

fn decode(category: ChannelCategory, payload: Value, io_logs: &IoLogs) -> Option<SessionCommand> {
    match category {
        ChannelCategory::Io => match serde_json::from_value::<IoTracePayload>(payload) {
            Ok(IoTracePayload::Input { data }) => {
                io_logs.append(IoDirection::Input, data);
                None
            }
            Ok(IoTracePayload::Output { data }) => {
                io_logs.append(IoDirection::Output, data.clone());
                Some(SessionCommand::OutputFrame { data })
            }
            Err(error) => {
                tracing::warn!(%error, "dropping malformed io trace payload");
                None
            }
        },

        ChannelCategory::Text => chunk_text(&payload)
            .map(|text| SessionCommand::Event(SessionEvent::TextChunk { text })),

        ChannelCategory::Thought => chunk_text(&payload)
            .map(|text| SessionCommand::Event(SessionEvent::ThoughtChunk { text })),

        ChannelCategory::SessionUpdate => {
            match serde_json::from_value::<SessionUpdatePayload>(payload) {
                Ok(update) => Some(SessionCommand::Event(session_update_event(update))),
                Err(error) => {
                    tracing::warn!(%error, "dropping unrecognized session update");
                    None
                }
            }
        }

        ChannelCategory::Error => match payload {
            Value::String(message) => {
                Some(SessionCommand::Event(SessionEvent::BackendError { message }))
            }
            other => {
                tracing::warn!(payload = %other, "dropping non-string error payload");
                None
            }
        },

        ChannelCategory::Permission => {
            match serde_json::from_value::<PermissionRequestPayload>(payload) {
                Ok(request) => {
                    let (request, fallback) = normalize_confirmation(&request);
                    Some(SessionCommand::Event(SessionEvent::PermissionRequest {
                        request,
                        fallback,
                    }))
                }
                Err(error) => {
                    tracing::warn!(%error, "dropping malformed permission request");
                    None
                }
            }
        }

        // Payload is a bool whose value is ignored; arrival is the signal.
        ChannelCategory::TurnFinished => Some(SessionCommand::Event(SessionEvent::TurnFinished)),
    }
}

fn session_update_event(update: SessionUpdatePayload) -> SessionEvent {
    match update {
        SessionUpdatePayload::ToolCall(event) => SessionEvent::ToolCallStart {
            call: tool_call_from_wire(&event),
        },
        SessionUpdatePayload::ToolCallUpdate(event) => {
            let status = map_status(event.status.as_deref());
            let result = event
                .content
                .as_deref()
                .map(|content| normalize_tool_result(content, status));
            SessionEvent::ToolCallUpdate {
                id: event.tool_call_id,
                status,
                result,
            }
        }
        SessionUpdatePayload::AgentMessageChunk(event) => SessionEvent::TextChunk {
            text: event.text().to_string(),
        },
        SessionUpdatePayload::AgentThoughtChunk(event) => SessionEvent::ThoughtChunk {
            text: event.text().to_string(),
        },
    }
}

/// Dedicated chunk channels carry either a bare string or a text block.
fn chunk_text(payload: &Value) -> Option<String> {
    match payload {
        Value::String(text) => Some(text.clone()),
        Value::Object(map) => map
            .get("text")
            .and_then(Value::as_str)
            .map(ToString::to_string),
        other => {
            tracing::warn!(payload = %other, "dropping unrecognized chunk payload");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::TransportError;
    use crate::conversation::{MessagePart, ToolResult, ToolStatus};
    use async_trait::async_trait;
    use serde_json::json;

    /// In-memory transport: tests push payloads into registered channels.
    #[derive(Default)]
    struct MockTransport {
        channels: Mutex<HashMap<String, mpsc::Sender<Value>>>,
    }

    impl MockTransport {
        async fn emit(&self, channel: &str, payload: Value) {
            let sender = self
                .channels
                .lock()
                .expect("channel lock")
                .get(channel)
                .cloned()
                .unwrap_or_else(|| panic!("no listener on {channel}"));
            sender.send(payload).await.expect("listener alive");
        }
    }

    #[async_trait]
    impl EventTransport for Arc<MockTransport> {
        async fn wait_for_connection(&self) -> Result<(), TransportError> {
            Ok(())
        }

        async fn subscribe(&self, channel: &str) -> Result<mpsc::Receiver<Value>, TransportError> {
            let (tx, rx) = mpsc::channel(16);
            self.channels
                .lock()
                .expect("channel lock")
                .insert(channel.to_string(), tx);
            Ok(rx)
        }
    }

    /// Route session logs through the test writer; `RUST_LOG` overrides
    /// the default filter when debugging a failing test.
    fn init_test_tracing() {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "acp_bridge=debug".into()),
            )
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init();
    }

    async fn setup() -> (Arc<MockTransport>, SessionManager<Arc<MockTransport>>) {
        init_test_tracing();
        let transport = Arc::new(MockTransport::default());
        let manager = SessionManager::new(Arc::clone(&transport));
        manager
            .setup_event_listeners("conv-1")
            .await
            .expect("setup succeeds");
        (transport, manager)
    }

    async fn next_update(rx: &mut broadcast::Receiver<ConversationEvent>) -> Conversation {
        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("update within deadline")
            .expect("broadcast alive");
        let ConversationEvent::Updated { conversation } = event;
        conversation
    }

    #[tokio::test]
    async fn tool_call_lifecycle_over_the_wire() {
        let (transport, manager) = setup().await;
        let mut updates = manager.subscribe("conv-1").await.expect("subscribed");

        transport
            .emit(
                "acp-session-update-conv-1",
                json!({
                    "sessionUpdate": "tool_call",
                    "toolCallId": "read_file_1",
                    "kind": "read",
                    "title": "Read main.rs",
                    "status": "in_progress",
                    "locations": [{"path": "src/main.rs"}]
                }),
            )
            .await;
        let conv = next_update(&mut updates).await;
        let call = conv.tool_call("read_file_1").expect("started");
        assert_eq!(call.status, ToolStatus::Running);
        assert!(conv.is_streaming);

        transport
            .emit(
                "acp-session-update-conv-1",
                json!({
                    "sessionUpdate": "tool_call_update",
                    "toolCallId": "read_file_1",
                    "status": "completed",
                    "content": [{"type": "content", "content": {"type": "text", "text": "fn main() {}"}}]
                }),
            )
            .await;
        let conv = next_update(&mut updates).await;
        let call = conv.tool_call("read_file_1").expect("still there");
        assert_eq!(call.status, ToolStatus::Completed);
        assert_eq!(call.result, Some(ToolResult::markdown("fn main() {}")));
    }

    #[tokio::test]
    async fn streamed_text_then_turn_finished() {
        let (transport, manager) = setup().await;
        let mut updates = manager.subscribe("conv-1").await.expect("subscribed");

        transport.emit("acp-text-conv-1", json!("Hello, ")).await;
        transport.emit("acp-text-conv-1", json!("world!")).await;
        next_update(&mut updates).await;
        let conv = next_update(&mut updates).await;
        assert!(conv.is_streaming);

        transport.emit("acp-turn-finished-conv-1", json!(true)).await;
        let conv = next_update(&mut updates).await;
        assert!(!conv.is_streaming);
        assert_eq!(
            conv.messages[0].parts,
            vec![MessagePart::Text {
                text: "Hello, world!".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn permission_request_synthesizes_call_and_fills_side_map() {
        let (transport, manager) = setup().await;
        let mut updates = manager.subscribe("conv-1").await.expect("subscribed");

        // The correlated JSON-RPC input frame arrives on the io channel
        // just before the permission request.
        transport
            .emit(
                "acp-io-conv-1",
                json!({
                    "type": "output",
                    "data": r#"{"jsonrpc":"2.0","method":"requestToolCallConfirmation","params":{"toolCallId":"tc-7"}}"#
                }),
            )
            .await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        transport
            .emit(
                "acp-permission-conv-1",
                json!({
                    "request_id": "42",
                    "request": {
                        "sessionId": "s-1",
                        "toolCall": {
                            "toolCallId": "tc-7",
                            "kind": "execute",
                            "title": "Run rm -rf target",
                            "status": "pending"
                        },
                        "options": ["Allow once", "Always allow", "Deny"]
                    }
                }),
            )
            .await;

        let conv = next_update(&mut updates).await;
        assert!(!conv.is_streaming);
        let call = conv.tool_call("tc-7").expect("synthesized");
        let attached = call.confirmation_request.as_ref().expect("attached");
        assert_eq!(attached.request_id, 42);
        assert_eq!(attached.options.len(), 3);
        assert!(attached
            .input_json_rpc
            .as_deref()
            .is_some_and(|frame| frame.contains("requestToolCallConfirmation")));

        let side = manager
            .confirmation_requests()
            .get("tc-7")
            .expect("side map entry");
        assert_eq!(side.request_id, 42);

        // Both io directions land in the trace log.
        transport
            .emit("acp-io-conv-1", json!({"type": "input", "data": "raw stdin"}))
            .await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        let entries = manager.io_logs().entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].direction, IoDirection::Output);
        assert_eq!(entries[1].direction, IoDirection::Input);
    }

    #[tokio::test]
    async fn consumer_rejection_is_sticky_across_the_queue() {
        let (transport, manager) = setup().await;
        let mut updates = manager.subscribe("conv-1").await.expect("subscribed");

        transport
            .emit(
                "acp-session-update-conv-1",
                json!({
                    "sessionUpdate": "tool_call",
                    "toolCallId": "tc-1",
                    "kind": "edit",
                    "title": "Edit file"
                }),
            )
            .await;
        next_update(&mut updates).await;

        manager
            .update_conversation("conv-1", |conv| {
                if let Some(call) = conv.tool_call_mut("tc-1") {
                    call.is_user_rejected = true;
                    call.status = ToolStatus::Failed;
                }
            })
            .await
            .expect("mutation enqueued");
        next_update(&mut updates).await;

        transport
            .emit(
                "acp-session-update-conv-1",
                json!({
                    "sessionUpdate": "tool_call_update",
                    "toolCallId": "tc-1",
                    "status": "completed"
                }),
            )
            .await;

        // The rejected update produces no broadcast; snapshot through the
        // same queue to observe the final state.
        let conv = manager.snapshot("conv-1").await.expect("snapshot");
        let call = conv.tool_call("tc-1").expect("exists");
        assert_eq!(call.status, ToolStatus::Failed);
    }

    #[tokio::test]
    async fn user_message_then_streaming_starts_new_assistant_message() {
        let (transport, manager) = setup().await;
        let mut updates = manager.subscribe("conv-1").await.expect("subscribed");

        manager
            .push_user_message("conv-1", "please read main.rs")
            .await
            .expect("queued");
        next_update(&mut updates).await;

        transport.emit("acp-text-conv-1", json!("Reading...")).await;
        let conv = next_update(&mut updates).await;
        assert_eq!(conv.messages.len(), 2);
    }

    #[tokio::test]
    async fn malformed_payloads_are_dropped_without_state_change() {
        let (transport, manager) = setup().await;

        transport
            .emit("acp-session-update-conv-1", json!({"sessionUpdate": "plan"}))
            .await;
        transport.emit("acp-error-conv-1", json!({"nope": 1})).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let conv = manager.snapshot("conv-1").await.expect("snapshot");
        assert!(conv.messages.is_empty());
    }

    #[tokio::test]
    async fn backend_error_renders_assistant_message() {
        let (transport, manager) = setup().await;
        let mut updates = manager.subscribe("conv-1").await.expect("subscribed");

        transport
            .emit("acp-error-conv-1", json!("model overloaded"))
            .await;
        let conv = next_update(&mut updates).await;
        assert_eq!(
            conv.messages[0].parts,
            vec![MessagePart::Text {
                text: "❌ **Error**: model overloaded".to_string()
            }]
        );
        assert!(!conv.is_streaming);
    }

    #[tokio::test]
    async fn operations_on_unknown_conversation_fail() {
        let transport = Arc::new(MockTransport::default());
        let manager = SessionManager::new(transport);

        let error = manager.snapshot("ghost").await.expect_err("no session");
        assert!(matches!(error, BridgeError::UnknownConversation(_)));
    }
}
