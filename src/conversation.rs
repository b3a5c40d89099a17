//! Conversation aggregate: messages, tool calls, confirmation requests
//!
//! The aggregate is owned exclusively by a conversation's session task;
//! everything here is plain data plus the append/accumulate helpers that
//! the reducer relies on. Messages are append-only except for in-place
//! mutation of the last message's trailing part while streaming.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Result text the backend uses to report a user-rejected tool call.
/// A tool call carrying this sentinel must never have its status or result
/// overwritten by a later backend update.
pub const REJECTION_SENTINEL: &str = "Tool call rejected by user";

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Assistant,
}

/// Canonical tool identifiers. The upstream protocol reuses one coarse
/// `kind` tag for several distinct tools; the normalizer disambiguates
/// into these variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    ReadFile,
    ReadManyFiles,
    ListDirectory,
    Replace,
    RunShellCommand,
    Glob,
    GoogleWebSearch,
    SearchFileContent,
    WebFetch,
    Other,
}

impl ToolName {
    pub fn as_str(self) -> &'static str {
        match self {
            ToolName::ReadFile => "read_file",
            ToolName::ReadManyFiles => "read_many_files",
            ToolName::ListDirectory => "list_directory",
            ToolName::Replace => "replace",
            ToolName::RunShellCommand => "run_shell_command",
            ToolName::Glob => "glob",
            ToolName::GoogleWebSearch => "google_web_search",
            ToolName::SearchFileContent => "search_file_content",
            ToolName::WebFetch => "web_fetch",
            ToolName::Other => "other",
        }
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tool-call lifecycle status, monotonically advanced by backend updates
/// except for the sticky-rejection rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

/// A file or directory a tool call touches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolLocation {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

/// Tool-call outcome, discriminated by the inbound shape rather than an
/// explicit tag from the source protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolResult {
    Diff {
        file_path: String,
        old_string: String,
        new_string: String,
        success: bool,
    },
    Markdown {
        text: String,
    },
}

impl ToolResult {
    pub fn markdown(text: impl Into<String>) -> Self {
        ToolResult::Markdown { text: text.into() }
    }

    /// Whether this result carries the user-rejection sentinel text.
    pub fn is_rejection_sentinel(&self) -> bool {
        matches!(self, ToolResult::Markdown { text } if text == REJECTION_SENTINEL)
    }
}

/// Permission option kind; bare-string options from the backend are
/// synthesized into these positionally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionOptionKind {
    AllowOnce,
    AllowAlways,
    RejectOnce,
    RejectAlways,
}

impl PermissionOptionKind {
    /// Positional synthesis for bare-string options: index 0 allows once,
    /// 1 allows always, 2 rejects once, everything past that rejects always.
    pub fn positional(index: usize) -> Self {
        match index {
            0 => PermissionOptionKind::AllowOnce,
            1 => PermissionOptionKind::AllowAlways,
            2 => PermissionOptionKind::RejectOnce,
            _ => PermissionOptionKind::RejectAlways,
        }
    }

    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "allow_once" => Some(PermissionOptionKind::AllowOnce),
            "allow_always" => Some(PermissionOptionKind::AllowAlways),
            "reject_once" => Some(PermissionOptionKind::RejectOnce),
            "reject_always" => Some(PermissionOptionKind::RejectAlways),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionOption {
    pub option_id: String,
    pub name: String,
    pub kind: PermissionOptionKind,
}

/// What kind of action the user is being asked to approve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationKind {
    Edit,
    Command,
    Generic,
}

/// Normalized confirmation content: either a proposed diff or a generic
/// description of the pending action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConfirmationContent {
    Diff {
        path: String,
        old_text: String,
        new_text: String,
    },
    Generic {
        new_text: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationLocation {
    pub path: String,
}

/// A normalized permission request, attached to its tool call and mirrored
/// into the side compatibility map on publication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationRequest {
    pub request_id: i64,
    pub session_id: String,
    pub tool_call_id: String,
    pub label: String,
    pub content: ConfirmationContent,
    pub kind: ConfirmationKind,
    pub locations: Vec<ConfirmationLocation>,
    pub options: Vec<PermissionOption>,
    /// Raw JSON-RPC input frame correlated with this request, for
    /// debugging. Populated by the session's output-frame sniffing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_json_rpc: Option<String>,
}

/// A backend-invoked operation surfaced to the UI as a trackable unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: ToolName,
    pub status: ToolStatus,
    pub label: String,
    pub locations: Vec<ToolLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ToolResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_request: Option<ConfirmationRequest>,
    /// Set when the user rejects the call; enforces sticky rejection.
    #[serde(default)]
    pub is_user_rejected: bool,
    /// Raw `updateToolCall` JSON-RPC frame captured by output sniffing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_json_rpc: Option<String>,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: ToolName, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name,
            status: ToolStatus::Pending,
            label: label.into(),
            locations: Vec::new(),
            result: None,
            confirmation_request: None,
            is_user_rejected: false,
            output_json_rpc: None,
        }
    }

    /// A call counts as rejected when the consumer flagged it, or when the
    /// backend already reported the rejection sentinel as a failure.
    pub fn is_rejected(&self) -> bool {
        if self.is_user_rejected {
            return true;
        }
        self.status == ToolStatus::Failed
            && self
                .result
                .as_ref()
                .is_some_and(ToolResult::is_rejection_sentinel)
    }
}

/// One ordered part of a message. Assistant messages mix all three kinds;
/// user messages carry text only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePart {
    Text { text: String },
    Thinking { text: String },
    ToolCall(ToolCall),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sender: Sender,
    pub parts: Vec<MessagePart>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            sender: Sender::User,
            parts: vec![MessagePart::Text { text: text.into() }],
            timestamp: Utc::now(),
        }
    }

    pub fn assistant() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            sender: Sender::Assistant,
            parts: Vec::new(),
            timestamp: Utc::now(),
        }
    }
}

/// The in-memory conversation aggregate.
#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub messages: Vec<Message>,
    pub is_streaming: bool,
    pub last_updated: DateTime<Utc>,
    /// Tool-call id to (message index, part index). Registered at creation
    /// time; the first registration for an id wins, preserving
    /// first-match lookup semantics should a duplicate ever appear.
    #[serde(skip)]
    tool_index: HashMap<String, (usize, usize)>,
}

impl Conversation {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            messages: Vec::new(),
            is_streaming: false,
            last_updated: Utc::now(),
            tool_index: HashMap::new(),
        }
    }

    /// Bump `last_updated` so downstream change detection fires.
    pub fn touch(&mut self) {
        self.last_updated = Utc::now();
    }

    pub fn push_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    fn last_is_assistant(&self) -> bool {
        self.messages
            .last()
            .is_some_and(|message| message.sender == Sender::Assistant)
    }

    /// Index of the trailing assistant message, appending one if the
    /// conversation is empty or ends with a user message.
    fn ensure_assistant_tail(&mut self) -> usize {
        if !self.last_is_assistant() {
            self.messages.push(Message::assistant());
        }
        self.messages.len() - 1
    }

    /// Append streamed assistant text, accumulating into the trailing text
    /// part when there is one.
    pub fn append_text(&mut self, chunk: &str) {
        let idx = self.ensure_assistant_tail();
        let parts = &mut self.messages[idx].parts;
        if let Some(MessagePart::Text { text }) = parts.last_mut() {
            text.push_str(chunk);
        } else {
            parts.push(MessagePart::Text {
                text: chunk.to_string(),
            });
        }
    }

    /// Append streamed assistant reasoning, symmetric to [`append_text`].
    ///
    /// [`append_text`]: Conversation::append_text
    pub fn append_thought(&mut self, chunk: &str) {
        let idx = self.ensure_assistant_tail();
        let parts = &mut self.messages[idx].parts;
        if let Some(MessagePart::Thinking { text }) = parts.last_mut() {
            text.push_str(chunk);
        } else {
            parts.push(MessagePart::Thinking {
                text: chunk.to_string(),
            });
        }
    }

    /// Append a tool call as a new part of the trailing assistant message
    /// and register it in the lookup index.
    pub fn push_tool_call(&mut self, call: ToolCall) {
        let id = call.id.clone();
        let message_idx = self.ensure_assistant_tail();
        let parts = &mut self.messages[message_idx].parts;
        parts.push(MessagePart::ToolCall(call));
        let part_idx = parts.len() - 1;
        if self.tool_index.contains_key(&id) {
            // Ids must be unique per conversation; keep the first entry.
            tracing::warn!(tool_call_id = %id, "duplicate tool call id, keeping first");
        } else {
            self.tool_index.insert(id, (message_idx, part_idx));
        }
    }

    pub fn contains_tool_call(&self, id: &str) -> bool {
        self.tool_index.contains_key(id)
    }

    pub fn tool_call(&self, id: &str) -> Option<&ToolCall> {
        let &(message_idx, part_idx) = self.tool_index.get(id)?;
        match self.messages.get(message_idx)?.parts.get(part_idx)? {
            MessagePart::ToolCall(call) => Some(call),
            _ => None,
        }
    }

    pub fn tool_call_mut(&mut self, id: &str) -> Option<&mut ToolCall> {
        let &(message_idx, part_idx) = self.tool_index.get(id)?;
        match self.messages.get_mut(message_idx)?.parts.get_mut(part_idx)? {
            MessagePart::ToolCall(call) => Some(call),
            _ => None,
        }
    }
}
