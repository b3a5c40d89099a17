//! Wire payload types for the Agent Client Protocol event stream
//!
//! Every payload arriving on a per-conversation channel decodes into one of
//! the types here before any conversation state is touched. Decoding fails
//! closed: an unrecognized `sessionUpdate` discriminant or a malformed
//! envelope is a decode error, which the session layer logs and drops
//! instead of silently misrouting.

use serde::Deserialize;
use serde_json::Value;

/// JSON-RPC method sniffed on output frames to correlate the raw input
/// frame that preceded a permission request.
pub const METHOD_REQUEST_CONFIRMATION: &str = "requestToolCallConfirmation";

/// JSON-RPC method sniffed on output frames to capture the raw update
/// frame on the matching tool call's debug field.
pub const METHOD_UPDATE_TOOL_CALL: &str = "updateToolCall";

/// Unified session-update event.
///
/// Tag values are `snake_case` on the wire while field names are
/// `camelCase`, matching the backend's serializer.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "sessionUpdate", rename_all = "snake_case")]
pub enum SessionUpdatePayload {
    ToolCall(ToolCallEvent),
    ToolCallUpdate(ToolCallEvent),
    AgentMessageChunk(MessageChunkEvent),
    AgentThoughtChunk(ThoughtChunkEvent),
}

/// Tool-call start and update events share one shape; starts carry
/// `kind`/`title`/`locations`, updates carry `status`/`content`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallEvent {
    pub tool_call_id: String,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub locations: Vec<WireLocation>,
    /// Content items stay raw here; they are shape-discriminated in the
    /// normalizer so one unrecognized item degrades to the generic fallback
    /// instead of failing the whole event.
    #[serde(default)]
    pub content: Option<Vec<Value>>,
}

/// Streamed assistant text. Some backends nest the text under `content`,
/// others send a bare `chunk` block.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageChunkEvent {
    #[serde(default)]
    pub content: Option<TextBlock>,
    #[serde(default)]
    pub chunk: Option<TextBlock>,
}

impl MessageChunkEvent {
    pub fn text(&self) -> &str {
        self.content
            .as_ref()
            .or(self.chunk.as_ref())
            .map_or("", |block| block.text.as_str())
    }
}

/// Streamed assistant reasoning. `thought` is the bare-string spelling.
#[derive(Debug, Clone, Deserialize)]
pub struct ThoughtChunkEvent {
    #[serde(default)]
    pub content: Option<TextBlock>,
    #[serde(default)]
    pub thought: Option<String>,
}

impl ThoughtChunkEvent {
    pub fn text(&self) -> &str {
        if let Some(block) = &self.content {
            return &block.text;
        }
        self.thought.as_deref().unwrap_or("")
    }
}

/// `{type: "text", text: ...}` content block; the `type` field is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct TextBlock {
    pub text: String,
}

/// A file or directory reference attached to a tool call.
///
/// Tool-call events reference `path`; permission requests historically used
/// `file`/`directory` instead, so all three spellings are accepted.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct WireLocation {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub directory: Option<String>,
    #[serde(default)]
    pub line: Option<u32>,
}

impl WireLocation {
    /// Best-effort path for tool-call locations.
    pub fn resolved_path(&self) -> &str {
        self.path
            .as_deref()
            .or(self.file.as_deref())
            .or(self.directory.as_deref())
            .unwrap_or("unknown")
    }

    /// Path chain for permission-request locations: `file`, else
    /// `directory`, else the literal `"unknown"`.
    pub fn confirmation_path(&self) -> &str {
        self.file
            .as_deref()
            .or(self.directory.as_deref())
            .unwrap_or("unknown")
    }
}

/// One item of a tool-call `content` array, once its shape is recognized.
/// Items that fail to decode into this enum fall back to a generic result.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentItem {
    Content { content: TextBlock },
    Diff(DiffContent),
}

/// Diff-shaped content; the backend emits both `camelCase` and
/// `snake_case` spellings for the text fields. The spellings decode as
/// separate fields (a serde `alias` would reject a payload carrying both)
/// and the accessors prefer camel.
#[derive(Debug, Clone, Deserialize)]
pub struct DiffContent {
    pub path: String,
    #[serde(default, rename = "oldText")]
    old_text_camel: Option<String>,
    #[serde(default)]
    old_text: Option<String>,
    #[serde(default, rename = "newText")]
    new_text_camel: Option<String>,
    #[serde(default)]
    new_text: Option<String>,
}

impl DiffContent {
    pub fn old_text(&self) -> Option<&str> {
        self.old_text_camel.as_deref().or(self.old_text.as_deref())
    }

    pub fn new_text(&self) -> Option<&str> {
        self.new_text_camel.as_deref().or(self.new_text.as_deref())
    }
}

/// Permission-request envelope. Note the `snake_case` spelling of
/// `request_id` at the top level against `camelCase` inside `request`, a
/// source-protocol quirk preserved byte-for-byte.
#[derive(Debug, Clone, Deserialize)]
pub struct PermissionRequestPayload {
    pub request_id: String,
    pub request: PermissionRequestBody,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRequestBody {
    #[serde(default)]
    pub session_id: Option<String>,
    pub tool_call: PermissionToolCall,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub options: Option<PermissionOptionsWire>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionToolCall {
    pub tool_call_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub locations: Vec<WireLocation>,
    #[serde(default)]
    pub content: Option<Vec<Value>>,
}

/// The backend sends either structured permission options or bare option
/// names; bare names are synthesized positionally by the normalizer.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PermissionOptionsWire {
    Structured(Vec<WirePermissionOption>),
    Names(Vec<String>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WirePermissionOption {
    pub option_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
}

/// Raw I/O trace frame.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum IoTracePayload {
    Input { data: String },
    Output { data: String },
}

/// Minimal JSON-RPC frame for output sniffing. Most output frames are not
/// JSON-RPC at all, so parse failure is expected and benign.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcFrame {
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
}

impl JsonRpcFrame {
    /// Attempt to parse a raw output frame as JSON-RPC.
    pub fn sniff(data: &str) -> Option<Self> {
        serde_json::from_str(data).ok()
    }

    /// Tool-call id carried in the params, either spelling.
    pub fn tool_call_id(&self) -> Option<&str> {
        let params = self.params.as_ref()?;
        params
            .get("toolCallId")
            .or_else(|| params.get("tool_call_id"))
            .and_then(Value::as_str)
    }
}
