//! Payload normalization: wire shapes into the internal vocabulary
//!
//! Pure functions, side effects limited to logging. Malformed but
//! recognized shapes degrade to fallbacks instead of erroring; the only
//! hard rejections happen earlier, at decode time in [`crate::protocol`].

use crate::conversation::{
    ConfirmationContent, ConfirmationKind, ConfirmationLocation, ConfirmationRequest,
    PermissionOption, PermissionOptionKind, ToolCall, ToolLocation, ToolName, ToolResult,
    ToolStatus,
};
use crate::protocol::{
    ContentItem, PermissionOptionsWire, PermissionRequestPayload, ToolCallEvent, WireLocation,
};
use serde_json::Value;

/// Resolve the canonical tool name from the protocol's coarse `kind` tag
/// plus contextual hints.
///
/// The precedence order here is load-bearing: id prefixes beat title text,
/// and the `"target dir"` carve-out suppresses the title-based directory
/// match (shell titles like "Target dir contents" describe a read, not a
/// listing).
pub fn resolve_tool_name(
    kind: Option<&str>,
    tool_call_id: &str,
    title: Option<&str>,
    location_count: usize,
) -> ToolName {
    let title_lower = title.map_or_else(String::new, str::to_lowercase);
    match kind.unwrap_or("other") {
        "read" => {
            if tool_call_id.starts_with("read_many_files") {
                ToolName::ReadManyFiles
            } else if tool_call_id.starts_with("list_directory") {
                ToolName::ListDirectory
            } else if tool_call_id.starts_with("read_file") {
                ToolName::ReadFile
            } else if title_lower.contains("directory") && !title_lower.contains("target dir") {
                ToolName::ListDirectory
            } else if location_count > 1 {
                ToolName::ReadManyFiles
            } else {
                ToolName::ReadFile
            }
        }
        "edit" => ToolName::Replace,
        "execute" => ToolName::RunShellCommand,
        "search" => {
            if tool_call_id.starts_with("list_directory") {
                ToolName::ListDirectory
            } else if tool_call_id.starts_with("glob") {
                ToolName::Glob
            } else if title_lower.contains("web") {
                ToolName::GoogleWebSearch
            } else {
                ToolName::SearchFileContent
            }
        }
        "fetch" => ToolName::WebFetch,
        _ => ToolName::Other,
    }
}

/// Map a wire status string; anything unrecognized (including absent)
/// lands on pending.
pub fn map_status(status: Option<&str>) -> ToolStatus {
    match status.unwrap_or_default() {
        "in_progress" => ToolStatus::Running,
        "completed" => ToolStatus::Completed,
        "failed" => ToolStatus::Failed,
        _ => ToolStatus::Pending,
    }
}

/// Normalize a tool-call content array into the legacy result shape.
///
/// Only the first element is inspected; the protocol sends at most one
/// meaningful element per update. Unrecognized shapes silently become a
/// generic empty result.
pub fn normalize_tool_result(content: &[Value], status: ToolStatus) -> ToolResult {
    let Some(first) = content.first() else {
        return ToolResult::markdown("");
    };
    match serde_json::from_value::<ContentItem>(first.clone()) {
        Ok(ContentItem::Content { content }) => ToolResult::markdown(content.text),
        Ok(ContentItem::Diff(diff)) => {
            let old_string = diff.old_text().unwrap_or_default().to_string();
            let new_string = diff.new_text().unwrap_or_default().to_string();
            ToolResult::Diff {
                file_path: diff.path,
                old_string,
                new_string,
                success: status == ToolStatus::Completed,
            }
        }
        Err(_) => ToolResult::markdown(""),
    }
}

fn tool_locations(locations: &[WireLocation]) -> Vec<ToolLocation> {
    locations
        .iter()
        .map(|location| ToolLocation {
            path: location.resolved_path().to_string(),
            line: location.line,
        })
        .collect()
}

/// Build a [`ToolCall`] from a `tool_call` start event.
pub fn tool_call_from_wire(event: &ToolCallEvent) -> ToolCall {
    let name = resolve_tool_name(
        event.kind.as_deref(),
        &event.tool_call_id,
        event.title.as_deref(),
        event.locations.len(),
    );
    let label = event
        .title
        .clone()
        .unwrap_or_else(|| name.as_str().to_string());
    let mut call = ToolCall::new(&event.tool_call_id, name, label);
    call.status = map_status(event.status.as_deref());
    call.locations = tool_locations(&event.locations);
    call
}

/// Normalize permission options, synthesizing structure for bare names.
pub fn normalize_options(options: Option<&PermissionOptionsWire>) -> Vec<PermissionOption> {
    match options {
        None => Vec::new(),
        Some(PermissionOptionsWire::Structured(options)) => options
            .iter()
            .enumerate()
            .map(|(index, option)| PermissionOption {
                option_id: option.option_id.clone(),
                name: option
                    .name
                    .clone()
                    .unwrap_or_else(|| option.option_id.clone()),
                kind: option
                    .kind
                    .as_deref()
                    .and_then(PermissionOptionKind::parse)
                    .unwrap_or_else(|| PermissionOptionKind::positional(index)),
            })
            .collect(),
        Some(PermissionOptionsWire::Names(names)) => names
            .iter()
            .enumerate()
            .map(|(index, name)| PermissionOption {
                option_id: format!("option_{index}"),
                name: name.clone(),
                kind: PermissionOptionKind::positional(index),
            })
            .collect(),
    }
}

fn confirmation_kind(kind: Option<&str>) -> ConfirmationKind {
    match kind.unwrap_or_default() {
        "edit" => ConfirmationKind::Edit,
        "execute" => ConfirmationKind::Command,
        _ => ConfirmationKind::Generic,
    }
}

fn confirmation_content(content: Option<&[Value]>, question: Option<&str>) -> ConfirmationContent {
    let first = content.and_then(<[Value]>::first);
    if let Some(first) = first {
        match serde_json::from_value::<ContentItem>(first.clone()) {
            Ok(ContentItem::Diff(diff)) => {
                let old_text = diff.old_text().unwrap_or_default().to_string();
                let new_text = diff.new_text().unwrap_or_default().to_string();
                return ConfirmationContent::Diff {
                    path: diff.path,
                    old_text,
                    new_text,
                };
            }
            Ok(ContentItem::Content { content }) => {
                return ConfirmationContent::Generic {
                    new_text: content.text,
                };
            }
            Err(_) => {}
        }
    }
    ConfirmationContent::Generic {
        new_text: question.unwrap_or_default().to_string(),
    }
}

/// Normalize a permission-request envelope into a [`ConfirmationRequest`]
/// plus a synthesized [`ToolCall`] to append should the referenced call not
/// exist yet.
pub fn normalize_confirmation(payload: &PermissionRequestPayload) -> (ConfirmationRequest, ToolCall) {
    let request_id = payload.request_id.parse::<i64>().unwrap_or_else(|_| {
        tracing::debug!(request_id = %payload.request_id, "non-numeric permission request id");
        0
    });

    let wire_call = &payload.request.tool_call;
    let name = resolve_tool_name(
        wire_call.kind.as_deref(),
        &wire_call.tool_call_id,
        wire_call.title.as_deref(),
        wire_call.locations.len(),
    );
    let label = wire_call
        .title
        .clone()
        .or_else(|| wire_call.name.clone())
        .unwrap_or_else(|| "Unknown Tool".to_string());

    let request = ConfirmationRequest {
        request_id,
        session_id: payload.request.session_id.clone().unwrap_or_default(),
        tool_call_id: wire_call.tool_call_id.clone(),
        label: label.clone(),
        content: confirmation_content(
            wire_call.content.as_deref(),
            payload.request.question.as_deref(),
        ),
        kind: confirmation_kind(wire_call.kind.as_deref()),
        locations: wire_call
            .locations
            .iter()
            .map(|location| ConfirmationLocation {
                path: location.confirmation_path().to_string(),
            })
            .collect(),
        options: normalize_options(payload.request.options.as_ref()),
        input_json_rpc: None,
    };

    let mut call = ToolCall::new(&wire_call.tool_call_id, name, label);
    call.status = map_status(wire_call.status.as_deref());
    call.locations = tool_locations(&wire_call.locations);

    (request, call)
}
