//! Property-based tests for the normalizer and reducer
//!
//! These verify totality and the streaming/rejection invariants across
//! arbitrary inputs, not just the handful of shapes the unit tests pin.

use super::{apply, SessionEvent};
use crate::conversation::{Conversation, MessagePart, ToolCall, ToolName, ToolResult, ToolStatus};
use crate::normalize::{map_status, resolve_tool_name};
use proptest::prelude::*;

fn arb_kind() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        Just(None),
        Just(Some("read".to_string())),
        Just(Some("edit".to_string())),
        Just(Some("execute".to_string())),
        Just(Some("search".to_string())),
        Just(Some("fetch".to_string())),
        "[a-z]{1,10}".prop_map(Some),
    ]
}

fn arb_status() -> impl Strategy<Value = ToolStatus> {
    prop_oneof![
        Just(ToolStatus::Pending),
        Just(ToolStatus::Running),
        Just(ToolStatus::Completed),
        Just(ToolStatus::Failed),
    ]
}

fn arb_event() -> impl Strategy<Value = SessionEvent> {
    prop_oneof![
        "[a-zA-Z0-9,.! ]{0,30}".prop_map(|text| SessionEvent::TextChunk { text }),
        "[a-zA-Z0-9,.! ]{0,30}".prop_map(|text| SessionEvent::ThoughtChunk { text }),
        "[a-z]{1,6}".prop_map(|id| SessionEvent::ToolCallStart {
            call: ToolCall::new(id, ToolName::Other, "tool"),
        }),
        ("[a-z]{1,6}", arb_status(), proptest::option::of("[a-z ]{0,20}")).prop_map(
            |(id, status, text)| SessionEvent::ToolCallUpdate {
                id,
                status,
                result: text.map(ToolResult::markdown),
            }
        ),
        "[a-z ]{1,20}".prop_map(|message| SessionEvent::BackendError { message }),
        Just(SessionEvent::TurnFinished),
    ]
}

proptest! {
    /// Name resolution is total over any kind/id/title combination.
    #[test]
    fn resolve_tool_name_never_panics(
        kind in arb_kind(),
        id in "[a-z_0-9]{0,24}",
        title in proptest::option::of("[ -~]{0,40}"),
        locations in 0usize..8,
    ) {
        let _ = resolve_tool_name(kind.as_deref(), &id, title.as_deref(), locations);
    }

    /// Id prefixes always win over title hints for the read kind.
    #[test]
    fn read_prefix_beats_title(title in proptest::option::of("[ -~]{0,40}")) {
        let name = resolve_tool_name(
            Some("read"),
            "list_directory_suffix",
            title.as_deref(),
            5,
        );
        prop_assert_eq!(name, ToolName::ListDirectory);
    }

    /// Status mapping is total and only recognizes the four known strings.
    #[test]
    fn map_status_is_total(status in proptest::option::of("[a-z_]{0,16}")) {
        let mapped = map_status(status.as_deref());
        match status.as_deref() {
            Some("in_progress") => prop_assert_eq!(mapped, ToolStatus::Running),
            Some("completed") => prop_assert_eq!(mapped, ToolStatus::Completed),
            Some("failed") => prop_assert_eq!(mapped, ToolStatus::Failed),
            _ => prop_assert_eq!(mapped, ToolStatus::Pending),
        }
    }

    /// The reducer is total: no event sequence panics, and message parts
    /// are only ever appended or mutated in place at the tail.
    #[test]
    fn apply_never_panics(events in proptest::collection::vec(arb_event(), 0..40)) {
        let mut conv = Conversation::new("conv", "");
        let mut part_counts: Vec<usize> = Vec::new();
        for event in events {
            let _ = apply(&mut conv, event);
            // Earlier messages never lose parts.
            for (idx, count) in part_counts.iter().enumerate() {
                prop_assert!(conv.messages[idx].parts.len() >= *count);
            }
            part_counts = conv.messages.iter().map(|m| m.parts.len()).collect();
        }
    }

    /// Streamed text equals the concatenation of its chunks.
    #[test]
    fn text_accumulation_is_concatenation(chunks in proptest::collection::vec("[a-z ]{0,12}", 1..10)) {
        let mut conv = Conversation::new("conv", "");
        for chunk in &chunks {
            apply(&mut conv, SessionEvent::TextChunk { text: chunk.clone() });
        }
        prop_assert_eq!(conv.messages.len(), 1);
        let MessagePart::Text { text } = &conv.messages[0].parts[0] else {
            return Err(TestCaseError::fail("expected text part"));
        };
        prop_assert_eq!(text, &chunks.concat());
    }
}
