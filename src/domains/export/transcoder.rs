//! Flattening of heterogeneous dialog turns into the fixed CSV schema.
//!
//! Each turn type maps to one handler in [`TURN_HANDLERS`]. A handler only
//! decides `content`, `output` and `ai`; the remaining columns come from the
//! turn's own attributes and from [`extract_telemetry`]. Types without a
//! handler still produce a row whose `content` is the serialized payload.

use crate::domains::export::telemetry::extract_telemetry;
use crate::domains::export::types::CsvRow;
use crate::domains::transcript::types::{DialogTurn, SessionSummary};
use serde_json::Value;

/// The part of a row decided by the turn type
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnFragment {
    /// `None` falls back to the serialized full payload
    pub content: Option<String>,
    pub output: String,
    pub ai: bool,
    /// `output` holds user-authored text eligible for redaction
    pub redact_output: bool,
}

pub type TurnHandler = fn(&DialogTurn) -> TurnFragment;

/// Dispatch table keyed by `turn.type`
pub const TURN_HANDLERS: &[(&str, TurnHandler)] = &[
    ("launch", launch),
    ("choice", intent_request),
    ("request", intent_request),
    ("knowledgeBase", knowledge_base),
    ("cardV2", message),
    ("block", message),
    ("path", message),
    ("flow", message),
    ("text", message),
    ("speak", speak),
    ("visual", visual),
    ("carousel", nested_payload),
    ("debug", nested_payload),
    ("no-reply", nested_payload),
    ("end", end),
];

/// Look up the handler registered for a turn type
pub fn handler_for(turn_type: &str) -> Option<TurnHandler> {
    TURN_HANDLERS
        .iter()
        .find(|(name, _)| *name == turn_type)
        .map(|(_, handler)| *handler)
}

fn launch(turn: &DialogTurn) -> TurnFragment {
    TurnFragment {
        content: Some(turn.format.clone()),
        ..Default::default()
    }
}

fn intent_request(turn: &DialogTurn) -> TurnFragment {
    if turn.event() != "intent" {
        return TurnFragment::default();
    }
    TurnFragment {
        output: turn.body_str(&["query"]).unwrap_or_default().to_string(),
        redact_output: true,
        ..Default::default()
    }
}

fn knowledge_base(turn: &DialogTurn) -> TurnFragment {
    TurnFragment {
        output: turn
            .body_str(&["query", "message"])
            .unwrap_or_default()
            .to_string(),
        redact_output: true,
        ..Default::default()
    }
}

fn message(turn: &DialogTurn) -> TurnFragment {
    TurnFragment {
        output: turn.body_str(&["message"]).unwrap_or_default().to_string(),
        ai: turn.body().get("ai").and_then(Value::as_bool).unwrap_or(false),
        redact_output: true,
        ..Default::default()
    }
}

fn speak(turn: &DialogTurn) -> TurnFragment {
    match turn.event() {
        "audio" => TurnFragment {
            output: turn.body_str(&["src"]).unwrap_or_default().to_string(),
            ..Default::default()
        },
        "message" => TurnFragment {
            output: turn.body_str(&["message"]).unwrap_or_default().to_string(),
            redact_output: true,
            ..Default::default()
        },
        _ => TurnFragment::default(),
    }
}

fn visual(turn: &DialogTurn) -> TurnFragment {
    TurnFragment {
        output: turn.body_str(&["image"]).unwrap_or_default().to_string(),
        ..Default::default()
    }
}

fn nested_payload(turn: &DialogTurn) -> TurnFragment {
    TurnFragment {
        content: Some(serialize_value(turn.body())),
        ..Default::default()
    }
}

fn end(_turn: &DialogTurn) -> TurnFragment {
    TurnFragment {
        content: Some("end".to_string()),
        output: "end".to_string(),
        ..Default::default()
    }
}

fn serialize_value(value: &Value) -> String {
    // Serializing a Value cannot fail: keys are always strings
    serde_json::to_string(value).unwrap_or_default()
}

/// Map one turn to the type-dependent part of its row
pub fn transcode_turn(turn: &DialogTurn) -> TurnFragment {
    handler_for(&turn.turn_type)
        .map(|handler| handler(turn))
        .unwrap_or_default()
}

/// A fully populated row plus the redaction hint from its handler
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodedTurn {
    pub row: CsvRow,
    pub redact_output: bool,
    /// `content` is the serialized full payload, so it echoes `output`
    pub content_from_payload: bool,
}

impl TranscodedTurn {
    /// Put scrubbed text in `output`, and in every payload string that
    /// `content` carries, so the raw text survives in no column.
    pub fn apply_redaction(&mut self, turn: &DialogTurn, redacted: String) {
        if self.content_from_payload && !self.row.output.is_empty() && redacted != self.row.output {
            let mut payload = turn.payload.clone();
            replace_text(&mut payload, &self.row.output, &redacted);
            self.row.content = serialize_value(&payload);
        }
        self.row.output = redacted;
    }
}

fn replace_text(value: &mut Value, needle: &str, replacement: &str) {
    match value {
        Value::String(s) => {
            if s.contains(needle) {
                *s = s.replace(needle, replacement);
            }
        }
        Value::Array(items) => items
            .iter_mut()
            .for_each(|item| replace_text(item, needle, replacement)),
        Value::Object(map) => map
            .values_mut()
            .for_each(|item| replace_text(item, needle, replacement)),
        _ => {}
    }
}

/// Build the complete sixteen-column row for one turn of a session
pub fn build_row(session: &SessionSummary, turn: &DialogTurn) -> TranscodedTurn {
    let fragment = transcode_turn(turn);
    let content_from_payload = fragment.content.is_none();
    let content = fragment
        .content
        .unwrap_or_else(|| serialize_value(&turn.payload));

    let confidence_interval = match turn.body().get("confidence") {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.clone(),
        _ => String::new(),
    };

    let telemetry = if turn.turn_type == "debug" {
        extract_telemetry(turn.body_str(&["message"]).unwrap_or_default())
    } else {
        Default::default()
    };

    let row = CsvRow {
        transcript_id: session.id.clone(),
        session_id: session.session_id.clone(),
        start_time: turn.start_time.clone(),
        turn_id: turn.turn_id.clone(),
        turn_type: turn.turn_type.clone(),
        event: turn.event().to_string(),
        content,
        output: fragment.output,
        ai: fragment.ai,
        intent_matched: turn
            .body_str(&["intent", "name"])
            .unwrap_or_default()
            .to_string(),
        confidence_interval,
        model: telemetry.model,
        token_multiplier: telemetry.token_multiplier,
        token_consumption_total: telemetry.tokens_total,
        token_consumption_query: telemetry.tokens_query,
        token_consumption_answer: telemetry.tokens_answer,
    };

    TranscodedTurn {
        row,
        redact_output: fragment.redact_output,
        content_from_payload,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn turn(turn_type: &str, payload: Value) -> DialogTurn {
        DialogTurn {
            turn_id: "turn-1".into(),
            turn_type: turn_type.into(),
            start_time: "2024-05-01T10:00:00.000Z".into(),
            format: "launch".into(),
            payload,
        }
    }

    fn session() -> SessionSummary {
        SessionSummary {
            id: "tr-1".into(),
            session_id: "sess-1".into(),
        }
    }

    #[test]
    fn test_end_turn() {
        let row = build_row(&session(), &turn("end", json!({"type": "end"}))).row;
        assert_eq!(row.content, "end");
        assert_eq!(row.output, "end");
    }

    #[test]
    fn test_unknown_type_serializes_full_payload() {
        let payload = json!({"type": "custom", "payload": {"x": 1}});
        let row = build_row(&session(), &turn("somethingNew", payload.clone())).row;
        assert_eq!(row.content, serde_json::to_string(&payload).unwrap());
        assert_eq!(row.output, "");
        assert_eq!(row.turn_type, "somethingNew");
        assert_eq!(row.event, "custom");
    }

    #[test]
    fn test_launch_uses_format() {
        let row = build_row(&session(), &turn("launch", json!({"type": "launch"}))).row;
        assert_eq!(row.content, "launch");
        assert_eq!(row.output, "");
    }

    #[test]
    fn test_intent_request() {
        let t = turn(
            "request",
            json!({
                "type": "intent",
                "payload": {
                    "query": "book a table",
                    "intent": {"name": "reserve"},
                    "confidence": 0.92
                }
            }),
        );
        let transcoded = build_row(&session(), &t);
        assert_eq!(transcoded.row.output, "book a table");
        assert_eq!(transcoded.row.intent_matched, "reserve");
        assert_eq!(transcoded.row.confidence_interval, "0.92");
        assert!(transcoded.redact_output);
        // content falls back to the full payload
        assert!(transcoded.row.content.contains("book a table"));
    }

    #[test]
    fn test_non_intent_request_has_no_output() {
        let t = turn("request", json!({"type": "launch", "payload": {}}));
        let transcoded = build_row(&session(), &t);
        assert_eq!(transcoded.row.output, "");
        assert!(!transcoded.redact_output);
    }

    #[test]
    fn test_knowledge_base_query() {
        let t = turn(
            "knowledgeBase",
            json!({"type": "knowledgeBase", "payload": {"query": {"message": "what are your hours?"}}}),
        );
        assert_eq!(build_row(&session(), &t).row.output, "what are your hours?");
    }

    #[test]
    fn test_text_family_sets_ai_flag() {
        for kind in ["cardV2", "block", "path", "flow", "text"] {
            let t = turn(kind, json!({"type": "text", "payload": {"message": "Hello!", "ai": true}}));
            let row = build_row(&session(), &t).row;
            assert_eq!(row.output, "Hello!", "type {}", kind);
            assert!(row.ai, "type {}", kind);
        }
        let t = turn("text", json!({"type": "text", "payload": {"message": "Hi"}}));
        assert!(!build_row(&session(), &t).row.ai);
    }

    #[test]
    fn test_speak_variants() {
        let audio = turn("speak", json!({"type": "audio", "payload": {"src": "https://cdn/a.mp3"}}));
        assert_eq!(build_row(&session(), &audio).row.output, "https://cdn/a.mp3");
        let msg = turn("speak", json!({"type": "message", "payload": {"message": "Welcome"}}));
        assert_eq!(build_row(&session(), &msg).row.output, "Welcome");
    }

    #[test]
    fn test_visual_image() {
        let t = turn("visual", json!({"type": "image", "payload": {"image": "https://cdn/i.png"}}));
        assert_eq!(build_row(&session(), &t).row.output, "https://cdn/i.png");
    }

    #[test]
    fn test_carousel_serializes_nested_payload() {
        let nested = json!({"cards": [{"title": "A"}]});
        let t = turn("carousel", json!({"type": "carousel", "payload": nested.clone()}));
        let row = build_row(&session(), &t).row;
        assert_eq!(row.content, serde_json::to_string(&nested).unwrap());
        assert_eq!(row.output, "");
    }

    #[test]
    fn test_debug_without_marker_has_empty_telemetry() {
        let t = turn(
            "debug",
            json!({"type": "debug", "payload": {"message": "matched intent reserve Model: `x`"}}),
        );
        let row = build_row(&session(), &t).row;
        assert_eq!(row.model, "");
        assert_eq!(row.token_multiplier, 0.0);
        assert_eq!(row.token_consumption_total, 0);
        assert_eq!(row.token_consumption_query, 0);
        assert_eq!(row.token_consumption_answer, 0);
    }

    #[test]
    fn test_debug_with_marker_extracts_telemetry() {
        let t = turn(
            "debug",
            json!({"type": "debug", "payload": {
                "message": "__AI Response__ Model: `gpt-4o` Token Multiplier: 5.00x Token Consumption: `{total: 30, query: 20, answer: 10}`"
            }}),
        );
        let row = build_row(&session(), &t).row;
        assert_eq!(row.model, "gpt-4o");
        assert_eq!(row.token_multiplier, 5.0);
        assert_eq!(row.token_consumption_total, 30);
    }

    #[test]
    fn test_telemetry_ignored_for_other_types() {
        let t = turn(
            "text",
            json!({"type": "text", "payload": {"message": "__AI__ Model: `gpt-4o`"}}),
        );
        assert_eq!(build_row(&session(), &t).row.model, "");
    }

    #[test]
    fn test_row_carries_turn_attributes() {
        let row = build_row(&session(), &turn("end", Value::Null)).row;
        assert_eq!(row.transcript_id, "tr-1");
        assert_eq!(row.session_id, "sess-1");
        assert_eq!(row.turn_id, "turn-1");
        assert_eq!(row.start_time, "2024-05-01T10:00:00.000Z");
    }

    #[test]
    fn test_dispatch_table_cases() {
        let choice = json!({"type": "intent", "payload": {"query": "yes please", "intent": {"name": "yes"}}});
        let choice_other = json!({"type": "path", "payload": {"path": "choice:1"}});
        let no_reply_body = json!({"timeout": 10});
        let no_reply = json!({"type": "no-reply", "payload": no_reply_body.clone()});
        let debug_body = json!({"message": "matched intent yes"});
        let debug = json!({"type": "debug", "payload": debug_body.clone()});
        let speak_other = json!({"type": "ssml", "payload": {"message": "<speak/>"}});

        let full = |v: &Value| serde_json::to_string(v).unwrap();
        let cases: Vec<(&str, Value, String, &str)> = vec![
            ("choice", choice.clone(), full(&choice), "yes please"),
            ("choice", choice_other.clone(), full(&choice_other), ""),
            ("no-reply", no_reply, full(&no_reply_body), ""),
            ("debug", debug, full(&debug_body), ""),
            ("speak", speak_other.clone(), full(&speak_other), ""),
        ];

        for (kind, payload, content, output) in cases {
            let event = payload["type"].as_str().unwrap_or_default().to_string();
            let row = build_row(&session(), &turn(kind, payload)).row;
            assert_eq!(row.content, content, "type {} / {}", kind, event);
            assert_eq!(row.output, output, "type {} / {}", kind, event);
            assert_eq!(row.event, event);
        }
    }

    #[test]
    fn test_apply_redaction_rewrites_payload_echo() {
        let t = turn(
            "request",
            json!({"type": "intent", "payload": {"query": "I am Ada Lovelace", "intent": {"name": "intro"}}}),
        );
        let mut transcoded = build_row(&session(), &t);
        assert!(transcoded.content_from_payload);
        transcoded.apply_redaction(&t, "I am [NAME]".to_string());
        assert_eq!(transcoded.row.output, "I am [NAME]");
        assert!(!transcoded.row.content.contains("Ada"));
        assert!(transcoded.row.content.contains("I am [NAME]"));
        assert!(transcoded.row.content.contains("intro"));
    }

    #[test]
    fn test_every_registered_type_has_a_handler() {
        for (name, _) in TURN_HANDLERS {
            assert!(handler_for(name).is_some());
        }
        assert!(handler_for("unknown").is_none());
    }
}
