// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Replays agent span, error and custom events as spans on a tracer.
//!
//! Span events become spans, keeping the ids, parent links and timing the agent
//! reported. Error events become `exception` span events on the span they were
//! raised in, and custom events become span events on the invocation's entry
//! point span. Errors and custom events with nothing to attach to are recorded
//! as spans of their own.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;
use tracing::debug;

use crate::agent_data::{AgentEvent, Attributes};
use crate::trace::provider::Tracer;
use crate::trace::span::{
    parse_span_id, parse_trace_id, random_span_id, random_trace_id, AttributeValue, SpanData,
    SpanEvent, SpanId, SpanKind, SpanStatus, TraceId,
};

/// Span intrinsics that map onto span fields rather than attributes.
const SPAN_FIELD_INTRINSICS: &[&str] = &[
    "type",
    "traceId",
    "guid",
    "parentId",
    "timestamp",
    "duration",
    "name",
];
const ERROR_FIELD_INTRINSICS: &[&str] = &[
    "type",
    "traceId",
    "spanId",
    "timestamp",
    "error.class",
    "error.message",
];
const CUSTOM_FIELD_INTRINSICS: &[&str] = &["type", "timestamp"];

const DEFAULT_CUSTOM_EVENT_NAME: &str = "CustomEvent";
/// Timestamps below this are in seconds, not milliseconds.
const SECONDS_CUTOFF: u64 = 100_000_000_000;

/// Converts the three event sequences into spans and records them on `tracer`.
///
/// Any of the sequences may be empty. Export problems surface on the next flush.
pub fn replay_spans(
    tracer: &Tracer,
    function_arn: &str,
    spans: &[AgentEvent],
    errors: &[AgentEvent],
    custom_events: &[AgentEvent],
) {
    let replayed = convert_events(function_arn, spans, errors, custom_events);
    debug!(
        "Replaying {} spans from {} span, {} error and {} custom events",
        replayed.len(),
        spans.len(),
        errors.len(),
        custom_events.len()
    );
    tracer.record_batch(replayed);
}

/// Builds the spans [`replay_spans`] records, without recording them.
#[must_use]
pub fn convert_events(
    function_arn: &str,
    spans: &[AgentEvent],
    errors: &[AgentEvent],
    custom_events: &[AgentEvent],
) -> Vec<SpanData> {
    // events that carry no trace id of their own share one
    let fallback_trace_id = random_trace_id();

    let mut out: Vec<SpanData> = spans
        .iter()
        .map(|event| span_from_event(event, fallback_trace_id))
        .collect();

    let index_by_span_id: HashMap<SpanId, usize> = out
        .iter()
        .enumerate()
        .map(|(idx, span)| (span.span_id, idx))
        .collect();

    let mut orphans = Vec::new();
    for error in errors {
        let exception = exception_event(error);
        let message = exception_message(error);
        match error_target(error, &out, &index_by_span_id) {
            Some(idx) => {
                let span = &mut out[idx];
                span.events.push(exception);
                span.status = SpanStatus::Error(message);
            }
            None => orphans.push(standalone_error_span(
                error,
                exception,
                message,
                fallback_trace_id,
            )),
        }
    }

    let custom_target = entry_point(&out, None);
    for custom in custom_events {
        let event = custom_span_event(custom);
        match custom_target {
            Some(idx) => out[idx].events.push(event),
            None => orphans.push(standalone_custom_span(event, fallback_trace_id)),
        }
    }

    out.extend(orphans);
    if !function_arn.is_empty() {
        for span in &mut out {
            span.set_attribute("faas.id", function_arn);
        }
    }
    out
}

fn span_from_event(event: &AgentEvent, fallback_trace_id: TraceId) -> SpanData {
    let trace_id = event
        .intrinsic_str("traceId")
        .and_then(parse_trace_id)
        .unwrap_or(fallback_trace_id);
    let span_id = event
        .intrinsic_str("guid")
        .and_then(parse_span_id)
        .unwrap_or_else(random_span_id);
    let parent_span_id = event.intrinsic_str("parentId").and_then(parse_span_id);

    let start = event
        .intrinsics
        .get("timestamp")
        .map_or_else(now_unix_nano, timestamp_unix_nano);
    let duration = event
        .intrinsic_f64("duration")
        .map_or(0, seconds_to_nanos);

    let kind = if event.intrinsic_bool("nr.entryPoint") {
        SpanKind::Server
    } else {
        match event.intrinsic_str("category") {
            Some("http" | "datastore") => SpanKind::Client,
            _ => SpanKind::Internal,
        }
    };

    let mut span = SpanData {
        trace_id,
        span_id,
        parent_span_id,
        name: event.intrinsic_str("name").unwrap_or("unknown").to_string(),
        kind,
        start_time_unix_nano: start,
        end_time_unix_nano: start.saturating_add(duration),
        attributes: Vec::new(),
        events: Vec::new(),
        status: SpanStatus::Unset,
        scope: String::new(),
    };
    for (key, value) in event_attributes(event, SPAN_FIELD_INTRINSICS) {
        span.set_attribute(&key, value);
    }
    span
}

/// Index of the span an error belongs to: the span it names, else the entry
/// point of its trace, else the first span.
fn error_target(
    error: &AgentEvent,
    spans: &[SpanData],
    index_by_span_id: &HashMap<SpanId, usize>,
) -> Option<usize> {
    if let Some(idx) = error
        .intrinsic_str("spanId")
        .and_then(parse_span_id)
        .and_then(|id| index_by_span_id.get(&id).copied())
    {
        return Some(idx);
    }
    let trace_id = error.intrinsic_str("traceId").and_then(parse_trace_id);
    entry_point(spans, trace_id)
}

/// First server span (optionally within one trace), falling back to the first span.
fn entry_point(spans: &[SpanData], trace_id: Option<TraceId>) -> Option<usize> {
    let in_trace = |span: &SpanData| trace_id.map_or(true, |id| span.trace_id == id);
    spans
        .iter()
        .position(|span| span.kind == SpanKind::Server && in_trace(span))
        .or_else(|| spans.iter().position(in_trace))
        .or(if spans.is_empty() { None } else { Some(0) })
}

fn exception_message(error: &AgentEvent) -> String {
    error
        .intrinsic_str("error.message")
        .or_else(|| error.intrinsic_str("error.class"))
        .unwrap_or("error")
        .to_string()
}

fn exception_event(error: &AgentEvent) -> SpanEvent {
    let mut attributes = Vec::new();
    if let Some(class) = error.intrinsic_str("error.class") {
        attributes.push(("exception.type".to_string(), AttributeValue::from(class)));
    }
    if let Some(message) = error.intrinsic_str("error.message") {
        attributes.push(("exception.message".to_string(), AttributeValue::from(message)));
    }
    attributes.extend(event_attributes(error, ERROR_FIELD_INTRINSICS));

    SpanEvent {
        name: "exception".to_string(),
        time_unix_nano: event_time(error),
        attributes,
    }
}

fn standalone_error_span(
    error: &AgentEvent,
    exception: SpanEvent,
    message: String,
    fallback_trace_id: TraceId,
) -> SpanData {
    let trace_id = error
        .intrinsic_str("traceId")
        .and_then(parse_trace_id)
        .unwrap_or(fallback_trace_id);
    let class = error.intrinsic_str("error.class").unwrap_or("Error");
    let time = exception.time_unix_nano;
    SpanData {
        trace_id,
        span_id: random_span_id(),
        parent_span_id: None,
        name: format!("error: {class}"),
        kind: SpanKind::Internal,
        start_time_unix_nano: time,
        end_time_unix_nano: time,
        attributes: Vec::new(),
        events: vec![exception],
        status: SpanStatus::Error(message),
        scope: String::new(),
    }
}

fn custom_span_event(custom: &AgentEvent) -> SpanEvent {
    SpanEvent {
        name: custom
            .intrinsic_str("type")
            .unwrap_or(DEFAULT_CUSTOM_EVENT_NAME)
            .to_string(),
        time_unix_nano: event_time(custom),
        attributes: event_attributes(custom, CUSTOM_FIELD_INTRINSICS),
    }
}

fn standalone_custom_span(event: SpanEvent, fallback_trace_id: TraceId) -> SpanData {
    let time = event.time_unix_nano;
    SpanData {
        trace_id: fallback_trace_id,
        span_id: random_span_id(),
        parent_span_id: None,
        name: event.name.clone(),
        kind: SpanKind::Internal,
        start_time_unix_nano: time,
        end_time_unix_nano: time,
        attributes: event.attributes.clone(),
        events: vec![event],
        status: SpanStatus::Unset,
        scope: String::new(),
    }
}

/// Intrinsics not in `skip`, then agent attributes, then user attributes.
/// Later sources win on key clashes.
fn event_attributes(event: &AgentEvent, skip: &[&str]) -> Vec<(String, AttributeValue)> {
    let mut merged: Vec<(String, AttributeValue)> = Vec::new();
    let mut push_all = |attrs: &Attributes, skip: &[&str]| {
        for (key, value) in attrs {
            if skip.contains(&key.as_str()) {
                continue;
            }
            let Some(value) = attribute_value(value) else {
                continue;
            };
            match merged.iter_mut().find(|(k, _)| k == key) {
                Some((_, existing)) => *existing = value,
                None => merged.push((key.clone(), value)),
            }
        }
    };
    push_all(&event.intrinsics, skip);
    push_all(&event.agent_attributes, &[]);
    push_all(&event.user_attributes, &[]);
    merged
}

fn attribute_value(value: &Value) -> Option<AttributeValue> {
    match value {
        Value::Null => None,
        Value::Bool(v) => Some(AttributeValue::Bool(*v)),
        Value::Number(n) => n
            .as_i64()
            .map(AttributeValue::Int)
            .or_else(|| n.as_f64().map(AttributeValue::Double)),
        Value::String(v) => Some(AttributeValue::String(v.clone())),
        other => Some(AttributeValue::String(other.to_string())),
    }
}

fn event_time(event: &AgentEvent) -> u64 {
    event
        .intrinsics
        .get("timestamp")
        .map_or_else(now_unix_nano, timestamp_unix_nano)
}

/// Agents report milliseconds; some older ones report seconds.
fn timestamp_unix_nano(value: &Value) -> u64 {
    if let Some(ts) = value.as_u64() {
        return if ts < SECONDS_CUTOFF {
            ts.saturating_mul(1_000_000_000)
        } else {
            ts.saturating_mul(1_000_000)
        };
    }
    match value.as_f64() {
        Some(ts) if ts < 1e11 => seconds_to_nanos(ts),
        Some(ts) => seconds_to_nanos(ts / 1e3),
        None => now_unix_nano(),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn seconds_to_nanos(secs: f64) -> u64 {
    (secs.max(0.0) * 1e9) as u64
}

fn now_unix_nano() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TRACE_ID: &str = "4bf92f3577b34da6a3ce929d0e0e4736";
    const ROOT_ID: &str = "00f067aa0ba902b7";
    const CHILD_ID: &str = "00f067aa0ba902b8";
    const ARN: &str = "arn:aws:lambda:us-east-1:123456789012:function:my-function";

    fn event(intrinsics: Value, user: Value) -> AgentEvent {
        AgentEvent {
            intrinsics: intrinsics.as_object().cloned().unwrap(),
            user_attributes: user.as_object().cloned().unwrap(),
            agent_attributes: Attributes::new(),
        }
    }

    fn root_and_child() -> Vec<AgentEvent> {
        vec![
            event(
                json!({
                    "type": "Span", "traceId": TRACE_ID, "guid": ROOT_ID,
                    "timestamp": 1_700_000_000_000_u64, "duration": 0.25,
                    "name": "Function/handler", "nr.entryPoint": true, "category": "generic"
                }),
                json!({"customer": "acme"}),
            ),
            event(
                json!({
                    "type": "Span", "traceId": TRACE_ID, "guid": CHILD_ID, "parentId": ROOT_ID,
                    "timestamp": 1_700_000_000_100_u64, "duration": 0.05,
                    "name": "External/api.example.com/GET", "category": "http"
                }),
                json!({}),
            ),
        ]
    }

    #[test]
    fn test_spans_keep_ids_links_and_timing() {
        let spans = convert_events(ARN, &root_and_child(), &[], &[]);
        assert_eq!(spans.len(), 2);

        let root = &spans[0];
        assert_eq!(hex::encode(root.trace_id), TRACE_ID);
        assert_eq!(hex::encode(root.span_id), ROOT_ID);
        assert_eq!(root.parent_span_id, None);
        assert_eq!(root.kind, SpanKind::Server);
        assert_eq!(root.start_time_unix_nano, 1_700_000_000_000_000_000);
        assert_eq!(root.end_time_unix_nano, 1_700_000_000_250_000_000);
        assert_eq!(root.name, "Function/handler");
        assert_eq!(root.attribute("customer"), Some(&AttributeValue::from("acme")));
        assert_eq!(root.attribute("category"), Some(&AttributeValue::from("generic")));
        assert_eq!(root.attribute("guid"), None);
        assert_eq!(root.attribute("faas.id"), Some(&AttributeValue::from(ARN)));

        let child = &spans[1];
        assert_eq!(child.trace_id, root.trace_id);
        assert_eq!(child.parent_span_id, Some(root.span_id));
        assert_eq!(child.kind, SpanKind::Client);
    }

    #[test]
    fn test_error_attaches_to_named_span() {
        let errors = vec![event(
            json!({
                "type": "TransactionError", "traceId": TRACE_ID, "spanId": CHILD_ID,
                "timestamp": 1_700_000_000_120_u64,
                "error.class": "TimeoutError", "error.message": "upstream timed out"
            }),
            json!({"retry": 2}),
        )];
        let spans = convert_events(ARN, &root_and_child(), &errors, &[]);
        assert_eq!(spans.len(), 2);

        let child = &spans[1];
        assert_eq!(
            child.status,
            SpanStatus::Error("upstream timed out".to_string())
        );
        let exception = &child.events[0];
        assert_eq!(exception.name, "exception");
        assert_eq!(exception.time_unix_nano, 1_700_000_000_120_000_000);
        assert!(exception
            .attributes
            .contains(&("exception.type".to_string(), "TimeoutError".into())));
        assert!(exception
            .attributes
            .contains(&("retry".to_string(), AttributeValue::Int(2))));
        assert!(spans[0].events.is_empty());
    }

    #[test]
    fn test_error_without_span_id_goes_to_entry_point() {
        let errors = vec![event(
            json!({"traceId": TRACE_ID, "error.class": "ValueError"}),
            json!({}),
        )];
        let spans = convert_events(ARN, &root_and_child(), &errors, &[]);
        assert_eq!(spans[0].status, SpanStatus::Error("ValueError".to_string()));
        assert_eq!(spans[0].events.len(), 1);
    }

    #[test]
    fn test_custom_events_attach_to_entry_point() {
        let custom = vec![
            event(
                json!({"type": "Purchase", "timestamp": 1_700_000_000_050_u64}),
                json!({"amount": 12.5}),
            ),
            event(json!({"timestamp": 1_700_000_001_u64}), json!({})),
        ];
        let spans = convert_events(ARN, &root_and_child(), &[], &custom);
        let root = &spans[0];
        assert_eq!(root.events.len(), 2);
        assert_eq!(root.events[0].name, "Purchase");
        assert_eq!(
            root.events[0].attributes,
            vec![("amount".to_string(), AttributeValue::Double(12.5))]
        );
        assert_eq!(root.events[1].name, DEFAULT_CUSTOM_EVENT_NAME);
        // seconds-based timestamps are converted too
        assert_eq!(root.events[1].time_unix_nano, 1_700_000_001_000_000_000);
    }

    #[test]
    fn test_errors_and_custom_events_without_spans() {
        let errors = vec![event(
            json!({"traceId": TRACE_ID, "error.class": "KeyError", "error.message": "missing"}),
            json!({}),
        )];
        let custom = vec![event(json!({"type": "Signup"}), json!({"plan": "pro"}))];
        let spans = convert_events("", &[], &errors, &custom);
        assert_eq!(spans.len(), 2);

        assert_eq!(spans[0].name, "error: KeyError");
        assert_eq!(hex::encode(spans[0].trace_id), TRACE_ID);
        assert_eq!(spans[0].status, SpanStatus::Error("missing".to_string()));

        assert_eq!(spans[1].name, "Signup");
        assert_eq!(spans[1].attribute("plan"), Some(&AttributeValue::from("pro")));
        assert_eq!(spans[1].attribute("faas.id"), None);
    }

    #[test]
    fn test_empty_sequences() {
        assert!(convert_events(ARN, &[], &[], &[]).is_empty());
    }

    #[test]
    fn test_spans_without_ids_share_a_trace() {
        let spans = vec![
            event(json!({"name": "a"}), json!({})),
            event(json!({"name": "b", "traceId": "not-hex"}), json!({})),
        ];
        let out = convert_events(ARN, &spans, &[], &[]);
        assert_eq!(out[0].trace_id, out[1].trace_id);
        assert_ne!(out[0].span_id, out[1].span_id);
    }
}
