// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Builders for agent payloads and log records

#![allow(dead_code)]

use base64::{engine::general_purpose::STANDARD, Engine};
use flate2::{write::GzEncoder, Compression};
use lambda_telemetry::agent_data::{AgentData, AgentEvent, Attributes, EventCollection};
use serde_json::{json, Value};
use std::io::Write;

pub const TRACE_ID: &str = "4bf92f3577b34da6a3ce929d0e0e4736";
pub const ROOT_SPAN_ID: &str = "00f067aa0ba902b7";
pub const CHILD_SPAN_ID: &str = "00f067aa0ba902b8";
pub const FUNCTION_ARN: &str = "arn:aws:lambda:us-east-1:123456789012:function:my-function";

pub fn attrs(value: Value) -> Attributes {
    value.as_object().cloned().expect("attributes must be an object")
}

pub fn event(intrinsics: Value) -> AgentEvent {
    AgentEvent {
        intrinsics: attrs(intrinsics),
        ..Default::default()
    }
}

/// An invocation with an entry point span, one outbound call, an error on the
/// call and one custom event.
pub fn invocation() -> AgentData {
    AgentData {
        span_event_data: EventCollection::from_events(vec![
            event(json!({
                "type": "Span", "traceId": TRACE_ID, "guid": ROOT_SPAN_ID,
                "timestamp": 1_700_000_000_000_u64, "duration": 0.3,
                "name": "Function/handler", "nr.entryPoint": true
            })),
            event(json!({
                "type": "Span", "traceId": TRACE_ID, "guid": CHILD_SPAN_ID,
                "parentId": ROOT_SPAN_ID, "timestamp": 1_700_000_000_100_u64,
                "duration": 0.1, "name": "External/api.example.com/GET", "category": "http"
            })),
        ]),
        error_event_data: EventCollection::from_events(vec![event(json!({
            "type": "TransactionError", "traceId": TRACE_ID, "spanId": CHILD_SPAN_ID,
            "timestamp": 1_700_000_000_150_u64,
            "error.class": "TimeoutError", "error.message": "upstream timed out"
        }))]),
        custom_event_data: EventCollection::from_events(vec![event(json!({
            "type": "Purchase", "timestamp": 1_700_000_000_200_u64
        }))]),
    }
}

/// base64(gzip(json(value)))
pub fn encode_payload(value: &Value) -> String {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(value.to_string().as_bytes())
        .expect("gzip write");
    STANDARD.encode(encoder.finish().expect("gzip finish"))
}

pub fn v1_record(data: &AgentData) -> Vec<u8> {
    let wrapper = json!({
        "metadata": {"protocol_version": 17, "agent_version": "10.0.0"},
        "data": data,
    });
    json!([1, "NR_LAMBDA_MONITORING", encode_payload(&wrapper)])
        .to_string()
        .into_bytes()
}

pub fn v2_record(data: &AgentData) -> Vec<u8> {
    let data = serde_json::to_value(data).expect("agent data serializes");
    json!([
        2,
        "NR_LAMBDA_MONITORING",
        {"arn": FUNCTION_ARN, "protocol_version": 17},
        encode_payload(&data)
    ])
    .to_string()
    .into_bytes()
}

pub fn record_with_version(version: i64) -> Vec<u8> {
    json!([version, "NR_LAMBDA_MONITORING", {}, "opaque"])
        .to_string()
        .into_bytes()
}

pub fn plain_log_line(text: &str) -> Vec<u8> {
    text.as_bytes().to_vec()
}
