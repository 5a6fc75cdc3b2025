// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

pub type TraceId = [u8; 16];
pub type SpanId = [u8; 8];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpanKind {
    #[default]
    Internal,
    Server,
    Client,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum SpanStatus {
    #[default]
    Unset,
    Ok,
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    String(String),
    Bool(bool),
    Int(i64),
    Double(f64),
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::String(v) => f.write_str(v),
            AttributeValue::Bool(v) => write!(f, "{v}"),
            AttributeValue::Int(v) => write!(f, "{v}"),
            AttributeValue::Double(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Double(value)
    }
}

/// A timestamped annotation on a span (exceptions, custom events).
#[derive(Debug, Clone, PartialEq)]
pub struct SpanEvent {
    pub name: String,
    pub time_unix_nano: u64,
    pub attributes: Vec<(String, AttributeValue)>,
}

/// A finished span waiting to be exported.
#[derive(Debug, Clone, PartialEq)]
pub struct SpanData {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub parent_span_id: Option<SpanId>,
    pub name: String,
    pub kind: SpanKind,
    pub start_time_unix_nano: u64,
    pub end_time_unix_nano: u64,
    pub attributes: Vec<(String, AttributeValue)>,
    pub events: Vec<SpanEvent>,
    pub status: SpanStatus,
    /// Name of the tracer that recorded the span
    pub scope: String,
}

impl SpanData {
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Sets `key`, replacing an existing value.
    pub fn set_attribute(&mut self, key: &str, value: impl Into<AttributeValue>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = value,
            None => self.attributes.push((key.to_string(), value)),
        }
    }
}

/// Parses a hex trace id, left-padding 16 character ids to 32.
#[must_use]
pub fn parse_trace_id(value: &str) -> Option<TraceId> {
    let value = value.trim();
    if value.is_empty() || value.len() > 32 {
        return None;
    }
    let padded = format!("{value:0>32}");
    let mut id = [0u8; 16];
    hex::decode_to_slice(padded, &mut id).ok()?;
    (id != [0u8; 16]).then_some(id)
}

#[must_use]
pub fn parse_span_id(value: &str) -> Option<SpanId> {
    let value = value.trim();
    if value.is_empty() || value.len() > 16 {
        return None;
    }
    let padded = format!("{value:0>16}");
    let mut id = [0u8; 8];
    hex::decode_to_slice(padded, &mut id).ok()?;
    (id != [0u8; 8]).then_some(id)
}

/// A random, non-zero trace id.
#[must_use]
pub fn random_trace_id() -> TraceId {
    fastrand::u128(1..).to_be_bytes()
}

/// A random, non-zero span id.
#[must_use]
pub fn random_span_id() -> SpanId {
    fastrand::u64(1..).to_be_bytes()
}
