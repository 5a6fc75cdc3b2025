// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Decoding of the monitoring envelope embedded in a function log record.
//!
//! A candidate record is a JSON array whose first element is the format version:
//!
//! ```text
//! [1, "NR_LAMBDA_MONITORING", "<base64(gzip(json wrapper))>"]
//! [2, "NR_LAMBDA_MONITORING", {metadata}, "<base64(gzip(json agent data))>"]
//! ```
//!
//! The payload is decoded in a fixed order (base64, gzip, JSON) and any failing
//! step aborts the whole record.

use std::io::Read;

use base64::{engine::general_purpose::STANDARD, Engine};
use flate2::read::GzDecoder;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::agent_data::{AgentData, RawAgentData};
use crate::config::UnknownVersionPolicy;
use crate::errors::{DecodeError, EnvelopeError};

/// Substring that marks a log record as carrying an agent payload.
pub const MONITORING_MARKER: &str = "NR_LAMBDA_MONITORING";

const V1_PAYLOAD_INDEX: usize = 2;
const V2_PAYLOAD_INDEX: usize = 3;

/// Returns true if the raw record contains the monitoring marker.
#[must_use]
pub fn is_candidate(buf: &[u8]) -> bool {
    let marker = MONITORING_MARKER.as_bytes();
    buf.windows(marker.len()).any(|window| window == marker)
}

/// Reverses base64, then gzip, then parses the JSON document as `T`.
pub fn decode_payload<T: DeserializeOwned>(encoded: &str) -> Result<T, DecodeError> {
    let compressed = STANDARD.decode(encoded.trim())?;

    let mut decoder = GzDecoder::new(&compressed[..]);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(DecodeError::Decompress)?;

    Ok(serde_json::from_slice(&decompressed)?)
}

/// A parsed envelope, tagged by format version.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// Payload decodes to a [`RawAgentData`] wrapper.
    V1 { payload: String },
    /// Payload decodes to [`AgentData`] directly.
    V2 { payload: String },
    Unknown { version: i64 },
}

impl Envelope {
    /// Parses the outer JSON array of a candidate record and validates its shape.
    pub fn parse(buf: &[u8]) -> Result<Self, EnvelopeError> {
        let parts: Vec<Value> = serde_json::from_slice(buf)
            .map_err(|e| EnvelopeError::Malformed(format!("not a JSON array: {e}")))?;

        let version = match parts.first() {
            Some(tag) => version_tag(tag)?,
            None => return Err(EnvelopeError::Malformed("empty envelope".to_string())),
        };

        match version {
            1 => Ok(Envelope::V1 {
                payload: payload_at(&parts, V1_PAYLOAD_INDEX, version)?,
            }),
            2 => Ok(Envelope::V2 {
                payload: payload_at(&parts, V2_PAYLOAD_INDEX, version)?,
            }),
            version => Ok(Envelope::Unknown { version }),
        }
    }

    #[must_use]
    pub fn version(&self) -> i64 {
        match self {
            Envelope::V1 { .. } => 1,
            Envelope::V2 { .. } => 2,
            Envelope::Unknown { version } => *version,
        }
    }

    /// Decodes the payload into agent data. `Unknown` envelopes yield `None`.
    pub fn into_agent_data(self) -> Result<Option<AgentData>, DecodeError> {
        match self {
            Envelope::V1 { payload } => {
                let raw: RawAgentData = decode_payload(&payload)?;
                Ok(Some(raw.data))
            }
            Envelope::V2 { payload } => decode_payload::<AgentData>(&payload).map(Some),
            Envelope::Unknown { .. } => Ok(None),
        }
    }
}

/// Parses and decodes one candidate record.
///
/// Returns `Ok(None)` for an unrecognized version under [`UnknownVersionPolicy::Skip`].
pub fn decode_record(
    buf: &[u8],
    policy: UnknownVersionPolicy,
) -> Result<Option<AgentData>, EnvelopeError> {
    let envelope = Envelope::parse(buf)?;
    if let Envelope::Unknown { version } = envelope {
        match policy {
            UnknownVersionPolicy::Skip => {
                warn!("Skipping telemetry payload with unsupported version {version}");
                return Ok(None);
            }
            UnknownVersionPolicy::Reject => return Err(EnvelopeError::UnknownVersion(version)),
        }
    }

    debug!("Decoding version {} telemetry payload", envelope.version());
    Ok(envelope.into_agent_data()?)
}

fn version_tag(tag: &Value) -> Result<i64, EnvelopeError> {
    if let Some(version) = tag.as_i64() {
        return Ok(version);
    }
    // Some agents serialize the tag as a float.
    match tag.as_f64() {
        #[allow(clippy::cast_possible_truncation)]
        Some(version) if version.fract() == 0.0 => Ok(version as i64),
        _ => Err(EnvelopeError::Malformed(format!(
            "version tag is not an integer: {tag}"
        ))),
    }
}

fn payload_at(parts: &[Value], idx: usize, version: i64) -> Result<String, EnvelopeError> {
    match parts.get(idx) {
        Some(Value::String(payload)) => Ok(payload.clone()),
        Some(other) => Err(EnvelopeError::Malformed(format!(
            "version {version} payload at position {idx} is not a string: {}",
            type_name(other)
        ))),
        None => Err(EnvelopeError::Malformed(format!(
            "version {version} envelope has {} elements, payload expected at position {idx}",
            parts.len()
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
