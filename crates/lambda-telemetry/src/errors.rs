// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error types for envelope decoding, span export and the telemetry sender.

use std::fmt;

use reqwest::StatusCode;

/// Step of the payload decoding pipeline that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStage {
    Base64,
    Decompress,
    Parse,
}

impl fmt::Display for DecodeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            DecodeStage::Base64 => "base64",
            DecodeStage::Decompress => "decompress",
            DecodeStage::Parse => "parse",
        };
        f.write_str(stage)
    }
}

/// Failure to turn an encoded payload string into a structured value.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("payload gzip stream is corrupt or truncated: {0}")]
    Decompress(#[source] std::io::Error),

    #[error("payload does not match the expected shape: {0}")]
    Parse(#[from] serde_json::Error),
}

impl DecodeError {
    #[must_use]
    pub fn stage(&self) -> DecodeStage {
        match self {
            DecodeError::Base64(_) => DecodeStage::Base64,
            DecodeError::Decompress(_) => DecodeStage::Decompress,
            DecodeError::Parse(_) => DecodeStage::Parse,
        }
    }
}

/// Failure to turn a candidate log record into agent data.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("malformed envelope: {0}")]
    Malformed(String),

    #[error("failed to decode envelope payload at the {} stage: {0}", .0.stage())]
    Decode(#[from] DecodeError),

    #[error("unsupported envelope version {0}")]
    UnknownVersion(i64),
}

/// Failure to hand a batch of spans to the collector.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to build OTLP HTTP client: {0}")]
    Client(String),

    #[error("OTLP export request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("OTLP collector rejected the export with status {status}: {body}")]
    Status { status: StatusCode, body: String },
}

/// Failure of a forced flush of the trace provider.
#[derive(Debug, thiserror::Error)]
pub enum FlushError {
    #[error("flush deadline exceeded")]
    DeadlineExceeded,

    #[error("flush cancelled")]
    Cancelled,

    #[error("span export failed during flush: {0}")]
    Export(#[from] ExportError),

    #[error("trace provider is shut down")]
    ProviderClosed,
}

/// Error returned by [`crate::sender::TelemetrySender::send_telemetry`].
///
/// Both variants mean no telemetry from the batch should be treated as delivered.
/// A decode failure happens before anything is flushed; a flush failure may
/// happen after some spans already reached the transport.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error(transparent)]
    Flush(#[from] FlushError),
}

impl TelemetryError {
    #[must_use]
    pub fn is_flush(&self) -> bool {
        matches!(self, TelemetryError::Flush(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LogSendError {
    #[error("failed to forward function logs: {0}")]
    Forward(String),
}

/// Error returned by the startup check runner.
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("Startup check failed: {0}")]
    Failed(#[source] anyhow::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is not set")]
    MissingEnv(&'static str),

    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_stage() {
        let err = DecodeError::Decompress(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "truncated",
        ));
        assert_eq!(err.stage(), DecodeStage::Decompress);
        assert_eq!(err.stage().to_string(), "decompress");
    }

    #[test]
    fn test_envelope_error_names_stage() {
        let parse_err = serde_json::from_str::<u8>("nope").unwrap_err();
        let err = EnvelopeError::from(DecodeError::from(parse_err));
        assert!(err.to_string().starts_with("failed to decode envelope payload at the parse stage"));
    }

    #[test]
    fn test_telemetry_error_is_flush() {
        let flush = TelemetryError::from(FlushError::DeadlineExceeded);
        assert!(flush.is_flush());
        assert_eq!(flush.to_string(), "flush deadline exceeded");

        let decode = TelemetryError::from(EnvelopeError::Malformed("empty".to_string()));
        assert!(!decode.is_flush());
        assert_eq!(decode.to_string(), "malformed envelope: empty");
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::MissingEnv("NEW_RELIC_LICENSE_KEY");
        assert_eq!(
            err.to_string(),
            "NEW_RELIC_LICENSE_KEY environment variable is not set"
        );
    }
}
