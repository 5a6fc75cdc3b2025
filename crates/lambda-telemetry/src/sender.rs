// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Entry point for batches of raw function log records.
//!
//! `send_telemetry` picks the records carrying an agent payload, decodes them,
//! replays the agent data as spans and flushes the trace provider before
//! returning. A batch is all-or-nothing: a record that fails to decode aborts
//! the call before any of its spans are recorded.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::config::{Config, UnknownVersionPolicy};
use crate::envelope::{decode_record, is_candidate};
use crate::errors::{ExportError, LogSendError, TelemetryError};
use crate::logs::{LogLine, LogSender};
use crate::replay::replay_spans;
use crate::trace::exporter::SpanExporter;
use crate::trace::{Context, TraceProvider};

/// Instrumentation scope of replayed spans.
pub const TRACER_NAME: &str = "newrelic-lambda-extension";

#[async_trait]
pub trait TelemetrySender: Send + Sync {
    /// Decodes and replays every agent payload in `telemetry`, then flushes.
    ///
    /// Returns the number of records in the batch, including those without a
    /// payload. Any error means none of the batch counts as delivered.
    async fn send_telemetry(
        &self,
        ctx: &Context,
        function_arn: &str,
        telemetry: &[Vec<u8>],
    ) -> Result<usize, TelemetryError>;
}

/// Sends agent telemetry as OTLP traces.
pub struct OtelTelemetrySender {
    provider: TraceProvider,
    unknown_version_policy: UnknownVersionPolicy,
}

impl OtelTelemetrySender {
    /// Builds a sender exporting to the configured OTLP/HTTP endpoint.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: &Config) -> Result<Self, ExportError> {
        Ok(OtelTelemetrySender {
            provider: TraceProvider::with_otlp_exporter(config)?,
            unknown_version_policy: config.unknown_version_policy,
        })
    }

    #[must_use]
    pub fn with_exporter(config: &Config, exporter: Arc<dyn SpanExporter>) -> Self {
        OtelTelemetrySender::with_provider(
            TraceProvider::new(config, exporter),
            config.unknown_version_policy,
        )
    }

    #[must_use]
    pub fn with_provider(
        provider: TraceProvider,
        unknown_version_policy: UnknownVersionPolicy,
    ) -> Self {
        OtelTelemetrySender {
            provider,
            unknown_version_policy,
        }
    }

    #[must_use]
    pub fn provider(&self) -> &TraceProvider {
        &self.provider
    }

    async fn send(
        &self,
        ctx: &Context,
        function_arn: &str,
        telemetry: &[Vec<u8>],
    ) -> Result<usize, TelemetryError> {
        let mut decoded = Vec::new();
        for buf in telemetry.iter().filter(|buf| is_candidate(buf)) {
            match decode_record(buf, self.unknown_version_policy)? {
                Some(data) if data.is_empty() => debug!("Agent payload carries no events"),
                Some(data) => decoded.push(data),
                None => {}
            }
        }

        let tracer = self.provider.tracer(TRACER_NAME);
        for data in &decoded {
            replay_spans(
                &tracer,
                function_arn,
                &data.span_event_data.agent_events(),
                &data.error_event_data.agent_events(),
                &data.custom_event_data.agent_events(),
            );
        }

        self.provider.force_flush(ctx).await?;
        debug!(
            "Sent {} agent payloads from a batch of {} records",
            decoded.len(),
            telemetry.len()
        );
        Ok(telemetry.len())
    }
}

#[async_trait]
impl TelemetrySender for OtelTelemetrySender {
    async fn send_telemetry(
        &self,
        ctx: &Context,
        function_arn: &str,
        telemetry: &[Vec<u8>],
    ) -> Result<usize, TelemetryError> {
        self.send(ctx, function_arn, telemetry).await.map_err(|e| {
            match &e {
                TelemetryError::Envelope(err) => {
                    error!("Dropping telemetry batch, failed to decode agent payload: {err}");
                }
                TelemetryError::Flush(err) => {
                    error!("Failed to flush replayed telemetry: {err}");
                }
            }
            e
        })
    }
}

/// Function logs are shipped by the log forwarder, not by this sender.
#[async_trait]
impl LogSender for OtelTelemetrySender {
    async fn send_function_logs(
        &self,
        _ctx: &Context,
        lines: Vec<LogLine>,
    ) -> Result<(), LogSendError> {
        debug!("Ignoring {} function log lines", lines.len());
        Ok(())
    }
}
