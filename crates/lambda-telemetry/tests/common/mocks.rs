// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Mock exporters and log senders

use async_trait::async_trait;
use lambda_telemetry::{
    errors::{ExportError, LogSendError},
    logs::{LogLine, LogSender},
    trace::{span::SpanData, Context},
};
use std::sync::Mutex;

/// Exporter that keeps every batch it is given
#[derive(Default)]
pub struct RecordingExporter {
    pub batches: Mutex<Vec<Vec<SpanData>>>,
}

#[allow(dead_code)]
impl RecordingExporter {
    pub fn batch_count(&self) -> usize {
        self.batches.lock().unwrap().len()
    }

    pub fn spans(&self) -> Vec<SpanData> {
        self.batches.lock().unwrap().iter().flatten().cloned().collect()
    }
}

#[async_trait]
impl lambda_telemetry::trace::exporter::SpanExporter for RecordingExporter {
    async fn export(&self, spans: Vec<SpanData>) -> Result<(), ExportError> {
        self.batches.lock().unwrap().push(spans);
        Ok(())
    }
}

/// Exporter that rejects every batch
#[allow(dead_code)]
pub struct FailingExporter;

#[async_trait]
impl lambda_telemetry::trace::exporter::SpanExporter for FailingExporter {
    async fn export(&self, _spans: Vec<SpanData>) -> Result<(), ExportError> {
        Err(ExportError::Client("collector unreachable".to_string()))
    }
}

/// Exporter that never completes
#[allow(dead_code)]
pub struct StallingExporter;

#[async_trait]
impl lambda_telemetry::trace::exporter::SpanExporter for StallingExporter {
    async fn export(&self, _spans: Vec<SpanData>) -> Result<(), ExportError> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

/// Log sender that keeps every line it is given
#[allow(dead_code)]
#[derive(Default)]
pub struct RecordingLogSender {
    pub sent: Mutex<Vec<LogLine>>,
}

#[async_trait]
impl LogSender for RecordingLogSender {
    async fn send_function_logs(
        &self,
        _ctx: &Context,
        lines: Vec<LogLine>,
    ) -> Result<(), LogSendError> {
        self.sent.lock().unwrap().extend(lines);
        Ok(())
    }
}
