// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batching span pipeline with an explicit, deadline-aware flush.
//!
//! The provider follows an actor layout: cloneable [`Tracer`] handles send
//! commands over a channel to a single [`BatchSpanService`] task that owns the
//! span queue and the exporter.
//!
//! ```text
//!   Tracer ──Record──┐
//!   Tracer ──Record──┼──> BatchSpanService ──> SpanExporter
//!   force_flush ─────┘        (queue)            (OTLP/HTTP)
//! ```
//!
//! The service exports on its own schedule (every `batch_scheduled_delay`, or
//! as soon as a full batch is queued). `force_flush` is the synchronization
//! point: it resolves once every span recorded before it has been handed to the
//! exporter. Export failures from the background schedule are held until the
//! next flush, which reports the first of them.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::errors::{ExportError, FlushError};
use crate::trace::aggregator::SpanAggregator;
use crate::trace::context::Context;
use crate::trace::exporter::{OtlpHttpExporter, SpanExporter};
use crate::trace::span::SpanData;

#[derive(Debug)]
pub enum ProviderCommand {
    Record(Vec<SpanData>),
    Flush(oneshot::Sender<Result<(), ExportError>>),
    Shutdown(oneshot::Sender<Result<(), ExportError>>),
}

pub struct BatchSpanService {
    aggregator: SpanAggregator,
    exporter: Arc<dyn SpanExporter>,
    scheduled_delay: Duration,
    rx: mpsc::UnboundedReceiver<ProviderCommand>,
    /// First export failure since the last flush
    export_error: Option<ExportError>,
}

impl BatchSpanService {
    #[must_use]
    pub fn new(
        config: &Config,
        exporter: Arc<dyn SpanExporter>,
    ) -> (Self, mpsc::UnboundedSender<ProviderCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let service = BatchSpanService {
            aggregator: SpanAggregator::new(config.max_queue_size, config.max_export_batch_size),
            exporter,
            scheduled_delay: config.batch_scheduled_delay,
            rx,
            export_error: None,
        };
        (service, tx)
    }

    pub async fn run(mut self) {
        debug!("Batch span service started");

        let mut interval =
            tokio::time::interval(self.scheduled_delay.max(Duration::from_millis(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        interval.tick().await;

        loop {
            tokio::select! {
                command = self.rx.recv() => match command {
                    Some(ProviderCommand::Record(spans)) => {
                        for span in spans {
                            self.aggregator.add(span);
                        }
                        while self.aggregator.has_full_batch() {
                            let batch = self.aggregator.get_batch();
                            if let Err(e) = self.exporter.export(batch).await {
                                error!("Failed to export full span batch: {e}");
                                self.export_error.get_or_insert(e);
                            }
                        }
                    }
                    Some(ProviderCommand::Flush(response_tx)) => {
                        let result = self.flush().await;
                        if response_tx.send(result).is_err() {
                            debug!("Flush requester went away before the flush completed");
                        }
                    }
                    Some(ProviderCommand::Shutdown(response_tx)) => {
                        let result = self.flush().await;
                        if response_tx.send(result).is_err() {
                            debug!("Shutdown requester went away before the final flush completed");
                        }
                        break;
                    }
                    None => {
                        // every handle is gone, nothing can flush us anymore
                        if let Err(e) = self.export_all().await {
                            error!("Failed to export remaining spans: {e}");
                        }
                        break;
                    }
                },
                _ = interval.tick() => {
                    if !self.aggregator.is_empty() {
                        if let Err(e) = self.export_all().await {
                            error!("Failed to export scheduled span batch: {e}");
                            self.export_error.get_or_insert(e);
                        }
                    }
                }
            }
        }

        debug!("Batch span service stopped");
    }

    /// Exports every queued span, then reports the first failure since the
    /// previous flush and clears it.
    async fn flush(&mut self) -> Result<(), ExportError> {
        let result = self.export_all().await;
        match self.export_error.take() {
            Some(e) => Err(e),
            None => result,
        }
    }

    /// Exports every queued span. Returns the first export error, if any.
    async fn export_all(&mut self) -> Result<(), ExportError> {
        let mut first_error = None;
        let mut batch = self.aggregator.get_batch();
        while !batch.is_empty() {
            if let Err(e) = self.exporter.export(batch).await {
                warn!("Dropping span batch after export failure: {e}");
                first_error.get_or_insert(e);
            }
            batch = self.aggregator.get_batch();
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// Long-lived span pipeline owned by a telemetry sender.
pub struct TraceProvider {
    tx: mpsc::UnboundedSender<ProviderCommand>,
    flushes: AtomicUsize,
}

impl TraceProvider {
    /// Starts the batch service on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    #[must_use]
    pub fn new(config: &Config, exporter: Arc<dyn SpanExporter>) -> Self {
        let (service, tx) = BatchSpanService::new(config, exporter);
        tokio::spawn(service.run());
        TraceProvider {
            tx,
            flushes: AtomicUsize::new(0),
        }
    }

    /// Builds a provider exporting to the configured OTLP/HTTP endpoint.
    pub fn with_otlp_exporter(config: &Config) -> Result<Self, ExportError> {
        let exporter = OtlpHttpExporter::new(config)?;
        Ok(TraceProvider::new(config, Arc::new(exporter)))
    }

    #[must_use]
    pub fn tracer(&self, name: &str) -> Tracer {
        Tracer {
            scope: name.to_string(),
            tx: self.tx.clone(),
        }
    }

    /// Blocks until every span recorded so far has been handed to the exporter,
    /// or until `ctx` is cancelled or its deadline passes.
    pub async fn force_flush(&self, ctx: &Context) -> Result<(), FlushError> {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(ProviderCommand::Flush(response_tx))
            .map_err(|_| FlushError::ProviderClosed)?;

        match ctx.run(response_rx).await? {
            Ok(result) => result.map_err(FlushError::from),
            Err(_) => Err(FlushError::ProviderClosed),
        }
    }

    /// Number of `force_flush` calls made on this provider.
    #[must_use]
    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::Relaxed)
    }

    /// Flushes remaining spans and stops the batch service.
    pub async fn shutdown(&self, ctx: &Context) -> Result<(), FlushError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(ProviderCommand::Shutdown(response_tx))
            .map_err(|_| FlushError::ProviderClosed)?;

        match ctx.run(response_rx).await? {
            Ok(result) => result.map_err(FlushError::from),
            Err(_) => Err(FlushError::ProviderClosed),
        }
    }
}

/// Records finished spans into the provider under one instrumentation scope.
#[derive(Clone)]
pub struct Tracer {
    scope: String,
    tx: mpsc::UnboundedSender<ProviderCommand>,
}

impl Tracer {
    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn record(&self, span: SpanData) {
        self.record_batch(vec![span]);
    }

    /// Queues spans for export. Spans recorded after shutdown are dropped.
    pub fn record_batch(&self, mut spans: Vec<SpanData>) {
        if spans.is_empty() {
            return;
        }
        for span in &mut spans {
            span.scope.clone_from(&self.scope);
        }
        if self.tx.send(ProviderCommand::Record(spans)).is_err() {
            warn!("Trace provider is shut down, dropping spans");
        }
    }
}
