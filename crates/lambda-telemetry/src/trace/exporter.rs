// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Span export to an OTLP/HTTP collector.
//!
//! Spans are grouped by the tracer that recorded them, wrapped in a single
//! `ExportTraceServiceRequest` and POSTed as protobuf to `{endpoint}/v1/traces`.

use std::collections::BTreeMap;
use std::time::Instant;

use async_trait::async_trait;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::common::v1::{any_value, AnyValue, InstrumentationScope, KeyValue};
use opentelemetry_proto::tonic::resource::v1::Resource;
use opentelemetry_proto::tonic::trace::v1::{
    span as proto_span, status as proto_status, ResourceSpans, ScopeSpans, Span, Status,
};
use prost::Message;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use tracing::{debug, error};

use crate::config::Config;
use crate::errors::ExportError;
use crate::http_utils::build_client;
use crate::trace::span::{AttributeValue, SpanData, SpanKind, SpanStatus};

/// Hands finished spans to a collector.
#[async_trait]
pub trait SpanExporter: Send + Sync {
    /// Exports one batch. An error means the batch was not accepted.
    async fn export(&self, spans: Vec<SpanData>) -> Result<(), ExportError>;
}

pub struct OtlpHttpExporter {
    client: reqwest::Client,
    traces_url: String,
    headers: HeaderMap,
    service_name: String,
}

impl OtlpHttpExporter {
    pub fn new(config: &Config) -> Result<Self, ExportError> {
        let client = build_client(config.proxy_url.as_deref(), config.export_timeout)
            .map_err(|e| ExportError::Client(e.to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(
            "api-key",
            HeaderValue::from_str(&config.license_key)
                .map_err(|_| ExportError::Client("license key is not a valid header value".to_string()))?,
        );
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-protobuf"),
        );

        Ok(OtlpHttpExporter {
            client,
            traces_url: config.traces_url(),
            headers,
            service_name: config.service_name.clone(),
        })
    }
}

#[async_trait]
impl SpanExporter for OtlpHttpExporter {
    async fn export(&self, spans: Vec<SpanData>) -> Result<(), ExportError> {
        if spans.is_empty() {
            return Ok(());
        }
        let n_spans = spans.len();
        let body = to_export_request(&self.service_name, spans).encode_to_vec();

        let time = Instant::now();
        let response = self
            .client
            .post(&self.traces_url)
            .headers(self.headers.clone())
            .body(body)
            .send()
            .await?;
        let elapsed = time.elapsed();

        let status = response.status();
        if status.is_success() {
            debug!(
                "Exported {n_spans} spans in {} ms to {}",
                elapsed.as_millis(),
                self.traces_url
            );
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        error!("OTLP export failed with status {status}: {body}");
        Err(ExportError::Status { status, body })
    }
}

/// Builds the OTLP request for a batch of spans.
#[must_use]
pub fn to_export_request(service_name: &str, spans: Vec<SpanData>) -> ExportTraceServiceRequest {
    let mut by_scope: BTreeMap<String, Vec<Span>> = BTreeMap::new();
    for span in spans {
        let scope = span.scope.clone();
        by_scope.entry(scope).or_default().push(to_proto_span(span));
    }

    let scope_spans = by_scope
        .into_iter()
        .map(|(scope, spans)| ScopeSpans {
            scope: Some(InstrumentationScope {
                name: scope,
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            }),
            spans,
            ..Default::default()
        })
        .collect();

    ExportTraceServiceRequest {
        resource_spans: vec![ResourceSpans {
            resource: Some(Resource {
                attributes: vec![key_value(
                    "service.name",
                    AttributeValue::from(service_name),
                )],
                ..Default::default()
            }),
            scope_spans,
            ..Default::default()
        }],
    }
}

fn to_proto_span(span: SpanData) -> Span {
    let kind = match span.kind {
        SpanKind::Internal => proto_span::SpanKind::Internal,
        SpanKind::Server => proto_span::SpanKind::Server,
        SpanKind::Client => proto_span::SpanKind::Client,
    };
    let status = match span.status {
        SpanStatus::Unset => None,
        SpanStatus::Ok => Some(Status {
            code: proto_status::StatusCode::Ok as i32,
            ..Default::default()
        }),
        SpanStatus::Error(message) => Some(Status {
            message,
            code: proto_status::StatusCode::Error as i32,
        }),
    };

    Span {
        trace_id: span.trace_id.to_vec(),
        span_id: span.span_id.to_vec(),
        parent_span_id: span.parent_span_id.map(|id| id.to_vec()).unwrap_or_default(),
        name: span.name,
        kind: kind as i32,
        start_time_unix_nano: span.start_time_unix_nano,
        end_time_unix_nano: span.end_time_unix_nano,
        attributes: span
            .attributes
            .into_iter()
            .map(|(k, v)| key_value(&k, v))
            .collect(),
        events: span
            .events
            .into_iter()
            .map(|event| proto_span::Event {
                time_unix_nano: event.time_unix_nano,
                name: event.name,
                attributes: event
                    .attributes
                    .into_iter()
                    .map(|(k, v)| key_value(&k, v))
                    .collect(),
                ..Default::default()
            })
            .collect(),
        status,
        ..Default::default()
    }
}

fn key_value(key: &str, value: AttributeValue) -> KeyValue {
    let value = match value {
        AttributeValue::String(v) => any_value::Value::StringValue(v),
        AttributeValue::Bool(v) => any_value::Value::BoolValue(v),
        AttributeValue::Int(v) => any_value::Value::IntValue(v),
        AttributeValue::Double(v) => any_value::Value::DoubleValue(v),
    };
    KeyValue {
        key: key.to_string(),
        value: Some(AnyValue { value: Some(value) }),
    }
}
