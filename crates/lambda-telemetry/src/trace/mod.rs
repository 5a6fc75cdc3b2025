// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Span pipeline: span model, batching provider, caller context and OTLP export.

pub mod aggregator;
pub mod context;
pub mod exporter;
pub mod provider;
pub mod span;

pub use context::Context;
pub use provider::{TraceProvider, Tracer};
