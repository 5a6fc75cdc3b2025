// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Decodes New Relic agent telemetry embedded in Lambda function log records
//! and replays it as OTLP traces.
//!
//! Agents running inside a function write their harvest to the function's log
//! stream as a marked JSON envelope. The [`sender::OtelTelemetrySender`] takes
//! a batch of raw records, decodes the envelopes ([`envelope`]), turns the
//! agent's span, error and custom events into spans ([`replay`]) and flushes
//! them through a batching OTLP/HTTP pipeline ([`trace`]) before returning.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod agent_data;
pub mod checks;
pub mod config;
pub mod envelope;
pub mod errors;
pub mod http_utils;
pub mod logger;
pub mod logs;
pub mod replay;
pub mod sender;
pub mod trace;

pub use config::Config;
pub use envelope::MONITORING_MARKER;
pub use sender::{OtelTelemetrySender, TelemetrySender};
