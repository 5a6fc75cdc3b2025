// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log formatting for the extension's own diagnostics.
//!
//! Extension logs share the function's log stream, so every line is prefixed
//! to tell them apart from function output:
//!
//! ```text
//! [NR_EXT] | WARN | Skipping telemetry payload with unsupported version 3
//! [NR_EXT] | DEBUG | send{records=4}: Sent 1 agent payloads from a batch of 4 records
//! ```

use std::error::Error;
use std::fmt;

use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

pub const LOG_PREFIX: &str = "[NR_EXT]";

#[derive(Debug, Clone, Copy)]
pub struct Formatter;

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(&mut writer, "{LOG_PREFIX} | {} | ", event.metadata().level())?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name())?;

                let ext = span.extensions();
                if let Some(fields) = ext.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{fields}}}")?;
                    }
                }
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

fn env_filter(level: &str) -> Result<EnvFilter, Box<dyn Error + Send + Sync>> {
    let directives = format!("h2=off,hyper=off,reqwest=off,rustls=off,{level}");
    Ok(EnvFilter::try_new(directives)?)
}

/// Installs the global subscriber. Fails on an unparsable level or when a
/// global subscriber is already set.
pub fn init(level: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(env_filter(level)?)
        .event_format(Formatter)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    tracing::debug!("Logging subsystem enabled");
    Ok(())
}
