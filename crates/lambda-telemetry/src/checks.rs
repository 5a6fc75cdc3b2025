// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Startup checks run once the extension has registered.
//!
//! A check is a plain function over the configuration, the registration
//! response and the detected runtime. A failing check is reported to the
//! function's own log stream as a single line so it is visible next to the
//! function output, and the error is handed back to the caller.

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::Config;
use crate::errors::CheckError;
use crate::logs::{LogLine, LogSender};
use crate::trace::Context;

/// Prefix of the line forwarded when a check fails.
pub const CHECK_FAILED_PREFIX: &str = "Startup check failed: ";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResponse {
    #[serde(default)]
    pub function_name: String,
    #[serde(default)]
    pub function_version: String,
    #[serde(default)]
    pub handler: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub language: String,
    pub runtime_version: Option<String>,
}

pub type Check = fn(&Config, &RegistrationResponse, &RuntimeConfig) -> anyhow::Result<()>;

/// Runs one check, forwarding exactly one log line if it fails.
pub async fn run_check(
    ctx: &Context,
    config: &Config,
    registration: &RegistrationResponse,
    runtime: &RuntimeConfig,
    log_sender: &dyn LogSender,
    check: Check,
) -> Result<(), CheckError> {
    let Err(err) = check(config, registration, runtime) else {
        return Ok(());
    };

    let content = format!("{CHECK_FAILED_PREFIX}{err}");
    error!("{content}");
    let line = LogLine::new("", content);
    if let Err(e) = log_sender.send_function_logs(ctx, vec![line]).await {
        error!("Failed to forward startup check failure: {e}");
    }
    Err(CheckError::Failed(err))
}

/// Runs checks in order, stopping at the first failure.
pub async fn run_checks(
    ctx: &Context,
    config: &Config,
    registration: &RegistrationResponse,
    runtime: &RuntimeConfig,
    log_sender: &dyn LogSender,
    checks: &[Check],
) -> Result<(), CheckError> {
    for check in checks {
        run_check(ctx, config, registration, runtime, log_sender, *check).await?;
    }
    debug!("{} startup checks passed", checks.len());
    Ok(())
}
