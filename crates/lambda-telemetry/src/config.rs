// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::ConfigError;

const DEFAULT_OTLP_ENDPOINT: &str = "https://otlp.nr-data.net:4318";
const DEFAULT_EU_OTLP_ENDPOINT: &str = "https://otlp.eu01.nr-data.net:4318";
const DEFAULT_SERVICE_NAME: &str = "newrelic-lambda-extension";
const DEFAULT_LOG_LEVEL: &str = "info";

/// What to do with an envelope whose version tag is neither 1 nor 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownVersionPolicy {
    /// Log a warning and produce no agent data for the record.
    #[default]
    Skip,
    /// Fail the whole batch with an unknown version error.
    Reject,
}

impl FromStr for UnknownVersionPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "skip" => Ok(UnknownVersionPolicy::Skip),
            "error" | "reject" => Ok(UnknownVersionPolicy::Reject),
            _ => Err(ConfigError::InvalidValue {
                name: "NEW_RELIC_UNKNOWN_PAYLOAD_VERSION",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Clone)]
pub struct Config {
    pub license_key: String,
    /// Base URL of the OTLP/HTTP collector, without the `/v1/traces` suffix
    pub otlp_endpoint: String,
    /// `service.name` resource attribute on exported spans
    pub service_name: String,
    /// timeout for a single export request
    pub export_timeout: Duration,
    /// how long the batch service waits between scheduled exports
    pub batch_scheduled_delay: Duration,
    pub max_export_batch_size: usize,
    pub max_queue_size: usize,
    pub proxy_url: Option<String>,
    pub log_level: String,
    pub unknown_version_policy: UnknownVersionPolicy,
}

// The license key stays out of debug output.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("otlp_endpoint", &self.otlp_endpoint)
            .field("service_name", &self.service_name)
            .field("export_timeout", &self.export_timeout)
            .field("batch_scheduled_delay", &self.batch_scheduled_delay)
            .field("max_export_batch_size", &self.max_export_batch_size)
            .field("max_queue_size", &self.max_queue_size)
            .field("proxy_url", &self.proxy_url)
            .field("log_level", &self.log_level)
            .field("unknown_version_policy", &self.unknown_version_policy)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Builds a configuration from the two values the trace provider cannot default.
    ///
    /// An empty `endpoint` selects the New Relic OTLP endpoint for the license key's region.
    #[must_use]
    pub fn new(license_key: &str, endpoint: &str) -> Self {
        let otlp_endpoint = if endpoint.trim().is_empty() {
            default_endpoint_for_license_key(license_key).to_string()
        } else {
            endpoint.trim_end_matches('/').to_string()
        };

        Config {
            license_key: license_key.to_string(),
            otlp_endpoint,
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            export_timeout: Duration::from_secs(10),
            batch_scheduled_delay: Duration::from_secs(5),
            max_export_batch_size: 512,
            max_queue_size: 2048,
            proxy_url: None,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            unknown_version_policy: UnknownVersionPolicy::Skip,
        }
    }

    pub fn from_env() -> Result<Config, ConfigError> {
        let license_key = env::var("NEW_RELIC_LICENSE_KEY")
            .map_err(|_| ConfigError::MissingEnv("NEW_RELIC_LICENSE_KEY"))?;

        // NEW_RELIC_OTLP_ENDPOINT is mostly used by integration tests
        let endpoint = env::var("NEW_RELIC_OTLP_ENDPOINT").unwrap_or_default();
        let mut config = Config::new(&license_key, &endpoint);

        if let Ok(name) = env::var("AWS_LAMBDA_FUNCTION_NAME") {
            config.service_name = name;
        }
        if let Ok(level) = env::var("NEW_RELIC_LOG_LEVEL") {
            config.log_level = level.to_lowercase();
        }
        if let Some(timeout) = duration_ms_from_env("NEW_RELIC_OTLP_EXPORT_TIMEOUT_MS")? {
            config.export_timeout = timeout;
        }
        if let Some(delay) = duration_ms_from_env("NEW_RELIC_OTLP_BATCH_DELAY_MS")? {
            config.batch_scheduled_delay = delay;
        }
        if let Ok(policy) = env::var("NEW_RELIC_UNKNOWN_PAYLOAD_VERSION") {
            config.unknown_version_policy = policy.parse()?;
        }
        config.proxy_url = env::var("NEW_RELIC_PROXY_HTTPS")
            .or_else(|_| env::var("HTTPS_PROXY"))
            .ok();

        Ok(config)
    }

    #[must_use]
    pub fn traces_url(&self) -> String {
        format!("{}/v1/traces", self.otlp_endpoint)
    }
}

fn default_endpoint_for_license_key(license_key: &str) -> &'static str {
    if license_key.to_lowercase().starts_with("eu") {
        DEFAULT_EU_OTLP_ENDPOINT
    } else {
        DEFAULT_OTLP_ENDPOINT
    }
}

fn duration_ms_from_env(name: &'static str) -> Result<Option<Duration>, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .map(|ms| Some(Duration::from_millis(ms)))
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        Err(_) => Ok(None),
    }
}
