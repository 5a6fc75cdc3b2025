// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::SystemTime;

use async_trait::async_trait;

use crate::errors::LogSendError;
use crate::trace::Context;

/// One raw function log line on its way to the log pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub time: SystemTime,
    pub request_id: String,
    pub content: Vec<u8>,
}

impl LogLine {
    #[must_use]
    pub fn new(request_id: &str, content: impl Into<Vec<u8>>) -> Self {
        LogLine {
            time: SystemTime::now(),
            request_id: request_id.to_string(),
            content: content.into(),
        }
    }

    /// The content as text, replacing invalid UTF-8.
    #[must_use]
    pub fn content_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.content)
    }
}

/// Delivers function log lines downstream.
#[async_trait]
pub trait LogSender: Send + Sync {
    async fn send_function_logs(
        &self,
        ctx: &Context,
        lines: Vec<LogLine>,
    ) -> Result<(), LogSendError>;
}
