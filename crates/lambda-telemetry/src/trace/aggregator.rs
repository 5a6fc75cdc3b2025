// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::VecDeque;
use tracing::warn;

use crate::trace::span::SpanData;

/// Takes in finished spans and hands them out in export-sized batches.
///
/// When the queue is full the oldest spans are dropped first.
pub struct SpanAggregator {
    queue: VecDeque<SpanData>,
    max_queue_size: usize,
    max_batch_size: usize,
}

impl SpanAggregator {
    #[must_use]
    pub fn new(max_queue_size: usize, max_batch_size: usize) -> Self {
        SpanAggregator {
            queue: VecDeque::with_capacity(max_queue_size.min(1024)),
            max_queue_size: max_queue_size.max(1),
            max_batch_size: max_batch_size.max(1),
        }
    }

    pub fn add(&mut self, span: SpanData) {
        if self.queue.len() >= self.max_queue_size {
            self.queue.pop_front();
            warn!(
                "Span queue is full ({} spans), dropping the oldest span",
                self.max_queue_size
            );
        }
        self.queue.push_back(span);
    }

    /// Returns up to `max_batch_size` spans, oldest first.
    pub fn get_batch(&mut self) -> Vec<SpanData> {
        let n = self.queue.len().min(self.max_batch_size);
        self.queue.drain(..n).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// True once a full export batch is waiting.
    #[must_use]
    pub fn has_full_batch(&self) -> bool {
        self.queue.len() >= self.max_batch_size
    }
}
