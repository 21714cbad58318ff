// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capturing [`IngestSink`] for session tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use wagate_core::{IngestSink, MessageInfo};

/// Ingest sink that records every submitted message.
#[derive(Default)]
pub struct MockIngest {
    submitted: Mutex<Vec<MessageInfo>>,
    reject: AtomicBool,
}

impl MockIngest {
    pub fn new() -> Self {
        Self::default()
    }

    /// All submitted messages in order.
    pub fn submitted(&self) -> Vec<MessageInfo> {
        self.submitted.lock().unwrap().clone()
    }

    /// Number of submitted messages.
    pub fn count(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }

    /// Makes subsequent submissions report rejection.
    pub fn set_reject(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }
}

#[async_trait]
impl IngestSink for MockIngest {
    async fn submit(&self, msg: MessageInfo) -> bool {
        self.submitted.lock().unwrap().push(msg);
        !self.reject.load(Ordering::SeqCst)
    }
}
