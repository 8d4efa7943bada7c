// SPDX-FileCopyrightText: 2026 Relaydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery status tracking for outbound messages.

use std::sync::Arc;

use relaydesk_core::types::{StatusApplication, StatusCallback};
use relaydesk_core::{RelaydeskError, StorageAdapter};
use serde::Serialize;
use tracing::debug;

/// Per-callback counts of how each message id was handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    /// Messages moved forward.
    pub applied: usize,
    /// Messages already at or past the reported status.
    pub unchanged: usize,
    /// Ids with no stored message.
    pub unknown: usize,
}

/// Applies provider delivery callbacks to stored messages.
///
/// Status only moves forward (`pending < sent < delivered < read`); the
/// comparison and the write happen inside one storage call per id.
#[derive(Clone)]
pub struct StatusTracker {
    storage: Arc<dyn StorageAdapter>,
}

impl StatusTracker {
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self { storage }
    }

    pub async fn apply(&self, callback: &StatusCallback) -> Result<StatusReport, RelaydeskError> {
        let mut report = StatusReport::default();
        for id in &callback.provider_message_ids {
            match self.storage.advance_message_status(id, callback.status).await? {
                StatusApplication::Applied { from, to } => {
                    debug!(provider = %callback.provider, id, %from, %to, "delivery status advanced");
                    report.applied += 1;
                }
                StatusApplication::Unchanged(current) => {
                    debug!(
                        provider = %callback.provider,
                        id,
                        %current,
                        incoming = %callback.status,
                        "stale delivery status ignored"
                    );
                    report.unchanged += 1;
                }
                StatusApplication::Unknown => {
                    debug!(provider = %callback.provider, id, "status callback for unknown message");
                    report.unknown += 1;
                }
            }
        }
        relaydesk_prometheus::record_status_callback("applied", report.applied as u64);
        relaydesk_prometheus::record_status_callback("unchanged", report.unchanged as u64);
        relaydesk_prometheus::record_status_callback("unknown", report.unknown as u64);
        Ok(report)
    }
}
