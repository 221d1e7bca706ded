//! Per-connection request/response correlation.

use std::collections::HashMap;
use std::time::Instant;

use protocol::{CorrelationId, ServerFrame};

use crate::tools::InvocationResult;
use crate::{Error, Result};

/// Calls in flight on one connection, keyed by the client's correlation id.
///
/// Owned by the connection's read loop, so it needs no locking.
#[derive(Debug)]
pub struct Correlator {
    pending: HashMap<CorrelationId, Pending>,
    limit: usize,
}

#[derive(Debug)]
struct Pending {
    tool: String,
    started: Instant,
}

impl Correlator {
    /// `limit` caps how many calls may be pending at once.
    pub fn new(limit: usize) -> Self {
        Self {
            pending: HashMap::new(),
            limit,
        }
    }

    /// Mark `id` as awaiting a response.
    pub fn register(&mut self, id: CorrelationId, tool: &str) -> Result<()> {
        if self.pending.contains_key(&id) {
            return Err(Error::DuplicateCorrelation(id));
        }
        if self.pending.len() >= self.limit {
            return Err(Error::InFlightLimit { limit: self.limit });
        }
        self.pending.insert(
            id,
            Pending {
                tool: tool.to_string(),
                started: Instant::now(),
            },
        );
        Ok(())
    }

    /// Complete `id`, producing the frame to write back.
    ///
    /// Unknown or already-resolved ids yield `None` and are logged.
    pub fn resolve(&mut self, id: CorrelationId, result: InvocationResult) -> Option<ServerFrame> {
        let Some(pending) = self.pending.remove(&id) else {
            tracing::warn!(correlation_id = %id, "resolve for unknown correlation id");
            return None;
        };
        tracing::debug!(
            correlation_id = %id,
            tool = %pending.tool,
            elapsed_ms = pending.started.elapsed().as_millis() as u64,
            success = result.is_success(),
            "call resolved"
        );
        Some(result.into_frame(id))
    }

    pub fn contains(&self, id: &CorrelationId) -> bool {
        self.pending.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drop every pending call without resolving it. Returns how many.
    pub fn discard_all(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        count
    }
}
