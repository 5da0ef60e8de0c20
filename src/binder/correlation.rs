//! Request correlation for asynchronous transports.
//!
//! Outbound requests wait in [`PendingRequests`] until the matching
//! response arrives or the timeout fires; whichever happens first removes the
//! entry, so the waiting caller is resolved exactly once. Inbound requests
//! are tracked in [`InflightRequests`] so a redelivered request is handed to
//! the dispatcher at most once.

use crate::error::BinderError;
use crate::primitive::{debug_content, RequestPrimitive, ResponsePrimitive, ResponseStatusCode};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

/// (peer, request identifier)
type CorrelationKey = (String, String);

struct PendingEntry {
    rqp: RequestPrimitive,
    reply: oneshot::Sender<ResponsePrimitive>,
    timer: Option<AbortHandle>,
}

/// Outbound requests awaiting a response, scoped per peer.
#[derive(Clone)]
pub struct PendingRequests {
    entries: Arc<DashMap<CorrelationKey, PendingEntry>>,
    timeout: Duration,
}

impl PendingRequests {
    pub fn new(timeout: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Registers `rqp` as sent to `peer` and arms its timeout. The receiver
    /// yields either the peer's response or a synthesized REQUEST_TIMEOUT.
    pub fn register(
        &self,
        peer: &str,
        rqp: &RequestPrimitive,
    ) -> Result<oneshot::Receiver<ResponsePrimitive>, BinderError> {
        let key = (peer.to_string(), rqp.rqi.clone());
        let (tx, rx) = oneshot::channel();

        match self.entries.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(BinderError::DuplicateRequest(rqp.rqi.clone()));
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(PendingEntry {
                    rqp: rqp.clone(),
                    reply: tx,
                    timer: None,
                });
            }
        }

        let entries = Arc::clone(&self.entries);
        let timeout = self.timeout;
        let timer_key = key.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some((_, entry)) = entries.remove(&timer_key) {
                warn!(peer = %timer_key.0, rqi = %timer_key.1, "Request timed out");
                let rsp = ResponsePrimitive::new(
                    &entry.rqp,
                    &entry.rqp.to,
                    ResponseStatusCode::RequestTimeout,
                    Some(debug_content(&format!(
                        "no response from {} within {}s",
                        timer_key.0,
                        timeout.as_secs()
                    ))),
                );
                let _ = entry.reply.send(rsp);
            }
        });

        // The timer may already have fired for a zero timeout; only attach
        // the handle while the entry is still pending.
        match self.entries.get_mut(&key) {
            Some(mut entry) => entry.timer = Some(timer.abort_handle()),
            None => debug!(rqi = %key.1, "Request resolved before its timer was attached"),
        }
        Ok(rx)
    }

    /// Resolves the pending request `rsp.rqi` sent to `peer`. Returns false
    /// (and drops the response) when nothing is waiting for it.
    pub fn complete(&self, peer: &str, rsp: ResponsePrimitive) -> bool {
        let key = (peer.to_string(), rsp.rqi.clone());
        match self.entries.remove(&key) {
            Some((_, entry)) => {
                if let Some(timer) = entry.timer {
                    timer.abort();
                }
                if entry.reply.send(rsp).is_err() {
                    debug!(peer = %peer, rqi = %key.1, "Caller stopped waiting for response");
                }
                true
            }
            None => {
                warn!(peer = %peer, rqi = %key.1, "Dropping unmatched response");
                false
            }
        }
    }

    /// Withdraws a request whose publish failed.
    pub fn cancel(&self, peer: &str, rqi: &str) {
        if let Some((_, entry)) = self.entries.remove(&(peer.to_string(), rqi.to_string())) {
            if let Some(timer) = entry.timer {
                timer.abort();
            }
        }
    }

    pub fn is_pending(&self, peer: &str, rqi: &str) -> bool {
        self.entries.contains_key(&(peer.to_string(), rqi.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Inbound requests handed to the dispatcher and not yet answered.
#[derive(Clone, Default)]
pub struct InflightRequests {
    entries: Arc<DashMap<CorrelationKey, RequestPrimitive>>,
}

impl InflightRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `rqp` from `source`. Returns false for a duplicate of a
    /// request that is still being processed.
    pub fn begin(&self, source: &str, rqp: &RequestPrimitive) -> bool {
        let key = (source.to_string(), rqp.rqi.clone());
        match self.entries.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                warn!(source = %source, rqi = %rqp.rqi, "Ignoring duplicate request");
                false
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(rqp.clone());
                true
            }
        }
    }

    /// Retires the transaction `rqi` from `source`, returning its request.
    pub fn drop(&self, source: &str, rqi: &str) -> Option<RequestPrimitive> {
        self.entries
            .remove(&(source.to_string(), rqi.to_string()))
            .map(|(_, rqp)| rqp)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
