//! Supersedable request streams.
//!
//! Each logical request stream (config fetch, connections fetch, one per
//! folder status) owns a [`RequestSlot`]. Issuing into a slot cancels the
//! request it held, and the owner only accepts a completion whose ticket still
//! matches the slot, so a late answer to a superseded request never reaches
//! state.

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::types::MonitorError;

/// Identifies one issued request. Tickets are never reused by a session.
pub type Ticket = u64;

#[derive(Debug)]
pub enum RequestOutcome<T> {
    Completed(Result<T, MonitorError>),
    Cancelled,
}

struct InFlight {
    ticket: Ticket,
    token: CancellationToken,
}

#[derive(Default)]
pub struct RequestSlot {
    inflight: Option<InFlight>,
}

impl RequestSlot {
    /// Cancels whatever the slot held and spawns `request`. The outcome is
    /// passed to `deliver` from the spawned task.
    pub fn issue<T, F, D>(&mut self, ticket: Ticket, request: F, deliver: D)
    where
        T: Send + 'static,
        F: Future<Output = Result<T, MonitorError>> + Send + 'static,
        D: FnOnce(RequestOutcome<T>) + Send + 'static,
    {
        self.cancel();
        let token = CancellationToken::new();
        let cancelled = token.clone();
        tokio::spawn(async move {
            let outcome = tokio::select! {
                biased;
                _ = cancelled.cancelled() => RequestOutcome::Cancelled,
                result = request => RequestOutcome::Completed(result),
            };
            deliver(outcome);
        });
        self.inflight = Some(InFlight { ticket, token });
    }

    /// Idempotent.
    pub fn cancel(&mut self) {
        if let Some(inflight) = self.inflight.take() {
            debug!(ticket = inflight.ticket, "Cancelling request");
            inflight.token.cancel();
        }
    }

    /// Returns true and empties the slot if `ticket` is the live request.
    pub fn settle(&mut self, ticket: Ticket) -> bool {
        match &self.inflight {
            Some(inflight) if inflight.ticket == ticket => {
                self.inflight = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.inflight.is_some()
    }
}

impl Drop for RequestSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}
