use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::scheduler::BackoffScheduler;

use super::client::ServiceControl;
use super::types::ServiceState;

enum MonitorMessage {
    Tick,
    SetInterval { minimum: Duration, maximum: Duration },
    Refresh,
}

/// Polls the service manager on a backoff schedule and reports each state
/// change once. The first query runs immediately and is always reported.
#[derive(Clone)]
pub struct ServiceMonitor {
    messages: mpsc::UnboundedSender<MonitorMessage>,
}

impl ServiceMonitor {
    /// The monitor task ends when every handle is dropped.
    pub fn spawn<S: ServiceControl>(
        service: Arc<S>,
        minimum: Duration,
        maximum: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<ServiceState>) {
        let (messages_tx, messages_rx) = mpsc::unbounded_channel();
        let (states_tx, states_rx) = mpsc::unbounded_channel();

        let tick = messages_tx.downgrade();
        let scheduler = BackoffScheduler::new(minimum, maximum, move || {
            if let Some(tick) = tick.upgrade() {
                let _ = tick.send(MonitorMessage::Tick);
            }
        });
        let handle = Self {
            messages: messages_tx,
        };
        tokio::spawn(monitor_service(
            service,
            scheduler,
            messages_rx,
            states_tx,
        ));
        (handle, states_rx)
    }

    /// Restarts polling at the new minimum.
    pub fn set_interval(&self, minimum: Duration, maximum: Duration) {
        let _ = self
            .messages
            .send(MonitorMessage::SetInterval { minimum, maximum });
    }

    /// Queries right away, for example when the status display opens.
    pub fn refresh(&self) {
        let _ = self.messages.send(MonitorMessage::Refresh);
    }
}

async fn monitor_service<S: ServiceControl>(
    service: Arc<S>,
    mut scheduler: BackoffScheduler,
    mut messages: mpsc::UnboundedReceiver<MonitorMessage>,
    states: mpsc::UnboundedSender<ServiceState>,
) {
    let mut last_state: Option<ServiceState> = None;
    let mut query = true;
    scheduler.start();

    loop {
        if query {
            let state = service.query_state().await;
            if last_state != Some(state) {
                info!(state = state.as_str(), "Service state changed");
                if states.send(state).is_err() {
                    break;
                }
                last_state = Some(state);
            }
        }

        // The scheduler holds a weak sender: this ends once every handle is
        // gone.
        let Some(message) = messages.recv().await else {
            break;
        };
        query = false;
        let mut pending = Some(message);
        // Ticks that piled up while querying collapse into one query.
        while let Some(message) = pending.take().or_else(|| messages.try_recv().ok()) {
            match message {
                MonitorMessage::Tick | MonitorMessage::Refresh => query = true,
                MonitorMessage::SetInterval { minimum, maximum } => {
                    debug!(
                        minimum_secs = minimum.as_secs(),
                        maximum_secs = maximum.as_secs(),
                        "Changing service poll interval"
                    );
                    scheduler.change_interval(minimum, maximum);
                }
            }
        }
    }
    debug!("Service monitor stopped");
}
