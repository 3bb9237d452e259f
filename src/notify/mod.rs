//! Notification fan-out.
//!
//! The lifecycle engine publishes a [`DomainEvent`] on the [`EventBus`] after
//! a change is persisted. Two independent consumers pick it up:
//!
//! - [`realtime::RealtimeFanout`] pushes `complaintUpdated` frames into the
//!   per-user / per-role channels of the [`realtime::Hub`];
//! - [`mailer::EmailWorker`] renders and sends the student email.
//!
//! Each consumer owns its own broadcast receiver, so a slow mail relay never
//! delays a WebSocket push and vice versa. Failures are logged and dropped.

pub mod mailer;
pub mod realtime;

use tokio::sync::broadcast;
use tracing::debug;

use crate::store::{Complaint, ComplaintStatus};

const BUS_CAPACITY: usize = 256;

/// How a status change came about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    /// Staff or admin update.
    Update,
    /// Owning student confirmed the resolution.
    Confirm,
}

#[derive(Debug, Clone)]
pub struct StatusChange {
    /// Complaint as persisted after the change.
    pub complaint: Complaint,
    pub previous: ComplaintStatus,
    pub kind: TransitionKind,
    /// Staff member bound to the complaint's category, filled for confirmations.
    pub category_staff_id: Option<String>,
}

#[derive(Debug, Clone)]
pub enum DomainEvent {
    ComplaintCreated(Complaint),
    StatusChanged(StatusChange),
}

/// In-process broadcast of [`DomainEvent`]s. Cheap to clone.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Fire-and-forget. Having no subscriber is not an error.
    pub fn publish(&self, event: DomainEvent) {
        if self.tx.send(event).is_err() {
            debug!("domain event dropped: no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
