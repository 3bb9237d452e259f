//! Real-time push: channel registry plus the fan-out worker.
//!
//! Channels are named `user:<id>` and `role:<role>`. Each one is a tokio
//! broadcast sender created lazily on first join; emitting to a channel
//! nobody has joined is a no-op. Payloads are pre-serialised JSON frames so
//! every subscriber shares one allocation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{DomainEvent, EventBus, StatusChange, TransitionKind};
use crate::error::AppError;
use crate::runtime::{Component, ComponentFuture};
use crate::store::{ComplaintStatus, Role};

const CHANNEL_CAPACITY: usize = 64;

pub type Frame = Arc<str>;

pub fn user_channel(user_id: &str) -> String {
    format!("user:{user_id}")
}

pub fn role_channel(role: Role) -> String {
    format!("role:{role}")
}

/// `complaintUpdated` payload. Admin/staff copies leave out the optional
/// fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplaintUpdated {
    pub complaint_id: String,
    pub status: ComplaintStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

#[derive(Serialize)]
struct Envelope<'a, T> {
    event: &'a str,
    data: &'a T,
}

/// Connection registry partitioned into per-user and per-role groups.
#[derive(Default)]
pub struct Hub {
    channels: Mutex<HashMap<String, broadcast::Sender<Frame>>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to `channel`, creating it if needed.
    pub fn join(&self, channel: &str) -> broadcast::Receiver<Frame> {
        let mut channels = self.channels.lock().unwrap_or_else(|p| p.into_inner());
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Send `event` to every receiver of `channel`; returns how many got it.
    /// Channels whose receivers are all gone are dropped here.
    pub fn emit<T: Serialize>(&self, channel: &str, event: &str, data: &T) -> usize {
        let frame: Frame = match serde_json::to_string(&Envelope { event, data }) {
            Ok(json) => json.into(),
            Err(e) => {
                warn!(%channel, "failed to serialise realtime frame: {e}");
                return 0;
            }
        };

        let mut channels = self.channels.lock().unwrap_or_else(|p| p.into_inner());
        let Some(tx) = channels.get(channel) else {
            return 0;
        };
        match tx.send(frame) {
            Ok(n) => n,
            Err(_) => {
                channels.remove(channel);
                0
            }
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.lock().map(|c| c.len()).unwrap_or(0)
    }
}

/// Work out which channels receive which payload for one status change.
pub fn plan(change: &StatusChange) -> Vec<(String, ComplaintUpdated)> {
    let c = &change.complaint;
    let brief = ComplaintUpdated {
        complaint_id: c.id.clone(),
        status: c.status,
        remarks: None,
        updated_at: None,
    };
    let full = ComplaintUpdated {
        remarks: Some(c.remarks.clone()),
        updated_at: Some(c.updated_at.clone()),
        ..brief.clone()
    };

    let mut out = vec![(user_channel(&c.student.id), full)];
    if change.kind == TransitionKind::Confirm {
        if let Some(staff) = &change.category_staff_id {
            out.push((user_channel(staff), brief.clone()));
        }
    }
    out.push((role_channel(Role::Admin), brief));
    out
}

/// Consumes the event bus and pushes `complaintUpdated` frames.
pub struct RealtimeFanout {
    hub: Arc<Hub>,
    events: broadcast::Receiver<DomainEvent>,
}

impl RealtimeFanout {
    /// Subscribe now so no event published after construction is missed.
    pub fn new(hub: Arc<Hub>, bus: &EventBus) -> Self {
        Self { hub, events: bus.subscribe() }
    }
}

impl Component for RealtimeFanout {
    fn id(&self) -> &str {
        "realtime-fanout"
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(run_fanout(self.hub, self.events, shutdown))
    }
}

async fn run_fanout(
    hub: Arc<Hub>,
    mut events: broadcast::Receiver<DomainEvent>,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    info!("realtime fan-out started");
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            ev = events.recv() => ev,
        };
        match event {
            Ok(DomainEvent::StatusChanged(change)) => {
                for (channel, payload) in plan(&change) {
                    let delivered = hub.emit(&channel, "complaintUpdated", &payload);
                    debug!(%channel, complaint_id = %payload.complaint_id, delivered, "pushed complaintUpdated");
                }
            }
            Ok(DomainEvent::ComplaintCreated(_)) => {}
            Err(RecvError::Lagged(n)) => warn!(skipped = n, "realtime fan-out lagging; events dropped"),
            Err(RecvError::Closed) => break,
        }
    }
    info!("realtime fan-out stopped");
    Ok(())
}
