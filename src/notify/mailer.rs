//! Outbound email: transports, templates and the bus-driven worker.
//!
//! The transport is chosen once at startup (`[mail] transport`). Sending is
//! best-effort; the worker logs failures and moves on.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{DomainEvent, EventBus};
use crate::config::MailConfig;
use crate::error::AppError;
use crate::runtime::{Component, ComponentFuture};
use crate::store::{Complaint, ComplaintStatus};

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail transport failed: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

// ── Transports ────────────────────────────────────────────────────────────────

/// Writes each message as an `.eml` file. Useful on dev machines.
#[derive(Debug, Clone)]
pub struct OutboxMailer {
    dir: PathBuf,
    from: String,
}

/// POSTs `{from, to, subject, html}` to a relay with a bearer key.
#[derive(Debug, Clone)]
pub struct HttpMailer {
    client: Client,
    endpoint: String,
    from: String,
    api_key: Option<String>,
}

/// Captures messages in memory. While offline every send fails and
/// nothing is captured.
#[derive(Debug, Clone, Default)]
pub struct MemoryMailer {
    sent: Arc<Mutex<Vec<OutgoingEmail>>>,
    offline: Arc<AtomicBool>,
    failures: Arc<AtomicUsize>,
}

impl MemoryMailer {
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Sends rejected while offline.
    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub enum Mailer {
    /// Log and skip.
    Disabled,
    Outbox(OutboxMailer),
    Http(HttpMailer),
    Memory(MemoryMailer),
}

#[derive(Serialize)]
struct RelayPayload<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

impl Mailer {
    pub fn build(config: &MailConfig, outbox_dir: PathBuf, api_key: Option<String>) -> Result<Self, AppError> {
        match config.transport.as_str() {
            "disabled" | "none" => Ok(Mailer::Disabled),
            "outbox" => Ok(Mailer::Outbox(OutboxMailer { dir: outbox_dir, from: config.from.clone() })),
            "http" => {
                if config.http_endpoint.is_empty() {
                    return Err(AppError::Config("mail.http_endpoint is required for the http transport".into()));
                }
                let client = Client::builder()
                    .timeout(Duration::from_secs(15))
                    .build()
                    .map_err(|e| AppError::Config(format!("failed to build mail HTTP client: {e}")))?;
                Ok(Mailer::Http(HttpMailer {
                    client,
                    endpoint: config.http_endpoint.clone(),
                    from: config.from.clone(),
                    api_key,
                }))
            }
            other => Err(AppError::Config(format!("unknown mail transport: {other}"))),
        }
    }

    pub fn is_configured(&self) -> bool {
        !matches!(self, Mailer::Disabled)
    }

    pub async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        match self {
            Mailer::Disabled => {
                info!(to = %email.to, subject = %email.subject, "mail transport disabled; skipping email");
                Ok(())
            }
            Mailer::Outbox(m) => {
                tokio::fs::create_dir_all(&m.dir)
                    .await
                    .map_err(|e| MailError::Transport(format!("create {}: {e}", m.dir.display())))?;
                let path = m.dir.join(format!("{}.eml", uuid::Uuid::now_v7()));
                let body = format!(
                    "From: {}\r\nTo: {}\r\nSubject: {}\r\nMIME-Version: 1.0\r\nContent-Type: text/html; charset=utf-8\r\n\r\n{}",
                    m.from, email.to, email.subject, email.html
                );
                tokio::fs::write(&path, body)
                    .await
                    .map_err(|e| MailError::Transport(format!("write {}: {e}", path.display())))?;
                debug!(path = %path.display(), "email written to outbox");
                Ok(())
            }
            Mailer::Http(m) => {
                let payload = RelayPayload {
                    from: &m.from,
                    to: &email.to,
                    subject: &email.subject,
                    html: &email.html,
                };
                let mut req = m.client.post(&m.endpoint).json(&payload);
                if let Some(key) = &m.api_key {
                    req = req.bearer_auth(key);
                }
                let response = req.send().await.map_err(|e| MailError::Transport(e.to_string()))?;
                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(MailError::Transport(format!("HTTP {status}: {body}")));
                }
                Ok(())
            }
            Mailer::Memory(m) => {
                if m.offline.load(Ordering::SeqCst) {
                    m.failures.fetch_add(1, Ordering::SeqCst);
                    return Err(MailError::Transport("memory mailer offline".into()));
                }
                if let Ok(mut sent) = m.sent.lock() {
                    sent.push(email.clone());
                }
                Ok(())
            }
        }
    }
}

// ── Templates ─────────────────────────────────────────────────────────────────

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

fn status_colours(status: ComplaintStatus) -> (&'static str, &'static str) {
    match status {
        ComplaintStatus::Open => ("#e3f2fd", "#1565c0"),
        ComplaintStatus::InProgress => ("#fff3e0", "#e65100"),
        ComplaintStatus::PendingVerification => ("#ede7f6", "#5e35b1"),
        ComplaintStatus::Resolved => ("#e8f5e9", "#2e7d32"),
    }
}

fn layout(heading: &str, body: &str, app_name: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html><head><meta charset="utf-8"></head>
<body style="font-family: Arial, sans-serif; background-color: #f4f7fa; margin: 0; padding: 20px;">
<div style="max-width: 600px; margin: 0 auto; background: white; border-radius: 12px; overflow: hidden;">
<div style="background: #5a67d8; padding: 24px; text-align: center;"><h1 style="color: white; margin: 0; font-size: 22px;">{heading}</h1></div>
<div style="padding: 24px;">{body}<p style="color: #888; font-size: 13px; margin-top: 30px;">{app}</p></div>
</div></body></html>"#,
        app = escape_html(app_name),
    )
}

fn status_badge(status: ComplaintStatus) -> String {
    let (bg, fg) = status_colours(status);
    format!(
        r#"<span style="background: {bg}; color: {fg}; padding: 3px 10px; border-radius: 12px; font-size: 13px;">{status}</span>"#
    )
}

pub const ACTION_REQUIRED: &str =
    "Action Required: Please log in to your account and confirm if the issue is resolved to your satisfaction.";

/// Confirmation sent when a student files a complaint.
pub fn complaint_submitted_email(complaint: &Complaint, app_name: &str) -> OutgoingEmail {
    let body = format!(
        r#"<p>Hello <strong>{name}</strong>,</p>
<p>Your complaint has been successfully submitted. Here are the details:</p>
<div style="background: #f8f9fc; border-left: 4px solid #5a67d8; padding: 15px; margin: 20px 0;">
<p><strong>Title:</strong> {title}</p>
<p><strong>Category:</strong> {category}</p>
<p><strong>Status:</strong> {badge}</p>
</div>
<p>We will review your complaint and get back to you shortly.</p>"#,
        name = escape_html(&complaint.student.name),
        title = escape_html(&complaint.title),
        category = escape_html(&complaint.category.name),
        badge = status_badge(complaint.status),
    );
    OutgoingEmail {
        to: complaint.student.email.clone(),
        subject: "Complaint Submitted Successfully".into(),
        html: layout("Complaint Submitted", &body, app_name),
    }
}

/// Sent to the student after every status change.
pub fn status_update_email(complaint: &Complaint, app_name: &str) -> OutgoingEmail {
    let remarks = if complaint.remarks.trim().is_empty() {
        String::new()
    } else {
        format!("<p><strong>Remarks:</strong> {}</p>", escape_html(&complaint.remarks))
    };
    let action = if complaint.status == ComplaintStatus::PendingVerification {
        format!(r#"<p style="font-weight: bold; margin-top: 15px;">{ACTION_REQUIRED}</p>"#)
    } else {
        String::new()
    };
    let body = format!(
        r#"<p>Hello <strong>{name}</strong>,</p>
<p>Your complaint status has been updated:</p>
<div style="background: #f8f9fc; border-left: 4px solid #5a67d8; padding: 15px; margin: 20px 0;">
<p><strong>Title:</strong> {title}</p>
<p><strong>New Status:</strong> {badge}</p>
{remarks}
</div>
{action}"#,
        name = escape_html(&complaint.student.name),
        title = escape_html(&complaint.title),
        badge = status_badge(complaint.status),
    );
    OutgoingEmail {
        to: complaint.student.email.clone(),
        subject: format!("Complaint Status Updated: {}", complaint.status),
        html: layout("Status Update", &body, app_name),
    }
}

// ── Worker ────────────────────────────────────────────────────────────────────

/// Renders and sends the student emails for every domain event.
pub struct EmailWorker {
    mailer: Mailer,
    app_name: String,
    events: broadcast::Receiver<DomainEvent>,
}

impl EmailWorker {
    pub fn new(mailer: Mailer, app_name: impl Into<String>, bus: &EventBus) -> Self {
        Self { mailer, app_name: app_name.into(), events: bus.subscribe() }
    }
}

impl Component for EmailWorker {
    fn id(&self) -> &str {
        "email-worker"
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        let this = *self;
        Box::pin(run_email_worker(this.mailer, this.app_name, this.events, shutdown))
    }
}

async fn run_email_worker(
    mailer: Mailer,
    app_name: String,
    mut events: broadcast::Receiver<DomainEvent>,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    info!(configured = mailer.is_configured(), "email worker started");
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            ev = events.recv() => ev,
        };
        let email = match event {
            Ok(DomainEvent::ComplaintCreated(complaint)) => complaint_submitted_email(&complaint, &app_name),
            Ok(DomainEvent::StatusChanged(change)) => status_update_email(&change.complaint, &app_name),
            Err(RecvError::Lagged(n)) => {
                warn!(skipped = n, "email worker lagging; emails dropped");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        // Each send runs detached so one slow relay call never stalls the queue.
        let mailer = mailer.clone();
        tokio::spawn(async move {
            match mailer.send(&email).await {
                Ok(()) => debug!(to = %email.to, subject = %email.subject, "email sent"),
                Err(e) => warn!(to = %email.to, subject = %email.subject, "email send failed: {e}"),
            }
        });
    }
    info!("email worker stopped");
    Ok(())
}
