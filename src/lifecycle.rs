//! Complaint lifecycle engine.
//!
//! ```text
//!   Open ──► In Progress ──► Pending Student Verification ──► Resolved
//!    │            │                       ▲                      ▲
//!    └────────────┴───────── admin: any target ──────────────────┘
//! ```
//!
//! Staff walk the forward edges one at a time and stop short of `Resolved`;
//! only the owning student's confirmation closes a complaint in the normal
//! flow. Admins may set any status from any non-terminal state. Every
//! persisted status change is published on the [`EventBus`] exactly once.

use std::sync::Arc;

use tracing::info;

use crate::access::{self, Operation, Resource, Subject};
use crate::error::AppError;
use crate::notify::{DomainEvent, EventBus, StatusChange, TransitionKind};
use crate::store::{Complaint, ComplaintStatus, Database, NewComplaint, Role, User};

/// Submission payload after validation. The student comes from the caller.
#[derive(Debug, Clone)]
pub struct Submission {
    pub title: String,
    pub description: String,
    pub category_id: String,
    pub file_url: Option<String>,
}

/// A staff/admin edit. At least one field must be set.
#[derive(Debug, Clone, Default)]
pub struct UpdateRequest {
    pub status: Option<ComplaintStatus>,
    pub remarks: Option<String>,
}

/// Check whether `role` may move a complaint from `current` to `target`.
/// Only called for real changes (`current != target`).
pub fn check_transition(
    role: Role,
    current: ComplaintStatus,
    target: ComplaintStatus,
) -> Result<(), AppError> {
    if current.is_terminal() {
        return Err(AppError::InvalidTransition(
            "This complaint is already resolved and can no longer change status.".into(),
        ));
    }
    match role {
        Role::Admin => Ok(()),
        Role::CategoryStaff => {
            if !ComplaintStatus::STAFF_TARGETS.contains(&target) {
                return Err(AppError::ForbiddenTransition {
                    allowed: ComplaintStatus::STAFF_TARGETS.to_vec(),
                });
            }
            if current.next() != Some(target) {
                return Err(AppError::InvalidTransition(format!(
                    "Cannot move a complaint from {current} to {target}."
                )));
            }
            Ok(())
        }
        Role::Student => Err(AppError::AccessDenied(
            "Access denied. Insufficient permissions.".into(),
        )),
    }
}

pub struct LifecycleEngine {
    db: Arc<Database>,
    events: EventBus,
}

impl LifecycleEngine {
    pub fn new(db: Arc<Database>, events: EventBus) -> Self {
        Self { db, events }
    }

    /// Create a complaint in `Open` for the calling student.
    pub fn submit(&self, actor: &User, submission: Submission) -> Result<Complaint, AppError> {
        access::require(&Subject::of(actor), Operation::SubmitComplaint, &Resource::none())?;

        if self.db.find_category(&submission.category_id)?.is_none() {
            return Err(AppError::Validation("Invalid category selected.".into()));
        }

        let complaint = self.db.create_complaint(NewComplaint {
            title: submission.title,
            description: submission.description,
            category_id: submission.category_id,
            student_id: actor.id.clone(),
            file_url: submission.file_url,
        })?;

        info!(complaint_id = %complaint.id, category = %complaint.category.name, "complaint submitted");
        self.events.publish(DomainEvent::ComplaintCreated(complaint.clone()));
        Ok(complaint)
    }

    /// Staff/admin status and remarks update.
    ///
    /// Resubmitting the current status is accepted (remarks still apply) but
    /// emits nothing.
    pub fn update(&self, actor: &User, complaint_id: &str, req: UpdateRequest) -> Result<Complaint, AppError> {
        if req.status.is_none() && req.remarks.is_none() {
            return Err(AppError::NoChangesSpecified);
        }

        let current = self.db.complaint(complaint_id)?;
        access::require(&Subject::of(actor), Operation::UpdateComplaint, &Resource::complaint(&current))?;

        let previous = current.status;
        let target = req.status.unwrap_or(previous);
        let changed = target != previous;
        if changed {
            check_transition(actor.role, previous, target)?;
        }

        let updated = self.db.update_complaint_state(complaint_id, previous, target, req.remarks.as_deref())?;

        if changed {
            info!(
                complaint_id = %updated.id,
                from = %previous,
                to = %updated.status,
                actor = %actor.id,
                "complaint status changed"
            );
            self.events.publish(DomainEvent::StatusChanged(StatusChange {
                complaint: updated.clone(),
                previous,
                kind: TransitionKind::Update,
                category_staff_id: None,
            }));
        }
        Ok(updated)
    }

    /// Owning student signs off a complaint awaiting verification.
    pub fn confirm(&self, actor: &User, complaint_id: &str) -> Result<Complaint, AppError> {
        let current = self.db.complaint(complaint_id)?;
        access::require(&Subject::of(actor), Operation::ConfirmComplaint, &Resource::complaint(&current))?;

        if current.status != ComplaintStatus::PendingVerification {
            return Err(AppError::InvalidTransition(
                "Only complaints pending your verification can be confirmed.".into(),
            ));
        }

        let updated = self
            .db
            .update_complaint_state(complaint_id, current.status, ComplaintStatus::Resolved, None)?;
        let category_staff_id = self
            .db
            .find_category(&updated.category.id)?
            .and_then(|c| c.staff_user)
            .map(|s| s.id);

        info!(complaint_id = %updated.id, student = %actor.id, "complaint confirmed resolved");
        self.events.publish(DomainEvent::StatusChanged(StatusChange {
            complaint: updated.clone(),
            previous: current.status,
            kind: TransitionKind::Confirm,
            category_staff_id,
        }));
        Ok(updated)
    }
}
