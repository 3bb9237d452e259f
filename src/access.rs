//! Access control: one stateless decision function for every operation.
//!
//! Handlers and the lifecycle engine describe *who* ([`Subject`]), *what*
//! ([`Operation`]) and *on what* ([`Resource`]); [`authorize`] answers with a
//! typed [`Decision`]. A denial always carries the message the client sees.

use crate::error::AppError;
use crate::store::{Complaint, Role, User};

/// The authenticated caller.
#[derive(Debug, Clone, Copy)]
pub struct Subject<'a> {
    pub user_id: &'a str,
    pub role: Role,
    pub assigned_category: Option<&'a str>,
}

impl<'a> Subject<'a> {
    pub fn of(user: &'a User) -> Self {
        Self {
            user_id: &user.id,
            role: user.role,
            assigned_category: user.assigned_category_id(),
        }
    }
}

/// Ownership facts about the target, where relevant.
#[derive(Debug, Clone, Copy, Default)]
pub struct Resource<'a> {
    pub owner_id: Option<&'a str>,
    pub category_id: Option<&'a str>,
}

impl<'a> Resource<'a> {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn complaint(complaint: &'a Complaint) -> Self {
        Self {
            owner_id: Some(&complaint.student.id),
            category_id: Some(&complaint.category.id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    SubmitComplaint,
    ListOwnComplaints,
    ListAssignedComplaints,
    ListAllComplaints,
    ReadComplaint,
    UpdateComplaint,
    ConfirmComplaint,
    ListCategories,
    ManageCategories,
    ListUsers,
    ListStaff,
    ManageUsers,
    ViewAnalytics,
    UseChatbot,
    ManageKnowledge,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(String),
}

const INSUFFICIENT: &str = "Access denied. Insufficient permissions.";
const DIFFERENT_CATEGORY: &str = "Access denied. This complaint belongs to a different category.";
const NOT_OWNER_CONFIRM: &str = "Access denied. You can only confirm your own complaints.";
const NO_ASSIGNMENT: &str = "You are not assigned to any category.";

fn role_gate(subject: &Subject<'_>, allowed: &[Role]) -> Decision {
    if allowed.contains(&subject.role) {
        Decision::Allow
    } else {
        Decision::Deny(INSUFFICIENT.into())
    }
}

fn same_category(subject: &Subject<'_>, resource: &Resource<'_>) -> bool {
    matches!(
        (subject.assigned_category, resource.category_id),
        (Some(mine), Some(theirs)) if mine == theirs
    )
}

/// Decide whether `subject` may perform `op` on `resource`.
pub fn authorize(subject: &Subject<'_>, op: Operation, resource: &Resource<'_>) -> Decision {
    use Operation::*;

    match op {
        ListCategories | UseChatbot => Decision::Allow,

        SubmitComplaint | ListOwnComplaints => role_gate(subject, &[Role::Student]),

        ListAllComplaints | ManageCategories | ListUsers | ManageUsers | ViewAnalytics
        | ManageKnowledge => role_gate(subject, &[Role::Admin]),

        ListStaff => role_gate(subject, &[Role::Admin, Role::CategoryStaff]),

        ListAssignedComplaints => match subject.role {
            Role::CategoryStaff if subject.assigned_category.is_some() => Decision::Allow,
            Role::CategoryStaff => Decision::Deny(NO_ASSIGNMENT.into()),
            _ => Decision::Deny(INSUFFICIENT.into()),
        },

        ReadComplaint => match subject.role {
            Role::Admin => Decision::Allow,
            Role::Student if resource.owner_id == Some(subject.user_id) => Decision::Allow,
            Role::CategoryStaff if same_category(subject, resource) => Decision::Allow,
            _ => Decision::Deny("Access denied.".into()),
        },

        UpdateComplaint => match subject.role {
            Role::Admin => Decision::Allow,
            Role::CategoryStaff if same_category(subject, resource) => Decision::Allow,
            Role::CategoryStaff => Decision::Deny(DIFFERENT_CATEGORY.into()),
            Role::Student => Decision::Deny(INSUFFICIENT.into()),
        },

        ConfirmComplaint => match subject.role {
            Role::Student if resource.owner_id == Some(subject.user_id) => Decision::Allow,
            Role::Student => Decision::Deny(NOT_OWNER_CONFIRM.into()),
            _ => Decision::Deny(INSUFFICIENT.into()),
        },
    }
}

/// [`authorize`], turning a denial into [`AppError::AccessDenied`].
pub fn require(subject: &Subject<'_>, op: Operation, resource: &Resource<'_>) -> Result<(), AppError> {
    match authorize(subject, op, resource) {
        Decision::Allow => Ok(()),
        Decision::Deny(message) => Err(AppError::AccessDenied(message)),
    }
}
