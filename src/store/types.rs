//! Record types shared by the stores, the lifecycle engine and the API.
//!
//! Every record serialises in the wire shape the front-end consumes:
//! camelCase keys, an `id` field, and nested `{id, name}` references.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

// ── Role ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    CategoryStaff,
    Admin,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Student, Role::CategoryStaff, Role::Admin];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::CategoryStaff => "category_staff",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| AppError::Validation("Invalid role".into()))
    }
}

// ── ComplaintStatus ───────────────────────────────────────────────────────────

/// Complaint lifecycle states, in lifecycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComplaintStatus {
    #[serde(rename = "Open")]
    Open,
    #[serde(rename = "In Progress")]
    InProgress,
    #[serde(rename = "Pending Student Verification")]
    PendingVerification,
    #[serde(rename = "Resolved")]
    Resolved,
}

impl ComplaintStatus {
    pub const ALL: [ComplaintStatus; 4] = [
        ComplaintStatus::Open,
        ComplaintStatus::InProgress,
        ComplaintStatus::PendingVerification,
        ComplaintStatus::Resolved,
    ];

    /// Targets a category staff member may request.
    pub const STAFF_TARGETS: [ComplaintStatus; 2] =
        [ComplaintStatus::InProgress, ComplaintStatus::PendingVerification];

    pub fn as_str(self) -> &'static str {
        match self {
            ComplaintStatus::Open => "Open",
            ComplaintStatus::InProgress => "In Progress",
            ComplaintStatus::PendingVerification => "Pending Student Verification",
            ComplaintStatus::Resolved => "Resolved",
        }
    }

    pub fn is_terminal(self) -> bool {
        self == ComplaintStatus::Resolved
    }

    /// The single forward edge of the normal (non-admin) flow.
    pub fn next(self) -> Option<ComplaintStatus> {
        match self {
            ComplaintStatus::Open => Some(ComplaintStatus::InProgress),
            ComplaintStatus::InProgress => Some(ComplaintStatus::PendingVerification),
            ComplaintStatus::PendingVerification => Some(ComplaintStatus::Resolved),
            ComplaintStatus::Resolved => None,
        }
    }
}

impl fmt::Display for ComplaintStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComplaintStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ComplaintStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| AppError::Validation("Invalid status value".into()))
    }
}

// ── References ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonRef {
    pub id: String,
    pub name: String,
    pub email: String,
}

// ── Records ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: Option<String>,
    pub role: Role,
    pub assigned_category: Option<CategoryRef>,
    #[serde(skip)]
    pub google_id: Option<String>,
    pub created_at: String,
}

impl User {
    pub fn assigned_category_id(&self) -> Option<&str> {
        self.assigned_category.as_ref().map(|c| c.id.as_str())
    }

    pub fn as_person(&self) -> PersonRef {
        PersonRef { id: self.id.clone(), name: self.name.clone(), email: self.email.clone() }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
    pub description: String,
    pub staff_user: Option<PersonRef>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Complaint {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: CategoryRef,
    pub status: ComplaintStatus,
    pub student: PersonRef,
    pub file_url: Option<String>,
    pub remarks: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeDoc {
    pub id: String,
    pub original_name: String,
    #[serde(skip)]
    pub stored_path: String,
    pub uploaded_by: PersonRef,
    pub chunk_count: usize,
    #[serde(rename = "pineconeIds")]
    pub vector_ids: Vec<String>,
    pub file_size: u64,
    pub created_at: String,
}

// ── Inputs ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub role: Role,
    pub google_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewComplaint {
    pub title: String,
    pub description: String,
    pub category_id: String,
    pub student_id: String,
    pub file_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewKnowledgeDoc {
    pub original_name: String,
    pub stored_path: String,
    pub uploaded_by: String,
    pub vector_ids: Vec<String>,
    pub file_size: u64,
}

/// 1-based page request.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub fn new(page: Option<u32>, limit: Option<u32>, default_limit: u32) -> Self {
        Self {
            page: page.filter(|p| *p > 0).unwrap_or(1),
            limit: limit.filter(|l| *l > 0).unwrap_or(default_limit).min(100),
        }
    }

    pub fn offset(&self) -> u32 {
        (self.page - 1) * self.limit
    }
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_labels_round_trip_through_json() {
        let json = serde_json::to_string(&ComplaintStatus::PendingVerification).unwrap();
        assert_eq!(json, "\"Pending Student Verification\"");
        let back: ComplaintStatus = serde_json::from_str("\"In Progress\"").unwrap();
        assert_eq!(back, ComplaintStatus::InProgress);
    }

    #[test]
    fn forward_edges() {
        assert_eq!(ComplaintStatus::Open.next(), Some(ComplaintStatus::InProgress));
        assert_eq!(ComplaintStatus::Resolved.next(), None);
        assert!(ComplaintStatus::Resolved.is_terminal());
    }

    #[test]
    fn role_parses_wire_names() {
        assert_eq!("category_staff".parse::<Role>().unwrap(), Role::CategoryStaff);
        assert!("root".parse::<Role>().is_err());
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
    }

    #[test]
    fn page_request_clamps() {
        let p = PageRequest::new(Some(0), Some(500), 20);
        assert_eq!(p.page, 1);
        assert_eq!(p.limit, 100);
        assert_eq!(PageRequest::new(Some(3), None, 10).offset(), 20);
    }

    #[test]
    fn user_serialisation_hides_credentials() {
        let user = User {
            id: "u1".into(),
            name: "Ann".into(),
            email: "ann@campus.edu".into(),
            password_hash: Some("secret".into()),
            role: Role::Student,
            assigned_category: None,
            google_id: Some("g".into()),
            created_at: "2026-01-01T00:00:00.000Z".into(),
        };
        let v = serde_json::to_value(&user).unwrap();
        assert!(v.get("passwordHash").is_none());
        assert!(v.get("googleId").is_none());
        assert_eq!(v["assignedCategory"], serde_json::Value::Null);
    }
}
