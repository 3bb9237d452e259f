use axum::extract::State;
use chrono::{Duration, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::json;

use crate::access::{self, Operation, Resource, Subject};
use crate::http::AppState;
use crate::http::extract::AuthUser;
use crate::http::response::{ApiResponse, ApiResult};
use crate::store::{ComplaintStats, ComplaintStatus};

const RECENT_DAYS: i64 = 7;

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub total_complaints: u64,
    pub open: u64,
    pub in_progress: u64,
    pub pending_verification: u64,
    pub resolved: u64,
    /// Whole percent of complaints resolved.
    pub resolution_rate: u64,
    pub recent_count: u64,
    pub category_stats: Vec<CategoryCount>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct CategoryCount {
    pub name: String,
    pub count: u64,
}

impl From<ComplaintStats> for Overview {
    fn from(stats: ComplaintStats) -> Self {
        let count = |s: ComplaintStatus| stats.by_status.get(&s).copied().unwrap_or(0);
        let resolved = count(ComplaintStatus::Resolved);
        let resolution_rate = if stats.total == 0 {
            0
        } else {
            (resolved as f64 * 100.0 / stats.total as f64).round() as u64
        };
        Overview {
            total_complaints: stats.total,
            open: count(ComplaintStatus::Open),
            in_progress: count(ComplaintStatus::InProgress),
            pending_verification: count(ComplaintStatus::PendingVerification),
            resolved,
            resolution_rate,
            recent_count: stats.created_since,
            category_stats: stats
                .by_category
                .into_iter()
                .map(|(name, count)| CategoryCount { name, count })
                .collect(),
        }
    }
}

pub async fn overview(State(state): State<AppState>, AuthUser(user): AuthUser) -> ApiResult {
    access::require(&Subject::of(&user), Operation::ViewAnalytics, &Resource::none())?;
    let since = (Utc::now() - Duration::days(RECENT_DAYS)).to_rfc3339_opts(SecondsFormat::Millis, true);
    let overview = Overview::from(state.db.complaint_stats(&since)?);
    Ok(ApiResponse::ok(json!(overview)))
}
