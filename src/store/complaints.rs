use std::collections::HashMap;

use rusqlite::{OptionalExtension, Row, params};

use super::{
    CategoryRef, Complaint, ComplaintStatus, Database, NewComplaint, Page, PageRequest, PersonRef,
    new_id, now_iso8601, parse_column,
};
use crate::error::AppError;

const SELECT_COMPLAINT: &str = "
    SELECT k.id, k.title, k.description, k.status, k.file_url, k.remarks,
           k.created_at, k.updated_at,
           c.id, c.name,
           u.id, u.name, u.email
    FROM complaints k
    JOIN categories c ON c.id = k.category_id
    JOIN users u ON u.id = k.student_id";

fn complaint_from_row(row: &Row<'_>) -> rusqlite::Result<Complaint> {
    Ok(Complaint {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        status: parse_column(row, 3)?,
        file_url: row.get(4)?,
        remarks: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
        category: CategoryRef { id: row.get(8)?, name: row.get(9)? },
        student: PersonRef { id: row.get(10)?, name: row.get(11)?, email: row.get(12)? },
    })
}

/// Listing filter. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct ComplaintFilter {
    pub student_id: Option<String>,
    pub category_id: Option<String>,
    pub status: Option<ComplaintStatus>,
}

/// Aggregate counts behind the admin dashboard.
#[derive(Debug, Clone, Default)]
pub struct ComplaintStats {
    pub total: u64,
    pub by_status: HashMap<ComplaintStatus, u64>,
    pub created_since: u64,
    /// `(category name, count)`, largest first.
    pub by_category: Vec<(String, u64)>,
}

impl Database {
    /// Insert a new complaint in the `Open` state.
    pub fn create_complaint(&self, new: NewComplaint) -> Result<Complaint, AppError> {
        let id = new_id();
        let now = now_iso8601();
        {
            let conn = self.conn()?;
            conn.execute(
                "INSERT INTO complaints
                    (id, title, description, category_id, status, student_id, file_url, remarks, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, '', ?8, ?8)",
                params![
                    id,
                    new.title,
                    new.description,
                    new.category_id,
                    ComplaintStatus::Open.as_str(),
                    new.student_id,
                    new.file_url,
                    now,
                ],
            )?;
        }
        self.complaint(&id)
    }

    pub fn find_complaint(&self, id: &str) -> Result<Option<Complaint>, AppError> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(&format!("{SELECT_COMPLAINT} WHERE k.id = ?1"), params![id], complaint_from_row)
            .optional()?)
    }

    pub fn complaint(&self, id: &str) -> Result<Complaint, AppError> {
        self.find_complaint(id)?
            .ok_or_else(|| AppError::NotFound("Complaint not found.".into()))
    }

    /// Complaints matching `filter`, newest first.
    pub fn list_complaints(
        &self,
        filter: &ComplaintFilter,
        page: PageRequest,
    ) -> Result<Page<Complaint>, AppError> {
        const WHERE: &str = "WHERE (?1 IS NULL OR k.student_id = ?1)
              AND (?2 IS NULL OR k.category_id = ?2)
              AND (?3 IS NULL OR k.status = ?3)";

        let conn = self.conn()?;
        let status = filter.status.map(ComplaintStatus::as_str);
        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM complaints k {WHERE}"),
            params![filter.student_id, filter.category_id, status],
            |row| row.get(0),
        )?;
        let mut stmt = conn.prepare(&format!(
            "{SELECT_COMPLAINT} {WHERE} ORDER BY k.created_at DESC, k.id DESC LIMIT ?4 OFFSET ?5"
        ))?;
        let items = stmt
            .query_map(
                params![filter.student_id, filter.category_id, status, page.limit, page.offset()],
                complaint_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page { items, total: total as u64 })
    }

    /// Persist a status and (optionally) new remarks in one statement.
    /// `remarks: None` leaves the stored remarks untouched.
    /// Set status and, when given, remarks, provided the complaint is still
    /// in `expected`. A lost race is a `Conflict` and writes nothing.
    pub fn update_complaint_state(
        &self,
        id: &str,
        expected: ComplaintStatus,
        status: ComplaintStatus,
        remarks: Option<&str>,
    ) -> Result<Complaint, AppError> {
        {
            let conn = self.conn()?;
            let changed = conn.execute(
                "UPDATE complaints
                 SET status = ?2, remarks = COALESCE(?3, remarks), updated_at = ?4
                 WHERE id = ?1 AND status = ?5",
                params![id, status.as_str(), remarks, now_iso8601(), expected.as_str()],
            )?;
            if changed == 0 {
                let exists = conn
                    .query_row("SELECT 1 FROM complaints WHERE id = ?1", params![id], |_| Ok(()))
                    .optional()?
                    .is_some();
                return Err(if exists {
                    AppError::Conflict(
                        "Complaint was updated by someone else. Please reload and try again.".into(),
                    )
                } else {
                    AppError::NotFound("Complaint not found.".into())
                });
            }
        }
        self.complaint(id)
    }

    /// Counts for the analytics dashboard. `since` is an RFC 3339 cut-off for
    /// `created_since`.
    pub fn complaint_stats(&self, since: &str) -> Result<ComplaintStats, AppError> {
        let conn = self.conn()?;
        let mut stats = ComplaintStats::default();

        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM complaints GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((parse_column::<ComplaintStatus>(row, 0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (status, count) = row?;
            stats.total += count as u64;
            stats.by_status.insert(status, count as u64);
        }

        let recent: i64 = conn.query_row(
            "SELECT COUNT(*) FROM complaints WHERE created_at >= ?1",
            params![since],
            |row| row.get(0),
        )?;
        stats.created_since = recent as u64;

        let mut stmt = conn.prepare(
            "SELECT c.name, COUNT(*) AS n
             FROM complaints k JOIN categories c ON c.id = k.category_id
             GROUP BY c.id ORDER BY n DESC, c.name",
        )?;
        stats.by_category = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64)))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{NewUser, Role, User};

    fn seed(db: &Database) -> (User, String, String) {
        let student = db
            .create_user(NewUser {
                name: "Ada".into(),
                email: "ada@campus.edu".into(),
                password_hash: None,
                role: Role::Student,
                google_id: None,
            })
            .unwrap();
        let dorm = db.create_category("Dormitory Issues", "").unwrap().id;
        let lab = db.create_category("Laboratory Equipment", "").unwrap().id;
        (student, dorm, lab)
    }

    fn submit(db: &Database, student: &User, category: &str, title: &str) -> Complaint {
        db.create_complaint(NewComplaint {
            title: title.into(),
            description: "Something needs fixing".into(),
            category_id: category.into(),
            student_id: student.id.clone(),
            file_url: None,
        })
        .unwrap()
    }

    #[test]
    fn new_complaints_start_open_with_nested_refs() {
        let db = Database::open_in_memory().unwrap();
        let (student, dorm, _) = seed(&db);
        let c = submit(&db, &student, &dorm, "Leaking faucet");
        assert_eq!(c.status, ComplaintStatus::Open);
        assert_eq!(c.category.name, "Dormitory Issues");
        assert_eq!(c.student.email, "ada@campus.edu");
        assert_eq!(c.remarks, "");

        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["status"], "Open");
        assert_eq!(json["category"]["name"], "Dormitory Issues");
        assert!(json.get("createdAt").is_some());
    }

    #[test]
    fn update_state_keeps_remarks_when_none() {
        let db = Database::open_in_memory().unwrap();
        let (student, dorm, _) = seed(&db);
        let c = submit(&db, &student, &dorm, "Broken window");

        let c = db
            .update_complaint_state(&c.id, ComplaintStatus::Open, ComplaintStatus::InProgress, Some("Glazier booked"))
            .unwrap();
        assert_eq!(c.remarks, "Glazier booked");
        let c = db
            .update_complaint_state(&c.id, ComplaintStatus::InProgress, ComplaintStatus::PendingVerification, None)
            .unwrap();
        assert_eq!(c.remarks, "Glazier booked");
        assert_eq!(c.status, ComplaintStatus::PendingVerification);

        assert!(matches!(
            db.update_complaint_state("missing", ComplaintStatus::Open, ComplaintStatus::Resolved, None),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn list_filters_and_orders_newest_first() {
        let db = Database::open_in_memory().unwrap();
        let (student, dorm, lab) = seed(&db);
        submit(&db, &student, &dorm, "first");
        submit(&db, &student, &lab, "second");
        let third = submit(&db, &student, &dorm, "third");
        db.update_complaint_state(&third.id, ComplaintStatus::Open, ComplaintStatus::InProgress, None).unwrap();

        let all = db.list_complaints(&ComplaintFilter::default(), PageRequest::new(None, None, 20)).unwrap();
        assert_eq!(all.total, 3);
        assert_eq!(all.items[0].title, "third");

        let dorm_only = ComplaintFilter { category_id: Some(dorm.clone()), ..Default::default() };
        assert_eq!(db.list_complaints(&dorm_only, PageRequest::new(None, None, 20)).unwrap().total, 2);

        let in_progress = ComplaintFilter {
            status: Some(ComplaintStatus::InProgress),
            ..Default::default()
        };
        let page = db.list_complaints(&in_progress, PageRequest::new(None, None, 20)).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].id, third.id);
    }

    #[test]
    fn stale_status_write_is_a_conflict() {
        let db = Database::open_in_memory().unwrap();
        let (student, dorm, _) = seed(&db);
        let c = submit(&db, &student, &dorm, "Broken heater");
        db.update_complaint_state(&c.id, ComplaintStatus::Open, ComplaintStatus::Resolved, None).unwrap();

        let err = db
            .update_complaint_state(&c.id, ComplaintStatus::Open, ComplaintStatus::InProgress, Some("late"))
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        let after = db.complaint(&c.id).unwrap();
        assert_eq!(after.status, ComplaintStatus::Resolved);
        assert_eq!(after.remarks, "");
    }

    #[test]
    fn stats_count_statuses_and_categories() {
        let db = Database::open_in_memory().unwrap();
        let (student, dorm, lab) = seed(&db);
        submit(&db, &student, &dorm, "a");
        submit(&db, &student, &dorm, "b");
        let c = submit(&db, &student, &lab, "c");
        db.update_complaint_state(&c.id, ComplaintStatus::Open, ComplaintStatus::Resolved, None).unwrap();

        let stats = db.complaint_stats("1970-01-01T00:00:00.000Z").unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_status.get(&ComplaintStatus::Open), Some(&2));
        assert_eq!(stats.by_status.get(&ComplaintStatus::Resolved), Some(&1));
        assert_eq!(stats.created_since, 3);
        assert_eq!(stats.by_category[0], ("Dormitory Issues".to_string(), 2));

        let future = db.complaint_stats("2999-01-01T00:00:00.000Z").unwrap();
        assert_eq!(future.created_since, 0);
    }
}
