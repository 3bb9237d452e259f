use rusqlite::{OptionalExtension, Row, params};

use super::{Category, Database, PersonRef, new_id, now_iso8601, unique_violation};
use crate::error::AppError;

const SELECT_CATEGORY: &str = "
    SELECT c.id, c.name, c.description, c.created_at, u.id, u.name, u.email
    FROM categories c
    LEFT JOIN users u ON u.id = c.staff_user_id";

fn category_from_row(row: &Row<'_>) -> rusqlite::Result<Category> {
    let staff_id: Option<String> = row.get(4)?;
    let staff_user = match staff_id {
        Some(id) => Some(PersonRef { id, name: row.get(5)?, email: row.get(6)? }),
        None => None,
    };
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        created_at: row.get(3)?,
        staff_user,
    })
}

impl Database {
    pub fn create_category(&self, name: &str, description: &str) -> Result<Category, AppError> {
        let id = new_id();
        {
            let conn = self.conn()?;
            conn.execute(
                "INSERT INTO categories (id, name, description, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![id, name, description, now_iso8601()],
            )
            .map_err(|e| unique_violation(e, "name"))?;
        }
        self.category(&id)
    }

    /// All categories, sorted by name, with their bound staff member.
    pub fn list_categories(&self) -> Result<Vec<Category>, AppError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("{SELECT_CATEGORY} ORDER BY c.name"))?;
        let rows = stmt.query_map([], category_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn find_category(&self, id: &str) -> Result<Option<Category>, AppError> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(&format!("{SELECT_CATEGORY} WHERE c.id = ?1"), params![id], category_from_row)
            .optional()?)
    }

    pub fn find_category_by_name(&self, name: &str) -> Result<Option<Category>, AppError> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                &format!("{SELECT_CATEGORY} WHERE c.name = ?1"),
                params![name],
                category_from_row,
            )
            .optional()?)
    }

    /// Like [`find_category`](Self::find_category) but `NotFound` when absent.
    pub fn category(&self, id: &str) -> Result<Category, AppError> {
        self.find_category(id)?
            .ok_or_else(|| AppError::NotFound("Category not found.".into()))
    }

    pub fn update_category(
        &self,
        id: &str,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<Category, AppError> {
        {
            let conn = self.conn()?;
            let changed = conn
                .execute(
                    "UPDATE categories
                     SET name = COALESCE(?2, name), description = COALESCE(?3, description)
                     WHERE id = ?1",
                    params![id, name, description],
                )
                .map_err(|e| unique_violation(e, "name"))?;
            if changed == 0 {
                return Err(AppError::NotFound("Category not found.".into()));
            }
        }
        self.category(id)
    }

    /// Delete a category that no complaint references. Any staff binding is
    /// released by the foreign key.
    pub fn delete_category(&self, id: &str) -> Result<(), AppError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let exists: bool = tx
            .query_row("SELECT 1 FROM categories WHERE id = ?1", params![id], |_| Ok(true))
            .optional()?
            .unwrap_or(false);
        if !exists {
            return Err(AppError::NotFound("Category not found.".into()));
        }

        let in_use: i64 = tx.query_row(
            "SELECT COUNT(*) FROM complaints WHERE category_id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        if in_use > 0 {
            return Err(AppError::Conflict(format!(
                "Cannot delete category. {in_use} complaint(s) are using it."
            )));
        }

        tx.execute("DELETE FROM categories WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{NewComplaint, NewUser, Role};

    #[test]
    fn names_are_unique() {
        let db = Database::open_in_memory().unwrap();
        db.create_category("Dormitory Issues", "rooms").unwrap();
        let err = db.create_category("Dormitory Issues", "again").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Duplicate value for name. This name already exists."
        );
    }

    #[test]
    fn list_is_sorted_by_name() {
        let db = Database::open_in_memory().unwrap();
        db.create_category("Transportation", "").unwrap();
        db.create_category("Cafeteria & Food", "").unwrap();
        let names: Vec<_> = db.list_categories().unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Cafeteria & Food", "Transportation"]);
    }

    #[test]
    fn update_keeps_unspecified_fields() {
        let db = Database::open_in_memory().unwrap();
        let c = db.create_category("Library", "books").unwrap();
        let updated = db.update_category(&c.id, Some("Library Services"), None).unwrap();
        assert_eq!(updated.name, "Library Services");
        assert_eq!(updated.description, "books");
        assert!(matches!(
            db.update_category("missing", Some("x"), None),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn delete_blocked_with_exact_reference_count() {
        let db = Database::open_in_memory().unwrap();
        let cat = db.create_category("Internet & Network", "").unwrap();
        let student = db
            .create_user(NewUser {
                name: "Sam".into(),
                email: "sam@campus.edu".into(),
                password_hash: None,
                role: Role::Student,
                google_id: None,
            })
            .unwrap();
        for i in 0..3 {
            db.create_complaint(NewComplaint {
                title: format!("Wifi down {i}"),
                description: "No connectivity in block C".into(),
                category_id: cat.id.clone(),
                student_id: student.id.clone(),
                file_url: None,
            })
            .unwrap();
        }

        let err = db.delete_category(&cat.id).unwrap_err();
        assert_eq!(err.to_string(), "Cannot delete category. 3 complaint(s) are using it.");
        assert!(db.find_category(&cat.id).unwrap().is_some());
    }

    #[test]
    fn delete_unused_category() {
        let db = Database::open_in_memory().unwrap();
        let cat = db.create_category("Other", "").unwrap();
        db.delete_category(&cat.id).unwrap();
        assert!(db.find_category(&cat.id).unwrap().is_none());
        assert!(matches!(db.delete_category(&cat.id), Err(AppError::NotFound(_))));
    }
}
