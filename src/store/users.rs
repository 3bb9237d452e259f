use rusqlite::{OptionalExtension, Row, params};

use super::{
    CategoryRef, Database, NewUser, Page, PageRequest, Role, User, new_id, now_iso8601,
    parse_column, unique_violation,
};
use crate::error::AppError;

const SELECT_USER: &str = "
    SELECT u.id, u.name, u.email, u.password_hash, u.role, u.google_id, u.created_at, c.id, c.name
    FROM users u
    LEFT JOIN categories c ON c.id = u.assigned_category_id";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let category_id: Option<String> = row.get(7)?;
    let assigned_category = match category_id {
        Some(id) => Some(CategoryRef { id, name: row.get(8)? }),
        None => None,
    };
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        role: parse_column(row, 4)?,
        google_id: row.get(5)?,
        created_at: row.get(6)?,
        assigned_category,
    })
}

/// Admin edit of a user. `assigned_category: Some(None)` clears the binding.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub role: Option<Role>,
    pub assigned_category: Option<Option<String>>,
}

impl Database {
    pub fn create_user(&self, new: NewUser) -> Result<User, AppError> {
        let id = new_id();
        {
            let conn = self.conn()?;
            conn.execute(
                "INSERT INTO users (id, name, email, password_hash, role, google_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id,
                    new.name,
                    new.email,
                    new.password_hash,
                    new.role.as_str(),
                    new.google_id,
                    now_iso8601(),
                ],
            )
            .map_err(|e| unique_violation(e, "email"))?;
        }
        self.user(&id)
    }

    pub fn find_user(&self, id: &str) -> Result<Option<User>, AppError> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(&format!("{SELECT_USER} WHERE u.id = ?1"), params![id], user_from_row)
            .optional()?)
    }

    pub fn user(&self, id: &str) -> Result<User, AppError> {
        self.find_user(id)?
            .ok_or_else(|| AppError::NotFound("User not found.".into()))
    }

    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(&format!("{SELECT_USER} WHERE u.email = ?1"), params![email], user_from_row)
            .optional()?)
    }

    pub fn find_user_by_google_id(&self, google_id: &str) -> Result<Option<User>, AppError> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                &format!("{SELECT_USER} WHERE u.google_id = ?1"),
                params![google_id],
                user_from_row,
            )
            .optional()?)
    }

    /// Attach a federated identity to an existing (email-matched) account.
    pub fn link_google_id(&self, user_id: &str, google_id: &str) -> Result<User, AppError> {
        {
            let conn = self.conn()?;
            conn.execute(
                "UPDATE users SET google_id = ?2 WHERE id = ?1",
                params![user_id, google_id],
            )?;
        }
        self.user(user_id)
    }

    /// Users newest first, optionally filtered by role.
    pub fn list_users(&self, role: Option<Role>, page: PageRequest) -> Result<Page<User>, AppError> {
        let conn = self.conn()?;
        let role = role.map(Role::as_str);
        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM users WHERE (?1 IS NULL OR role = ?1)",
            params![role],
            |row| row.get(0),
        )?;
        let mut stmt = conn.prepare(&format!(
            "{SELECT_USER} WHERE (?1 IS NULL OR u.role = ?1)
             ORDER BY u.created_at DESC, u.id DESC LIMIT ?2 OFFSET ?3"
        ))?;
        let items = stmt
            .query_map(params![role, page.limit, page.offset()], user_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page { items, total: total as u64 })
    }

    /// Category staff accounts sorted by name.
    pub fn list_staff(&self) -> Result<Vec<User>, AppError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("{SELECT_USER} WHERE u.role = ?1 ORDER BY u.name"))?;
        let items = stmt
            .query_map(params![Role::CategoryStaff.as_str()], user_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    /// Apply an admin edit. Category bindings are kept symmetric: the user's
    /// `assigned_category_id` and the category's `staff_user_id` always point
    /// at each other, and any previous binding on either side is released.
    pub fn update_user(&self, id: &str, update: UserUpdate) -> Result<User, AppError> {
        {
            let mut conn = self.conn()?;
            let tx = conn.transaction()?;

            let current_role: Option<Role> = tx
                .query_row("SELECT role FROM users WHERE id = ?1", params![id], |row| {
                    parse_column(row, 0)
                })
                .optional()?;
            let Some(current_role) = current_role else {
                return Err(AppError::NotFound("User not found.".into()));
            };
            let role = update.role.unwrap_or(current_role);

            if let Some(name) = &update.name {
                tx.execute("UPDATE users SET name = ?2 WHERE id = ?1", params![id, name])?;
            }
            if update.role.is_some() {
                tx.execute("UPDATE users SET role = ?2 WHERE id = ?1", params![id, role.as_str()])?;
            }

            let release = role != Role::CategoryStaff
                || matches!(update.assigned_category, Some(None));
            if release {
                tx.execute("UPDATE users SET assigned_category_id = NULL WHERE id = ?1", params![id])?;
                tx.execute(
                    "UPDATE categories SET staff_user_id = NULL WHERE staff_user_id = ?1",
                    params![id],
                )?;
            }

            if let Some(Some(category_id)) = &update.assigned_category {
                if role != Role::CategoryStaff {
                    return Err(AppError::Validation(
                        "Only category staff can be assigned a category.".into(),
                    ));
                }
                let exists = tx
                    .query_row("SELECT 1 FROM categories WHERE id = ?1", params![category_id], |_| {
                        Ok(())
                    })
                    .optional()?
                    .is_some();
                if !exists {
                    return Err(AppError::NotFound("Category not found.".into()));
                }
                // Release this user's old category and the category's old staff member.
                tx.execute(
                    "UPDATE categories SET staff_user_id = NULL WHERE staff_user_id = ?1",
                    params![id],
                )?;
                tx.execute(
                    "UPDATE users SET assigned_category_id = NULL WHERE assigned_category_id = ?1",
                    params![category_id],
                )?;
                tx.execute(
                    "UPDATE users SET assigned_category_id = ?2 WHERE id = ?1",
                    params![id, category_id],
                )?;
                tx.execute(
                    "UPDATE categories SET staff_user_id = ?2 WHERE id = ?1",
                    params![category_id, id],
                )?;
            }

            tx.commit()?;
        }
        self.user(id)
    }

    /// Remove an account. Refused while complaints or knowledge documents
    /// still reference it; any category binding is released by the foreign key.
    pub fn delete_user(&self, id: &str) -> Result<(), AppError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let exists = tx
            .query_row("SELECT 1 FROM users WHERE id = ?1", params![id], |_| Ok(()))
            .optional()?
            .is_some();
        if !exists {
            return Err(AppError::NotFound("User not found.".into()));
        }

        let referenced: i64 = tx.query_row(
            "SELECT (SELECT COUNT(*) FROM complaints WHERE student_id = ?1)
                  + (SELECT COUNT(*) FROM knowledge_docs WHERE uploaded_by = ?1)",
            params![id],
            |row| row.get(0),
        )?;
        if referenced > 0 {
            return Err(AppError::Conflict(format!(
                "Cannot delete user. {referenced} record(s) reference this account."
            )));
        }

        tx.execute("DELETE FROM users WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(())
    }

    pub fn count_users(&self) -> Result<u64, AppError> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(n as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(db: &Database, email: &str, role: Role) -> User {
        db.create_user(NewUser {
            name: email.split('@').next().unwrap_or("user").to_string(),
            email: email.to_string(),
            password_hash: Some("hash".into()),
            role,
            google_id: None,
        })
        .unwrap()
    }

    #[test]
    fn email_is_unique() {
        let db = Database::open_in_memory().unwrap();
        new_user(&db, "a@campus.edu", Role::Student);
        let err = db
            .create_user(NewUser {
                name: "Again".into(),
                email: "a@campus.edu".into(),
                password_hash: None,
                role: Role::Student,
                google_id: None,
            })
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(ref m) if m.contains("email")));
    }

    #[test]
    fn assigning_category_binds_both_sides_and_releases_previous() {
        let db = Database::open_in_memory().unwrap();
        let dorm = db.create_category("Dormitory Issues", "").unwrap();
        let lab = db.create_category("Laboratory Equipment", "").unwrap();
        let first = new_user(&db, "first@campus.edu", Role::CategoryStaff);
        let second = new_user(&db, "second@campus.edu", Role::CategoryStaff);

        let assign = |user: &User, cat: &str| {
            db.update_user(
                &user.id,
                UserUpdate { assigned_category: Some(Some(cat.to_string())), ..Default::default() },
            )
            .unwrap()
        };

        let first = assign(&first, &dorm.id);
        assert_eq!(first.assigned_category_id(), Some(dorm.id.as_str()));
        assert_eq!(db.category(&dorm.id).unwrap().staff_user.unwrap().id, first.id);

        // Second staff takes over the dorm category; first is released.
        assign(&second, &dorm.id);
        assert!(db.user(&first.id).unwrap().assigned_category.is_none());

        // Second moves to lab; dorm loses its staff member.
        assign(&second, &lab.id);
        assert!(db.category(&dorm.id).unwrap().staff_user.is_none());
        assert_eq!(db.category(&lab.id).unwrap().staff_user.unwrap().id, second.id);
    }

    #[test]
    fn demotion_releases_binding() {
        let db = Database::open_in_memory().unwrap();
        let cat = db.create_category("Transportation", "").unwrap();
        let staff = new_user(&db, "bus@campus.edu", Role::CategoryStaff);
        db.update_user(
            &staff.id,
            UserUpdate { assigned_category: Some(Some(cat.id.clone())), ..Default::default() },
        )
        .unwrap();

        let demoted = db
            .update_user(&staff.id, UserUpdate { role: Some(Role::Student), ..Default::default() })
            .unwrap();
        assert_eq!(demoted.role, Role::Student);
        assert!(demoted.assigned_category.is_none());
        assert!(db.category(&cat.id).unwrap().staff_user.is_none());
    }

    #[test]
    fn students_cannot_hold_a_category() {
        let db = Database::open_in_memory().unwrap();
        let cat = db.create_category("Other", "").unwrap();
        let student = new_user(&db, "s@campus.edu", Role::Student);
        let err = db
            .update_user(
                &student.id,
                UserUpdate { assigned_category: Some(Some(cat.id)), ..Default::default() },
            )
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn list_filters_by_role_and_paginates() {
        let db = Database::open_in_memory().unwrap();
        for i in 0..5 {
            new_user(&db, &format!("s{i}@campus.edu"), Role::Student);
        }
        new_user(&db, "admin@campus.edu", Role::Admin);

        let page = db.list_users(Some(Role::Student), PageRequest::new(Some(2), Some(2), 20)).unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.items.len(), 2);
        assert!(page.items.iter().all(|u| u.role == Role::Student));
        assert_eq!(db.list_users(None, PageRequest::new(None, None, 20)).unwrap().total, 6);
    }

    #[test]
    fn delete_user_releases_category() {
        let db = Database::open_in_memory().unwrap();
        let cat = db.create_category("Library Services", "").unwrap();
        let staff = new_user(&db, "lib@campus.edu", Role::CategoryStaff);
        db.update_user(
            &staff.id,
            UserUpdate { assigned_category: Some(Some(cat.id.clone())), ..Default::default() },
        )
        .unwrap();

        db.delete_user(&staff.id).unwrap();
        assert!(db.find_user(&staff.id).unwrap().is_none());
        assert!(db.category(&cat.id).unwrap().staff_user.is_none());
    }
}
