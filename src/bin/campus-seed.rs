//! campus-seed: create the default admin and the predefined categories, each
//! with a bound staff account.
//!
//! Idempotent: accounts and categories that already exist are left alone.
//! Passwords come from `SEED_ADMIN_PASSWORD` / `SEED_STAFF_PASSWORD` and the
//! mail domain from `SEED_EMAIL_DOMAIN`.

use std::env;

use tracing::info;

use campus_desk::auth::password::hash_password;
use campus_desk::config;
use campus_desk::error::AppError;
use campus_desk::logger;
use campus_desk::store::{Category, Database, NewUser, Role, User, UserUpdate};

const CATEGORIES: [(&str, &str, &str); 8] = [
    ("Dormitory Issues", "Issues related to student dormitories, housing, and residential facilities.", "staff.dorm"),
    ("Laboratory Equipment", "Problems with lab equipment, chemicals, computers, and safety concerns.", "staff.lab"),
    ("Internet & Network", "Wi-Fi connectivity, network access, bandwidth, and internet service issues.", "staff.network"),
    ("Classroom Facilities", "Classroom furniture, projectors, lighting, HVAC, and other facility issues.", "staff.classroom"),
    ("Library Services", "Library access, book availability, study spaces, and related services.", "staff.library"),
    ("Cafeteria & Food", "Food quality, cafeteria cleanliness, meal plans, and dining services.", "staff.cafeteria"),
    ("Transportation", "Campus shuttle, parking, and transportation-related issues.", "staff.transport"),
    ("Other", "General complaints and issues not covered by other categories.", "staff.other"),
];

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).ok().filter(|v| !v.trim().is_empty()).unwrap_or_else(|| default.to_string())
}

fn ensure_user(db: &Database, name: &str, email: &str, password: &str, role: Role) -> Result<User, AppError> {
    if let Some(existing) = db.find_user_by_email(email)? {
        info!(%email, "account exists, skipping");
        return Ok(existing);
    }
    let user = db.create_user(NewUser {
        name: name.to_string(),
        email: email.to_string(),
        password_hash: Some(hash_password(password)?),
        role,
        google_id: None,
    })?;
    info!(%email, role = %role, "account created");
    Ok(user)
}

fn ensure_category(db: &Database, name: &str, description: &str) -> Result<Category, AppError> {
    match db.find_category_by_name(name)? {
        Some(existing) => Ok(existing),
        None => db.create_category(name, description),
    }
}

fn run() -> Result<(), AppError> {
    let _ = dotenvy::dotenv();
    let config = config::load()?;
    logger::init(&config.log_level, false, config.server.environment)?;

    std::fs::create_dir_all(&config.work_dir)?;
    let db = Database::open(&config.db_path())?;

    let domain = env_or("SEED_EMAIL_DOMAIN", "campus.edu");
    let admin_password = env_or("SEED_ADMIN_PASSWORD", "Admin@123");
    let staff_password = env_or("SEED_STAFF_PASSWORD", "Staff@123");

    ensure_user(&db, "System Admin", &format!("admin@{domain}"), &admin_password, Role::Admin)?;

    for (name, description, mailbox) in CATEGORIES {
        let staff = ensure_user(
            &db,
            &format!("{name} Staff"),
            &format!("{mailbox}@{domain}"),
            &staff_password,
            Role::CategoryStaff,
        )?;
        let category = ensure_category(&db, name, description)?;
        if category.staff_user.is_none() && staff.assigned_category.is_none() {
            db.update_user(
                &staff.id,
                UserUpdate { assigned_category: Some(Some(category.id.clone())), ..Default::default() },
            )?;
        }
        println!("✓ {name}: {mailbox}@{domain}");
    }

    println!("✓ seed complete ({} users)", db.count_users()?);
    Ok(())
}
