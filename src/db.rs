//! Database module for the portal
//!
//! Provides persistence for user accounts and credit balances.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("User not found: {0}")]
    UserNotFound(String),
    #[error("Email already registered: {0}")]
    EmailExists(String),
    #[error("Insufficient credits: have {have}, need {need}")]
    InsufficientCredits { have: i64, need: i64 },
}

pub type DbResult<T> = Result<T, DbError>;

/// User role stored as text in the `users` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Student,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Student => "student",
        }
    }

    fn parse(s: &str) -> Role {
        match s {
            "admin" => Role::Admin,
            _ => Role::Student,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub credits: i64,
    pub created_at: DateTime<Utc>,
}

/// User row plus the stored password material, for login verification.
/// Never serialized; the hash and salt stay inside the auth path.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: String,
    pub password_salt: String,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    email TEXT UNIQUE NOT NULL,
    password_hash TEXT NOT NULL,
    password_salt TEXT NOT NULL,
    role TEXT NOT NULL DEFAULT 'student',
    credits INTEGER NOT NULL DEFAULT 0,
    created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
);
";

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        let _ = conn.pragma_update(None, "journal_mode", "WAL");
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Create a user. Fails with `EmailExists` when the email is taken.
    pub fn create_user(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
        password_salt: &str,
        role: Role,
        credits: i64,
    ) -> DbResult<User> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO users (name, email, password_hash, password_salt, role, credits, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                name,
                email,
                password_hash,
                password_salt,
                role.as_str(),
                credits,
                now.to_rfc3339(),
            ],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                DbError::EmailExists(email.to_string())
            }
            other => DbError::Sqlite(other),
        })?;

        let id = conn.last_insert_rowid();
        Ok(User {
            id,
            name: name.to_string(),
            email: email.to_string(),
            role,
            credits,
            created_at: now,
        })
    }

    /// Get a user by ID
    pub fn get_user(&self, id: i64) -> DbResult<User> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, name, email, role, credits, created_at FROM users WHERE id = ?1",
        )?;

        stmt.query_row(params![id], parse_user_row)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => DbError::UserNotFound(id.to_string()),
                other => DbError::Sqlite(other),
            })
    }

    /// Get a user plus password material by email, for login.
    pub fn get_credentials_by_email(&self, email: &str) -> DbResult<UserCredentials> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, name, email, role, credits, created_at, password_hash, password_salt
             FROM users WHERE email = ?1",
        )?;

        stmt.query_row(params![email], |row| {
            Ok(UserCredentials {
                user: parse_user_row(row)?,
                password_hash: row.get(6)?,
                password_salt: row.get(7)?,
            })
        })
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => DbError::UserNotFound(email.to_string()),
            other => DbError::Sqlite(other),
        })
    }

    /// List all student accounts, newest first
    pub fn list_students(&self) -> DbResult<Vec<User>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, name, email, role, credits, created_at FROM users
             WHERE role = 'student' ORDER BY created_at DESC, id DESC",
        )?;

        let rows = stmt.query_map([], parse_user_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Delete a user account
    pub fn delete_user(&self, id: i64) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute("DELETE FROM users WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(DbError::UserNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Add credits to a user's balance (e.g. after a completed checkout).
    /// Returns the new balance.
    pub fn add_credits(&self, id: i64, amount: i64) -> DbResult<i64> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE users SET credits = credits + ?1 WHERE id = ?2",
            params![amount, id],
        )?;
        if updated == 0 {
            return Err(DbError::UserNotFound(id.to_string()));
        }
        conn.query_row(
            "SELECT credits FROM users WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .map_err(DbError::from)
    }

    /// Deduct credits, refusing to overdraw. The balance check and the
    /// decrement happen in a single conditional UPDATE.
    pub fn spend_credits(&self, id: i64, amount: i64) -> DbResult<i64> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE users SET credits = credits - ?1 WHERE id = ?2 AND credits >= ?1",
            params![amount, id],
        )?;

        if updated == 0 {
            // Distinguish a missing user from an insufficient balance
            let have: i64 = conn
                .query_row(
                    "SELECT credits FROM users WHERE id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .map_err(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => DbError::UserNotFound(id.to_string()),
                    other => DbError::Sqlite(other),
                })?;
            return Err(DbError::InsufficientCredits { have, need: amount });
        }

        conn.query_row(
            "SELECT credits FROM users WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .map_err(DbError::from)
    }

    /// Create the admin account if it does not exist yet.
    /// Returns true when a new account was seeded.
    pub fn ensure_admin(
        &self,
        email: &str,
        password_hash: &str,
        password_salt: &str,
    ) -> DbResult<bool> {
        match self.get_credentials_by_email(email) {
            Ok(_) => Ok(false),
            Err(DbError::UserNotFound(_)) => {
                self.create_user("Admin", email, password_hash, password_salt, Role::Admin, 0)?;
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }
}

fn parse_user_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        role: Role::parse(&row.get::<_, String>(3)?),
        credits: row.get(4)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?),
    })
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
