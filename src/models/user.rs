use libsql::Connection;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

const COLUMNS: &str = "id, email, name, created_at, updated_at";

pub const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    name TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
)";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// SQLite extended result code for a UNIQUE constraint violation.
const SQLITE_CONSTRAINT_UNIQUE: i32 = 2067;

/// Maps a UNIQUE violation on insert/update to `Conflict`; other errors pass through.
fn unique_violation(e: libsql::Error) -> AppError {
    let is_unique = match &e {
        libsql::Error::SqliteFailure(code, _) if *code == SQLITE_CONSTRAINT_UNIQUE => true,
        other => other.to_string().contains("UNIQUE constraint failed"),
    };

    if is_unique {
        AppError::Conflict("Email already registered".to_string())
    } else {
        AppError::from(e)
    }
}

impl User {
    fn from_row(row: &libsql::Row) -> Result<Self, libsql::Error> {
        Ok(Self {
            id: row.get(0)?,
            email: row.get(1)?,
            name: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateUser {
    pub email: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateUser {
    pub email: Option<String>,
    pub name: Option<String>,
}

impl UpdateUser {
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.name.is_none()
    }
}

impl User {
    pub async fn list(conn: &Connection) -> AppResult<Vec<Self>> {
        let mut rows = conn
            .query(
                &format!("SELECT {COLUMNS} FROM users ORDER BY created_at, rowid"),
                (),
            )
            .await?;

        let mut users = Vec::new();
        while let Some(row) = rows.next().await? {
            users.push(Self::from_row(&row)?);
        }
        Ok(users)
    }

    pub async fn find_by_id(conn: &Connection, id: &str) -> AppResult<Option<Self>> {
        let mut rows = conn
            .query(&format!("SELECT {COLUMNS} FROM users WHERE id = ?"), [id])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn find_by_email(conn: &Connection, email: &str) -> AppResult<Option<Self>> {
        let mut rows = conn
            .query(&format!("SELECT {COLUMNS} FROM users WHERE email = ?"), [email])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn create(conn: &Connection, data: CreateUser) -> AppResult<Self> {
        let id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO users (id, email, name) VALUES (?, ?, ?)",
            libsql::params![id.clone(), data.email, data.name],
        )
        .await
        .map_err(unique_violation)?;

        Self::find_by_id(conn, &id)
            .await?
            .ok_or_else(|| AppError::Internal("Failed to create user".to_string()))
    }

    pub async fn update(conn: &Connection, id: &str, data: UpdateUser) -> AppResult<Option<Self>> {
        let changed = conn
            .execute(
                "UPDATE users SET email = COALESCE(?, email), name = COALESCE(?, name), \
                 updated_at = datetime('now') WHERE id = ?",
                libsql::params![data.email, data.name, id.to_string()],
            )
            .await
            .map_err(unique_violation)?;

        if changed == 0 {
            return Ok(None);
        }
        Self::find_by_id(conn, id).await
    }

    pub async fn delete(conn: &Connection, id: &str) -> AppResult<bool> {
        let changed = conn.execute("DELETE FROM users WHERE id = ?", [id]).await?;
        Ok(changed > 0)
    }
}
