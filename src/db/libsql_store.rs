use async_trait::async_trait;
use libsql::{Builder, Connection, Database};

use crate::db::UserStore;
use crate::error::{AppError, AppResult};
use crate::models::user::SCHEMA;
use crate::models::{CreateUser, UpdateUser, User};

pub async fn create_database(database_url: &str, auth_token: Option<&str>) -> AppResult<Database> {
    // Check if this is a Turso remote URL
    if database_url.starts_with("libsql://") {
        let auth_token = auth_token.ok_or_else(|| {
            AppError::Internal("TURSO_AUTH_TOKEN must be set for remote database".to_string())
        })?;

        Ok(Builder::new_remote(database_url.to_string(), auth_token.to_string())
            .build()
            .await?)
    } else {
        // Local SQLite file
        let path = database_url
            .strip_prefix("sqlite:")
            .unwrap_or(database_url)
            .split('?')
            .next()
            .unwrap_or("users.db");

        Ok(Builder::new_local(path).build().await?)
    }
}

/// `UserStore` over a libsql connection (local SQLite file or Turso).
pub struct LibsqlStore {
    _db: Database,
    conn: Connection,
}

impl LibsqlStore {
    /// Opens a connection and makes sure the `users` table exists.
    pub async fn open(db: Database) -> AppResult<Self> {
        let conn = db.connect()?;
        conn.execute(SCHEMA, ()).await?;
        Ok(Self { _db: db, conn })
    }
}

#[async_trait]
impl UserStore for LibsqlStore {
    async fn list(&self) -> AppResult<Vec<User>> {
        User::list(&self.conn).await
    }

    async fn find_by_id(&self, id: &str) -> AppResult<Option<User>> {
        User::find_by_id(&self.conn, id).await
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        User::find_by_email(&self.conn, email).await
    }

    async fn create(&self, data: CreateUser) -> AppResult<User> {
        User::create(&self.conn, data).await
    }

    async fn update(&self, id: &str, data: UpdateUser) -> AppResult<Option<User>> {
        User::update(&self.conn, id, data).await
    }

    async fn delete(&self, id: &str) -> AppResult<bool> {
        User::delete(&self.conn, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> LibsqlStore {
        let db = create_database(":memory:", None).await.unwrap();
        LibsqlStore::open(db).await.unwrap()
    }

    #[tokio::test]
    async fn create_then_find_by_id_and_email() {
        let store = store().await;
        let created = store
            .create(CreateUser {
                email: "ada@example.com".to_string(),
                name: Some("Ada".to_string()),
            })
            .await
            .unwrap();

        let by_id = store.find_by_id(&created.id).await.unwrap().unwrap();
        assert_eq!(by_id, created);
        let by_email = store.find_by_email("ada@example.com").await.unwrap().unwrap();
        assert_eq!(by_email.id, created.id);
    }

    #[tokio::test]
    async fn update_keeps_fields_that_are_not_sent() {
        let store = store().await;
        let created = store
            .create(CreateUser {
                email: "grace@example.com".to_string(),
                name: Some("Grace".to_string()),
            })
            .await
            .unwrap();

        let updated = store
            .update(
                &created.id,
                UpdateUser {
                    email: None,
                    name: Some("Grace Hopper".to_string()),
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.email, "grace@example.com");
        assert_eq!(updated.name.as_deref(), Some("Grace Hopper"));
        assert!(store.update("missing", UpdateUser::default()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_reports_whether_a_row_went_away() {
        let store = store().await;
        let created = store
            .create(CreateUser {
                email: "linus@example.com".to_string(),
                name: None,
            })
            .await
            .unwrap();

        assert!(store.delete(&created.id).await.unwrap());
        assert!(!store.delete(&created.id).await.unwrap());
        assert!(store.list().await.unwrap().is_empty());
    }
    #[tokio::test]
    async fn duplicate_email_on_insert_is_a_conflict() {
        let store = store().await;
        let new_user = || CreateUser {
            email: "dup@example.com".to_string(),
            name: None,
        };

        store.create(new_user()).await.unwrap();
        let err = store.create(new_user()).await.unwrap_err();

        assert!(matches!(err, AppError::Conflict(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn moving_onto_a_taken_email_is_a_conflict() {
        let store = store().await;
        store
            .create(CreateUser {
                email: "first@example.com".to_string(),
                name: None,
            })
            .await
            .unwrap();
        let second = store
            .create(CreateUser {
                email: "second@example.com".to_string(),
                name: None,
            })
            .await
            .unwrap();

        let err = store
            .update(
                &second.id,
                UpdateUser {
                    email: Some("first@example.com".to_string()),
                    name: None,
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Conflict(_)), "got {err:?}");
    }
}
