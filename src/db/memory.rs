use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::UserStore;
use crate::error::{AppError, AppResult};
use crate::models::{CreateUser, UpdateUser, User};

/// Process-local `UserStore`, used when no database is configured.
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<Vec<User>>,
}

fn now() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a user with a caller-chosen id.
    pub async fn insert(&self, id: &str, data: CreateUser) -> AppResult<User> {
        let mut users = self.users.write().await;
        if users.iter().any(|u| u.id == id || u.email == data.email) {
            return Err(AppError::Conflict("User already exists".to_string()));
        }

        let timestamp = now();
        let user = User {
            id: id.to_string(),
            email: data.email,
            name: data.name,
            created_at: timestamp.clone(),
            updated_at: timestamp,
        };
        users.push(user.clone());
        Ok(user)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn list(&self) -> AppResult<Vec<User>> {
        Ok(self.users.read().await.clone())
    }

    async fn find_by_id(&self, id: &str) -> AppResult<Option<User>> {
        Ok(self.users.read().await.iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .iter()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn create(&self, data: CreateUser) -> AppResult<User> {
        self.insert(&Uuid::new_v4().to_string(), data).await
    }

    async fn update(&self, id: &str, data: UpdateUser) -> AppResult<Option<User>> {
        let mut users = self.users.write().await;

        if let Some(email) = &data.email {
            if users.iter().any(|u| u.id != id && &u.email == email) {
                return Err(AppError::Conflict("Email already in use".to_string()));
            }
        }

        let Some(user) = users.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        if let Some(email) = data.email {
            user.email = email;
        }
        if let Some(name) = data.name {
            user.name = Some(name);
        }
        user.updated_at = now();
        Ok(Some(user.clone()))
    }

    async fn delete(&self, id: &str) -> AppResult<bool> {
        let mut users = self.users.write().await;
        let before = users.len();
        users.retain(|u| u.id != id);
        Ok(users.len() != before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str) -> CreateUser {
        CreateUser {
            email: email.to_string(),
            name: None,
        }
    }

    #[tokio::test]
    async fn list_keeps_insertion_order() {
        let store = MemoryStore::new();
        store.insert("b", new_user("b@example.com")).await.unwrap();
        store.insert("a", new_user("a@example.com")).await.unwrap();

        let ids: Vec<_> = store.list().await.unwrap().into_iter().map(|u| u.id).collect();
        assert_eq!(ids, ["b", "a"]);
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let store = MemoryStore::new();
        store.create(new_user("dup@example.com")).await.unwrap();

        let err = store.create(new_user("dup@example.com")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn update_rejects_email_owned_by_someone_else() {
        let store = MemoryStore::new();
        store.insert("1", new_user("one@example.com")).await.unwrap();
        store.insert("2", new_user("two@example.com")).await.unwrap();

        let err = store
            .update(
                "2",
                UpdateUser {
                    email: Some("one@example.com".to_string()),
                    name: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        // Re-sending your own email is fine.
        let same = store
            .update(
                "2",
                UpdateUser {
                    email: Some("two@example.com".to_string()),
                    name: Some("Two".to_string()),
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(same.name.as_deref(), Some("Two"));
    }

    #[tokio::test]
    async fn delete_unknown_id_is_false() {
        let store = MemoryStore::new();
        assert!(!store.delete("nope").await.unwrap());
    }
}
