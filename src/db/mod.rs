pub mod libsql_store;
pub mod memory;

use async_trait::async_trait;

use crate::error::AppResult;
use crate::models::{CreateUser, UpdateUser, User};

pub use libsql_store::{create_database, LibsqlStore};
pub use memory::MemoryStore;

/// Persistence behind the users controller.
///
/// Inputs are already validated by the handlers; implementations only enforce
/// storage-level constraints.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn list(&self) -> AppResult<Vec<User>>;
    async fn find_by_id(&self, id: &str) -> AppResult<Option<User>>;
    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>>;
    async fn create(&self, data: CreateUser) -> AppResult<User>;
    /// Returns `None` when no user has this id.
    async fn update(&self, id: &str, data: UpdateUser) -> AppResult<Option<User>>;
    /// Returns whether a user was removed.
    async fn delete(&self, id: &str) -> AppResult<bool>;
}
