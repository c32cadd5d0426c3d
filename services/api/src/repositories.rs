//! Credential store: persistence contract for users, groups, todos and
//! verification codes

use async_trait::async_trait;
use common::error::DatabaseError;
use thiserror::Error;

use crate::models::{
    NewTodo, NewTodoGroup, NewUser, NewVerification, Todo, TodoGroup, TodoUpdate, User,
    UserSettingsUpdate, Verification,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Store level errors. `NotFound` is always distinguishable from a backend
/// failure.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Record not found")]
    NotFound,

    #[error("Record already exists: {0}")]
    AlreadyExists(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            other => StoreError::Database(DatabaseError::Query(other)),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence operations the service relies on.
///
/// Writes are individually atomic; nothing here spans a request, so checks
/// made by callers before a write are best effort.
#[async_trait]
pub trait Store: Send + Sync {
    // users
    async fn get_user(&self, email: &str) -> StoreResult<User>;
    async fn create_user(&self, user: &NewUser) -> StoreResult<User>;
    async fn update_user_settings(&self, email: &str, update: &UserSettingsUpdate) -> StoreResult<()>;
    async fn set_email_confirmed(&self, email: &str) -> StoreResult<()>;
    /// Removes the user together with every group, todo and verification
    async fn delete_user_cascade(&self, email: &str) -> StoreResult<()>;
    /// Like [`Store::delete_user_cascade`], but only while the email is
    /// unconfirmed. Returns whether anything was deleted.
    async fn delete_unverified_user_cascade(&self, email: &str) -> StoreResult<bool>;
    async fn get_unconfirmed_users(&self) -> StoreResult<Vec<User>>;
    async fn get_users_with_notifications_on(&self) -> StoreResult<Vec<User>>;

    // groups
    async fn create_todo_group(&self, group: &NewTodoGroup) -> StoreResult<TodoGroup>;
    async fn get_todo_group(&self, id: i64) -> StoreResult<TodoGroup>;
    async fn get_all_user_todo_groups(&self, email: &str) -> StoreResult<Vec<TodoGroup>>;
    async fn rename_todo_group(&self, id: i64, name: &str) -> StoreResult<()>;
    /// Removes the group and every todo inside it
    async fn delete_todo_group_cascade(&self, id: i64) -> StoreResult<()>;

    // todos
    async fn create_todo(&self, todo: &NewTodo) -> StoreResult<Todo>;
    async fn get_todo(&self, id: i64) -> StoreResult<Todo>;
    async fn get_all_user_todos(&self, email: &str) -> StoreResult<Vec<Todo>>;
    async fn get_group_todos(&self, group_id: i64) -> StoreResult<Vec<Todo>>;
    async fn update_todo(&self, id: i64, update: &TodoUpdate) -> StoreResult<()>;
    async fn delete_todo(&self, id: i64) -> StoreResult<()>;
    /// Unfinished todos with a due date set and `due_unix <= horizon`
    async fn get_user_todos_due_by(&self, email: &str, horizon: i64) -> StoreResult<Vec<Todo>>;

    // verification codes
    async fn create_verification(&self, verification: &NewVerification) -> StoreResult<Verification>;
    /// Most recently issued verification for the email
    async fn get_latest_verification(&self, email: &str) -> StoreResult<Verification>;
}
