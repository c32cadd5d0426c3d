//! PostgreSQL implementation of the store

use async_trait::async_trait;
use common::error::DatabaseError;
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::info;

use super::{Store, StoreError, StoreResult};
use crate::models::{
    NewTodo, NewTodoGroup, NewUser, NewVerification, Todo, TodoGroup, TodoUpdate, User,
    UserSettingsUpdate, Verification,
};

const USER_COLUMNS: &str = "email, password_hash, created_unix, confirmed_email, notify_on_todos";
const GROUP_COLUMNS: &str = "id, name, created_unix, owner_email, removable";
const TODO_COLUMNS: &str = "id, group_id, text, created_unix, due_unix, completion_unix, owner_email, is_done, image, file";
const VERIFICATION_COLUMNS: &str = "id, email, code, issued_unix, life_seconds";

fn user_from_row(row: &PgRow) -> User {
    User {
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        created_unix: row.get("created_unix"),
        confirmed_email: row.get("confirmed_email"),
        notify_on_todos: row.get("notify_on_todos"),
    }
}

fn group_from_row(row: &PgRow) -> TodoGroup {
    TodoGroup {
        id: row.get("id"),
        name: row.get("name"),
        created_unix: row.get("created_unix"),
        owner_email: row.get("owner_email"),
        removable: row.get("removable"),
    }
}

fn todo_from_row(row: &PgRow) -> Todo {
    Todo {
        id: row.get("id"),
        group_id: row.get("group_id"),
        text: row.get("text"),
        created_unix: row.get("created_unix"),
        due_unix: row.get("due_unix"),
        completion_unix: row.get("completion_unix"),
        owner_email: row.get("owner_email"),
        is_done: row.get("is_done"),
        image: row.get("image"),
        file: row.get("file"),
    }
}

fn verification_from_row(row: &PgRow) -> Verification {
    Verification {
        id: row.get("id"),
        email: row.get("email"),
        code: row.get("code"),
        issued_unix: row.get("issued_unix"),
        life_seconds: row.get("life_seconds"),
    }
}

fn expect_affected(rows_affected: u64) -> StoreResult<()> {
    if rows_affected == 0 {
        Err(StoreError::NotFound)
    } else {
        Ok(())
    }
}

/// Store backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the bundled schema migrations
    pub async fn migrate(&self) -> Result<(), DatabaseError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn get_user(&self, email: &str) -> StoreResult<User> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)?;

        Ok(user_from_row(&row))
    }

    async fn create_user(&self, user: &NewUser) -> StoreResult<User> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO users (email, password_hash, created_unix, confirmed_email, notify_on_todos)
            VALUES ($1, $2, $3, $4, FALSE)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.created_unix)
        .bind(user.confirmed_email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            let e = DatabaseError::Query(e);
            if e.is_unique_violation() {
                StoreError::AlreadyExists(user.email.clone())
            } else {
                StoreError::Database(e)
            }
        })?;

        Ok(user_from_row(&row))
    }

    async fn update_user_settings(&self, email: &str, update: &UserSettingsUpdate) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = COALESCE($2, password_hash),
                notify_on_todos = COALESCE($3, notify_on_todos)
            WHERE email = $1
            "#,
        )
        .bind(email)
        .bind(&update.password_hash)
        .bind(update.notify_on_todos)
        .execute(&self.pool)
        .await?;

        expect_affected(result.rows_affected())
    }

    async fn set_email_confirmed(&self, email: &str) -> StoreResult<()> {
        let result = sqlx::query("UPDATE users SET confirmed_email = TRUE WHERE email = $1")
            .bind(email)
            .execute(&self.pool)
            .await?;

        expect_affected(result.rows_affected())
    }

    async fn delete_user_cascade(&self, email: &str) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM todos WHERE owner_email = $1")
            .bind(email)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM todo_groups WHERE owner_email = $1")
            .bind(email)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM verifications WHERE email = $1")
            .bind(email)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM users WHERE email = $1")
            .bind(email)
            .execute(&mut *tx)
            .await?;

        expect_affected(result.rows_affected())?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete_unverified_user_cascade(&self, email: &str) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        let confirmed: Option<bool> =
            sqlx::query_scalar("SELECT confirmed_email FROM users WHERE email = $1 FOR UPDATE")
                .bind(email)
                .fetch_optional(&mut *tx)
                .await?;

        if confirmed != Some(false) {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("DELETE FROM todos WHERE owner_email = $1")
            .bind(email)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM todo_groups WHERE owner_email = $1")
            .bind(email)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM verifications WHERE email = $1")
            .bind(email)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM users WHERE email = $1")
            .bind(email)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn get_unconfirmed_users(&self) -> StoreResult<Vec<User>> {
        let rows = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE confirmed_email = FALSE"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(user_from_row).collect())
    }

    async fn get_users_with_notifications_on(&self) -> StoreResult<Vec<User>> {
        let rows = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE notify_on_todos = TRUE"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(user_from_row).collect())
    }

    async fn create_todo_group(&self, group: &NewTodoGroup) -> StoreResult<TodoGroup> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO todo_groups (name, created_unix, owner_email, removable)
            VALUES ($1, $2, $3, $4)
            RETURNING {GROUP_COLUMNS}
            "#
        ))
        .bind(&group.name)
        .bind(group.created_unix)
        .bind(&group.owner_email)
        .bind(group.removable)
        .fetch_one(&self.pool)
        .await?;

        Ok(group_from_row(&row))
    }

    async fn get_todo_group(&self, id: i64) -> StoreResult<TodoGroup> {
        let row = sqlx::query(&format!("SELECT {GROUP_COLUMNS} FROM todo_groups WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)?;

        Ok(group_from_row(&row))
    }

    async fn get_all_user_todo_groups(&self, email: &str) -> StoreResult<Vec<TodoGroup>> {
        let rows = sqlx::query(&format!(
            "SELECT {GROUP_COLUMNS} FROM todo_groups WHERE owner_email = $1 ORDER BY id"
        ))
        .bind(email)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(group_from_row).collect())
    }

    async fn rename_todo_group(&self, id: i64, name: &str) -> StoreResult<()> {
        let result = sqlx::query("UPDATE todo_groups SET name = $1 WHERE id = $2")
            .bind(name)
            .bind(id)
            .execute(&self.pool)
            .await?;

        expect_affected(result.rows_affected())
    }

    async fn delete_todo_group_cascade(&self, id: i64) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM todos WHERE group_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM todo_groups WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        expect_affected(result.rows_affected())?;
        tx.commit().await?;
        Ok(())
    }

    async fn create_todo(&self, todo: &NewTodo) -> StoreResult<Todo> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO todos (group_id, text, created_unix, due_unix, completion_unix, owner_email, is_done, image, file)
            VALUES ($1, $2, $3, $4, 0, $5, FALSE, $6, $7)
            RETURNING {TODO_COLUMNS}
            "#
        ))
        .bind(todo.group_id)
        .bind(&todo.text)
        .bind(todo.created_unix)
        .bind(todo.due_unix)
        .bind(&todo.owner_email)
        .bind(&todo.image)
        .bind(&todo.file)
        .fetch_one(&self.pool)
        .await?;

        Ok(todo_from_row(&row))
    }

    async fn get_todo(&self, id: i64) -> StoreResult<Todo> {
        let row = sqlx::query(&format!("SELECT {TODO_COLUMNS} FROM todos WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)?;

        Ok(todo_from_row(&row))
    }

    async fn get_all_user_todos(&self, email: &str) -> StoreResult<Vec<Todo>> {
        let rows = sqlx::query(&format!(
            "SELECT {TODO_COLUMNS} FROM todos WHERE owner_email = $1 ORDER BY id"
        ))
        .bind(email)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(todo_from_row).collect())
    }

    async fn get_group_todos(&self, group_id: i64) -> StoreResult<Vec<Todo>> {
        let rows = sqlx::query(&format!(
            "SELECT {TODO_COLUMNS} FROM todos WHERE group_id = $1 ORDER BY id"
        ))
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(todo_from_row).collect())
    }

    async fn update_todo(&self, id: i64, update: &TodoUpdate) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE todos
            SET group_id = $1, text = $2, due_unix = $3, is_done = $4,
                completion_unix = $5, image = $6, file = $7
            WHERE id = $8
            "#,
        )
        .bind(update.group_id)
        .bind(&update.text)
        .bind(update.due_unix)
        .bind(update.is_done)
        .bind(update.completion_unix)
        .bind(&update.image)
        .bind(&update.file)
        .bind(id)
        .execute(&self.pool)
        .await?;

        expect_affected(result.rows_affected())
    }

    async fn delete_todo(&self, id: i64) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM todos WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        expect_affected(result.rows_affected())
    }

    async fn get_user_todos_due_by(&self, email: &str, horizon: i64) -> StoreResult<Vec<Todo>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {TODO_COLUMNS} FROM todos
            WHERE owner_email = $1 AND is_done = FALSE AND due_unix > 0 AND due_unix <= $2
            ORDER BY due_unix
            "#
        ))
        .bind(email)
        .bind(horizon)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(todo_from_row).collect())
    }

    async fn create_verification(&self, verification: &NewVerification) -> StoreResult<Verification> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO verifications (email, code, issued_unix, life_seconds)
            VALUES ($1, $2, $3, $4)
            RETURNING {VERIFICATION_COLUMNS}
            "#
        ))
        .bind(&verification.email)
        .bind(&verification.code)
        .bind(verification.issued_unix)
        .bind(verification.life_seconds)
        .fetch_one(&self.pool)
        .await?;

        Ok(verification_from_row(&row))
    }

    async fn get_latest_verification(&self, email: &str) -> StoreResult<Verification> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {VERIFICATION_COLUMNS} FROM verifications
            WHERE email = $1
            ORDER BY issued_unix DESC, id DESC
            LIMIT 1
            "#
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)?;

        Ok(verification_from_row(&row))
    }
}
