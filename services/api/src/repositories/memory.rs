//! In-process store with the same semantics as the PostgreSQL one.
//! Used by the test-suite and by `storage = "memory"` local runs.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{Store, StoreError, StoreResult};
use crate::models::{
    NewTodo, NewTodoGroup, NewUser, NewVerification, Todo, TodoGroup, TodoUpdate, User,
    UserSettingsUpdate, Verification,
};

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<String, User>,
    groups: BTreeMap<i64, TodoGroup>,
    todos: BTreeMap<i64, Todo>,
    verifications: Vec<Verification>,
    last_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn remove_user_data(&mut self, email: &str) {
        self.todos.retain(|_, todo| todo.owner_email != email);
        self.groups.retain(|_, group| group.owner_email != email);
        self.verifications.retain(|v| v.email != email);
        self.users.remove(email);
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_user(&self, email: &str) -> StoreResult<User> {
        let tables = self.tables.read().await;
        tables.users.get(email).cloned().ok_or(StoreError::NotFound)
    }

    async fn create_user(&self, user: &NewUser) -> StoreResult<User> {
        let mut tables = self.tables.write().await;
        if tables.users.contains_key(&user.email) {
            return Err(StoreError::AlreadyExists(user.email.clone()));
        }

        let created = User {
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            created_unix: user.created_unix,
            confirmed_email: user.confirmed_email,
            notify_on_todos: false,
        };
        tables.users.insert(created.email.clone(), created.clone());
        Ok(created)
    }

    async fn update_user_settings(&self, email: &str, update: &UserSettingsUpdate) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let user = tables.users.get_mut(email).ok_or(StoreError::NotFound)?;

        if let Some(hash) = &update.password_hash {
            user.password_hash = hash.clone();
        }
        if let Some(notify) = update.notify_on_todos {
            user.notify_on_todos = notify;
        }
        Ok(())
    }

    async fn set_email_confirmed(&self, email: &str) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let user = tables.users.get_mut(email).ok_or(StoreError::NotFound)?;
        user.confirmed_email = true;
        Ok(())
    }

    async fn delete_user_cascade(&self, email: &str) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(email) {
            return Err(StoreError::NotFound);
        }
        tables.remove_user_data(email);
        Ok(())
    }

    async fn delete_unverified_user_cascade(&self, email: &str) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.users.get(email) {
            Some(user) if !user.confirmed_email => {
                tables.remove_user_data(email);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_unconfirmed_users(&self) -> StoreResult<Vec<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .filter(|user| !user.confirmed_email)
            .cloned()
            .collect())
    }

    async fn get_users_with_notifications_on(&self) -> StoreResult<Vec<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .filter(|user| user.notify_on_todos)
            .cloned()
            .collect())
    }

    async fn create_todo_group(&self, group: &NewTodoGroup) -> StoreResult<TodoGroup> {
        let mut tables = self.tables.write().await;
        let id = tables.next_id();
        let created = TodoGroup {
            id,
            name: group.name.clone(),
            created_unix: group.created_unix,
            owner_email: group.owner_email.clone(),
            removable: group.removable,
        };
        tables.groups.insert(id, created.clone());
        Ok(created)
    }

    async fn get_todo_group(&self, id: i64) -> StoreResult<TodoGroup> {
        let tables = self.tables.read().await;
        tables.groups.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn get_all_user_todo_groups(&self, email: &str) -> StoreResult<Vec<TodoGroup>> {
        let tables = self.tables.read().await;
        Ok(tables
            .groups
            .values()
            .filter(|group| group.owner_email == email)
            .cloned()
            .collect())
    }

    async fn rename_todo_group(&self, id: i64, name: &str) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let group = tables.groups.get_mut(&id).ok_or(StoreError::NotFound)?;
        group.name = name.to_string();
        Ok(())
    }

    async fn delete_todo_group_cascade(&self, id: i64) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.groups.remove(&id).is_none() {
            return Err(StoreError::NotFound);
        }
        tables.todos.retain(|_, todo| todo.group_id != id);
        Ok(())
    }

    async fn create_todo(&self, todo: &NewTodo) -> StoreResult<Todo> {
        let mut tables = self.tables.write().await;
        if !tables.groups.contains_key(&todo.group_id) {
            // mirrors the foreign key on todos.group_id
            return Err(StoreError::NotFound);
        }

        let id = tables.next_id();
        let created = Todo {
            id,
            group_id: todo.group_id,
            text: todo.text.clone(),
            created_unix: todo.created_unix,
            due_unix: todo.due_unix,
            completion_unix: 0,
            owner_email: todo.owner_email.clone(),
            is_done: false,
            image: todo.image.clone(),
            file: todo.file.clone(),
        };
        tables.todos.insert(id, created.clone());
        Ok(created)
    }

    async fn get_todo(&self, id: i64) -> StoreResult<Todo> {
        let tables = self.tables.read().await;
        tables.todos.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn get_all_user_todos(&self, email: &str) -> StoreResult<Vec<Todo>> {
        let tables = self.tables.read().await;
        Ok(tables
            .todos
            .values()
            .filter(|todo| todo.owner_email == email)
            .cloned()
            .collect())
    }

    async fn get_group_todos(&self, group_id: i64) -> StoreResult<Vec<Todo>> {
        let tables = self.tables.read().await;
        Ok(tables
            .todos
            .values()
            .filter(|todo| todo.group_id == group_id)
            .cloned()
            .collect())
    }

    async fn update_todo(&self, id: i64, update: &TodoUpdate) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let todo = tables.todos.get_mut(&id).ok_or(StoreError::NotFound)?;

        todo.group_id = update.group_id;
        todo.text = update.text.clone();
        todo.due_unix = update.due_unix;
        todo.is_done = update.is_done;
        todo.completion_unix = update.completion_unix;
        todo.image = update.image.clone();
        todo.file = update.file.clone();
        Ok(())
    }

    async fn delete_todo(&self, id: i64) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables
            .todos
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn get_user_todos_due_by(&self, email: &str, horizon: i64) -> StoreResult<Vec<Todo>> {
        let tables = self.tables.read().await;
        let mut due: Vec<Todo> = tables
            .todos
            .values()
            .filter(|todo| todo.owner_email == email && todo.is_due_by(horizon))
            .cloned()
            .collect();
        due.sort_by_key(|todo| todo.due_unix);
        Ok(due)
    }

    async fn create_verification(&self, verification: &NewVerification) -> StoreResult<Verification> {
        let mut tables = self.tables.write().await;
        let id = tables.next_id();
        let created = Verification {
            id,
            email: verification.email.clone(),
            code: verification.code.clone(),
            issued_unix: verification.issued_unix,
            life_seconds: verification.life_seconds,
        };
        tables.verifications.push(created.clone());
        Ok(created)
    }

    async fn get_latest_verification(&self, email: &str) -> StoreResult<Verification> {
        let tables = self.tables.read().await;
        tables
            .verifications
            .iter()
            .filter(|v| v.email == email)
            .max_by_key(|v| (v.issued_unix, v.id))
            .cloned()
            .ok_or(StoreError::NotFound)
    }
}
