//! User model and related payloads

use serde::{Deserialize, Serialize};

/// User entity, keyed by email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub email: String,
    pub password_hash: String,
    pub created_unix: i64,
    pub confirmed_email: bool,
    pub notify_on_todos: bool,
}

/// New user creation payload
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub created_unix: i64,
    pub confirmed_email: bool,
}

/// Partial update of the user-editable settings
#[derive(Debug, Clone, Default)]
pub struct UserSettingsUpdate {
    pub password_hash: Option<String>,
    pub notify_on_todos: Option<bool>,
}

/// Registration request
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

/// Registration outcome; tells the client whether a code was emailed
#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub confirm_email: bool,
}

/// Login request
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Email verification answer. With the password included the response
/// also carries the `auth` cookie.
#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub email: String,
    pub code: String,
    #[serde(default)]
    pub password: Option<String>,
}

/// Request for a fresh verification code
#[derive(Debug, Deserialize)]
pub struct ResendRequest {
    pub email: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub password: Option<String>,
    pub notify_on_todos: Option<bool>,
}

/// Public view of a user; never carries the password hash
#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub email: String,
    pub created_unix: i64,
    pub confirmed_email: bool,
    pub notify_on_todos: bool,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            email: user.email.clone(),
            created_unix: user.created_unix,
            confirmed_email: user.confirmed_email,
            notify_on_todos: user.notify_on_todos,
        }
    }
}
