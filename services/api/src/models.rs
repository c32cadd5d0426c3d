//! Domain entities plus the request and response payloads of the API

use chrono::{DateTime, Utc};

pub mod group;
pub mod todo;
pub mod user;
pub mod verification;

pub use group::{CreateGroupRequest, NewTodoGroup, TodoGroup, UpdateGroupRequest};
pub use todo::{CreateTodoRequest, NewTodo, Todo, TodoUpdate, UpdateTodoRequest};
pub use user::{
    LoginRequest, NewUser, RegisterRequest, RegisterResponse, ResendRequest, UpdateUserRequest,
    User, UserResponse, UserSettingsUpdate, VerifyRequest,
};
pub use verification::{NewVerification, Verification};

/// Current time as unix seconds
pub fn now_unix() -> i64 {
    Utc::now().timestamp()
}

/// Human readable rendering of a unix timestamp; `0` means "unset"
pub fn display_unix(ts: i64) -> String {
    if ts <= 0 {
        return "None".to_string();
    }

    DateTime::<Utc>::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "None".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_unix_unset() {
        assert_eq!(display_unix(0), "None");
    }

    #[test]
    fn test_display_unix_formats_utc() {
        // 2024-01-02 03:04:00 UTC
        assert_eq!(display_unix(1_704_164_640), "2024-01-02 03:04 UTC");
    }
}
