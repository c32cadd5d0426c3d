//! Input validation utilities

use base64::{Engine, engine::general_purpose::STANDARD};
use regex::Regex;
use std::sync::OnceLock;

pub const MIN_PASSWORD_LEN: usize = 5;
pub const MAX_PASSWORD_LEN: usize = 128;
pub const MAX_GROUP_NAME_LEN: usize = 100;
pub const MAX_TODO_TEXT_LEN: usize = 4096;

/// Validate email
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }

    if email.len() > 254 {
        return Err("Email must be at most 254 characters long".to_string());
    }

    static EMAIL_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
    let regex = EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").ok()
    });

    match regex {
        Some(regex) if regex.is_match(email) => Ok(()),
        _ => Err("Invalid email format".to_string()),
    }
}

/// Validate password
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.is_empty() {
        return Err("Password is required".to_string());
    }

    let len = password.chars().count();
    if len < MIN_PASSWORD_LEN {
        return Err(format!(
            "Password must be at least {} characters long",
            MIN_PASSWORD_LEN
        ));
    }

    if len > MAX_PASSWORD_LEN {
        return Err(format!(
            "Password must be at most {} characters long",
            MAX_PASSWORD_LEN
        ));
    }

    Ok(())
}

/// Validate a group name, returning it trimmed
pub fn validate_group_name(name: &str) -> Result<String, String> {
    let name = name.trim();
    if name.is_empty() {
        return Err("Group name is required".to_string());
    }

    if name.chars().count() > MAX_GROUP_NAME_LEN {
        return Err(format!(
            "Group name must be at most {} characters long",
            MAX_GROUP_NAME_LEN
        ));
    }

    Ok(name.to_string())
}

/// Validate todo text, returning it trimmed
pub fn validate_todo_text(text: &str) -> Result<String, String> {
    let text = text.trim();
    if text.is_empty() {
        return Err("Todo text is required".to_string());
    }

    if text.chars().count() > MAX_TODO_TEXT_LEN {
        return Err(format!(
            "Todo text must be at most {} characters long",
            MAX_TODO_TEXT_LEN
        ));
    }

    Ok(text.to_string())
}

/// `0` means "no due date"
pub fn validate_due_unix(due_unix: i64) -> Result<(), String> {
    if due_unix < 0 {
        return Err("Due date must not be negative".to_string());
    }
    Ok(())
}

/// Decode a base64 attachment. An empty string decodes to `None`.
pub fn decode_attachment(field: &str, encoded: &str, max_bytes: usize) -> Result<Option<Vec<u8>>, String> {
    if encoded.is_empty() {
        return Ok(None);
    }

    let bytes = STANDARD
        .decode(encoded)
        .map_err(|_| format!("{} is not valid base64", field))?;

    if bytes.len() > max_bytes {
        return Err(format!("{} must be at most {} bytes", field, max_bytes));
    }

    Ok(Some(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("a@b.com").is_ok());
        assert!(validate_email("first.last+tag@sub.example.org").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("a@b").is_err());
        assert!(validate_email(&format!("{}@b.com", "a".repeat(250))).is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("12345").is_ok());
        assert!(validate_password("1234").is_err());
        assert!(validate_password("").is_err());
        assert!(validate_password(&"x".repeat(128)).is_ok());
        assert!(validate_password(&"x".repeat(129)).is_err());
    }

    #[test]
    fn test_validate_group_name() {
        assert_eq!(validate_group_name("  Work ").unwrap(), "Work");
        assert!(validate_group_name("   ").is_err());
        assert!(validate_group_name(&"g".repeat(101)).is_err());
    }

    #[test]
    fn test_validate_todo_text() {
        assert_eq!(validate_todo_text(" Buy milk\n").unwrap(), "Buy milk");
        assert!(validate_todo_text("").is_err());
        assert!(validate_todo_text(&"t".repeat(4097)).is_err());
    }

    #[test]
    fn test_validate_due_unix() {
        assert!(validate_due_unix(0).is_ok());
        assert!(validate_due_unix(1_700_000_000).is_ok());
        assert!(validate_due_unix(-1).is_err());
    }

    #[test]
    fn test_decode_attachment() {
        assert_eq!(decode_attachment("image", "", 10).unwrap(), None);
        assert_eq!(
            decode_attachment("image", "3q2+7w==", 10).unwrap(),
            Some(vec![0xde, 0xad, 0xbe, 0xef])
        );
        assert!(decode_attachment("image", "3q2+7w==", 3).is_err());
        assert!(decode_attachment("file", "not base64!", 10).is_err());
    }
}
