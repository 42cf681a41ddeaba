//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest user identifier accepted on the wire.
pub const USER_ID_MAX_LEN: usize = 64;

/// Validates that a user ID is non-blank, at most 64 characters and free of control characters.
///
/// # Examples
///
/// ```ignore
/// validate_user_id("64f1c0ffee") // Ok
/// validate_user_id("   ")        // Err - blank
/// validate_user_id("a\nb")       // Err - control character
/// ```
pub fn validate_user_id(id: &str) -> Result<(), ValidationError> {
    if id.trim().is_empty() {
        let mut err = ValidationError::new("user_id_missing");
        err.message = Some("User ID must not be empty".into());
        return Err(err);
    }

    let len = id.chars().count();
    if len > USER_ID_MAX_LEN {
        let mut err = ValidationError::new("user_id_length");
        err.message = Some(
            format!("User ID must be at most {USER_ID_MAX_LEN} characters (got {len})").into(),
        );
        return Err(err);
    }

    if id.chars().any(char::is_control) {
        let mut err = ValidationError::new("user_id_format");
        err.message = Some("User ID must not contain control characters".into());
        return Err(err);
    }

    Ok(())
}
