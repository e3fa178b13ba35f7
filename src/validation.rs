//! Input validation for customer fields.

use crate::error::ValidationError;

/// Shortest accepted name, in characters, after trimming.
pub const NAME_MIN_LEN: usize = 2;

/// Longest accepted name, in characters, after trimming.
pub const NAME_MAX_LEN: usize = 50;

/// Check a customer name: 2–50 characters once trimmed, letters and
/// whitespace only.
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    let trimmed = name.trim();
    let len = trimmed.chars().count();

    if len == 0 {
        return Err(ValidationError::NameRequired);
    }
    if len < NAME_MIN_LEN {
        return Err(ValidationError::NameTooShort);
    }
    if len > NAME_MAX_LEN {
        return Err(ValidationError::NameTooLong);
    }
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_alphabetic() || c.is_whitespace())
    {
        return Err(ValidationError::NameInvalidCharacters);
    }

    Ok(())
}
