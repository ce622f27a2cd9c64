//! Input validation for user operations.

use crate::model::{NewUser, UserUpdate};
use crate::service::UserError;

/// Whether `email` looks like `local@domain`.
///
/// The check is shallow: trimmed length of at least 3, exactly one `@`,
/// and non-empty text on both sides of it.
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    if email.len() < 3 {
        return false;
    }

    let mut parts = email.split('@');
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(local), Some(domain), None) if !local.is_empty() && !domain.is_empty()
    )
}

fn invalid(message: &str) -> UserError {
    UserError::InvalidInput(message.to_string())
}

/// Validate the input of a create.
///
/// # Errors
///
/// Returns [`UserError::InvalidInput`] naming the first offending field.
pub fn validate_create(user: &NewUser) -> Result<(), UserError> {
    if user.email.trim().is_empty() {
        return Err(invalid("email is required"));
    }
    if !is_valid_email(&user.email) {
        return Err(invalid("invalid email format"));
    }
    if user.first_name.trim().is_empty() {
        return Err(invalid("first_name is required"));
    }
    if user.last_name.trim().is_empty() {
        return Err(invalid("last_name is required"));
    }
    Ok(())
}

/// Validate the input of a partial update. Absent fields are not checked.
///
/// # Errors
///
/// Returns [`UserError::InvalidInput`] naming the first offending field.
pub fn validate_update(update: &UserUpdate) -> Result<(), UserError> {
    if let Some(email) = &update.email {
        if !is_valid_email(email) {
            return Err(invalid("invalid email format"));
        }
    }
    if update.first_name.as_deref().is_some_and(|name| name.trim().is_empty()) {
        return Err(invalid("first_name must not be empty"));
    }
    if update.last_name.as_deref().is_some_and(|name| name.trim().is_empty()) {
        return Err(invalid("last_name must not be empty"));
    }
    Ok(())
}
