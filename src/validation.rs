/// Input validation shared by the entry routes and the backup configuration surface.
use crate::constants::{RECIPIENT_HANDLE_MAX_LEN, RECIPIENT_HANDLE_MIN_LEN};

/// A recipient is either a numeric chat id (optionally negative, for groups)
/// or an `@handle` of 5 to 32 ASCII letters, digits or underscores.
pub fn is_valid_recipient(input: &str) -> bool {
    let value = input.trim();
    if let Some(handle) = value.strip_prefix('@') {
        let len = handle.len();
        return (RECIPIENT_HANDLE_MIN_LEN..=RECIPIENT_HANDLE_MAX_LEN).contains(&len)
            && handle
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_');
    }
    let digits = value.strip_prefix('-').unwrap_or(value);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

pub fn validate_recipient(input: &str) -> Result<(), &'static str> {
    if input.trim().is_empty() {
        return Err("Enter a chat id or @username");
    }
    if !is_valid_recipient(input) {
        return Err("Invalid recipient: expected a numeric chat id or @username (5-32 characters)");
    }
    Ok(())
}

/// Checks a weighing and returns the net weight.
pub fn validate_weights(gross: f64, tare: f64) -> Result<f64, &'static str> {
    if !gross.is_finite() || !tare.is_finite() {
        return Err("Weights must be finite numbers");
    }
    if gross <= 0.0 {
        return Err("Gross weight must be greater than zero");
    }
    if tare < 0.0 {
        return Err("Tare weight cannot be negative");
    }
    let net = gross - tare;
    if net < 0.0 {
        return Err("Net weight cannot be negative (check gross and tare)");
    }
    Ok(net)
}

pub fn validate_name(name: &str) -> Result<(), &'static str> {
    let len = name.trim().chars().count();
    if len == 0 {
        return Err("Name is required");
    }
    if len > 200 {
        return Err("Name must not exceed 200 characters");
    }
    Ok(())
}
