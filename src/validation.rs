use crate::constants::MAX_TARGET_ID_LEN;
use crate::error::AppError;

/// Validate a lock target identifier (package name, WM class, ...).
/// Returns the trimmed identifier.
pub fn validate_target_id(target_id: &str) -> Result<&str, AppError> {
    let trimmed = target_id.trim();
    let err = |reason: &str| AppError::InvalidInput {
        field: "target_id",
        reason: reason.into(),
    };

    if trimmed.is_empty() {
        return Err(err("cannot be empty"));
    }
    if trimmed.len() > MAX_TARGET_ID_LEN {
        return Err(AppError::InvalidInput {
            field: "target_id",
            reason: format!("cannot exceed {MAX_TARGET_ID_LEN} bytes"),
        });
    }
    if trimmed.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(err("cannot contain whitespace or control characters"));
    }

    Ok(trimmed)
}

/// Parse a boolean flag value as accepted on the command line.
pub fn parse_flag_value(value: &str) -> Result<bool, AppError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        other => Err(AppError::InvalidInput {
            field: "value",
            reason: format!("expected true/false, got '{other}'"),
        }),
    }
}
