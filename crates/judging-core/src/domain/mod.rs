//! Domain-level types shared by every judging component.

pub mod error;

pub use error::{JudgingError, Result};

/// Check an externally supplied identifier (team id, judge code, domain key).
///
/// Identifiers are non-empty and contain neither `/` nor whitespace, since
/// they appear inside allocation ids and score keys.
pub fn validate_identifier(entity: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(JudgingError::validation(entity, "identifier must not be empty"));
    }
    if value.contains('/') {
        return Err(JudgingError::validation(
            entity,
            format!("identifier {value:?} must not contain '/'"),
        ));
    }
    if value.chars().any(char::is_whitespace) {
        return Err(JudgingError::validation(
            entity,
            format!("identifier {value:?} must not contain whitespace"),
        ));
    }
    Ok(())
}

/// Reject blank display text.
pub fn require_text(entity: &str, field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(JudgingError::validation(entity, format!("{field} must not be empty")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_rules() {
        assert!(validate_identifier("team", "agri-01").is_ok());
        assert!(validate_identifier("team", "").is_err());
        assert!(validate_identifier("team", "a/b").is_err());
        assert!(validate_identifier("team", "a b").is_err());
        assert!(validate_identifier("team", "tab\there").is_err());
    }

    #[test]
    fn test_require_text_rejects_blank() {
        assert!(require_text("team", "name", "Rootstock").is_ok());
        assert!(require_text("team", "name", "   ").is_err());
    }
}
