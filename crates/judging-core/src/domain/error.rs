//! Judging error taxonomy.

use judging_state::{JudgeId, Round, StorageError, TeamId};

/// Errors surfaced by every judging operation.
///
/// Each variant names the entity and the constraint that failed so callers
/// can act on it without parsing messages.
#[derive(Debug, thiserror::Error)]
pub enum JudgingError {
    /// Malformed or out-of-range input; correct it and resubmit.
    #[error("invalid {entity}: {reason}")]
    Validation { entity: String, reason: String },

    /// No qualifying allocation links this judge to this team for this round.
    #[error("judge {judge_id} is not allocated to team {team_id} in {round}")]
    Authorization {
        judge_id: JudgeId,
        team_id: TeamId,
        round: Round,
    },

    /// The operation needs a prior state that has not been reached yet.
    #[error("{operation} requires {requirement}")]
    Precondition {
        operation: &'static str,
        requirement: String,
    },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// A calculation hit an internal invariant violation and was aborted.
    /// The previous snapshot stays in force.
    #[error("{round} calculation aborted: {reason}")]
    Consistency { round: Round, reason: String },

    #[error("storage error: {0}")]
    Storage(StorageError),

    #[error("config error: {0}")]
    Config(String),
}

impl JudgingError {
    pub fn validation(entity: impl Into<String>, reason: impl Into<String>) -> Self {
        JudgingError::Validation {
            entity: entity.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(kind: &'static str, id: impl std::fmt::Display) -> Self {
        JudgingError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn precondition(operation: &'static str, requirement: impl Into<String>) -> Self {
        JudgingError::Precondition {
            operation,
            requirement: requirement.into(),
        }
    }

    pub fn consistency(round: Round, reason: impl Into<String>) -> Self {
        JudgingError::Consistency {
            round,
            reason: reason.into(),
        }
    }
}

/// Missing and duplicate records are caller errors; everything else the
/// store reports stays a storage failure.
impl From<StorageError> for JudgingError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { kind, id } => JudgingError::NotFound { kind, id },
            StorageError::Duplicate { kind, id } => JudgingError::Validation {
                entity: kind.to_string(),
                reason: format!("{id} already exists"),
            },
            other => JudgingError::Storage(other),
        }
    }
}

/// Result type for judging operations.
pub type Result<T> = std::result::Result<T, JudgingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_error_names_judge_team_and_round() {
        let err = JudgingError::Authorization {
            judge_id: JudgeId::from("j-7"),
            team_id: TeamId::from("agri-03"),
            round: Round::One,
        };
        let msg = err.to_string();
        assert!(msg.contains("j-7"));
        assert!(msg.contains("agri-03"));
        assert!(msg.contains("round_one"));
    }

    #[test]
    fn test_storage_not_found_maps_to_not_found() {
        let err: JudgingError = StorageError::NotFound {
            kind: "team",
            id: "t1".to_string(),
        }
        .into();
        assert!(matches!(err, JudgingError::NotFound { kind: "team", .. }));
    }

    #[test]
    fn test_storage_duplicate_maps_to_validation() {
        let err: JudgingError = StorageError::Duplicate {
            kind: "judge_code",
            id: "J01".to_string(),
        }
        .into();
        match err {
            JudgingError::Validation { entity, reason } => {
                assert_eq!(entity, "judge_code");
                assert!(reason.contains("J01"));
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn test_backend_failure_stays_storage() {
        let err: JudgingError = StorageError::Backend("connection reset".to_string()).into();
        assert!(matches!(err, JudgingError::Storage(_)));
        assert!(err.to_string().contains("connection reset"));
    }
}
