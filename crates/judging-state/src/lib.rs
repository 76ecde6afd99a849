//! judging-state: persistence layer for the hackathon judging engine
//!
//! Owns every durable record the judging core reads or writes: teams,
//! judges, allocations for both rounds, the score ledger and the round
//! result snapshots.
//!
//! ## Key Components
//!
//! - `storage_traits`: backend-agnostic async traits plus the record types
//! - `SurrealJudgingStore`: SurrealDB implementation (mem, SurrealKV, ws)
//! - `fakes::MemoryJudgingStore`: in-memory implementation for tests

mod error;
pub mod fakes;
mod migrations;
mod schema;
pub mod storage_traits;
pub mod surreal_store;

pub use error::{StateError, StorageError};
pub use schema::{AssignmentRow, JudgeRow, PairRow, RevocationRow, ScoreRow, SnapshotRow, TeamRow};
pub use storage_traits::{
    AllocationStore, ContentDigest, DirectoryStore, DomainAssignment, DomainKey, DomainRecord,
    JudgeId, JudgeRecord, JudgeType, JudgingStore, PairAllocationRecord, ResultSnapshot,
    ResultStore, Revocation, Round, RoundResultRecord, RubricScores, ScoreFilter, ScoreKey,
    ScoreRecord, ScoreStore, StorageResult, TeamId, TeamRecord,
};
pub use fakes::MemoryJudgingStore;
pub use surreal_store::{CloudConfig, SurrealJudgingStore};

/// Result type for judging-state connection and schema operations
pub type Result<T> = std::result::Result<T, StateError>;
