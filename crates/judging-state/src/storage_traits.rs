//! Storage trait definitions for the judging engine
//!
//! These traits define the persistence collaborators the core consumes:
//! - `DirectoryStore`: team and judge records
//! - `AllocationStore`: Round 1 domain assignments and Round 2 pairings
//! - `ScoreStore`: one current score per (judge, team, round)
//! - `ResultStore`: versioned RoundResult snapshots with atomic replace-all
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name(s)
            }
        }
    };
}

string_id!(
    /// Globally unique domain key (e.g. `fintech_ecommerce`), used everywhere
    /// instead of the display name.
    DomainKey
);

string_id!(
    /// Stable team identifier supplied when the team is registered.
    TeamId
);

string_id!(
    /// Internal judge identifier, generated at creation time.
    JudgeId
);

impl JudgeId {
    /// Generate a new random JudgeId
    pub fn new() -> Self {
        JudgeId(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for JudgeId {
    fn default() -> Self {
        Self::new()
    }
}

/// The two judging rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Round {
    #[serde(rename = "round_one")]
    One,
    #[serde(rename = "round_two")]
    Two,
}

impl Round {
    pub const ALL: [Round; 2] = [Round::One, Round::Two];

    pub fn as_str(&self) -> &'static str {
        match self {
            Round::One => "round_one",
            Round::Two => "round_two",
        }
    }

    /// 1-based round number.
    pub fn number(&self) -> u8 {
        match self {
            Round::One => 1,
            Round::Two => 2,
        }
    }
}

impl std::fmt::Display for Round {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Round {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "1" | "one" | "round_one" | "round-one" | "r1" => Ok(Round::One),
            "2" | "two" | "round_two" | "round-two" | "r2" => Ok(Round::Two),
            other => Err(format!("unknown round: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Content digest
// ---------------------------------------------------------------------------

/// Content digest (SHA-256 hex string).
///
/// The inner field is private to guarantee the string is always valid
/// lowercase hex produced by `from_bytes` or validated via `TryFrom<String>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Compute the SHA-256 digest of the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        use sha2::Digest;
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentDigest(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = StorageError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StorageError::InvalidDigest { digest: s });
        }
        Ok(ContentDigest(s.to_ascii_lowercase()))
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Directory records
// ---------------------------------------------------------------------------

/// A scoring domain (thematic track).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRecord {
    pub key: DomainKey,
    pub name: String,
}

/// Judge category. Decides which round a judge may be allocated to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JudgeType {
    Internal,
    External,
}

impl JudgeType {
    /// The round this judge type scores.
    pub fn round(&self) -> Round {
        match self {
            JudgeType::Internal => Round::One,
            JudgeType::External => Round::Two,
        }
    }
}

impl std::fmt::Display for JudgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JudgeType::Internal => f.write_str("Internal"),
            JudgeType::External => f.write_str("External"),
        }
    }
}

impl std::str::FromStr for JudgeType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "internal" => Ok(JudgeType::Internal),
            "external" => Ok(JudgeType::External),
            other => Err(format!("unknown judge type: {other}")),
        }
    }
}

/// A registered team. `domain_key` never changes after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamRecord {
    pub id: TeamId,
    pub name: String,
    pub domain_key: DomainKey,
    pub problem_statement: String,
    pub idea_description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A registered judge. `code` is the external-facing login code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeRecord {
    pub id: JudgeId,
    pub name: String,
    pub code: String,
    pub judge_type: JudgeType,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Allocation records
// ---------------------------------------------------------------------------

/// Round 1: a judge assigned to a whole domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainAssignment {
    pub domain_key: DomainKey,
    pub judge_id: JudgeId,
    pub created_at: DateTime<Utc>,
}

/// Round 1: one expanded (domain, judge, team) relation removed by hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revocation {
    pub domain_key: DomainKey,
    pub judge_id: JudgeId,
    pub team_id: TeamId,
    pub revoked_at: DateTime<Utc>,
}

/// Round 2: a direct judge ↔ team pairing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairAllocationRecord {
    pub judge_id: JudgeId,
    pub team_id: TeamId,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Scores
// ---------------------------------------------------------------------------

/// The six rubric criteria plus bonus.
///
/// Also used for per-criterion means in round results.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RubricScores {
    pub problem_identification: f64,
    pub innovation_creativity: f64,
    pub feasibility_practicality: f64,
    pub market_impact_potential: f64,
    pub technology_domain_relevance: f64,
    pub pitch_delivery_qa: f64,
    pub bonus: f64,
}

impl RubricScores {
    /// Names of the six weighted criteria, in canonical order.
    pub const CRITERIA: [&'static str; 6] = [
        "problem_identification",
        "innovation_creativity",
        "feasibility_practicality",
        "market_impact_potential",
        "technology_domain_relevance",
        "pitch_delivery_qa",
    ];

    /// The six criteria in canonical order.
    pub fn criteria(&self) -> [f64; 6] {
        [
            self.problem_identification,
            self.innovation_creativity,
            self.feasibility_practicality,
            self.market_impact_potential,
            self.technology_domain_relevance,
            self.pitch_delivery_qa,
        ]
    }

    /// Sum of the six criteria plus bonus, always added in canonical order.
    pub fn total(&self) -> f64 {
        self.criteria().iter().sum::<f64>() + self.bonus
    }
}

/// Key of the single current score per (judge, team, round).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ScoreKey {
    pub judge_id: JudgeId,
    pub team_id: TeamId,
    pub round: Round,
}

impl std::fmt::Display for ScoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.judge_id, self.team_id, self.round)
    }
}

/// A stored score.
///
/// `total` is a cached value derived from `rubric`; use [`ScoreRecord::new`]
/// to build one and [`ScoreRecord::verify_total`] when loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub judge_id: JudgeId,
    pub team_id: TeamId,
    pub domain_key: DomainKey,
    pub round: Round,
    pub rubric: RubricScores,
    pub total: f64,
    pub created_at: DateTime<Utc>,
}

impl ScoreRecord {
    pub fn new(
        judge_id: JudgeId,
        team_id: TeamId,
        domain_key: DomainKey,
        round: Round,
        rubric: RubricScores,
        created_at: DateTime<Utc>,
    ) -> Self {
        let total = rubric.total();
        Self {
            judge_id,
            team_id,
            domain_key,
            round,
            rubric,
            total,
            created_at,
        }
    }

    pub fn key(&self) -> ScoreKey {
        ScoreKey {
            judge_id: self.judge_id.clone(),
            team_id: self.team_id.clone(),
            round: self.round,
        }
    }

    /// Re-derive `total` from the rubric and compare with the cached value.
    pub fn verify_total(&self) -> StorageResult<()> {
        let expected = self.rubric.total();
        if expected != self.total {
            return Err(StorageError::Integrity {
                kind: "score",
                id: self.key().to_string(),
                reason: format!("cached total {} != derived total {}", self.total, expected),
            });
        }
        Ok(())
    }
}

/// Filter for [`ScoreStore::list_scores`]. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreFilter {
    pub judge_id: Option<JudgeId>,
    pub team_id: Option<TeamId>,
    pub round: Option<Round>,
    pub domain_key: Option<DomainKey>,
}

impl ScoreFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_round(round: Round) -> Self {
        Self {
            round: Some(round),
            ..Self::default()
        }
    }

    pub fn judge(mut self, judge_id: &JudgeId) -> Self {
        self.judge_id = Some(judge_id.clone());
        self
    }

    pub fn team(mut self, team_id: &TeamId) -> Self {
        self.team_id = Some(team_id.clone());
        self
    }

    pub fn domain(mut self, domain_key: Option<&DomainKey>) -> Self {
        self.domain_key = domain_key.cloned();
        self
    }

    pub fn matches(&self, score: &ScoreRecord) -> bool {
        self.judge_id.as_ref().map_or(true, |j| *j == score.judge_id)
            && self.team_id.as_ref().map_or(true, |t| *t == score.team_id)
            && self.round.map_or(true, |r| r == score.round)
            && self
                .domain_key
                .as_ref()
                .map_or(true, |d| *d == score.domain_key)
    }
}

// ---------------------------------------------------------------------------
// Round results
// ---------------------------------------------------------------------------

/// One ranked team in a round result snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundResultRecord {
    pub domain_key: DomainKey,
    pub team_id: TeamId,
    pub team_name: String,
    /// Mean of per-judge totals.
    pub total_score: f64,
    /// Per-criterion means across the judges who scored this team.
    pub breakdown: RubricScores,
    /// Number of judges whose scores were aggregated.
    pub judges_scored: u32,
    /// 1-based dense rank (within the domain for Round 1, global for Round 2).
    pub rank: u32,
}

/// A full, immutable set of results produced by one calculation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSnapshot {
    pub round: Round,
    /// Monotonic calculation counter for this round, starting at 1.
    pub version: u64,
    pub calculated_at: DateTime<Utc>,
    /// SHA-256 over the canonical JSON of `rows`.
    pub digest: ContentDigest,
    pub rows: Vec<RoundResultRecord>,
}

impl ResultSnapshot {
    pub fn new(
        round: Round,
        version: u64,
        calculated_at: DateTime<Utc>,
        rows: Vec<RoundResultRecord>,
    ) -> StorageResult<Self> {
        let digest = Self::compute_digest(&rows)?;
        Ok(Self {
            round,
            version,
            calculated_at,
            digest,
            rows,
        })
    }

    pub fn compute_digest(rows: &[RoundResultRecord]) -> StorageResult<ContentDigest> {
        let bytes = serde_json::to_vec(rows)?;
        Ok(ContentDigest::from_bytes(&bytes))
    }

    pub fn verify_digest(&self) -> StorageResult<()> {
        let actual = Self::compute_digest(&self.rows)?;
        if actual != self.digest {
            return Err(StorageError::Integrity {
                kind: "result_snapshot",
                id: format!("{}@{}", self.round, self.version),
                reason: format!("digest {} != {}", self.digest.short(), actual.short()),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Team and judge records.
///
/// Guarantees:
/// - Team ids are unique; judge ids and judge codes are unique.
/// - `update_*` never creates; it fails with `NotFound` when absent.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn insert_team(&self, team: TeamRecord) -> StorageResult<()>;
    async fn update_team(&self, team: TeamRecord) -> StorageResult<()>;
    async fn get_team(&self, id: &TeamId) -> StorageResult<Option<TeamRecord>>;
    async fn list_teams(&self) -> StorageResult<Vec<TeamRecord>>;
    async fn delete_team(&self, id: &TeamId) -> StorageResult<()>;
    /// Delete every team, returning how many were removed.
    async fn delete_all_teams(&self) -> StorageResult<u64>;

    async fn insert_judge(&self, judge: JudgeRecord) -> StorageResult<()>;
    async fn update_judge(&self, judge: JudgeRecord) -> StorageResult<()>;
    async fn get_judge(&self, id: &JudgeId) -> StorageResult<Option<JudgeRecord>>;
    async fn list_judges(&self) -> StorageResult<Vec<JudgeRecord>>;
    async fn delete_judge(&self, id: &JudgeId) -> StorageResult<()>;
    async fn delete_all_judges(&self) -> StorageResult<u64>;
}

/// Allocation relations for both rounds.
///
/// Semantics:
/// - `replace_domain_judges` swaps the full assignment set of one domain and
///   clears that domain's revocations.
/// - `replace_pair_allocations` swaps the full Round 2 pairing set.
#[async_trait]
pub trait AllocationStore: Send + Sync {
    async fn replace_domain_judges(
        &self,
        domain_key: &DomainKey,
        assignments: Vec<DomainAssignment>,
    ) -> StorageResult<()>;

    async fn list_domain_assignments(
        &self,
        domain_key: Option<&DomainKey>,
    ) -> StorageResult<Vec<DomainAssignment>>;

    /// Record a revoked Round 1 relation. Revoking twice is a no-op.
    async fn revoke_relation(&self, revocation: Revocation) -> StorageResult<()>;

    async fn list_revocations(&self, domain_key: Option<&DomainKey>)
        -> StorageResult<Vec<Revocation>>;

    async fn replace_pair_allocations(&self, pairs: Vec<PairAllocationRecord>)
        -> StorageResult<()>;

    async fn list_pair_allocations(
        &self,
        judge_id: Option<&JudgeId>,
    ) -> StorageResult<Vec<PairAllocationRecord>>;

    /// Delete one pairing. Returns `NotFound` if absent.
    async fn delete_pair_allocation(&self, judge_id: &JudgeId, team_id: &TeamId)
        -> StorageResult<()>;
}

/// Score ledger persistence.
///
/// Guarantees:
/// - At most one record per [`ScoreKey`]; `upsert_score` replaces in place.
/// - Records whose cached total disagrees with the rubric are rejected.
#[async_trait]
pub trait ScoreStore: Send + Sync {
    /// Insert or replace, returning the record that was replaced (if any).
    async fn upsert_score(&self, score: ScoreRecord) -> StorageResult<Option<ScoreRecord>>;

    /// Upsert every record or none. Returns the replaced records in input
    /// order.
    async fn upsert_scores(
        &self,
        scores: Vec<ScoreRecord>,
    ) -> StorageResult<Vec<Option<ScoreRecord>>>;

    async fn list_scores(&self, filter: &ScoreFilter) -> StorageResult<Vec<ScoreRecord>>;
}

/// Round result snapshots.
///
/// `replace_snapshot` is atomic: readers observe either the previous snapshot
/// or the new one, never a mix. It fails with `VersionConflict` when the
/// stored version is not `expected_version`.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn replace_snapshot(
        &self,
        snapshot: ResultSnapshot,
        expected_version: Option<u64>,
    ) -> StorageResult<()>;

    async fn current_snapshot(&self, round: Round) -> StorageResult<Option<ResultSnapshot>>;
}

/// Everything the judging core needs from persistence.
pub trait JudgingStore: DirectoryStore + AllocationStore + ScoreStore + ResultStore {}

impl<T> JudgingStore for T where T: DirectoryStore + AllocationStore + ScoreStore + ResultStore {}
