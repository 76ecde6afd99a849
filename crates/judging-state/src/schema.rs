//! SurrealDB row schemas
//!
//! Each row mirrors a record from `storage_traits` with primitive field types
//! suitable for SurrealDB, and converts back at the boundary.

/// Module for serializing chrono DateTime to SurrealDB datetime format
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::storage_traits::{
    ContentDigest, DomainAssignment, DomainKey, JudgeId, JudgeRecord, JudgeType,
    PairAllocationRecord, ResultSnapshot, Revocation, Round, RoundResultRecord, RubricScores,
    ScoreRecord, StorageResult, TeamId, TeamRecord,
};

fn parse_round(raw: &str) -> StorageResult<Round> {
    raw.parse::<Round>().map_err(StorageError::Backend)
}

/// Row in `teams`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamRow {
    /// SurrealDB record ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub team_id: String,
    pub name: String,
    pub domain_key: String,
    pub problem_statement: String,
    pub idea_description: Option<String>,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

impl From<TeamRecord> for TeamRow {
    fn from(t: TeamRecord) -> Self {
        TeamRow {
            id: None,
            team_id: t.id.0,
            name: t.name,
            domain_key: t.domain_key.0,
            problem_statement: t.problem_statement,
            idea_description: t.idea_description,
            created_at: t.created_at,
        }
    }
}

impl From<TeamRow> for TeamRecord {
    fn from(row: TeamRow) -> Self {
        TeamRecord {
            id: TeamId(row.team_id),
            name: row.name,
            domain_key: DomainKey(row.domain_key),
            problem_statement: row.problem_statement,
            idea_description: row.idea_description,
            created_at: row.created_at,
        }
    }
}

/// Row in `judges`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub judge_id: String,
    pub name: String,
    pub code: String,
    /// "Internal" | "External"
    pub judge_type: String,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

impl From<JudgeRecord> for JudgeRow {
    fn from(j: JudgeRecord) -> Self {
        JudgeRow {
            id: None,
            judge_id: j.id.0,
            name: j.name,
            code: j.code,
            judge_type: j.judge_type.to_string(),
            created_at: j.created_at,
        }
    }
}

impl TryFrom<JudgeRow> for JudgeRecord {
    type Error = StorageError;

    fn try_from(row: JudgeRow) -> StorageResult<Self> {
        let judge_type = row
            .judge_type
            .parse::<JudgeType>()
            .map_err(|reason| StorageError::Integrity {
                kind: "judge",
                id: row.judge_id.clone(),
                reason,
            })?;
        Ok(JudgeRecord {
            id: JudgeId(row.judge_id),
            name: row.name,
            code: row.code,
            judge_type,
            created_at: row.created_at,
        })
    }
}

/// Row in `domain_judges`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub domain_key: String,
    pub judge_id: String,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

impl From<DomainAssignment> for AssignmentRow {
    fn from(a: DomainAssignment) -> Self {
        AssignmentRow {
            id: None,
            domain_key: a.domain_key.0,
            judge_id: a.judge_id.0,
            created_at: a.created_at,
        }
    }
}

impl From<AssignmentRow> for DomainAssignment {
    fn from(row: AssignmentRow) -> Self {
        DomainAssignment {
            domain_key: DomainKey(row.domain_key),
            judge_id: JudgeId(row.judge_id),
            created_at: row.created_at,
        }
    }
}

/// Row in `revocations`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevocationRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub domain_key: String,
    pub judge_id: String,
    pub team_id: String,
    #[serde(with = "surreal_datetime")]
    pub revoked_at: DateTime<Utc>,
}

impl From<Revocation> for RevocationRow {
    fn from(r: Revocation) -> Self {
        RevocationRow {
            id: None,
            domain_key: r.domain_key.0,
            judge_id: r.judge_id.0,
            team_id: r.team_id.0,
            revoked_at: r.revoked_at,
        }
    }
}

impl From<RevocationRow> for Revocation {
    fn from(row: RevocationRow) -> Self {
        Revocation {
            domain_key: DomainKey(row.domain_key),
            judge_id: JudgeId(row.judge_id),
            team_id: TeamId(row.team_id),
            revoked_at: row.revoked_at,
        }
    }
}

/// Row in `round_two_allocations`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub judge_id: String,
    pub team_id: String,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

impl From<PairAllocationRecord> for PairRow {
    fn from(p: PairAllocationRecord) -> Self {
        PairRow {
            id: None,
            judge_id: p.judge_id.0,
            team_id: p.team_id.0,
            created_at: p.created_at,
        }
    }
}

impl From<PairRow> for PairAllocationRecord {
    fn from(row: PairRow) -> Self {
        PairAllocationRecord {
            judge_id: JudgeId(row.judge_id),
            team_id: TeamId(row.team_id),
            created_at: row.created_at,
        }
    }
}

/// Row in `scores`, keyed by `score_key` (judge/team/round).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub score_key: String,
    pub judge_id: String,
    pub team_id: String,
    pub domain_key: String,
    pub round: String,
    pub problem_identification: f64,
    pub innovation_creativity: f64,
    pub feasibility_practicality: f64,
    pub market_impact_potential: f64,
    pub technology_domain_relevance: f64,
    pub pitch_delivery_qa: f64,
    pub bonus: f64,
    pub total: f64,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

impl From<ScoreRecord> for ScoreRow {
    fn from(s: ScoreRecord) -> Self {
        ScoreRow {
            id: None,
            score_key: s.key().to_string(),
            judge_id: s.judge_id.0,
            team_id: s.team_id.0,
            domain_key: s.domain_key.0,
            round: s.round.as_str().to_string(),
            problem_identification: s.rubric.problem_identification,
            innovation_creativity: s.rubric.innovation_creativity,
            feasibility_practicality: s.rubric.feasibility_practicality,
            market_impact_potential: s.rubric.market_impact_potential,
            technology_domain_relevance: s.rubric.technology_domain_relevance,
            pitch_delivery_qa: s.rubric.pitch_delivery_qa,
            bonus: s.rubric.bonus,
            total: s.total,
            created_at: s.created_at,
        }
    }
}

impl TryFrom<ScoreRow> for ScoreRecord {
    type Error = StorageError;

    fn try_from(row: ScoreRow) -> StorageResult<Self> {
        let record = ScoreRecord {
            judge_id: JudgeId(row.judge_id),
            team_id: TeamId(row.team_id),
            domain_key: DomainKey(row.domain_key),
            round: parse_round(&row.round)?,
            rubric: RubricScores {
                problem_identification: row.problem_identification,
                innovation_creativity: row.innovation_creativity,
                feasibility_practicality: row.feasibility_practicality,
                market_impact_potential: row.market_impact_potential,
                technology_domain_relevance: row.technology_domain_relevance,
                pitch_delivery_qa: row.pitch_delivery_qa,
                bonus: row.bonus,
            },
            total: row.total,
            created_at: row.created_at,
        };
        record.verify_total()?;
        Ok(record)
    }
}

/// Row in `result_snapshots`; one row per round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub round: String,
    pub version: u64,
    #[serde(with = "surreal_datetime")]
    pub calculated_at: DateTime<Utc>,
    pub digest: String,
    pub rows: Vec<RoundResultRecord>,
}

impl From<ResultSnapshot> for SnapshotRow {
    fn from(s: ResultSnapshot) -> Self {
        SnapshotRow {
            id: None,
            round: s.round.as_str().to_string(),
            version: s.version,
            calculated_at: s.calculated_at,
            digest: s.digest.as_str().to_string(),
            rows: s.rows,
        }
    }
}

impl TryFrom<SnapshotRow> for ResultSnapshot {
    type Error = StorageError;

    fn try_from(row: SnapshotRow) -> StorageResult<Self> {
        let snapshot = ResultSnapshot {
            round: parse_round(&row.round)?,
            version: row.version,
            calculated_at: row.calculated_at,
            digest: ContentDigest::try_from(row.digest)?,
            rows: row.rows,
        };
        snapshot.verify_digest()?;
        Ok(snapshot)
    }
}
