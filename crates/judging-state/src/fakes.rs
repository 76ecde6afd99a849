//! In-memory fake for the storage traits (testing only)
//!
//! `MemoryJudgingStore` satisfies every trait contract without external
//! dependencies. Individual tables can be marked unavailable to exercise
//! collaborator-failure paths.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::StorageError;
use crate::storage_traits::*;

#[derive(Debug, Default)]
struct Tables {
    teams: BTreeMap<TeamId, TeamRecord>,
    judges: BTreeMap<JudgeId, JudgeRecord>,
    assignments: Vec<DomainAssignment>,
    revocations: Vec<Revocation>,
    pairs: Vec<PairAllocationRecord>,
    scores: BTreeMap<ScoreKey, ScoreRecord>,
    snapshots: HashMap<Round, ResultSnapshot>,
}

/// In-memory judging store backed by ordered maps behind one mutex.
#[derive(Debug, Default)]
pub struct MemoryJudgingStore {
    tables: Mutex<Tables>,
    unavailable: Mutex<HashSet<&'static str>>,
}

impl MemoryJudgingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation on `table` fail with a backend error.
    ///
    /// Table names: `team`, `judge`, `domain_assignment`, `revocation`,
    /// `pair_allocation`, `score`, `result_snapshot`.
    pub fn set_unavailable(&self, table: &'static str, unavailable: bool) {
        let mut set = match self.unavailable.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if unavailable {
            set.insert(table);
        } else {
            set.remove(table);
        }
    }

    fn tables(&self, table: &'static str) -> StorageResult<MutexGuard<'_, Tables>> {
        let down = self
            .unavailable
            .lock()
            .map_err(|_| StorageError::Backend("availability lock poisoned".to_string()))?
            .contains(table);
        if down {
            return Err(StorageError::Backend(format!("{table} table unavailable")));
        }
        self.tables
            .lock()
            .map_err(|_| StorageError::Backend("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl DirectoryStore for MemoryJudgingStore {
    async fn insert_team(&self, team: TeamRecord) -> StorageResult<()> {
        let mut t = self.tables("team")?;
        if t.teams.contains_key(&team.id) {
            return Err(StorageError::Duplicate {
                kind: "team",
                id: team.id.0,
            });
        }
        t.teams.insert(team.id.clone(), team);
        Ok(())
    }

    async fn update_team(&self, team: TeamRecord) -> StorageResult<()> {
        let mut t = self.tables("team")?;
        match t.teams.get_mut(&team.id) {
            Some(existing) => {
                *existing = team;
                Ok(())
            }
            None => Err(StorageError::NotFound {
                kind: "team",
                id: team.id.0,
            }),
        }
    }

    async fn get_team(&self, id: &TeamId) -> StorageResult<Option<TeamRecord>> {
        Ok(self.tables("team")?.teams.get(id).cloned())
    }

    async fn list_teams(&self) -> StorageResult<Vec<TeamRecord>> {
        Ok(self.tables("team")?.teams.values().cloned().collect())
    }

    async fn delete_team(&self, id: &TeamId) -> StorageResult<()> {
        self.tables("team")?
            .teams
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound {
                kind: "team",
                id: id.0.clone(),
            })
    }

    async fn delete_all_teams(&self) -> StorageResult<u64> {
        let mut t = self.tables("team")?;
        let n = t.teams.len() as u64;
        t.teams.clear();
        Ok(n)
    }

    async fn insert_judge(&self, judge: JudgeRecord) -> StorageResult<()> {
        let mut t = self.tables("judge")?;
        if t.judges.contains_key(&judge.id) {
            return Err(StorageError::Duplicate {
                kind: "judge",
                id: judge.id.0,
            });
        }
        if t.judges.values().any(|j| j.code == judge.code) {
            return Err(StorageError::Duplicate {
                kind: "judge_code",
                id: judge.code,
            });
        }
        t.judges.insert(judge.id.clone(), judge);
        Ok(())
    }

    async fn update_judge(&self, judge: JudgeRecord) -> StorageResult<()> {
        let mut t = self.tables("judge")?;
        if t
            .judges
            .values()
            .any(|j| j.code == judge.code && j.id != judge.id)
        {
            return Err(StorageError::Duplicate {
                kind: "judge_code",
                id: judge.code,
            });
        }
        match t.judges.get_mut(&judge.id) {
            Some(existing) => {
                *existing = judge;
                Ok(())
            }
            None => Err(StorageError::NotFound {
                kind: "judge",
                id: judge.id.0,
            }),
        }
    }

    async fn get_judge(&self, id: &JudgeId) -> StorageResult<Option<JudgeRecord>> {
        Ok(self.tables("judge")?.judges.get(id).cloned())
    }

    async fn list_judges(&self) -> StorageResult<Vec<JudgeRecord>> {
        Ok(self.tables("judge")?.judges.values().cloned().collect())
    }

    async fn delete_judge(&self, id: &JudgeId) -> StorageResult<()> {
        self.tables("judge")?
            .judges
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound {
                kind: "judge",
                id: id.0.clone(),
            })
    }

    async fn delete_all_judges(&self) -> StorageResult<u64> {
        let mut t = self.tables("judge")?;
        let n = t.judges.len() as u64;
        t.judges.clear();
        Ok(n)
    }
}

#[async_trait]
impl AllocationStore for MemoryJudgingStore {
    async fn replace_domain_judges(
        &self,
        domain_key: &DomainKey,
        assignments: Vec<DomainAssignment>,
    ) -> StorageResult<()> {
        let mut t = self.tables("domain_assignment")?;
        t.assignments.retain(|a| a.domain_key != *domain_key);
        t.assignments.extend(assignments);
        t.revocations.retain(|r| r.domain_key != *domain_key);
        Ok(())
    }

    async fn list_domain_assignments(
        &self,
        domain_key: Option<&DomainKey>,
    ) -> StorageResult<Vec<DomainAssignment>> {
        let t = self.tables("domain_assignment")?;
        Ok(t.assignments
            .iter()
            .filter(|a| domain_key.map_or(true, |d| a.domain_key == *d))
            .cloned()
            .collect())
    }

    async fn revoke_relation(&self, revocation: Revocation) -> StorageResult<()> {
        let mut t = self.tables("revocation")?;
        let exists = t.revocations.iter().any(|r| {
            r.domain_key == revocation.domain_key
                && r.judge_id == revocation.judge_id
                && r.team_id == revocation.team_id
        });
        if !exists {
            t.revocations.push(revocation);
        }
        Ok(())
    }

    async fn list_revocations(
        &self,
        domain_key: Option<&DomainKey>,
    ) -> StorageResult<Vec<Revocation>> {
        let t = self.tables("revocation")?;
        Ok(t.revocations
            .iter()
            .filter(|r| domain_key.map_or(true, |d| r.domain_key == *d))
            .cloned()
            .collect())
    }

    async fn replace_pair_allocations(
        &self,
        pairs: Vec<PairAllocationRecord>,
    ) -> StorageResult<()> {
        self.tables("pair_allocation")?.pairs = pairs;
        Ok(())
    }

    async fn list_pair_allocations(
        &self,
        judge_id: Option<&JudgeId>,
    ) -> StorageResult<Vec<PairAllocationRecord>> {
        let t = self.tables("pair_allocation")?;
        Ok(t.pairs
            .iter()
            .filter(|p| judge_id.map_or(true, |j| p.judge_id == *j))
            .cloned()
            .collect())
    }

    async fn delete_pair_allocation(
        &self,
        judge_id: &JudgeId,
        team_id: &TeamId,
    ) -> StorageResult<()> {
        let mut t = self.tables("pair_allocation")?;
        let before = t.pairs.len();
        t.pairs
            .retain(|p| !(p.judge_id == *judge_id && p.team_id == *team_id));
        if t.pairs.len() == before {
            return Err(StorageError::NotFound {
                kind: "pair_allocation",
                id: format!("{judge_id}/{team_id}"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ScoreStore for MemoryJudgingStore {
    async fn upsert_score(&self, score: ScoreRecord) -> StorageResult<Option<ScoreRecord>> {
        score.verify_total()?;
        let mut t = self.tables("score")?;
        Ok(t.scores.insert(score.key(), score))
    }

    async fn upsert_scores(
        &self,
        scores: Vec<ScoreRecord>,
    ) -> StorageResult<Vec<Option<ScoreRecord>>> {
        for score in &scores {
            score.verify_total()?;
        }
        let mut t = self.tables("score")?;
        Ok(scores
            .into_iter()
            .map(|score| t.scores.insert(score.key(), score))
            .collect())
    }

    async fn list_scores(&self, filter: &ScoreFilter) -> StorageResult<Vec<ScoreRecord>> {
        let t = self.tables("score")?;
        Ok(t.scores
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ResultStore for MemoryJudgingStore {
    async fn replace_snapshot(
        &self,
        snapshot: ResultSnapshot,
        expected_version: Option<u64>,
    ) -> StorageResult<()> {
        snapshot.verify_digest()?;
        let mut t = self.tables("result_snapshot")?;
        let actual = t.snapshots.get(&snapshot.round).map(|s| s.version);
        if actual != expected_version {
            return Err(StorageError::VersionConflict {
                round: snapshot.round.to_string(),
                expected: expected_version,
                actual,
            });
        }
        t.snapshots.insert(snapshot.round, snapshot);
        Ok(())
    }

    async fn current_snapshot(&self, round: Round) -> StorageResult<Option<ResultSnapshot>> {
        Ok(self.tables("result_snapshot")?.snapshots.get(&round).cloned())
    }
}
