//! Allocation engine.
//!
//! Round 1 allocation is domain-wide: assigning a judge to a domain allocates
//! them to every team currently in that domain, minus relations revoked by
//! hand. Round 2 allocation is a direct judge ↔ team pairing over the
//! cross-domain finalist pool. The two shapes stay distinct variants of
//! [`Allocation`] so each round's expansion and checks can be exercised on
//! their own.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use judging_state::{
    DomainAssignment, DomainKey, JudgeId, JudgeRecord, JudgeType, JudgingStore,
    PairAllocationRecord, ResultSnapshot, Revocation, Round, TeamId, TeamRecord,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::JudgingConfig;
use crate::directory::{Directory, DirectoryView};
use crate::domain::{JudgingError, Result};
use crate::metrics::METRICS;
use crate::obs;
use crate::registry::DomainRegistry;
use crate::round_gate::RoundGate;

/// One expanded Round 1 relation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoundOneRelation {
    pub domain_key: DomainKey,
    pub judge_id: JudgeId,
    pub team_id: TeamId,
}

/// One Round 2 pairing.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoundTwoPairing {
    pub judge_id: JudgeId,
    pub team_id: TeamId,
}

/// A relation authorizing a judge to score a team in one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "round", rename_all = "snake_case")]
pub enum Allocation {
    RoundOne(RoundOneRelation),
    RoundTwo(RoundTwoPairing),
}

impl Allocation {
    pub fn round(&self) -> Round {
        match self {
            Allocation::RoundOne(_) => Round::One,
            Allocation::RoundTwo(_) => Round::Two,
        }
    }

    pub fn judge_id(&self) -> &JudgeId {
        match self {
            Allocation::RoundOne(r) => &r.judge_id,
            Allocation::RoundTwo(p) => &p.judge_id,
        }
    }

    pub fn team_id(&self) -> &TeamId {
        match self {
            Allocation::RoundOne(r) => &r.team_id,
            Allocation::RoundTwo(p) => &p.team_id,
        }
    }

    pub fn id(&self) -> AllocationId {
        match self {
            Allocation::RoundOne(r) => AllocationId::RoundOne {
                domain_key: r.domain_key.clone(),
                judge_id: r.judge_id.clone(),
                team_id: r.team_id.clone(),
            },
            Allocation::RoundTwo(p) => AllocationId::RoundTwo {
                judge_id: p.judge_id.clone(),
                team_id: p.team_id.clone(),
            },
        }
    }
}

/// Structured allocation id.
///
/// Textual forms: `r1/<domain>/<judge>/<team>` and `r2/<judge>/<team>`.
/// Because the id is derived from the relation itself, assigning the same
/// relation twice can never produce two ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AllocationId {
    RoundOne {
        domain_key: DomainKey,
        judge_id: JudgeId,
        team_id: TeamId,
    },
    RoundTwo {
        judge_id: JudgeId,
        team_id: TeamId,
    },
}

impl fmt::Display for AllocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocationId::RoundOne {
                domain_key,
                judge_id,
                team_id,
            } => write!(f, "r1/{domain_key}/{judge_id}/{team_id}"),
            AllocationId::RoundTwo { judge_id, team_id } => write!(f, "r2/{judge_id}/{team_id}"),
        }
    }
}

impl FromStr for AllocationId {
    type Err = JudgingError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('/').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(JudgingError::validation(
                "allocation id",
                format!("{s:?} has an empty segment"),
            ));
        }
        match parts.as_slice() {
            ["r1", domain, judge, team] => Ok(AllocationId::RoundOne {
                domain_key: DomainKey::from(*domain),
                judge_id: JudgeId::from(*judge),
                team_id: TeamId::from(*team),
            }),
            ["r2", judge, team] => Ok(AllocationId::RoundTwo {
                judge_id: JudgeId::from(*judge),
                team_id: TeamId::from(*team),
            }),
            _ => Err(JudgingError::validation(
                "allocation id",
                format!("{s:?} is neither r1/<domain>/<judge>/<team> nor r2/<judge>/<team>"),
            )),
        }
    }
}

/// Outcome of [`AllocationEngine::setup_round_two`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundTwoSetup {
    pub finalists: Vec<TeamId>,
    pub judges: Vec<JudgeId>,
    pub allocations: usize,
    pub promotion_cutoff: u32,
    /// Version of the Round 1 snapshot the pool was drawn from.
    pub round_one_version: u64,
}

/// Expand domain-level assignments into per-team relations.
///
/// Each assignment yields one relation per team currently in its domain,
/// except those listed in `revocations`. Output is sorted and free of
/// duplicates.
pub fn expand_domain_assignments<'a>(
    assignments: &[DomainAssignment],
    teams: impl IntoIterator<Item = &'a TeamRecord>,
    revocations: &[Revocation],
) -> Vec<RoundOneRelation> {
    let teams: Vec<&TeamRecord> = teams.into_iter().collect();
    let revoked: HashSet<(&DomainKey, &JudgeId, &TeamId)> = revocations
        .iter()
        .map(|r| (&r.domain_key, &r.judge_id, &r.team_id))
        .collect();

    let mut out = BTreeSet::new();
    for a in assignments {
        for team in teams.iter().filter(|t| t.domain_key == a.domain_key) {
            if revoked.contains(&(&a.domain_key, &a.judge_id, &team.id)) {
                continue;
            }
            out.insert(RoundOneRelation {
                domain_key: a.domain_key.clone(),
                judge_id: a.judge_id.clone(),
                team_id: team.id.clone(),
            });
        }
    }
    out.into_iter().collect()
}

/// Teams promoted from a Round 1 snapshot: rank within `cutoff` and at
/// least one Round 1 score. Sorted by team id.
pub fn select_finalists(round_one: &ResultSnapshot, cutoff: u32) -> Vec<TeamId> {
    let pool: BTreeSet<TeamId> = round_one
        .rows
        .iter()
        .filter(|r| r.rank <= cutoff && r.judges_scored > 0)
        .map(|r| r.team_id.clone())
        .collect();
    pool.into_iter().collect()
}

pub struct AllocationEngine<S> {
    store: Arc<S>,
    registry: Arc<DomainRegistry>,
    directory: Arc<Directory<S>>,
    config: Arc<JudgingConfig>,
    gate: Arc<RoundGate>,
}

impl<S> AllocationEngine<S>
where
    S: JudgingStore,
{
    pub fn new(
        store: Arc<S>,
        registry: Arc<DomainRegistry>,
        directory: Arc<Directory<S>>,
        config: Arc<JudgingConfig>,
        gate: Arc<RoundGate>,
    ) -> Self {
        Self {
            store,
            registry,
            directory,
            config,
            gate,
        }
    }

    /// Resolve judge ids against the directory, deduplicating while keeping
    /// first-seen order. Unknown ids and wrong types are validation errors.
    fn resolve_judges<'v>(
        &self,
        view: &'v DirectoryView,
        judge_ids: &[JudgeId],
        required: JudgeType,
    ) -> Result<Vec<&'v JudgeRecord>> {
        let mut seen = HashSet::new();
        let mut judges = Vec::new();
        for id in judge_ids {
            if !seen.insert(id) {
                continue;
            }
            let judge = view.judge(id).ok_or_else(|| {
                JudgingError::validation("allocation", format!("unknown judge {id}"))
            })?;
            if self.config.enforce_judge_type && judge.judge_type != required {
                return Err(JudgingError::validation(
                    "allocation",
                    format!(
                        "judge {} ({}) is {}, {} requires {} judges",
                        judge.code,
                        judge.id,
                        judge.judge_type,
                        required.round(),
                        required
                    ),
                ));
            }
            judges.push(judge);
        }
        Ok(judges)
    }

    /// Replace the full Round 1 judge set of one domain.
    ///
    /// Idempotent: the same set twice yields the same relations. Relations
    /// revoked by hand in this domain are reinstated.
    pub async fn assign_domain_judges(
        &self,
        domain_key: &DomainKey,
        judge_ids: &[JudgeId],
    ) -> Result<Vec<RoundOneRelation>> {
        if !self.registry.contains(domain_key) {
            return Err(JudgingError::validation(
                "allocation",
                format!("unknown domain {domain_key}"),
            ));
        }
        let view = self.directory.refresh().await?;
        let judges = self.resolve_judges(&view, judge_ids, JudgeType::Internal)?;

        let now = Utc::now();
        let assignments: Vec<DomainAssignment> = judges
            .iter()
            .map(|j| DomainAssignment {
                domain_key: domain_key.clone(),
                judge_id: j.id.clone(),
                created_at: now,
            })
            .collect();

        self.store
            .replace_domain_judges(domain_key, assignments.clone())
            .await?;
        METRICS.inc_allocation_writes();

        let teams_in_domain = view.teams_in(domain_key).count();
        obs::emit_allocations_replaced(domain_key, assignments.len(), teams_in_domain);
        Ok(expand_domain_assignments(
            &assignments,
            view.teams_in(domain_key),
            &[],
        ))
    }

    /// Judges assigned to a domain for Round 1, ordered by id.
    pub async fn list_domain_judges(&self, domain_key: &DomainKey) -> Result<Vec<JudgeRecord>> {
        self.registry.require(domain_key)?;
        let view = self.directory.view().await?;
        let mut judges: Vec<JudgeRecord> = self
            .store
            .list_domain_assignments(Some(domain_key))
            .await?
            .into_iter()
            .filter_map(|a| view.judge(&a.judge_id).cloned())
            .collect();
        judges.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(judges)
    }

    /// Round 1 relations, expanded from domain membership, optionally for
    /// one judge.
    pub async fn list_allocations(
        &self,
        judge_id: Option<&JudgeId>,
    ) -> Result<Vec<RoundOneRelation>> {
        let view = self.directory.view().await?;
        let mut assignments = self.store.list_domain_assignments(None).await?;
        if let Some(j) = judge_id {
            assignments.retain(|a| a.judge_id == *j);
        }
        let revocations = self.store.list_revocations(None).await?;
        Ok(expand_domain_assignments(&assignments, view.teams(), &revocations))
    }

    /// Round 2 pairings, optionally for one judge.
    pub async fn list_round_two_allocations(
        &self,
        judge_id: Option<&JudgeId>,
    ) -> Result<Vec<RoundTwoPairing>> {
        let mut pairs: Vec<RoundTwoPairing> = self
            .store
            .list_pair_allocations(judge_id)
            .await?
            .into_iter()
            .map(|p| RoundTwoPairing {
                judge_id: p.judge_id,
                team_id: p.team_id,
            })
            .collect();
        pairs.sort();
        Ok(pairs)
    }

    /// Both rounds for one judge. A failed Round 2 lookup degrades to an
    /// empty set, since Round 2 may not exist yet.
    pub async fn allocations_for_judge(&self, judge_id: &JudgeId) -> Result<Vec<Allocation>> {
        let mut out: Vec<Allocation> = self
            .list_allocations(Some(judge_id))
            .await?
            .into_iter()
            .map(Allocation::RoundOne)
            .collect();

        match self.list_round_two_allocations(Some(judge_id)).await {
            Ok(pairs) => out.extend(pairs.into_iter().map(Allocation::RoundTwo)),
            Err(e) => warn!(judge_id = %judge_id, error = %e, "round two allocations unavailable"),
        }
        Ok(out)
    }

    /// Whether `judge_id` may score `team` in `round`.
    pub async fn is_allocated(
        &self,
        judge_id: &JudgeId,
        team: &TeamRecord,
        round: Round,
    ) -> Result<bool> {
        match round {
            Round::One => {
                let assigned = self
                    .store
                    .list_domain_assignments(Some(&team.domain_key))
                    .await?
                    .iter()
                    .any(|a| a.judge_id == *judge_id);
                if !assigned {
                    return Ok(false);
                }
                let revoked = self
                    .store
                    .list_revocations(Some(&team.domain_key))
                    .await?
                    .iter()
                    .any(|r| r.judge_id == *judge_id && r.team_id == team.id);
                Ok(!revoked)
            }
            Round::Two => Ok(self
                .store
                .list_pair_allocations(Some(judge_id))
                .await?
                .iter()
                .any(|p| p.team_id == team.id)),
        }
    }

    /// Pair every Round 1 finalist with every judge in `judge_ids`,
    /// replacing any existing Round 2 pairings.
    ///
    /// Fails with `Precondition` until Round 1 has been calculated.
    pub async fn setup_round_two(&self, judge_ids: &[JudgeId]) -> Result<RoundTwoSetup> {
        let _guard = self.gate.calculation(Round::Two).await;

        let round_one = self
            .store
            .current_snapshot(Round::One)
            .await?
            .ok_or_else(|| {
                JudgingError::precondition("round two setup", "calculated round one results")
            })?;

        if judge_ids.is_empty() {
            return Err(JudgingError::validation(
                "round two setup",
                "at least one judge is required",
            ));
        }
        let view = self.directory.refresh().await?;
        let judges: Vec<JudgeId> = self
            .resolve_judges(&view, judge_ids, JudgeType::External)?
            .into_iter()
            .map(|j| j.id.clone())
            .collect();

        let cutoff = self.config.round_two.promotion_cutoff;
        let (finalists, missing): (Vec<TeamId>, Vec<TeamId>) = select_finalists(&round_one, cutoff)
            .into_iter()
            .partition(|t| view.team(t).is_some());
        if !missing.is_empty() {
            warn!(missing = ?missing, "finalists no longer registered, skipped");
        }

        let now = Utc::now();
        let pairs: Vec<PairAllocationRecord> = finalists
            .iter()
            .flat_map(|team_id| {
                judges.iter().map(move |judge_id| PairAllocationRecord {
                    judge_id: judge_id.clone(),
                    team_id: team_id.clone(),
                    created_at: now,
                })
            })
            .collect();
        let allocations = pairs.len();

        self.store.replace_pair_allocations(pairs).await?;
        METRICS.inc_allocation_writes();
        obs::emit_round_two_setup(finalists.len(), judges.len(), allocations);

        Ok(RoundTwoSetup {
            finalists,
            judges,
            allocations,
            promotion_cutoff: cutoff,
            round_one_version: round_one.version,
        })
    }

    /// Delete a single relation. Scores already submitted under it stay.
    pub async fn remove_allocation(&self, id: &AllocationId) -> Result<()> {
        match id {
            AllocationId::RoundOne {
                domain_key,
                judge_id,
                team_id,
            } => {
                let view = self.directory.view().await?;
                let team = view
                    .team(team_id)
                    .filter(|t| t.domain_key == *domain_key);
                let allocated = match team {
                    Some(team) => self.is_allocated(judge_id, team, Round::One).await?,
                    None => false,
                };
                if !allocated {
                    return Err(JudgingError::not_found("allocation", id));
                }
                self.store
                    .revoke_relation(Revocation {
                        domain_key: domain_key.clone(),
                        judge_id: judge_id.clone(),
                        team_id: team_id.clone(),
                        revoked_at: Utc::now(),
                    })
                    .await?;
            }
            AllocationId::RoundTwo { judge_id, team_id } => {
                self.store
                    .delete_pair_allocation(judge_id, team_id)
                    .await
                    .map_err(|e| match e {
                        judging_state::StorageError::NotFound { .. } => {
                            JudgingError::not_found("allocation", id)
                        }
                        other => other.into(),
                    })?;
            }
        }
        METRICS.inc_allocation_writes();
        obs::emit_allocation_removed(&id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use judging_state::{RoundResultRecord, RubricScores};

    fn team(id: &str, domain: &str) -> TeamRecord {
        TeamRecord {
            id: TeamId::from(id),
            name: id.to_string(),
            domain_key: DomainKey::from(domain),
            problem_statement: "p".to_string(),
            idea_description: None,
            created_at: Utc::now(),
        }
    }

    fn assignment(domain: &str, judge: &str) -> DomainAssignment {
        DomainAssignment {
            domain_key: DomainKey::from(domain),
            judge_id: JudgeId::from(judge),
            created_at: Utc::now(),
        }
    }

    fn relation(domain: &str, judge: &str, team: &str) -> RoundOneRelation {
        RoundOneRelation {
            domain_key: DomainKey::from(domain),
            judge_id: JudgeId::from(judge),
            team_id: TeamId::from(team),
        }
    }

    #[test]
    fn test_expansion_is_domain_wide() {
        let teams = vec![team("t1", "d"), team("t2", "d"), team("t3", "other")];
        let relations = expand_domain_assignments(
            &[assignment("d", "j1"), assignment("d", "j2")],
            &teams,
            &[],
        );
        assert_eq!(
            relations,
            vec![
                relation("d", "j1", "t1"),
                relation("d", "j1", "t2"),
                relation("d", "j2", "t1"),
                relation("d", "j2", "t2"),
            ]
        );
    }

    #[test]
    fn test_expansion_skips_revoked_and_duplicates() {
        let teams = vec![team("t1", "d"), team("t2", "d")];
        let revoked = Revocation {
            domain_key: DomainKey::from("d"),
            judge_id: JudgeId::from("j1"),
            team_id: TeamId::from("t2"),
            revoked_at: Utc::now(),
        };
        let relations = expand_domain_assignments(
            &[assignment("d", "j1"), assignment("d", "j1")],
            &teams,
            &[revoked],
        );
        assert_eq!(relations, vec![relation("d", "j1", "t1")]);
    }

    #[test]
    fn test_allocation_id_text_forms() {
        let r1 = Allocation::RoundOne(relation("health_biotech", "j1", "t1")).id();
        assert_eq!(r1.to_string(), "r1/health_biotech/j1/t1");
        assert_eq!("r1/health_biotech/j1/t1".parse::<AllocationId>().unwrap(), r1);

        let r2 = Allocation::RoundTwo(RoundTwoPairing {
            judge_id: JudgeId::from("x"),
            team_id: TeamId::from("t9"),
        })
        .id();
        assert_eq!(r2.to_string(), "r2/x/t9");
        assert_eq!("r2/x/t9".parse::<AllocationId>().unwrap(), r2);

        assert!("r3/x/t9".parse::<AllocationId>().is_err());
        assert!("r2//t9".parse::<AllocationId>().is_err());
        assert!("r1/d/j".parse::<AllocationId>().is_err());
    }

    #[test]
    fn test_select_finalists_respects_cutoff_and_requires_scores() {
        let row = |team: &str, rank: u32, judges: u32| RoundResultRecord {
            domain_key: DomainKey::from("d"),
            team_id: TeamId::from(team),
            team_name: team.to_string(),
            total_score: 0.0,
            breakdown: RubricScores::default(),
            judges_scored: judges,
            rank,
        };
        let snapshot = ResultSnapshot::new(
            Round::One,
            1,
            Utc::now(),
            vec![row("a", 1, 2), row("b", 2, 2), row("c", 2, 1), row("d", 3, 0)],
        )
        .unwrap();
        assert_eq!(
            select_finalists(&snapshot, 2),
            vec![TeamId::from("a"), TeamId::from("b"), TeamId::from("c")]
        );
        assert_eq!(select_finalists(&snapshot, 3).len(), 3);
        assert_eq!(select_finalists(&snapshot, 1), vec![TeamId::from("a")]);
    }
}
