//! Score submission ledger.
//!
//! One current score per (judge, team, round). A resubmission replaces the
//! stored record in place and refreshes its timestamp, which marks any
//! calculated snapshot for that round as stale.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Utc;
use judging_state::{
    DomainKey, JudgeId, JudgingStore, Round, RubricScores, ScoreFilter, ScoreRecord, TeamId,
    TeamRecord,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::allocation::AllocationEngine;
use crate::config::JudgingConfig;
use crate::directory::{Directory, DirectoryView};
use crate::domain::{JudgingError, Result};
use crate::metrics::METRICS;
use crate::obs;
use crate::registry::DomainRegistry;
use crate::round_gate::RoundGate;

/// One entry of a bulk submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSubmission {
    pub team_id: TeamId,
    pub round: Round,
    pub rubric: RubricScores,
}

/// Live per-team view for dashboards. Not a substitute for a calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamScoreSummary {
    pub team_id: TeamId,
    pub team_name: String,
    pub domain_key: DomainKey,
    pub scores_received: usize,
    /// Mean of the totals received so far; `None` before the first score.
    pub running_mean: Option<f64>,
}

/// How far one allocated judge is through their teams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeCoverage {
    pub judge_id: JudgeId,
    pub judge_name: String,
    pub judge_code: String,
    pub allocated: usize,
    pub scored: usize,
    pub missing: Vec<TeamId>,
}

impl JudgeCoverage {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

pub struct ScoreLedger<S> {
    store: Arc<S>,
    registry: Arc<DomainRegistry>,
    directory: Arc<Directory<S>>,
    allocations: Arc<AllocationEngine<S>>,
    config: Arc<JudgingConfig>,
    gate: Arc<RoundGate>,
}

impl<S> ScoreLedger<S>
where
    S: JudgingStore,
{
    pub fn new(
        store: Arc<S>,
        registry: Arc<DomainRegistry>,
        directory: Arc<Directory<S>>,
        allocations: Arc<AllocationEngine<S>>,
        config: Arc<JudgingConfig>,
        gate: Arc<RoundGate>,
    ) -> Self {
        Self {
            store,
            registry,
            directory,
            allocations,
            config,
            gate,
        }
    }

    /// Bounds, judge, team and allocation checks for one submission.
    async fn authorize<'v>(
        &self,
        view: &'v DirectoryView,
        judge_id: &JudgeId,
        team_id: &TeamId,
        round: Round,
        rubric: &RubricScores,
    ) -> Result<&'v TeamRecord> {
        self.config.rubric.check(rubric)?;
        view.judge(judge_id)
            .ok_or_else(|| JudgingError::not_found("judge", judge_id))?;
        let team = view
            .team(team_id)
            .ok_or_else(|| JudgingError::not_found("team", team_id))?;
        if !self.allocations.is_allocated(judge_id, team, round).await? {
            return Err(JudgingError::Authorization {
                judge_id: judge_id.clone(),
                team_id: team_id.clone(),
                round,
            });
        }
        Ok(team)
    }

    fn written(&self, record: &ScoreRecord, replaced: bool) {
        METRICS.inc_scores_submitted(replaced);
        obs::emit_score_submitted(
            &record.judge_id,
            &record.team_id,
            record.round,
            record.total,
            replaced,
        );
    }

    /// Record a judge's score for a team, replacing any earlier score for
    /// the same (judge, team, round).
    ///
    /// Fails with `Validation` for out-of-range fields, `NotFound` for an
    /// unknown judge or team, and `Authorization` when no allocation links
    /// the judge to the team in `round`. Nothing is written on failure.
    pub async fn submit(
        &self,
        judge_id: &JudgeId,
        team_id: &TeamId,
        round: Round,
        rubric: RubricScores,
    ) -> Result<ScoreRecord> {
        let view = self.directory.view().await?;
        let team = self
            .authorize(&view, judge_id, team_id, round, &rubric)
            .await?;
        let domain_key = team.domain_key.clone();

        // Stamped under the guard so the record is never older than a
        // snapshot that does not include it.
        let _shared = self.gate.submission(round).await;
        let record = ScoreRecord::new(
            judge_id.clone(),
            team_id.clone(),
            domain_key,
            round,
            rubric,
            Utc::now(),
        );
        let previous = self.store.upsert_score(record.clone()).await?;
        self.written(&record, previous.is_some());
        Ok(record)
    }

    /// Submit several scores for one judge. Every item is checked before any
    /// is written, and the batch is stored whole or not at all.
    pub async fn submit_bulk(
        &self,
        judge_id: &JudgeId,
        submissions: Vec<ScoreSubmission>,
    ) -> Result<Vec<ScoreRecord>> {
        let view = self.directory.view().await?;
        let mut seen = BTreeSet::new();
        let mut records = Vec::with_capacity(submissions.len());
        for s in submissions {
            if !seen.insert((s.team_id.clone(), s.round)) {
                return Err(JudgingError::validation(
                    "score submission",
                    format!("team {} appears twice for {}", s.team_id, s.round),
                ));
            }
            let team = self
                .authorize(&view, judge_id, &s.team_id, s.round, &s.rubric)
                .await?;
            records.push(ScoreRecord::new(
                judge_id.clone(),
                s.team_id,
                team.domain_key.clone(),
                s.round,
                s.rubric,
                Utc::now(),
            ));
        }
        if records.is_empty() {
            return Ok(records);
        }

        let _shared = self
            .gate
            .submissions(records.iter().map(|r| r.round))
            .await;
        let now = Utc::now();
        for record in &mut records {
            record.created_at = now;
        }
        let previous = self.store.upsert_scores(records.clone()).await?;
        for (record, previous) in records.iter().zip(&previous) {
            self.written(record, previous.is_some());
        }
        debug!(judge_id = %judge_id, count = records.len(), "bulk submission stored");
        Ok(records)
    }

    /// A judge's scores in one round, optionally within one domain.
    pub async fn list_for_judge(
        &self,
        judge_id: &JudgeId,
        round: Round,
        domain_key: Option<&DomainKey>,
    ) -> Result<Vec<ScoreRecord>> {
        Ok(self
            .store
            .list_scores(&ScoreFilter::for_round(round).judge(judge_id).domain(domain_key))
            .await?)
    }

    pub async fn list_for_team(&self, team_id: &TeamId, round: Round) -> Result<Vec<ScoreRecord>> {
        Ok(self
            .store
            .list_scores(&ScoreFilter::for_round(round).team(team_id))
            .await?)
    }

    /// Number of scores per judge in `round`, optionally within one domain.
    pub async fn count_by_judge(
        &self,
        round: Round,
        domain_key: Option<&DomainKey>,
    ) -> Result<BTreeMap<JudgeId, usize>> {
        if let Some(d) = domain_key {
            self.registry.require(d)?;
        }
        let scores = self
            .store
            .list_scores(&ScoreFilter::for_round(round).domain(domain_key))
            .await?;
        let mut counts = BTreeMap::new();
        for s in scores {
            *counts.entry(s.judge_id).or_insert(0) += 1;
        }
        Ok(counts)
    }

    /// Live per-team scores for `round`, optionally within one domain.
    /// Round 1 lists every registered team; Round 2 lists the finalists.
    pub async fn team_scores(
        &self,
        round: Round,
        domain_key: Option<&DomainKey>,
    ) -> Result<Vec<TeamScoreSummary>> {
        if let Some(d) = domain_key {
            self.registry.require(d)?;
        }
        let view = self.directory.view().await?;
        let scores = self
            .store
            .list_scores(&ScoreFilter::for_round(round).domain(domain_key))
            .await?;
        let mut by_team: BTreeMap<&TeamId, Vec<f64>> = BTreeMap::new();
        for s in &scores {
            by_team.entry(&s.team_id).or_default().push(s.total);
        }

        let teams: Vec<&TeamRecord> = match round {
            Round::One => view
                .teams()
                .filter(|t| domain_key.map_or(true, |d| t.domain_key == *d))
                .collect(),
            Round::Two => {
                let finalists: BTreeSet<TeamId> = self
                    .allocations
                    .list_round_two_allocations(None)
                    .await?
                    .into_iter()
                    .map(|p| p.team_id)
                    .collect();
                finalists
                    .iter()
                    .filter_map(|id| view.team(id))
                    .filter(|t| domain_key.map_or(true, |d| t.domain_key == *d))
                    .collect()
            }
        };

        Ok(teams
            .into_iter()
            .map(|team| {
                let totals = by_team.get(&team.id).map(Vec::as_slice).unwrap_or(&[]);
                let running_mean = if totals.is_empty() {
                    None
                } else {
                    Some(totals.iter().sum::<f64>() / totals.len() as f64)
                };
                TeamScoreSummary {
                    team_id: team.id.clone(),
                    team_name: team.name.clone(),
                    domain_key: team.domain_key.clone(),
                    scores_received: totals.len(),
                    running_mean,
                }
            })
            .collect())
    }

    /// Allocated vs. scored teams for every judge with allocations in
    /// `round`, ordered by judge id.
    pub async fn coverage(&self, round: Round) -> Result<Vec<JudgeCoverage>> {
        let view = self.directory.view().await?;
        let mut allocated: BTreeMap<JudgeId, BTreeSet<TeamId>> = BTreeMap::new();
        match round {
            Round::One => {
                for r in self.allocations.list_allocations(None).await? {
                    allocated.entry(r.judge_id).or_default().insert(r.team_id);
                }
            }
            Round::Two => {
                for p in self.allocations.list_round_two_allocations(None).await? {
                    allocated.entry(p.judge_id).or_default().insert(p.team_id);
                }
            }
        }

        let scores = self.store.list_scores(&ScoreFilter::for_round(round)).await?;
        let mut scored: BTreeMap<&JudgeId, BTreeSet<&TeamId>> = BTreeMap::new();
        for s in &scores {
            scored.entry(&s.judge_id).or_default().insert(&s.team_id);
        }

        Ok(allocated
            .into_iter()
            .map(|(judge_id, teams)| {
                let done = scored.get(&judge_id);
                let missing: Vec<TeamId> = teams
                    .iter()
                    .filter(|t| done.map_or(true, |d| !d.contains(t)))
                    .cloned()
                    .collect();
                let (judge_name, judge_code) = view
                    .judge(&judge_id)
                    .map(|j| (j.name.clone(), j.code.clone()))
                    .unwrap_or_default();
                JudgeCoverage {
                    allocated: teams.len(),
                    scored: teams.len() - missing.len(),
                    missing,
                    judge_id,
                    judge_name,
                    judge_code,
                }
            })
            .collect())
    }

    /// Judges from [`coverage`](Self::coverage) still missing scores.
    pub async fn incomplete_judges(&self, round: Round) -> Result<Vec<JudgeCoverage>> {
        Ok(self
            .coverage(round)
            .await?
            .into_iter()
            .filter(|c| !c.is_complete())
            .collect())
    }
}
