//! Results aggregator and the per-round calculation state machine.
//!
//! Each round moves `NotCalculated -> Calculated` on an explicit calculate
//! request and is never recomputed on score writes. A calculation reads the
//! whole ledger under the round's write lock, builds every row, and only then
//! swaps in a new [`ResultSnapshot`] with a compare-and-swap on the version.
//! Any failure leaves the previous snapshot in force.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use judging_state::{
    DomainKey, JudgingStore, ResultSnapshot, Round, RoundResultRecord, ScoreFilter, ScoreRecord,
    TeamId, TeamRecord,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::directory::{Directory, DirectoryView};
use crate::domain::{JudgingError, Result};
use crate::metrics::METRICS;
use crate::obs::{self, CalculationSpan};
use crate::ranking::{rank_dense, TeamAggregate};
use crate::registry::DomainRegistry;
use crate::round_gate::RoundGate;

/// Outcome of a successful calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationSummary {
    pub round: Round,
    pub version: u64,
    pub count: usize,
    pub digest: String,
    pub calculated_at: DateTime<Utc>,
}

/// Read-only introspection of one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundStatus {
    pub round: Round,
    /// True once any calculation has succeeded, regardless of later scores.
    pub calculated: bool,
    pub count: usize,
    pub version: Option<u64>,
    pub calculated_at: Option<DateTime<Utc>>,
    /// A score for this round was written after the snapshot.
    pub stale: bool,
}

pub struct ResultsAggregator<S> {
    store: Arc<S>,
    registry: Arc<DomainRegistry>,
    directory: Arc<Directory<S>>,
    gate: Arc<RoundGate>,
}

impl<S> ResultsAggregator<S>
where
    S: JudgingStore,
{
    pub fn new(
        store: Arc<S>,
        registry: Arc<DomainRegistry>,
        directory: Arc<Directory<S>>,
        gate: Arc<RoundGate>,
    ) -> Self {
        Self {
            store,
            registry,
            directory,
            gate,
        }
    }

    /// Rank every team within its domain from all Round 1 scores.
    pub async fn calculate_round_one(&self) -> Result<CalculationSummary> {
        self.calculate(Round::One).await
    }

    /// Rank the Round 2 finalists globally. Requires calculated Round 1
    /// results and Round 2 allocations.
    pub async fn calculate_round_two(&self) -> Result<CalculationSummary> {
        self.calculate(Round::Two).await
    }

    async fn calculate(&self, round: Round) -> Result<CalculationSummary> {
        let _guard = self.gate.calculation(round).await;

        let previous = self
            .store
            .current_snapshot(round)
            .await
            .map_err(|e| self.abort(round, e.into()))?
            .map(|p| p.version);
        let version = previous.map_or(1, |v| v + 1);

        CalculationSpan::new(round, version)
            .run_in(self.run(round, version, previous))
            .await
    }

    /// Build every row, then swap the snapshot in. Nothing is written unless
    /// all rows were built.
    async fn run(
        &self,
        round: Round,
        version: u64,
        expected: Option<u64>,
    ) -> Result<CalculationSummary> {
        let built = match round {
            Round::One => self.build_round_one().await,
            Round::Two => self.build_round_two().await,
        };
        let rows = built.map_err(|e| self.abort(round, e))?;

        let calculated_at = Utc::now();
        let snapshot = ResultSnapshot::new(round, version, calculated_at, rows)
            .map_err(|e| self.abort(round, e.into()))?;
        let summary = CalculationSummary {
            round,
            version,
            count: snapshot.rows.len(),
            digest: snapshot.digest.to_string(),
            calculated_at,
        };

        self.store
            .replace_snapshot(snapshot, expected)
            .await
            .map_err(|e| self.abort(round, e.into()))?;

        METRICS.inc_calculations_completed();
        obs::emit_calculation_finished(round, version, summary.count, &summary.digest);
        Ok(summary)
    }

    fn abort(&self, round: Round, err: JudgingError) -> JudgingError {
        METRICS.inc_calculations_aborted();
        obs::emit_calculation_aborted(round, &err);
        err
    }

    /// Group scores by team, rejecting scores filed under a domain other
    /// than their team's. Scores for teams no longer registered are skipped.
    fn scores_by_team<'s>(
        round: Round,
        view: &DirectoryView,
        scores: &'s [ScoreRecord],
    ) -> Result<BTreeMap<&'s TeamId, Vec<&'s ScoreRecord>>> {
        let mut by_team: BTreeMap<&TeamId, Vec<&ScoreRecord>> = BTreeMap::new();
        for s in scores {
            let Some(team) = view.team(&s.team_id) else {
                debug!(team_id = %s.team_id, judge_id = %s.judge_id, "score for unregistered team skipped");
                continue;
            };
            if team.domain_key != s.domain_key {
                return Err(JudgingError::consistency(
                    round,
                    format!(
                        "score {} is filed under {} but team {} belongs to {}",
                        s.key(),
                        s.domain_key,
                        team.id,
                        team.domain_key
                    ),
                ));
            }
            by_team.entry(&s.team_id).or_default().push(s);
        }
        Ok(by_team)
    }

    fn aggregate(
        team: &TeamRecord,
        by_team: &BTreeMap<&TeamId, Vec<&ScoreRecord>>,
    ) -> TeamAggregate {
        let scores = by_team.get(&team.id).map(Vec::as_slice).unwrap_or(&[]);
        TeamAggregate::from_scores(team, scores)
    }

    async fn build_round_one(&self) -> Result<Vec<RoundResultRecord>> {
        let view = self.directory.refresh().await?;
        let scores = self
            .store
            .list_scores(&ScoreFilter::for_round(Round::One))
            .await?;

        if let Some(team) = view.teams().find(|t| !self.registry.contains(&t.domain_key)) {
            return Err(JudgingError::consistency(
                Round::One,
                format!("team {} has unknown domain {}", team.id, team.domain_key),
            ));
        }
        let by_team = Self::scores_by_team(Round::One, &view, &scores)?;

        let mut rows = Vec::new();
        for domain_key in self.registry.keys() {
            let aggregates = view
                .teams_in(domain_key)
                .map(|team| Self::aggregate(team, &by_team))
                .collect();
            rows.extend(rank_dense(aggregates));
        }
        Ok(rows)
    }

    async fn build_round_two(&self) -> Result<Vec<RoundResultRecord>> {
        if self.store.current_snapshot(Round::One).await?.is_none() {
            return Err(JudgingError::precondition(
                "round two calculation",
                "calculated round one results",
            ));
        }
        let finalists: BTreeSet<TeamId> = self
            .store
            .list_pair_allocations(None)
            .await?
            .into_iter()
            .map(|p| p.team_id)
            .collect();
        if finalists.is_empty() {
            return Err(JudgingError::precondition(
                "round two calculation",
                "round two allocations",
            ));
        }

        let view = self.directory.refresh().await?;
        let mut teams = Vec::with_capacity(finalists.len());
        for team_id in &finalists {
            let team = view.team(team_id).ok_or_else(|| {
                JudgingError::consistency(
                    Round::Two,
                    format!("finalist {team_id} is no longer registered"),
                )
            })?;
            if !self.registry.contains(&team.domain_key) {
                return Err(JudgingError::consistency(
                    Round::Two,
                    format!("team {} has unknown domain {}", team.id, team.domain_key),
                ));
            }
            teams.push(team);
        }

        let scores: Vec<ScoreRecord> = self
            .store
            .list_scores(&ScoreFilter::for_round(Round::Two))
            .await?
            .into_iter()
            .filter(|s| finalists.contains(&s.team_id))
            .collect();
        let by_team = Self::scores_by_team(Round::Two, &view, &scores)?;

        let aggregates = teams
            .into_iter()
            .map(|team| Self::aggregate(team, &by_team))
            .collect();
        Ok(rank_dense(aggregates))
    }

    pub async fn status(&self, round: Round) -> Result<RoundStatus> {
        let Some(snapshot) = self.store.current_snapshot(round).await? else {
            return Ok(RoundStatus {
                round,
                calculated: false,
                count: 0,
                version: None,
                calculated_at: None,
                stale: false,
            });
        };
        let stale = self
            .store
            .list_scores(&ScoreFilter::for_round(round))
            .await?
            .iter()
            .any(|s| s.created_at > snapshot.calculated_at);
        Ok(RoundStatus {
            round,
            calculated: true,
            count: snapshot.rows.len(),
            version: Some(snapshot.version),
            calculated_at: Some(snapshot.calculated_at),
            stale,
        })
    }

    /// The current snapshot of a round, if calculated.
    pub async fn snapshot(&self, round: Round) -> Result<Option<ResultSnapshot>> {
        Ok(self.store.current_snapshot(round).await?)
    }

    /// Round 1 rows in catalog order, optionally for one domain. Empty
    /// until Round 1 has been calculated.
    pub async fn list_round_one_results(
        &self,
        domain_key: Option<&DomainKey>,
    ) -> Result<Vec<RoundResultRecord>> {
        if let Some(d) = domain_key {
            self.registry.require(d)?;
        }
        Ok(self
            .snapshot(Round::One)
            .await?
            .map(|s| s.rows)
            .unwrap_or_default()
            .into_iter()
            .filter(|r| domain_key.map_or(true, |d| r.domain_key == *d))
            .collect())
    }

    pub async fn list_round_two_results(&self) -> Result<Vec<RoundResultRecord>> {
        Ok(self
            .snapshot(Round::Two)
            .await?
            .map(|s| s.rows)
            .unwrap_or_default())
    }
}
