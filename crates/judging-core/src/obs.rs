//! Structured observability hooks for judging lifecycle events.
//!
//! This module provides:
//! - Calculation-scoped tracing spans via `CalculationSpan`
//! - Emission functions for allocation writes, score submissions, Round 2
//!   setup and calculation outcomes
//!
//! Events are emitted at `info!` level (configurable via `JUDGING_LOG`).

use std::future::Future;

use judging_state::{DomainKey, JudgeId, Round, TeamId};
use tracing::instrument::Instrumented;
use tracing::{info, Instrument};

/// Calculation-scoped span.
///
/// Every event emitted while an instrumented future runs carries the round
/// and the snapshot version being produced.
///
/// ```ignore
/// let span = CalculationSpan::new(Round::One, 4);
/// span.run_in(build_rows()).await;
/// ```
pub struct CalculationSpan {
    span: tracing::Span,
}

impl CalculationSpan {
    pub fn new(round: Round, version: u64) -> Self {
        Self {
            span: tracing::info_span!("judging.calculation", round = %round, version = version),
        }
    }

    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    /// Run `fut` inside this span.
    pub fn run_in<F: Future>(&self, fut: F) -> Instrumented<F> {
        fut.instrument(self.span.clone())
    }
}

/// Emit event: the judge set of one domain was replaced.
pub fn emit_allocations_replaced(domain_key: &DomainKey, judges: usize, teams: usize) {
    info!(
        event = "allocation.domain_replaced",
        domain = %domain_key,
        judges = judges,
        relations = judges * teams,
    );
}

/// Emit event: one allocation removed by hand.
pub fn emit_allocation_removed(allocation_id: &str) {
    info!(event = "allocation.removed", allocation_id = %allocation_id);
}

/// Emit event: Round 2 pairings rebuilt from the Round 1 qualifying pool.
pub fn emit_round_two_setup(finalists: usize, judges: usize, allocations: usize) {
    info!(
        event = "round_two.setup",
        finalists = finalists,
        judges = judges,
        allocations = allocations,
    );
}

/// Emit event: a score was accepted.
pub fn emit_score_submitted(
    judge_id: &JudgeId,
    team_id: &TeamId,
    round: Round,
    total: f64,
    replaced: bool,
) {
    info!(
        event = "score.submitted",
        judge_id = %judge_id,
        team_id = %team_id,
        round = %round,
        total = total,
        replaced = replaced,
    );
}

/// Emit event: a calculation committed a new snapshot.
pub fn emit_calculation_finished(round: Round, version: u64, rows: usize, digest: &str) {
    info!(
        event = "calculation.finished",
        round = %round,
        version = version,
        rows = rows,
        digest = %digest,
    );
}

/// Emit event: a calculation was aborted; the prior snapshot is retained.
pub fn emit_calculation_aborted(round: Round, error: &dyn std::fmt::Display) {
    tracing::warn!(event = "calculation.aborted", round = %round, error = %error);
}
