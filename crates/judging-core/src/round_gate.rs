//! Per-round serialization of submissions against calculations.
//!
//! Score submissions for a round take that round's read lock, so distinct
//! judges proceed concurrently. A calculation (or Round 2 setup) first takes
//! the global calculation mutex and then the round's write lock, so it reads
//! a fully committed ledger and never overlaps another calculation.

use std::collections::BTreeSet;

use judging_state::Round;
use tokio::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
pub struct RoundGate {
    round_one: RwLock<()>,
    round_two: RwLock<()>,
    calculation: Mutex<()>,
}

/// Held for the duration of one calculation or Round 2 setup.
pub struct CalculationGuard<'a> {
    _round: RwLockWriteGuard<'a, ()>,
    _calculation: MutexGuard<'a, ()>,
}

impl RoundGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, round: Round) -> &RwLock<()> {
        match round {
            Round::One => &self.round_one,
            Round::Two => &self.round_two,
        }
    }

    /// Shared access for one score write in `round`.
    pub async fn submission(&self, round: Round) -> RwLockReadGuard<'_, ()> {
        self.lock_for(round).read().await
    }

    /// Shared access to several rounds at once, taken in round order.
    pub async fn submissions(
        &self,
        rounds: impl IntoIterator<Item = Round>,
    ) -> Vec<RwLockReadGuard<'_, ()>> {
        let ordered: BTreeSet<Round> = rounds.into_iter().collect();
        let mut guards = Vec::with_capacity(ordered.len());
        for round in ordered {
            guards.push(self.lock_for(round).read().await);
        }
        guards
    }

    /// Exclusive access to `round`, serialized against every other
    /// calculation.
    pub async fn calculation(&self, round: Round) -> CalculationGuard<'_> {
        let calculation = self.calculation.lock().await;
        let round = self.lock_for(round).write().await;
        CalculationGuard {
            _round: round,
            _calculation: calculation,
        }
    }

    /// True while a calculation or setup holds the gate.
    pub fn is_calculating(&self) -> bool {
        self.calculation.try_lock().is_err()
    }
}
