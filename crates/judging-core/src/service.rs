//! Service facade wiring every judging component over one store.

use std::path::Path;
use std::sync::Arc;

use judging_state::{JudgingStore, Round};

use crate::allocation::AllocationEngine;
use crate::config::JudgingConfig;
use crate::directory::Directory;
use crate::domain::{JudgingError, Result};
use crate::export;
use crate::ledger::ScoreLedger;
use crate::registry::DomainRegistry;
use crate::results::ResultsAggregator;
use crate::round_gate::RoundGate;

/// Registry, directory, allocation engine, ledger and aggregator sharing a
/// store handle and one [`RoundGate`].
pub struct JudgingService<S> {
    config: Arc<JudgingConfig>,
    registry: Arc<DomainRegistry>,
    directory: Arc<Directory<S>>,
    allocations: Arc<AllocationEngine<S>>,
    ledger: ScoreLedger<S>,
    results: ResultsAggregator<S>,
    gate: Arc<RoundGate>,
}

impl<S> JudgingService<S>
where
    S: JudgingStore,
{
    pub fn new(store: Arc<S>, config: JudgingConfig) -> Result<Self> {
        let registry = Arc::new(DomainRegistry::from_config(&config)?);
        let config = Arc::new(config);
        let gate = Arc::new(RoundGate::new());

        let directory = Arc::new(Directory::new(store.clone(), registry.clone()));
        let allocations = Arc::new(AllocationEngine::new(
            store.clone(),
            registry.clone(),
            directory.clone(),
            config.clone(),
            gate.clone(),
        ));
        let ledger = ScoreLedger::new(
            store.clone(),
            registry.clone(),
            directory.clone(),
            allocations.clone(),
            config.clone(),
            gate.clone(),
        );
        let results =
            ResultsAggregator::new(store, registry.clone(), directory.clone(), gate.clone());

        Ok(Self {
            config,
            registry,
            directory,
            allocations,
            ledger,
            results,
            gate,
        })
    }

    pub fn config(&self) -> &JudgingConfig {
        &self.config
    }

    pub fn registry(&self) -> &DomainRegistry {
        &self.registry
    }

    pub fn directory(&self) -> &Directory<S> {
        &self.directory
    }

    pub fn allocations(&self) -> &AllocationEngine<S> {
        &self.allocations
    }

    pub fn ledger(&self) -> &ScoreLedger<S> {
        &self.ledger
    }

    pub fn results(&self) -> &ResultsAggregator<S> {
        &self.results
    }

    /// The gate every submission and calculation of this service passes.
    pub fn gate(&self) -> &RoundGate {
        &self.gate
    }

    /// Render the current snapshot of `round` as CSV.
    pub async fn export_csv(&self, round: Round) -> Result<String> {
        let snapshot = self
            .results
            .snapshot(round)
            .await?
            .ok_or_else(|| JudgingError::precondition("export", format!("calculated {round} results")))?;
        Ok(export::render_results_csv(&self.registry, &snapshot))
    }

    /// Write the current snapshot of `round` as CSV to `path`.
    pub async fn export_csv_to(&self, round: Round, path: &Path) -> anyhow::Result<()> {
        let snapshot = self
            .results
            .snapshot(round)
            .await?
            .ok_or_else(|| JudgingError::precondition("export", format!("calculated {round} results")))?;
        export::write_results_csv(path, &self.registry, &snapshot)
    }
}
