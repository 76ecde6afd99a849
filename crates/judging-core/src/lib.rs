//! Judging Core Library
//!
//! Two-round hackathon judging: domain registry, team & judge directory,
//! allocation engine, score submission ledger and results aggregator,
//! consumed through [`JudgingService`] over any `judging_state::JudgingStore`.

pub mod allocation;
pub mod config;
pub mod directory;
pub mod domain;
pub mod export;
pub mod ledger;
pub mod metrics;
pub mod obs;
pub mod ranking;
pub mod registry;
pub mod results;
pub mod round_gate;
pub mod service;
pub mod telemetry;

pub use allocation::{
    expand_domain_assignments, select_finalists, Allocation, AllocationEngine, AllocationId,
    RoundOneRelation, RoundTwoPairing, RoundTwoSetup,
};
pub use config::{default_domains, JudgingConfig, RoundTwoConfig, RubricBounds};
pub use directory::{
    legacy_judge_type, Directory, DirectoryView, JudgeUpdate, LegacyJudge, NewJudge, NewTeam,
    TeamUpdate,
};
pub use domain::{JudgingError, Result};
pub use export::{render_results_csv, write_results_csv, CSV_HEADER};
pub use ledger::{JudgeCoverage, ScoreLedger, ScoreSubmission, TeamScoreSummary};
pub use ranking::{rank_dense, TeamAggregate};
pub use registry::DomainRegistry;
pub use results::{CalculationSummary, ResultsAggregator, RoundStatus};
pub use round_gate::RoundGate;
pub use service::JudgingService;

pub use judging_state::{
    DomainKey, DomainRecord, JudgeId, JudgeRecord, JudgeType, ResultSnapshot, Round,
    RoundResultRecord, RubricScores, ScoreRecord, TeamId, TeamRecord,
};
