//! SurrealDB schema migrations and initialization
//!
//! Defines every judging table with its unique keys and lookup indexes.

use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize all judging tables in SurrealDB
///
/// Safe to call multiple times (idempotent).
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing judging SurrealDB schema");

    init_directory_tables(db).await?;
    init_allocation_tables(db).await?;
    init_scores_table(db).await?;
    init_result_snapshots_table(db).await?;

    info!("judging schema initialization complete");
    Ok(())
}

/// `teams` and `judges`
///
/// Constraints:
/// - `teams.team_id` unique
/// - `judges.judge_id` and `judges.code` unique
async fn init_directory_tables(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing directory tables");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS teams SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_team_id ON TABLE teams COLUMNS team_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_team_domain ON TABLE teams COLUMNS domain_key;

        DEFINE TABLE IF NOT EXISTS judges SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_judge_id ON TABLE judges COLUMNS judge_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_judge_code ON TABLE judges COLUMNS code UNIQUE;
    "#;

    db.query(sql).await?.check()?;
    info!("✓ directory tables initialized");
    Ok(())
}

/// `domain_judges`, `revocations`, `round_two_allocations`
///
/// Round 1 stores domain-level assignments only; per-team relations are
/// derived by the core. Round 2 stores direct pairings.
async fn init_allocation_tables(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing allocation tables");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS domain_judges SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_domain_judge ON TABLE domain_judges COLUMNS domain_key, judge_id UNIQUE;

        DEFINE TABLE IF NOT EXISTS revocations SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_revocation ON TABLE revocations COLUMNS domain_key, judge_id, team_id UNIQUE;

        DEFINE TABLE IF NOT EXISTS round_two_allocations SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_pair ON TABLE round_two_allocations COLUMNS judge_id, team_id UNIQUE;
    "#;

    db.query(sql).await?.check()?;
    info!("✓ allocation tables initialized");
    Ok(())
}

/// `scores`
///
/// Constraints:
/// - `score_key` (judge/team/round) unique: one current score per key
async fn init_scores_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing scores table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS scores SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_score_key ON TABLE scores COLUMNS score_key UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_score_round_domain ON TABLE scores COLUMNS round, domain_key;
        DEFINE INDEX IF NOT EXISTS idx_score_judge ON TABLE scores COLUMNS judge_id;
    "#;

    db.query(sql).await?.check()?;
    info!("✓ scores table initialized");
    Ok(())
}

/// `result_snapshots`: one row per round, replaced wholesale
async fn init_result_snapshots_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing result_snapshots table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS result_snapshots SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_snapshot_round ON TABLE result_snapshots COLUMNS round UNIQUE;
    "#;

    db.query(sql).await?.check()?;
    info!("✓ result_snapshots table initialized");
    Ok(())
}
