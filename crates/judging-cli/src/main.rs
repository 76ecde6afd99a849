//! Hackathon judging CLI
//!
//! The `judging` command drives the two-round judging engine.
//!
//! ## Commands
//!
//! - `team` / `judge`: manage the directory
//! - `assign` / `round-two setup`: allocate judges
//! - `score`: submit and inspect scores
//! - `calculate` / `status` / `results` / `export`: round results

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use judging_core::metrics::METRICS;
use judging_core::{
    Allocation, AllocationId, DomainKey, JudgeId, JudgeRecord, JudgeType, JudgingConfig,
    JudgingService, LegacyJudge, NewJudge, NewTeam, Round, RoundResultRecord, RubricScores, TeamId,
};
use judging_state::SurrealJudgingStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};

type Service = JudgingService<SurrealJudgingStore>;

#[derive(Parser)]
#[command(name = "judging")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Two-round hackathon judging", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Command output format
    #[arg(long, global = true, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Judging configuration (TOML)
    #[arg(long, global = true, env = "JUDGING_CONFIG")]
    config: Option<PathBuf>,

    /// Use an ephemeral in-memory store instead of the configured database
    #[arg(long, global = true)]
    memory: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// List the domain catalog
    Domains,

    /// Manage teams
    Team {
        #[command(subcommand)]
        action: TeamAction,
    },

    /// Manage judges
    Judge {
        #[command(subcommand)]
        action: JudgeAction,
    },

    /// Replace the Round 1 judge set of a domain
    Assign {
        /// Domain key
        #[arg(short, long)]
        domain: String,

        /// Judge codes (or ids)
        #[arg(required = true)]
        judges: Vec<String>,
    },

    /// Show allocations, optionally for one judge
    Allocations {
        /// Judge code (or id)
        #[arg(short, long)]
        judge: Option<String>,

        /// Remove one allocation by id (r1/<domain>/<judge>/<team> or r2/<judge>/<team>)
        #[arg(long)]
        remove: Option<String>,
    },

    /// Round 2 allocation
    RoundTwo {
        #[command(subcommand)]
        action: RoundTwoAction,
    },

    /// Submit and inspect scores
    Score {
        #[command(subcommand)]
        action: ScoreAction,
    },

    /// Calculate results for a round (round-one | round-two)
    Calculate {
        round: Round,
    },

    /// Show calculation status of one or both rounds
    Status {
        round: Option<Round>,
    },

    /// Show calculated results
    Results {
        #[command(subcommand)]
        action: ResultsAction,
    },

    /// Export calculated results as CSV
    Export {
        round: Round,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum TeamAction {
    /// Register a team
    Add {
        #[arg(long)]
        id: String,
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        domain: String,
        #[arg(short, long)]
        problem: String,
        #[arg(long)]
        idea: Option<String>,
    },
    /// List teams
    List {
        #[arg(short, long)]
        domain: Option<String>,
    },
    /// Remove a team, or every team with --all
    Remove {
        id: Option<String>,
        #[arg(long, conflicts_with = "id")]
        all: bool,
    },
    /// Register teams from a JSON array file
    Import { path: PathBuf },
}

#[derive(Subcommand)]
enum JudgeAction {
    /// Register a judge
    Add {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        code: String,
        /// internal | external
        #[arg(short = 't', long = "type")]
        judge_type: JudgeType,
    },
    /// List judges
    List {
        #[arg(short = 't', long = "type")]
        judge_type: Option<JudgeType>,
    },
    /// Remove a judge, or every judge with --all
    Remove {
        judge: Option<String>,
        #[arg(long, conflicts_with = "judge")]
        all: bool,
    },
    /// Import a legacy roster (JSON array; `judge_type` may be missing)
    Import { path: PathBuf },
}

#[derive(Subcommand)]
enum RoundTwoAction {
    /// Pair every finalist with every given judge
    Setup {
        #[arg(required = true)]
        judges: Vec<String>,
    },
    /// List Round 2 pairings
    Allocations {
        #[arg(short, long)]
        judge: Option<String>,
    },
}

#[derive(Subcommand)]
enum ScoreAction {
    /// Submit (or replace) a score
    Submit {
        #[arg(short, long)]
        judge: String,
        #[arg(short, long)]
        team: String,
        #[arg(short, long, default_value = "round-one")]
        round: Round,
        #[arg(long, default_value_t = 0.0)]
        problem: f64,
        #[arg(long, default_value_t = 0.0)]
        innovation: f64,
        #[arg(long, default_value_t = 0.0)]
        feasibility: f64,
        #[arg(long, default_value_t = 0.0)]
        market: f64,
        #[arg(long, default_value_t = 0.0)]
        technology: f64,
        #[arg(long, default_value_t = 0.0)]
        pitch: f64,
        #[arg(long, default_value_t = 0.0)]
        bonus: f64,
    },
    /// List scores of a judge or a team
    List {
        #[arg(short, long, conflicts_with = "team")]
        judge: Option<String>,
        #[arg(short, long)]
        team: Option<String>,
        #[arg(short, long, default_value = "round-one")]
        round: Round,
        #[arg(short, long)]
        domain: Option<String>,
    },
    /// Number of scores per judge
    Counts {
        #[arg(short, long, default_value = "round-one")]
        round: Round,
        #[arg(short, long)]
        domain: Option<String>,
    },
    /// Allocated vs. scored teams per judge
    Coverage {
        #[arg(short, long, default_value = "round-one")]
        round: Round,
        /// Only judges still missing scores
        #[arg(long)]
        incomplete: bool,
    },
}

#[derive(Subcommand)]
enum ResultsAction {
    /// Per-domain Round 1 ranking
    RoundOne {
        #[arg(short, long)]
        domain: Option<String>,
    },
    /// Global Round 2 ranking
    RoundTwo,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    judging_core::telemetry::init_tracing(cli.json, level);

    let config = load_config(cli.config.as_deref())?;
    let store = open_store(cli.memory).await?;
    let service = JudgingService::new(Arc::new(store), config)?;

    let result = run(&service, cli.command, cli.format).await;
    METRICS.flush();
    result
}

fn load_config(path: Option<&Path>) -> Result<JudgingConfig> {
    let config = match path {
        Some(path) => JudgingConfig::load(path)?,
        None => JudgingConfig::default(),
    };
    Ok(config.with_env_overrides()?)
}

async fn open_store(memory: bool) -> Result<SurrealJudgingStore> {
    if memory {
        return SurrealJudgingStore::in_memory()
            .await
            .context("Failed to start in-memory store");
    }
    SurrealJudgingStore::from_env()
        .await
        .context("Failed to connect to judging database")
}

async fn run(svc: &Service, command: Commands, format: Format) -> Result<()> {
    match command {
        Commands::Domains => cmd_domains(svc, format),
        Commands::Team { action } => match action {
            TeamAction::Add {
                id,
                name,
                domain,
                problem,
                idea,
            } => {
                let team = NewTeam {
                    id: TeamId::from(id),
                    name,
                    domain_key: DomainKey::from(domain),
                    problem_statement: problem,
                    idea_description: idea,
                };
                cmd_team_add(svc, team, format).await
            }
            TeamAction::List { domain } => cmd_team_list(svc, domain.as_deref(), format).await,
            TeamAction::Remove { id, all } => cmd_team_remove(svc, id.as_deref(), all).await,
            TeamAction::Import { path } => cmd_team_import(svc, &path, format).await,
        },
        Commands::Judge { action } => match action {
            JudgeAction::Add {
                name,
                code,
                judge_type,
            } => {
                let judge = NewJudge {
                    name,
                    code,
                    judge_type,
                };
                cmd_judge_add(svc, judge, format).await
            }
            JudgeAction::List { judge_type } => cmd_judge_list(svc, judge_type, format).await,
            JudgeAction::Remove { judge, all } => cmd_judge_remove(svc, judge.as_deref(), all).await,
            JudgeAction::Import { path } => cmd_judge_import(svc, &path, format).await,
        },
        Commands::Assign { domain, judges } => cmd_assign(svc, &domain, &judges, format).await,
        Commands::Allocations { judge, remove } => match remove {
            Some(id) => cmd_allocation_remove(svc, &id).await,
            None => cmd_allocations(svc, judge.as_deref(), format).await,
        },
        Commands::RoundTwo { action } => match action {
            RoundTwoAction::Setup { judges } => cmd_round_two_setup(svc, &judges, format).await,
            RoundTwoAction::Allocations { judge } => {
                cmd_round_two_allocations(svc, judge.as_deref(), format).await
            }
        },
        Commands::Score { action } => match action {
            ScoreAction::Submit {
                judge,
                team,
                round,
                problem,
                innovation,
                feasibility,
                market,
                technology,
                pitch,
                bonus,
            } => {
                let rubric = RubricScores {
                    problem_identification: problem,
                    innovation_creativity: innovation,
                    feasibility_practicality: feasibility,
                    market_impact_potential: market,
                    technology_domain_relevance: technology,
                    pitch_delivery_qa: pitch,
                    bonus,
                };
                cmd_score_submit(svc, &judge, &team, round, rubric, format).await
            }
            ScoreAction::List {
                judge,
                team,
                round,
                domain,
            } => {
                cmd_score_list(
                    svc,
                    judge.as_deref(),
                    team.as_deref(),
                    round,
                    domain.as_deref(),
                    format,
                )
                .await
            }
            ScoreAction::Counts { round, domain } => {
                cmd_score_counts(svc, round, domain.as_deref(), format).await
            }
            ScoreAction::Coverage { round, incomplete } => {
                cmd_score_coverage(svc, round, incomplete, format).await
            }
        },
        Commands::Calculate { round } => cmd_calculate(svc, round, format).await,
        Commands::Status { round } => cmd_status(svc, round, format).await,
        Commands::Results { action } => match action {
            ResultsAction::RoundOne { domain } => {
                cmd_results(svc, Round::One, domain.as_deref(), format).await
            }
            ResultsAction::RoundTwo => cmd_results(svc, Round::Two, None, format).await,
        },
        Commands::Export { round, output } => cmd_export(svc, round, output.as_deref()).await,
    }
}

// ========== Helpers ==========

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Resolve a judge by login code, falling back to the judge id.
async fn resolve_judge(svc: &Service, key: &str) -> Result<JudgeRecord> {
    if let Some(judge) = svc.directory().find_judge_by_code(key).await? {
        return Ok(judge);
    }
    svc.directory()
        .get_judge(&JudgeId::from(key))
        .await
        .with_context(|| format!("No judge with code or id '{}'", key))
}

async fn resolve_judges(svc: &Service, keys: &[String]) -> Result<Vec<JudgeId>> {
    let mut ids = Vec::with_capacity(keys.len());
    for key in keys {
        ids.push(resolve_judge(svc, key).await?.id);
    }
    Ok(ids)
}

fn render_result_row(svc: &Service, row: &RoundResultRecord) -> String {
    format!(
        "{:>3}  {:<16} {:<28} {:<26} {:>6.2}  ({} judges)",
        row.rank,
        row.team_id,
        row.team_name,
        svc.registry()
            .name_of(&row.domain_key)
            .unwrap_or(row.domain_key.as_str()),
        row.total_score,
        row.judges_scored
    )
}

// ========== Directory Commands ==========

fn cmd_domains(svc: &Service, format: Format) -> Result<()> {
    let domains = svc.registry().list();
    if format == Format::Json {
        return print_json(domains);
    }
    for d in domains {
        println!("{:<26} {}", d.key, d.name);
    }
    Ok(())
}

async fn cmd_team_add(svc: &Service, team: NewTeam, format: Format) -> Result<()> {
    let team = svc.directory().create_team(team).await?;
    if format == Format::Json {
        return print_json(&team);
    }
    println!("Registered team '{}' ({}) in {}", team.name, team.id, team.domain_key);
    Ok(())
}

async fn cmd_team_list(svc: &Service, domain: Option<&str>, format: Format) -> Result<()> {
    let domain = domain.map(DomainKey::from);
    let teams = svc.directory().list_teams(domain.as_ref()).await?;
    if format == Format::Json {
        return print_json(&teams);
    }
    if teams.is_empty() {
        println!("No teams registered.");
        return Ok(());
    }
    for t in teams {
        println!("{:<16} {:<26} {}", t.id, t.domain_key, t.name);
    }
    Ok(())
}

async fn cmd_team_remove(svc: &Service, id: Option<&str>, all: bool) -> Result<()> {
    match (id, all) {
        (_, true) => {
            let removed = svc.directory().delete_all_teams().await?;
            println!("Removed {} teams", removed);
        }
        (Some(id), false) => {
            svc.directory().delete_team(&TeamId::from(id)).await?;
            println!("Removed team '{}'", id);
        }
        (None, false) => bail!("Give a team id or --all"),
    }
    Ok(())
}

async fn cmd_team_import(svc: &Service, path: &Path, format: Format) -> Result<()> {
    let teams: Vec<NewTeam> = read_json_file(path)?;
    let created = svc.directory().create_teams(teams).await?;
    if format == Format::Json {
        return print_json(&created);
    }
    println!("Imported {} teams from {}", created.len(), path.display());
    Ok(())
}

async fn cmd_judge_add(svc: &Service, judge: NewJudge, format: Format) -> Result<()> {
    let judge = svc.directory().create_judge(judge).await?;
    if format == Format::Json {
        return print_json(&judge);
    }
    println!(
        "Registered {} judge '{}' with code {} ({})",
        judge.judge_type, judge.name, judge.code, judge.id
    );
    Ok(())
}

async fn cmd_judge_list(
    svc: &Service,
    judge_type: Option<JudgeType>,
    format: Format,
) -> Result<()> {
    let judges = svc.directory().list_judges(judge_type).await?;
    if format == Format::Json {
        return print_json(&judges);
    }
    if judges.is_empty() {
        println!("No judges registered.");
        return Ok(());
    }
    for j in judges {
        println!("{:<8} {:<9} {:<24} {}", j.code, j.judge_type, j.name, j.id);
    }
    Ok(())
}

async fn cmd_judge_remove(svc: &Service, judge: Option<&str>, all: bool) -> Result<()> {
    match (judge, all) {
        (_, true) => {
            let removed = svc.directory().delete_all_judges().await?;
            println!("Removed {} judges", removed);
        }
        (Some(key), false) => {
            let judge = resolve_judge(svc, key).await?;
            svc.directory().delete_judge(&judge.id).await?;
            println!("Removed judge {} ({})", judge.code, judge.id);
        }
        (None, false) => bail!("Give a judge code or --all"),
    }
    Ok(())
}

async fn cmd_judge_import(svc: &Service, path: &Path, format: Format) -> Result<()> {
    let judges: Vec<LegacyJudge> = read_json_file(path)?;
    let created = svc.directory().import_legacy_judges(judges).await?;
    if format == Format::Json {
        return print_json(&created);
    }
    for j in &created {
        println!("{:<8} {}", j.code, j.judge_type);
    }
    println!("Imported {} judges from {}", created.len(), path.display());
    Ok(())
}

// ========== Allocation Commands ==========

async fn cmd_assign(svc: &Service, domain: &str, judges: &[String], format: Format) -> Result<()> {
    let ids = resolve_judges(svc, judges).await?;
    let relations = svc
        .allocations()
        .assign_domain_judges(&DomainKey::from(domain), &ids)
        .await?;
    if format == Format::Json {
        return print_json(&relations);
    }
    println!(
        "Assigned {} judges to {} ({} allocations)",
        ids.len(),
        domain,
        relations.len()
    );
    Ok(())
}

async fn cmd_allocations(svc: &Service, judge: Option<&str>, format: Format) -> Result<()> {
    let allocations: Vec<Allocation> = match judge {
        Some(key) => {
            let judge = resolve_judge(svc, key).await?;
            svc.allocations().allocations_for_judge(&judge.id).await?
        }
        None => svc
            .allocations()
            .list_allocations(None)
            .await?
            .into_iter()
            .map(Allocation::RoundOne)
            .collect(),
    };
    if format == Format::Json {
        return print_json(&allocations);
    }
    if allocations.is_empty() {
        println!("No allocations.");
        return Ok(());
    }
    for a in allocations {
        println!("{}", a.id());
    }
    Ok(())
}

async fn cmd_allocation_remove(svc: &Service, id: &str) -> Result<()> {
    let id: AllocationId = id.parse()?;
    svc.allocations().remove_allocation(&id).await?;
    println!("Removed allocation {}", id);
    Ok(())
}

async fn cmd_round_two_setup(svc: &Service, judges: &[String], format: Format) -> Result<()> {
    let ids = resolve_judges(svc, judges).await?;
    let setup = svc.allocations().setup_round_two(&ids).await?;
    if format == Format::Json {
        return print_json(&setup);
    }
    println!(
        "Round 2: {} finalists x {} judges = {} allocations (cutoff {}, round 1 v{})",
        setup.finalists.len(),
        setup.judges.len(),
        setup.allocations,
        setup.promotion_cutoff,
        setup.round_one_version
    );
    for team in &setup.finalists {
        println!("  {}", team);
    }
    Ok(())
}

async fn cmd_round_two_allocations(
    svc: &Service,
    judge: Option<&str>,
    format: Format,
) -> Result<()> {
    let judge_id = match judge {
        Some(key) => Some(resolve_judge(svc, key).await?.id),
        None => None,
    };
    let pairs = svc
        .allocations()
        .list_round_two_allocations(judge_id.as_ref())
        .await?;
    if format == Format::Json {
        return print_json(&pairs);
    }
    if pairs.is_empty() {
        println!("No Round 2 allocations.");
        return Ok(());
    }
    for p in pairs {
        println!("{} -> {}", p.judge_id, p.team_id);
    }
    Ok(())
}

// ========== Score Commands ==========

async fn cmd_score_submit(
    svc: &Service,
    judge: &str,
    team: &str,
    round: Round,
    rubric: RubricScores,
    format: Format,
) -> Result<()> {
    let judge = resolve_judge(svc, judge).await?;
    let score = svc
        .ledger()
        .submit(&judge.id, &TeamId::from(team), round, rubric)
        .await?;
    if format == Format::Json {
        return print_json(&score);
    }
    println!(
        "Recorded {} score {:.2} from {} for {}",
        score.round, score.total, judge.code, score.team_id
    );
    Ok(())
}

async fn cmd_score_list(
    svc: &Service,
    judge: Option<&str>,
    team: Option<&str>,
    round: Round,
    domain: Option<&str>,
    format: Format,
) -> Result<()> {
    let domain = domain.map(DomainKey::from);
    let scores = match (judge, team) {
        (Some(key), _) => {
            let judge = resolve_judge(svc, key).await?;
            svc.ledger()
                .list_for_judge(&judge.id, round, domain.as_ref())
                .await?
        }
        (None, Some(team)) => svc.ledger().list_for_team(&TeamId::from(team), round).await?,
        (None, None) => bail!("Give --judge or --team"),
    };
    if format == Format::Json {
        return print_json(&scores);
    }
    for s in scores {
        println!(
            "{} {} {:>6.2}  {}",
            s.judge_id,
            s.team_id,
            s.total,
            s.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    Ok(())
}

async fn cmd_score_counts(
    svc: &Service,
    round: Round,
    domain: Option<&str>,
    format: Format,
) -> Result<()> {
    let domain = domain.map(DomainKey::from);
    let counts = svc.ledger().count_by_judge(round, domain.as_ref()).await?;
    if format == Format::Json {
        return print_json(&counts);
    }
    for (judge, count) in counts {
        println!("{} {}", judge, count);
    }
    Ok(())
}

async fn cmd_score_coverage(
    svc: &Service,
    round: Round,
    incomplete: bool,
    format: Format,
) -> Result<()> {
    let coverage = if incomplete {
        svc.ledger().incomplete_judges(round).await?
    } else {
        svc.ledger().coverage(round).await?
    };
    if format == Format::Json {
        return print_json(&coverage);
    }
    for c in coverage {
        println!(
            "{:<8} {:<24} {}/{}",
            c.judge_code, c.judge_name, c.scored, c.allocated
        );
        for team in &c.missing {
            println!("    missing {}", team);
        }
    }
    Ok(())
}

// ========== Results Commands ==========

async fn cmd_calculate(svc: &Service, round: Round, format: Format) -> Result<()> {
    let summary = match round {
        Round::One => svc.results().calculate_round_one().await?,
        Round::Two => svc.results().calculate_round_two().await?,
    };
    info!(round = %round, version = summary.version, "calculation complete");
    if format == Format::Json {
        return print_json(&summary);
    }
    println!(
        "Calculated {} v{}: {} teams, digest {}",
        summary.round,
        summary.version,
        summary.count,
        &summary.digest[..12.min(summary.digest.len())]
    );
    Ok(())
}

async fn cmd_status(svc: &Service, round: Option<Round>, format: Format) -> Result<()> {
    let rounds = match round {
        Some(r) => vec![r],
        None => Round::ALL.to_vec(),
    };
    let mut statuses = Vec::with_capacity(rounds.len());
    for r in rounds {
        statuses.push(svc.results().status(r).await?);
    }
    if format == Format::Json {
        return print_json(&statuses);
    }
    for s in statuses {
        match (s.version, s.calculated_at) {
            (Some(version), Some(at)) => println!(
                "{}: v{} with {} teams at {}{}",
                s.round,
                version,
                s.count,
                at.to_rfc3339(),
                if s.stale { " (stale)" } else { "" }
            ),
            _ => println!("{}: not calculated", s.round),
        }
    }
    Ok(())
}

async fn cmd_results(
    svc: &Service,
    round: Round,
    domain: Option<&str>,
    format: Format,
) -> Result<()> {
    let rows = match round {
        Round::One => {
            let domain = domain.map(DomainKey::from);
            svc.results().list_round_one_results(domain.as_ref()).await?
        }
        Round::Two => svc.results().list_round_two_results().await?,
    };
    if format == Format::Json {
        return print_json(&rows);
    }
    if rows.is_empty() {
        println!("No {} results. Run 'judging calculate {}' first.", round, round);
        return Ok(());
    }
    for row in &rows {
        println!("{}", render_result_row(svc, row));
    }
    Ok(())
}

async fn cmd_export(svc: &Service, round: Round, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            svc.export_csv_to(round, path).await?;
            println!("Wrote {} results to {}", round, path.display());
        }
        None => print!("{}", svc.export_csv(round).await?),
    }
    Ok(())
}
