//! SurrealDB-backed implementation of every judging storage trait
//!
//! Uses the row types in `schema`, converting to/from `storage_traits`
//! records at the boundary. Multi-row replacements run inside a single
//! SurrealDB transaction so readers never observe a partial set.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::{Database, Root};
use surrealdb::Surreal;
use tracing::{debug, info, instrument};

use crate::error::{StateError, StorageError};
use crate::migrations;
use crate::schema::{AssignmentRow, JudgeRow, PairRow, RevocationRow, ScoreRow, SnapshotRow, TeamRow};
use crate::storage_traits::*;

const DEFAULT_NAMESPACE: &str = "judging";
const DEFAULT_DATABASE: &str = "main";
const LOCAL_DB_PATH: &str = ".judging/db";

/// Configuration for a remote SurrealDB server
#[derive(Debug, Clone)]
pub struct CloudConfig {
    /// WebSocket endpoint URL (e.g., "wss://xxx.aws-use1.surrealdb.cloud")
    pub endpoint: String,
    pub username: String,
    pub password: String,
    /// Namespace (default: "judging")
    pub namespace: String,
    /// Database name (default: "main")
    pub database: String,
    /// Whether this is a root user (true) or database user (false)
    pub is_root: bool,
}

impl CloudConfig {
    pub fn new(
        endpoint: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            username: username.into(),
            password: password.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            is_root: false,
        }
    }

    pub fn with_namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = ns.into();
        self
    }

    pub fn with_database(mut self, db: impl Into<String>) -> Self {
        self.database = db.into();
        self
    }

    pub fn with_root(mut self, is_root: bool) -> Self {
        self.is_root = is_root;
        self
    }

    /// Create from environment variables
    ///
    /// Reads:
    /// - SURREALDB_ENDPOINT (required)
    /// - SURREALDB_USERNAME (required)
    /// - SURREALDB_PASSWORD (required)
    /// - SURREALDB_NAMESPACE (optional, default: "judging")
    /// - SURREALDB_DATABASE (optional, default: "main")
    /// - SURREALDB_ROOT (optional, default: "false")
    pub fn from_env() -> std::result::Result<Self, String> {
        let endpoint =
            std::env::var("SURREALDB_ENDPOINT").map_err(|_| "SURREALDB_ENDPOINT not set")?;
        let username =
            std::env::var("SURREALDB_USERNAME").map_err(|_| "SURREALDB_USERNAME not set")?;
        let password =
            std::env::var("SURREALDB_PASSWORD").map_err(|_| "SURREALDB_PASSWORD not set")?;
        let namespace = std::env::var("SURREALDB_NAMESPACE")
            .unwrap_or_else(|_| DEFAULT_NAMESPACE.to_string());
        let database =
            std::env::var("SURREALDB_DATABASE").unwrap_or_else(|_| DEFAULT_DATABASE.to_string());
        let is_root = std::env::var("SURREALDB_ROOT")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(Self {
            endpoint,
            username,
            password,
            namespace,
            database,
            is_root,
        })
    }
}

/// SurrealDB-backed [`JudgingStore`].
#[derive(Clone)]
pub struct SurrealJudgingStore {
    db: Surreal<Any>,
}

impl SurrealJudgingStore {
    /// Connect to an in-memory instance (`mem://`), mainly for tests.
    pub async fn in_memory() -> crate::Result<Self> {
        let store = Self::connect_url("mem://").await?;
        info!("SurrealJudgingStore connected (in-memory)");
        Ok(store)
    }

    /// Connect to any SurrealDB URL and initialize the schema.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn connect_url(url: &str) -> crate::Result<Self> {
        let db = surrealdb::engine::any::connect(url)
            .await
            .map_err(|e| StateError::Connection(format!("Failed to connect to {url}: {e}")))?;

        db.use_ns(DEFAULT_NAMESPACE)
            .use_db(DEFAULT_DATABASE)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;
        Ok(Self { db })
    }

    /// Connect to a remote server with credentials.
    #[instrument(skip(config), fields(endpoint = %config.endpoint, namespace = %config.namespace))]
    pub async fn connect_cloud(config: &CloudConfig) -> crate::Result<Self> {
        let db = surrealdb::engine::any::connect(&config.endpoint)
            .await
            .map_err(|e| {
                StateError::Connection(format!("Failed to connect to {}: {}", config.endpoint, e))
            })?;

        if config.is_root {
            db.signin(Root {
                username: &config.username,
                password: &config.password,
            })
            .await
            .map_err(|e| StateError::Connection(format!("Root auth failed: {e}")))?;
        } else {
            db.signin(Database {
                namespace: &config.namespace,
                database: &config.database,
                username: &config.username,
                password: &config.password,
            })
            .await
            .map_err(|e| StateError::Connection(format!("DB auth failed: {e}")))?;
        }

        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;
        info!("SurrealJudgingStore connected (cloud)");
        Ok(Self { db })
    }

    /// Create from environment variables.
    ///
    /// Order: [`CloudConfig::from_env`], then `SURREALDB_URL`, then a local
    /// SurrealKV directory at `.judging/db`.
    pub async fn from_env() -> crate::Result<Self> {
        if let Ok(config) = CloudConfig::from_env() {
            return Self::connect_cloud(&config).await;
        }

        if let Ok(url) = std::env::var("SURREALDB_URL") {
            let store = Self::connect_url(&url).await?;
            info!("SurrealJudgingStore connected ({})", url);
            return Ok(store);
        }

        std::fs::create_dir_all(LOCAL_DB_PATH).map_err(|e| {
            StateError::Connection(format!(
                "Failed to create database directory {LOCAL_DB_PATH}: {e}"
            ))
        })?;
        let url = format!("surrealkv://{LOCAL_DB_PATH}");
        info!(
            "No cloud config or SURREALDB_URL found, using local persistence: {}",
            url
        );
        Self::connect_url(&url).await
    }

    // -- private helpers -----------------------------------------------------

    /// Run a single-statement query with one string binding and decode rows.
    async fn select_where<T: DeserializeOwned>(
        &self,
        sql: &'static str,
        name: &'static str,
        value: String,
    ) -> StorageResult<Vec<T>> {
        let mut res = self.db.query(sql).bind((name, value)).await?.check()?;
        Ok(res.take(0)?)
    }

    async fn select_all<T: DeserializeOwned>(&self, sql: &'static str) -> StorageResult<Vec<T>> {
        let mut res = self.db.query(sql).await?.check()?;
        Ok(res.take(0)?)
    }

    async fn fetch_team(&self, id: &TeamId) -> StorageResult<Option<TeamRow>> {
        let rows: Vec<TeamRow> = self
            .select_where("SELECT * FROM teams WHERE team_id = $id", "id", id.0.clone())
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn fetch_judge(&self, id: &JudgeId) -> StorageResult<Option<JudgeRow>> {
        let rows: Vec<JudgeRow> = self
            .select_where("SELECT * FROM judges WHERE judge_id = $id", "id", id.0.clone())
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn fetch_judge_by_code(&self, code: &str) -> StorageResult<Option<JudgeRow>> {
        let rows: Vec<JudgeRow> = self
            .select_where("SELECT * FROM judges WHERE code = $code", "code", code.to_string())
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn fetch_snapshot(&self, round: Round) -> StorageResult<Option<SnapshotRow>> {
        let rows: Vec<SnapshotRow> = self
            .select_where(
                "SELECT * FROM result_snapshots WHERE round = $round",
                "round",
                round.as_str().to_string(),
            )
            .await?;
        Ok(rows.into_iter().next())
    }
}

#[async_trait]
impl DirectoryStore for SurrealJudgingStore {
    async fn insert_team(&self, team: TeamRecord) -> StorageResult<()> {
        if self.fetch_team(&team.id).await?.is_some() {
            return Err(StorageError::Duplicate {
                kind: "team",
                id: team.id.0,
            });
        }
        debug!(team_id = %team.id, "creating team");
        let _created: Option<TeamRow> = self
            .db
            .create("teams")
            .content(TeamRow::from(team))
            .await?;
        Ok(())
    }

    async fn update_team(&self, team: TeamRecord) -> StorageResult<()> {
        if self.fetch_team(&team.id).await?.is_none() {
            return Err(StorageError::NotFound {
                kind: "team",
                id: team.id.0,
            });
        }
        let tid = team.id.0.clone();
        self.db
            .query("UPDATE teams CONTENT $row WHERE team_id = $tid")
            .bind(("row", TeamRow::from(team)))
            .bind(("tid", tid))
            .await?
            .check()?;
        Ok(())
    }

    async fn get_team(&self, id: &TeamId) -> StorageResult<Option<TeamRecord>> {
        Ok(self.fetch_team(id).await?.map(TeamRecord::from))
    }

    async fn list_teams(&self) -> StorageResult<Vec<TeamRecord>> {
        let rows: Vec<TeamRow> = self
            .select_all("SELECT * FROM teams ORDER BY team_id ASC")
            .await?;
        Ok(rows.into_iter().map(TeamRecord::from).collect())
    }

    async fn delete_team(&self, id: &TeamId) -> StorageResult<()> {
        if self.fetch_team(id).await?.is_none() {
            return Err(StorageError::NotFound {
                kind: "team",
                id: id.0.clone(),
            });
        }
        self.db
            .query("DELETE teams WHERE team_id = $tid")
            .bind(("tid", id.0.clone()))
            .await?
            .check()?;
        Ok(())
    }

    async fn delete_all_teams(&self) -> StorageResult<u64> {
        let n = self.list_teams().await?.len() as u64;
        self.db.query("DELETE teams").await?.check()?;
        Ok(n)
    }

    async fn insert_judge(&self, judge: JudgeRecord) -> StorageResult<()> {
        if self.fetch_judge(&judge.id).await?.is_some() {
            return Err(StorageError::Duplicate {
                kind: "judge",
                id: judge.id.0,
            });
        }
        if self.fetch_judge_by_code(&judge.code).await?.is_some() {
            return Err(StorageError::Duplicate {
                kind: "judge_code",
                id: judge.code,
            });
        }
        debug!(judge_id = %judge.id, code = %judge.code, "creating judge");
        let _created: Option<JudgeRow> = self
            .db
            .create("judges")
            .content(JudgeRow::from(judge))
            .await?;
        Ok(())
    }

    async fn update_judge(&self, judge: JudgeRecord) -> StorageResult<()> {
        if self.fetch_judge(&judge.id).await?.is_none() {
            return Err(StorageError::NotFound {
                kind: "judge",
                id: judge.id.0,
            });
        }
        if let Some(other) = self.fetch_judge_by_code(&judge.code).await? {
            if other.judge_id != judge.id.0 {
                return Err(StorageError::Duplicate {
                    kind: "judge_code",
                    id: judge.code,
                });
            }
        }
        let jid = judge.id.0.clone();
        self.db
            .query("UPDATE judges CONTENT $row WHERE judge_id = $jid")
            .bind(("row", JudgeRow::from(judge)))
            .bind(("jid", jid))
            .await?
            .check()?;
        Ok(())
    }

    async fn get_judge(&self, id: &JudgeId) -> StorageResult<Option<JudgeRecord>> {
        self.fetch_judge(id)
            .await?
            .map(JudgeRecord::try_from)
            .transpose()
    }

    async fn list_judges(&self) -> StorageResult<Vec<JudgeRecord>> {
        let rows: Vec<JudgeRow> = self
            .select_all("SELECT * FROM judges ORDER BY judge_id ASC")
            .await?;
        rows.into_iter().map(JudgeRecord::try_from).collect()
    }

    async fn delete_judge(&self, id: &JudgeId) -> StorageResult<()> {
        if self.fetch_judge(id).await?.is_none() {
            return Err(StorageError::NotFound {
                kind: "judge",
                id: id.0.clone(),
            });
        }
        self.db
            .query("DELETE judges WHERE judge_id = $jid")
            .bind(("jid", id.0.clone()))
            .await?
            .check()?;
        Ok(())
    }

    async fn delete_all_judges(&self) -> StorageResult<u64> {
        let n = self.list_judges().await?.len() as u64;
        self.db.query("DELETE judges").await?.check()?;
        Ok(n)
    }
}

#[async_trait]
impl AllocationStore for SurrealJudgingStore {
    async fn replace_domain_judges(
        &self,
        domain_key: &DomainKey,
        assignments: Vec<DomainAssignment>,
    ) -> StorageResult<()> {
        let rows: Vec<AssignmentRow> = assignments.into_iter().map(AssignmentRow::from).collect();
        debug!(domain = %domain_key, judges = rows.len(), "replacing domain judges");
        self.db
            .query(
                r#"
                BEGIN TRANSACTION;
                DELETE domain_judges WHERE domain_key = $domain;
                DELETE revocations WHERE domain_key = $domain;
                FOR $row IN $rows { CREATE domain_judges CONTENT $row; };
                COMMIT TRANSACTION;
                "#,
            )
            .bind(("domain", domain_key.0.clone()))
            .bind(("rows", rows))
            .await?
            .check()?;
        Ok(())
    }

    async fn list_domain_assignments(
        &self,
        domain_key: Option<&DomainKey>,
    ) -> StorageResult<Vec<DomainAssignment>> {
        let rows: Vec<AssignmentRow> = match domain_key {
            Some(d) => {
                self.select_where(
                    "SELECT * FROM domain_judges WHERE domain_key = $domain ORDER BY judge_id ASC",
                    "domain",
                    d.0.clone(),
                )
                .await?
            }
            None => {
                self.select_all("SELECT * FROM domain_judges ORDER BY domain_key ASC, judge_id ASC")
                    .await?
            }
        };
        Ok(rows.into_iter().map(DomainAssignment::from).collect())
    }

    async fn revoke_relation(&self, revocation: Revocation) -> StorageResult<()> {
        let mut res = self
            .db
            .query(
                "SELECT * FROM revocations WHERE domain_key = $domain AND judge_id = $judge AND team_id = $team",
            )
            .bind(("domain", revocation.domain_key.0.clone()))
            .bind(("judge", revocation.judge_id.0.clone()))
            .bind(("team", revocation.team_id.0.clone()))
            .await?
            .check()?;
        let existing: Vec<RevocationRow> = res.take(0)?;
        if !existing.is_empty() {
            return Ok(());
        }
        let _created: Option<RevocationRow> = self
            .db
            .create("revocations")
            .content(RevocationRow::from(revocation))
            .await?;
        Ok(())
    }

    async fn list_revocations(
        &self,
        domain_key: Option<&DomainKey>,
    ) -> StorageResult<Vec<Revocation>> {
        let rows: Vec<RevocationRow> = match domain_key {
            Some(d) => {
                self.select_where(
                    "SELECT * FROM revocations WHERE domain_key = $domain",
                    "domain",
                    d.0.clone(),
                )
                .await?
            }
            None => self.select_all("SELECT * FROM revocations").await?,
        };
        Ok(rows.into_iter().map(Revocation::from).collect())
    }

    async fn replace_pair_allocations(
        &self,
        pairs: Vec<PairAllocationRecord>,
    ) -> StorageResult<()> {
        let rows: Vec<PairRow> = pairs.into_iter().map(PairRow::from).collect();
        debug!(pairs = rows.len(), "replacing round two allocations");
        self.db
            .query(
                r#"
                BEGIN TRANSACTION;
                DELETE round_two_allocations;
                FOR $row IN $rows { CREATE round_two_allocations CONTENT $row; };
                COMMIT TRANSACTION;
                "#,
            )
            .bind(("rows", rows))
            .await?
            .check()?;
        Ok(())
    }

    async fn list_pair_allocations(
        &self,
        judge_id: Option<&JudgeId>,
    ) -> StorageResult<Vec<PairAllocationRecord>> {
        let rows: Vec<PairRow> = match judge_id {
            Some(j) => {
                self.select_where(
                    "SELECT * FROM round_two_allocations WHERE judge_id = $judge ORDER BY team_id ASC",
                    "judge",
                    j.0.clone(),
                )
                .await?
            }
            None => {
                self.select_all(
                    "SELECT * FROM round_two_allocations ORDER BY team_id ASC, judge_id ASC",
                )
                .await?
            }
        };
        Ok(rows.into_iter().map(PairAllocationRecord::from).collect())
    }

    async fn delete_pair_allocation(
        &self,
        judge_id: &JudgeId,
        team_id: &TeamId,
    ) -> StorageResult<()> {
        let mut res = self
            .db
            .query("SELECT * FROM round_two_allocations WHERE judge_id = $judge AND team_id = $team")
            .bind(("judge", judge_id.0.clone()))
            .bind(("team", team_id.0.clone()))
            .await?
            .check()?;
        let existing: Vec<PairRow> = res.take(0)?;
        if existing.is_empty() {
            return Err(StorageError::NotFound {
                kind: "pair_allocation",
                id: format!("{judge_id}/{team_id}"),
            });
        }
        self.db
            .query("DELETE round_two_allocations WHERE judge_id = $judge AND team_id = $team")
            .bind(("judge", judge_id.0.clone()))
            .bind(("team", team_id.0.clone()))
            .await?
            .check()?;
        Ok(())
    }
}

#[async_trait]
impl ScoreStore for SurrealJudgingStore {
    async fn upsert_score(&self, score: ScoreRecord) -> StorageResult<Option<ScoreRecord>> {
        score.verify_total()?;
        let key = score.key().to_string();

        let previous: Vec<ScoreRow> = self
            .select_where(
                "SELECT * FROM scores WHERE score_key = $key",
                "key",
                key.clone(),
            )
            .await?;

        debug!(score_key = %key, replaced = !previous.is_empty(), "upserting score");
        self.db
            .query(
                r#"
                BEGIN TRANSACTION;
                DELETE scores WHERE score_key = $key;
                CREATE scores CONTENT $row;
                COMMIT TRANSACTION;
                "#,
            )
            .bind(("key", key))
            .bind(("row", ScoreRow::from(score)))
            .await?
            .check()?;

        previous
            .into_iter()
            .next()
            .map(ScoreRecord::try_from)
            .transpose()
    }

    async fn upsert_scores(
        &self,
        scores: Vec<ScoreRecord>,
    ) -> StorageResult<Vec<Option<ScoreRecord>>> {
        let mut previous = Vec::with_capacity(scores.len());
        let mut rows = Vec::with_capacity(scores.len());
        for score in scores {
            score.verify_total()?;
            let existing: Vec<ScoreRow> = self
                .select_where(
                    "SELECT * FROM scores WHERE score_key = $key",
                    "key",
                    score.key().to_string(),
                )
                .await?;
            previous.push(
                existing
                    .into_iter()
                    .next()
                    .map(ScoreRecord::try_from)
                    .transpose()?,
            );
            rows.push(ScoreRow::from(score));
        }

        debug!(count = rows.len(), "upserting score batch");
        self.db
            .query(
                r#"
                BEGIN TRANSACTION;
                FOR $row IN $rows {
                    DELETE scores WHERE score_key = $row.score_key;
                    CREATE scores CONTENT $row;
                };
                COMMIT TRANSACTION;
                "#,
            )
            .bind(("rows", rows))
            .await?
            .check()?;
        Ok(previous)
    }

    async fn list_scores(&self, filter: &ScoreFilter) -> StorageResult<Vec<ScoreRecord>> {
        // Narrow by round in the query; the remaining predicates are cheap.
        let rows: Vec<ScoreRow> = match filter.round {
            Some(round) => {
                self.select_where(
                    "SELECT * FROM scores WHERE round = $round ORDER BY score_key ASC",
                    "round",
                    round.as_str().to_string(),
                )
                .await?
            }
            None => {
                self.select_all("SELECT * FROM scores ORDER BY score_key ASC")
                    .await?
            }
        };

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let record = ScoreRecord::try_from(row)?;
            if filter.matches(&record) {
                out.push(record);
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl ResultStore for SurrealJudgingStore {
    async fn replace_snapshot(
        &self,
        snapshot: ResultSnapshot,
        expected_version: Option<u64>,
    ) -> StorageResult<()> {
        snapshot.verify_digest()?;
        let target = snapshot.round;
        let round = target.as_str().to_string();
        debug!(round = %round, version = snapshot.version, rows = snapshot.rows.len(), "replacing result snapshot");

        // The version check runs inside the transaction so two writers that
        // read the same version cannot both commit.
        let response = self
            .db
            .query(
                r#"
                BEGIN TRANSACTION;
                LET $current = (SELECT VALUE version FROM result_snapshots WHERE round = $round)[0];
                IF $current != $expected {
                    THROW "snapshot version conflict";
                };
                DELETE result_snapshots WHERE round = $round;
                CREATE result_snapshots CONTENT $row;
                COMMIT TRANSACTION;
                "#,
            )
            .bind(("round", round))
            .bind(("expected", expected_version))
            .bind(("row", SnapshotRow::from(snapshot)))
            .await?;
        if let Err(e) = response.check() {
            let actual = self.fetch_snapshot(target).await?.map(|r| r.version);
            if actual != expected_version {
                return Err(StorageError::VersionConflict {
                    round: target.to_string(),
                    expected: expected_version,
                    actual,
                });
            }
            return Err(e.into());
        }
        Ok(())
    }

    async fn current_snapshot(&self, round: Round) -> StorageResult<Option<ResultSnapshot>> {
        self.fetch_snapshot(round)
            .await?
            .map(ResultSnapshot::try_from)
            .transpose()
    }
}
