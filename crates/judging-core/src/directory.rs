//! Team & judge directory.
//!
//! Wraps a [`DirectoryStore`] with validation and a read-through
//! [`DirectoryView`] cache. The cache is loaded on first read and dropped by
//! every directory write; calculations call [`Directory::refresh`] to force
//! a fresh read.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use judging_state::{DirectoryStore, DomainKey, JudgeId, JudgeRecord, JudgeType, TeamId, TeamRecord};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::domain::{require_text, validate_identifier, JudgingError, Result};
use crate::registry::DomainRegistry;

/// Input for registering a team.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTeam {
    pub id: TeamId,
    pub name: String,
    pub domain_key: DomainKey,
    pub problem_statement: String,
    #[serde(default)]
    pub idea_description: Option<String>,
}

/// Partial team update. The domain is deliberately absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TeamUpdate {
    pub name: Option<String>,
    pub problem_statement: Option<String>,
    /// `Some(None)` clears the description.
    pub idea_description: Option<Option<String>>,
}

/// Input for registering a judge. The type is always explicit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewJudge {
    pub name: String,
    pub code: String,
    pub judge_type: JudgeType,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JudgeUpdate {
    pub name: Option<String>,
    pub code: Option<String>,
    pub judge_type: Option<JudgeType>,
}

/// A judge record from the legacy roster, where the type may be missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyJudge {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub judge_type: Option<JudgeType>,
}

/// Resolve the type of a legacy judge from its code: the first number in
/// the code at 11 or above means External, anything else Internal.
///
/// Only [`Directory::import_legacy_judges`] calls this.
pub fn legacy_judge_type(code: &str) -> JudgeType {
    let digits: String = code
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    match digits.parse::<u64>() {
        Ok(n) if n >= 11 => JudgeType::External,
        _ => JudgeType::Internal,
    }
}

/// Immutable snapshot of the directory.
#[derive(Debug, Clone, Default)]
pub struct DirectoryView {
    teams: BTreeMap<TeamId, TeamRecord>,
    judges: BTreeMap<JudgeId, JudgeRecord>,
}

impl DirectoryView {
    pub fn new(teams: Vec<TeamRecord>, judges: Vec<JudgeRecord>) -> Self {
        Self {
            teams: teams.into_iter().map(|t| (t.id.clone(), t)).collect(),
            judges: judges.into_iter().map(|j| (j.id.clone(), j)).collect(),
        }
    }

    pub fn team(&self, id: &TeamId) -> Option<&TeamRecord> {
        self.teams.get(id)
    }

    pub fn judge(&self, id: &JudgeId) -> Option<&JudgeRecord> {
        self.judges.get(id)
    }

    pub fn judge_by_code(&self, code: &str) -> Option<&JudgeRecord> {
        self.judges.values().find(|j| j.code == code)
    }

    /// All teams ordered by id.
    pub fn teams(&self) -> impl Iterator<Item = &TeamRecord> {
        self.teams.values()
    }

    /// All judges ordered by id.
    pub fn judges(&self) -> impl Iterator<Item = &JudgeRecord> {
        self.judges.values()
    }

    /// Teams of one domain, ordered by id.
    pub fn teams_in<'a>(&'a self, domain_key: &'a DomainKey) -> impl Iterator<Item = &'a TeamRecord> {
        self.teams.values().filter(move |t| t.domain_key == *domain_key)
    }
}

pub struct Directory<S> {
    store: Arc<S>,
    registry: Arc<DomainRegistry>,
    cache: RwLock<Option<Arc<DirectoryView>>>,
}

impl<S> Directory<S>
where
    S: DirectoryStore,
{
    pub fn new(store: Arc<S>, registry: Arc<DomainRegistry>) -> Self {
        Self {
            store,
            registry,
            cache: RwLock::new(None),
        }
    }

    /// Cached view, loading it on first use.
    pub async fn view(&self) -> Result<Arc<DirectoryView>> {
        if let Some(view) = self.cache.read().await.as_ref() {
            return Ok(view.clone());
        }
        self.refresh().await
    }

    /// Reload from the store and replace the cached view.
    pub async fn refresh(&self) -> Result<Arc<DirectoryView>> {
        let mut slot = self.cache.write().await;
        let teams = self.store.list_teams().await?;
        let judges = self.store.list_judges().await?;
        debug!(teams = teams.len(), judges = judges.len(), "directory view loaded");
        let view = Arc::new(DirectoryView::new(teams, judges));
        *slot = Some(view.clone());
        Ok(view)
    }

    /// Drop the cached view. Called after every write.
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }

    // -- teams ---------------------------------------------------------------

    fn check_new_team(&self, team: &NewTeam) -> Result<()> {
        validate_identifier("team", team.id.as_str())?;
        require_text("team", "name", &team.name)?;
        require_text("team", "problem_statement", &team.problem_statement)?;
        if !self.registry.contains(&team.domain_key) {
            return Err(JudgingError::validation(
                "team",
                format!("unknown domain {}", team.domain_key),
            ));
        }
        Ok(())
    }

    fn team_record(team: NewTeam) -> TeamRecord {
        TeamRecord {
            id: team.id,
            name: team.name.trim().to_string(),
            domain_key: team.domain_key,
            problem_statement: team.problem_statement,
            idea_description: team.idea_description.filter(|d| !d.trim().is_empty()),
            created_at: Utc::now(),
        }
    }

    pub async fn create_team(&self, team: NewTeam) -> Result<TeamRecord> {
        self.check_new_team(&team)?;
        let record = Self::team_record(team);
        let result = self.store.insert_team(record.clone()).await;
        self.invalidate().await;
        result?;
        info!(team_id = %record.id, domain = %record.domain_key, "team created");
        Ok(record)
    }

    /// Register many teams. Every entry is validated (including duplicates
    /// within the batch and against existing teams) before any is written.
    pub async fn create_teams(&self, teams: Vec<NewTeam>) -> Result<Vec<TeamRecord>> {
        let existing = self.refresh().await?;
        let mut seen = HashSet::new();
        for team in &teams {
            self.check_new_team(team)?;
            if existing.team(&team.id).is_some() || !seen.insert(team.id.clone()) {
                return Err(JudgingError::validation(
                    "team",
                    format!("{} already exists", team.id),
                ));
            }
        }

        let mut created = Vec::with_capacity(teams.len());
        let mut outcome = Ok(());
        for team in teams {
            let record = Self::team_record(team);
            if let Err(e) = self.store.insert_team(record.clone()).await {
                outcome = Err(e);
                break;
            }
            created.push(record);
        }
        self.invalidate().await;
        outcome?;
        info!(count = created.len(), "teams created");
        Ok(created)
    }

    pub async fn update_team(&self, id: &TeamId, update: TeamUpdate) -> Result<TeamRecord> {
        let mut team = self
            .store
            .get_team(id)
            .await?
            .ok_or_else(|| JudgingError::not_found("team", id))?;

        if let Some(name) = update.name {
            require_text("team", "name", &name)?;
            team.name = name.trim().to_string();
        }
        if let Some(problem) = update.problem_statement {
            require_text("team", "problem_statement", &problem)?;
            team.problem_statement = problem;
        }
        if let Some(idea) = update.idea_description {
            team.idea_description = idea.filter(|d| !d.trim().is_empty());
        }

        let result = self.store.update_team(team.clone()).await;
        self.invalidate().await;
        result?;
        Ok(team)
    }

    pub async fn get_team(&self, id: &TeamId) -> Result<TeamRecord> {
        self.view()
            .await?
            .team(id)
            .cloned()
            .ok_or_else(|| JudgingError::not_found("team", id))
    }

    /// Teams ordered by id, optionally restricted to one domain.
    pub async fn list_teams(&self, domain_key: Option<&DomainKey>) -> Result<Vec<TeamRecord>> {
        if let Some(d) = domain_key {
            self.registry.require(d)?;
        }
        let view = self.view().await?;
        Ok(view
            .teams()
            .filter(|t| domain_key.map_or(true, |d| t.domain_key == *d))
            .cloned()
            .collect())
    }

    /// Remove a team. Submitted scores are kept as historical evidence.
    pub async fn delete_team(&self, id: &TeamId) -> Result<()> {
        let result = self.store.delete_team(id).await;
        self.invalidate().await;
        result?;
        info!(team_id = %id, "team deleted");
        Ok(())
    }

    pub async fn delete_all_teams(&self) -> Result<u64> {
        let result = self.store.delete_all_teams().await;
        self.invalidate().await;
        let n = result?;
        info!(count = n, "all teams deleted");
        Ok(n)
    }

    // -- judges --------------------------------------------------------------

    fn check_new_judge(judge: &NewJudge) -> Result<()> {
        require_text("judge", "name", &judge.name)?;
        validate_identifier("judge code", &judge.code)
    }

    fn judge_record(judge: NewJudge) -> JudgeRecord {
        JudgeRecord {
            id: JudgeId::new(),
            name: judge.name.trim().to_string(),
            code: judge.code,
            judge_type: judge.judge_type,
            created_at: Utc::now(),
        }
    }

    pub async fn create_judge(&self, judge: NewJudge) -> Result<JudgeRecord> {
        Self::check_new_judge(&judge)?;
        let record = Self::judge_record(judge);
        let result = self.store.insert_judge(record.clone()).await;
        self.invalidate().await;
        result?;
        info!(judge_id = %record.id, code = %record.code, judge_type = %record.judge_type, "judge created");
        Ok(record)
    }

    /// Register many judges with all-or-nothing validation.
    pub async fn create_judges(&self, judges: Vec<NewJudge>) -> Result<Vec<JudgeRecord>> {
        let existing = self.refresh().await?;
        let mut codes = HashSet::new();
        for judge in &judges {
            Self::check_new_judge(judge)?;
            if existing.judge_by_code(&judge.code).is_some() || !codes.insert(judge.code.as_str()) {
                return Err(JudgingError::validation(
                    "judge_code",
                    format!("{} already exists", judge.code),
                ));
            }
        }

        let mut created = Vec::with_capacity(judges.len());
        let mut outcome = Ok(());
        for judge in judges {
            let record = Self::judge_record(judge);
            if let Err(e) = self.store.insert_judge(record.clone()).await {
                outcome = Err(e);
                break;
            }
            created.push(record);
        }
        self.invalidate().await;
        outcome?;
        info!(count = created.len(), "judges created");
        Ok(created)
    }

    /// One-time migration of a legacy roster whose records may lack a type.
    /// The resolved type is stored explicitly.
    pub async fn import_legacy_judges(&self, judges: Vec<LegacyJudge>) -> Result<Vec<JudgeRecord>> {
        let resolved = judges
            .into_iter()
            .map(|j| {
                let judge_type = j.judge_type.unwrap_or_else(|| legacy_judge_type(&j.code));
                NewJudge {
                    name: j.name,
                    code: j.code,
                    judge_type,
                }
            })
            .collect();
        self.create_judges(resolved).await
    }

    pub async fn update_judge(&self, id: &JudgeId, update: JudgeUpdate) -> Result<JudgeRecord> {
        let mut judge = self
            .store
            .get_judge(id)
            .await?
            .ok_or_else(|| JudgingError::not_found("judge", id))?;

        if let Some(name) = update.name {
            require_text("judge", "name", &name)?;
            judge.name = name.trim().to_string();
        }
        if let Some(code) = update.code {
            validate_identifier("judge code", &code)?;
            judge.code = code;
        }
        if let Some(judge_type) = update.judge_type {
            judge.judge_type = judge_type;
        }

        let result = self.store.update_judge(judge.clone()).await;
        self.invalidate().await;
        result?;
        Ok(judge)
    }

    pub async fn get_judge(&self, id: &JudgeId) -> Result<JudgeRecord> {
        self.view()
            .await?
            .judge(id)
            .cloned()
            .ok_or_else(|| JudgingError::not_found("judge", id))
    }

    pub async fn find_judge_by_code(&self, code: &str) -> Result<Option<JudgeRecord>> {
        Ok(self.view().await?.judge_by_code(code).cloned())
    }

    pub async fn list_judges(&self, judge_type: Option<JudgeType>) -> Result<Vec<JudgeRecord>> {
        let view = self.view().await?;
        Ok(view
            .judges()
            .filter(|j| judge_type.map_or(true, |t| j.judge_type == t))
            .cloned()
            .collect())
    }

    pub async fn delete_judge(&self, id: &JudgeId) -> Result<()> {
        let result = self.store.delete_judge(id).await;
        self.invalidate().await;
        result?;
        info!(judge_id = %id, "judge deleted");
        Ok(())
    }

    pub async fn delete_all_judges(&self) -> Result<u64> {
        let result = self.store.delete_all_judges().await;
        self.invalidate().await;
        let n = result?;
        info!(count = n, "all judges deleted");
        Ok(n)
    }
}
