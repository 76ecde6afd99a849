#![allow(dead_code)]

use std::sync::Arc;

use judging_core::{
    DomainKey, JudgeRecord, JudgeType, JudgingConfig, JudgingService, NewJudge, NewTeam,
    RubricScores, TeamId, TeamRecord,
};
use judging_state::{JudgingStore, MemoryJudgingStore};

pub const AGRI: &str = "agritech_rural";
pub const FINTECH: &str = "fintech_ecommerce";

pub fn memory_service() -> (Arc<MemoryJudgingStore>, JudgingService<MemoryJudgingStore>) {
    let store = Arc::new(MemoryJudgingStore::new());
    let service = JudgingService::new(store.clone(), JudgingConfig::default()).unwrap();
    (store, service)
}

/// A rubric whose total is exactly `total` (kept in the first criterion
/// and bonus so bounds hold up to 15).
pub fn rubric_with_total(total: f64) -> RubricScores {
    let first = total.min(10.0);
    RubricScores {
        problem_identification: first,
        bonus: total - first,
        ..RubricScores::default()
    }
}

pub async fn team<S: JudgingStore>(
    service: &JudgingService<S>,
    id: &str,
    domain: &str,
) -> TeamRecord {
    service
        .directory()
        .create_team(NewTeam {
            id: TeamId::from(id),
            name: format!("Team {id}"),
            domain_key: DomainKey::from(domain),
            problem_statement: "Smallholder farmers lack soil data".to_string(),
            idea_description: None,
        })
        .await
        .unwrap()
}

pub async fn judge<S: JudgingStore>(
    service: &JudgingService<S>,
    code: &str,
    judge_type: JudgeType,
) -> JudgeRecord {
    service
        .directory()
        .create_judge(NewJudge {
            name: format!("Judge {code}"),
            code: code.to_string(),
            judge_type,
        })
        .await
        .unwrap()
}
