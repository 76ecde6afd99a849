//! Round 2: finalist selection, pairing setup, scoring and global ranking.

mod common;

use common::{judge, memory_service, rubric_with_total, team, AGRI, FINTECH};
use judging_core::{
    Allocation, AllocationId, DomainKey, JudgeRecord, JudgeType, JudgingError, JudgingService,
    Round, TeamRecord,
};
use judging_state::MemoryJudgingStore;

/// Two domains with four teams each, one internal judge per domain and
/// Round 1 calculated. Totals descend with the team index.
async fn calculated_round_one(
    svc: &JudgingService<MemoryJudgingStore>,
) -> (Vec<TeamRecord>, Vec<TeamRecord>) {
    let mut agri = Vec::new();
    let mut fin = Vec::new();
    for i in 1..=4 {
        agri.push(team(svc, &format!("agri-{i}"), AGRI).await);
        fin.push(team(svc, &format!("fin-{i}"), FINTECH).await);
    }
    for (code, domain, teams) in [("J01", AGRI, &agri), ("J02", FINTECH, &fin)] {
        let j = judge(svc, code, JudgeType::Internal).await;
        svc.allocations()
            .assign_domain_judges(&DomainKey::from(domain), &[j.id.clone()])
            .await
            .unwrap();
        for (i, t) in teams.iter().enumerate() {
            svc.ledger()
                .submit(&j.id, &t.id, Round::One, rubric_with_total(10.0 - i as f64))
                .await
                .unwrap();
        }
    }
    svc.results().calculate_round_one().await.unwrap();
    (agri, fin)
}

async fn external_judges(svc: &JudgingService<MemoryJudgingStore>) -> Vec<JudgeRecord> {
    vec![
        judge(svc, "J11", JudgeType::External).await,
        judge(svc, "J12", JudgeType::External).await,
    ]
}

#[tokio::test]
async fn setup_before_round_one_is_precondition_error() {
    let (_store, svc) = memory_service();
    let externals = external_judges(&svc).await;
    let ids: Vec<_> = externals.iter().map(|j| j.id.clone()).collect();

    assert!(!svc.results().status(Round::One).await.unwrap().calculated);
    let err = svc.allocations().setup_round_two(&ids).await.unwrap_err();
    assert!(matches!(err, JudgingError::Precondition { .. }));
    assert!(svc.allocations().list_round_two_allocations(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn setup_pairs_every_finalist_with_every_judge() {
    let (_store, svc) = memory_service();
    let (agri, fin) = calculated_round_one(&svc).await;
    let externals = external_judges(&svc).await;
    let ids: Vec<_> = externals.iter().map(|j| j.id.clone()).collect();

    let setup = svc.allocations().setup_round_two(&ids).await.unwrap();
    assert_eq!(setup.promotion_cutoff, 3);
    assert_eq!(setup.round_one_version, 1);
    // Top three of each domain.
    assert_eq!(setup.finalists.len(), 6);
    assert!(!setup.finalists.contains(&agri[3].id));
    assert!(!setup.finalists.contains(&fin[3].id));
    assert_eq!(setup.allocations, 12);

    let pairs = svc.allocations().list_round_two_allocations(None).await.unwrap();
    assert_eq!(pairs.len(), 12);
    let mine = svc.allocations().list_round_two_allocations(Some(&ids[0])).await.unwrap();
    assert_eq!(mine.len(), 6);

    // Running setup again replaces rather than appends.
    svc.allocations().setup_round_two(&ids[..1]).await.unwrap();
    assert_eq!(svc.allocations().list_round_two_allocations(None).await.unwrap().len(), 6);
}

#[tokio::test]
async fn internal_judge_cannot_judge_round_two() {
    let (_store, svc) = memory_service();
    calculated_round_one(&svc).await;
    let internal = judge(&svc, "J03", JudgeType::Internal).await;

    let err = svc.allocations().setup_round_two(&[internal.id]).await.unwrap_err();
    assert!(matches!(err, JudgingError::Validation { .. }));
    let err = svc.allocations().setup_round_two(&[]).await.unwrap_err();
    assert!(matches!(err, JudgingError::Validation { .. }));
}

#[tokio::test]
async fn round_two_ranking_is_global() {
    let (_store, svc) = memory_service();
    let (agri, fin) = calculated_round_one(&svc).await;
    let externals = external_judges(&svc).await;
    let ids: Vec<_> = externals.iter().map(|j| j.id.clone()).collect();
    svc.allocations().setup_round_two(&ids).await.unwrap();

    // fin-2 wins overall, agri-1 second, others unscored.
    for j in &ids {
        svc.ledger().submit(j, &fin[1].id, Round::Two, rubric_with_total(14.0)).await.unwrap();
    }
    svc.ledger().submit(&ids[0], &agri[0].id, Round::Two, rubric_with_total(12.0)).await.unwrap();
    svc.ledger().submit(&ids[1], &agri[0].id, Round::Two, rubric_with_total(11.0)).await.unwrap();

    // A Round 1 team outside the pool cannot be scored.
    let err = svc
        .ledger()
        .submit(&ids[0], &agri[3].id, Round::Two, rubric_with_total(15.0))
        .await
        .unwrap_err();
    assert!(matches!(err, JudgingError::Authorization { round: Round::Two, .. }));

    let summary = svc.results().calculate_round_two().await.unwrap();
    assert_eq!(summary.count, 6);

    let rows = svc.results().list_round_two_results().await.unwrap();
    assert_eq!(rows.len(), 6);
    assert_eq!(rows[0].team_id, fin[1].id);
    assert_eq!(rows[0].rank, 1);
    assert_eq!(rows[0].domain_key, DomainKey::from(FINTECH));
    assert_eq!(rows[1].team_id, agri[0].id);
    assert_eq!(rows[1].total_score, 11.5);
    assert_eq!(rows[1].rank, 2);
    assert!(rows[2..].iter().all(|r| r.judges_scored == 0 && r.rank == 3));

    // Round 1 results are untouched by Round 2.
    assert_eq!(svc.results().snapshot(Round::One).await.unwrap().unwrap().version, 1);
}

#[tokio::test]
async fn round_two_calculation_requires_setup() {
    let (_store, svc) = memory_service();
    let err = svc.results().calculate_round_two().await.unwrap_err();
    assert!(matches!(err, JudgingError::Precondition { .. }));

    calculated_round_one(&svc).await;
    let err = svc.results().calculate_round_two().await.unwrap_err();
    assert!(matches!(err, JudgingError::Precondition { .. }));
}

#[tokio::test]
async fn deleted_finalist_aborts_round_two_calculation() {
    let (_store, svc) = memory_service();
    let (agri, _fin) = calculated_round_one(&svc).await;
    let externals = external_judges(&svc).await;
    let ids: Vec<_> = externals.iter().map(|j| j.id.clone()).collect();
    svc.allocations().setup_round_two(&ids).await.unwrap();
    let first = svc.results().calculate_round_two().await.unwrap();

    svc.directory().delete_team(&agri[0].id).await.unwrap();
    let err = svc.results().calculate_round_two().await.unwrap_err();
    assert!(matches!(err, JudgingError::Consistency { round: Round::Two, .. }));

    let kept = svc.results().snapshot(Round::Two).await.unwrap().unwrap();
    assert_eq!(kept.version, first.version);
    assert_eq!(kept.rows.len(), 6);
}

#[tokio::test]
async fn removing_a_pair_revokes_round_two_authorization() {
    let (_store, svc) = memory_service();
    let (agri, _fin) = calculated_round_one(&svc).await;
    let externals = external_judges(&svc).await;
    let ids: Vec<_> = externals.iter().map(|j| j.id.clone()).collect();
    svc.allocations().setup_round_two(&ids).await.unwrap();

    let id = AllocationId::RoundTwo {
        judge_id: ids[0].clone(),
        team_id: agri[0].id.clone(),
    };
    svc.allocations().remove_allocation(&id).await.unwrap();
    let err = svc
        .ledger()
        .submit(&ids[0], &agri[0].id, Round::Two, rubric_with_total(9.0))
        .await
        .unwrap_err();
    assert!(matches!(err, JudgingError::Authorization { .. }));

    let err = svc.allocations().remove_allocation(&id).await.unwrap_err();
    assert!(matches!(err, JudgingError::NotFound { kind: "allocation", .. }));
}

#[tokio::test]
async fn judge_view_spans_both_rounds_and_degrades_without_round_two() {
    let (store, svc) = memory_service();
    calculated_round_one(&svc).await;
    let j01 = svc.directory().find_judge_by_code("J01").await.unwrap().unwrap();

    let all = svc.allocations().allocations_for_judge(&j01.id).await.unwrap();
    assert_eq!(all.len(), 4);
    assert!(all.iter().all(|a| matches!(a, Allocation::RoundOne(_))));

    store.set_unavailable("pair_allocation", true);
    let degraded = svc.allocations().allocations_for_judge(&j01.id).await.unwrap();
    assert_eq!(degraded.len(), 4);

    // Other reads are not best-effort.
    let err = svc.ledger().coverage(Round::Two).await.unwrap_err();
    assert!(matches!(err, JudgingError::Storage(_)));
    store.set_unavailable("pair_allocation", false);

    let externals = external_judges(&svc).await;
    svc.allocations().setup_round_two(&[externals[0].id.clone()]).await.unwrap();
    let ext = svc.allocations().allocations_for_judge(&externals[0].id).await.unwrap();
    assert_eq!(ext.len(), 6);
    assert!(ext.iter().all(|a| a.round() == Round::Two));
}

#[tokio::test]
async fn cutoff_override_widens_the_pool() {
    let store = std::sync::Arc::new(MemoryJudgingStore::new());
    let config = judging_core::JudgingConfig::default()
        .with_cutoff_override(Some("4"))
        .unwrap();
    let svc = JudgingService::new(store, config).unwrap();
    calculated_round_one(&svc).await;
    let externals = external_judges(&svc).await;

    let setup = svc.allocations().setup_round_two(&[externals[0].id.clone()]).await.unwrap();
    assert_eq!(setup.promotion_cutoff, 4);
    assert_eq!(setup.finalists.len(), 8);
}
