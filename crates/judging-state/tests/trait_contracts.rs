//! Trait contract tests for DirectoryStore, AllocationStore, ScoreStore and
//! ResultStore.
//!
//! Every contract is written once against `JudgingStore` and run against both
//! the in-memory fake and the SurrealDB in-memory engine.

use chrono::{Duration, Utc};
use judging_state::fakes::MemoryJudgingStore;
use judging_state::storage_traits::*;
use judging_state::{StorageError, SurrealJudgingStore};

fn team(id: &str, domain: &str) -> TeamRecord {
    TeamRecord {
        id: TeamId::from(id),
        name: format!("Team {id}"),
        domain_key: DomainKey::from(domain),
        problem_statement: "Farmers lack price data".to_string(),
        idea_description: None,
        created_at: Utc::now(),
    }
}

fn judge(id: &str, code: &str, judge_type: JudgeType) -> JudgeRecord {
    JudgeRecord {
        id: JudgeId::from(id),
        name: format!("Judge {id}"),
        code: code.to_string(),
        judge_type,
        created_at: Utc::now(),
    }
}

fn rubric(value: f64, bonus: f64) -> RubricScores {
    RubricScores {
        problem_identification: value,
        innovation_creativity: value,
        feasibility_practicality: value,
        market_impact_potential: value,
        technology_domain_relevance: value,
        pitch_delivery_qa: value,
        bonus,
    }
}

fn score(judge: &str, team: &str, round: Round, value: f64) -> ScoreRecord {
    ScoreRecord::new(
        JudgeId::from(judge),
        TeamId::from(team),
        DomainKey::from("agritech_rural"),
        round,
        rubric(value, 0.5),
        Utc::now(),
    )
}

fn result_row(team: &str, total: f64, rank: u32) -> RoundResultRecord {
    RoundResultRecord {
        domain_key: DomainKey::from("agritech_rural"),
        team_id: TeamId::from(team),
        team_name: format!("Team {team}"),
        total_score: total,
        breakdown: rubric(total / 6.0, 0.5),
        judges_scored: 2,
        rank,
    }
}

// ===========================================================================
// Contracts
// ===========================================================================

async fn team_crud_contract<S: JudgingStore>(store: &S) {
    store.insert_team(team("t1", "agritech_rural")).await.unwrap();
    store.insert_team(team("t2", "health_biotech")).await.unwrap();

    let err = store
        .insert_team(team("t1", "agritech_rural"))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Duplicate { kind: "team", .. }));

    let mut t1 = store.get_team(&TeamId::from("t1")).await.unwrap().unwrap();
    t1.idea_description = Some("SMS price alerts".to_string());
    store.update_team(t1).await.unwrap();
    let reloaded = store.get_team(&TeamId::from("t1")).await.unwrap().unwrap();
    assert_eq!(reloaded.idea_description.as_deref(), Some("SMS price alerts"));

    let err = store
        .update_team(team("ghost", "agritech_rural"))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound { kind: "team", .. }));

    let ids: Vec<String> = store
        .list_teams()
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.id.0)
        .collect();
    assert_eq!(ids, vec!["t1", "t2"]);

    store.delete_team(&TeamId::from("t2")).await.unwrap();
    assert!(store.get_team(&TeamId::from("t2")).await.unwrap().is_none());
    assert!(matches!(
        store.delete_team(&TeamId::from("t2")).await,
        Err(StorageError::NotFound { .. })
    ));

    assert_eq!(store.delete_all_teams().await.unwrap(), 1);
    assert!(store.list_teams().await.unwrap().is_empty());
}

async fn judge_code_uniqueness_contract<S: JudgingStore>(store: &S) {
    store
        .insert_judge(judge("j1", "J01", JudgeType::Internal))
        .await
        .unwrap();
    store
        .insert_judge(judge("j2", "J02", JudgeType::External))
        .await
        .unwrap();

    let err = store
        .insert_judge(judge("j3", "J01", JudgeType::Internal))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StorageError::Duplicate {
            kind: "judge_code",
            ..
        }
    ));

    // Renaming onto another judge's code is rejected; keeping your own is fine.
    let err = store
        .update_judge(judge("j2", "J01", JudgeType::External))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Duplicate { .. }));
    store
        .update_judge(judge("j2", "J02", JudgeType::Internal))
        .await
        .unwrap();

    let j2 = store.get_judge(&JudgeId::from("j2")).await.unwrap().unwrap();
    assert_eq!(j2.judge_type, JudgeType::Internal);
    assert_eq!(store.list_judges().await.unwrap().len(), 2);

    store.delete_judge(&JudgeId::from("j1")).await.unwrap();
    assert_eq!(store.delete_all_judges().await.unwrap(), 1);
}

async fn domain_assignment_contract<S: JudgingStore>(store: &S) {
    let domain = DomainKey::from("agritech_rural");
    let now = Utc::now();
    let assign = |j: &str| DomainAssignment {
        domain_key: domain.clone(),
        judge_id: JudgeId::from(j),
        created_at: now,
    };

    store
        .replace_domain_judges(&domain, vec![assign("j1"), assign("j2")])
        .await
        .unwrap();
    store
        .replace_domain_judges(
            &DomainKey::from("health_biotech"),
            vec![DomainAssignment {
                domain_key: DomainKey::from("health_biotech"),
                judge_id: JudgeId::from("j9"),
                created_at: now,
            }],
        )
        .await
        .unwrap();

    let revocation = Revocation {
        domain_key: domain.clone(),
        judge_id: JudgeId::from("j1"),
        team_id: TeamId::from("t1"),
        revoked_at: now,
    };
    store.revoke_relation(revocation.clone()).await.unwrap();
    store.revoke_relation(revocation).await.unwrap();
    assert_eq!(store.list_revocations(Some(&domain)).await.unwrap().len(), 1);

    // Replacing the domain's judges swaps the set and clears its revocations.
    store
        .replace_domain_judges(&domain, vec![assign("j3")])
        .await
        .unwrap();
    let judges: Vec<String> = store
        .list_domain_assignments(Some(&domain))
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.judge_id.0)
        .collect();
    assert_eq!(judges, vec!["j3"]);
    assert!(store.list_revocations(Some(&domain)).await.unwrap().is_empty());
    assert_eq!(store.list_domain_assignments(None).await.unwrap().len(), 2);
}

async fn pair_allocation_contract<S: JudgingStore>(store: &S) {
    let now = Utc::now();
    let pair = |j: &str, t: &str| PairAllocationRecord {
        judge_id: JudgeId::from(j),
        team_id: TeamId::from(t),
        created_at: now,
    };

    store
        .replace_pair_allocations(vec![pair("x1", "t1"), pair("x1", "t2"), pair("x2", "t1")])
        .await
        .unwrap();
    assert_eq!(
        store
            .list_pair_allocations(Some(&JudgeId::from("x1")))
            .await
            .unwrap()
            .len(),
        2
    );

    store
        .delete_pair_allocation(&JudgeId::from("x1"), &TeamId::from("t2"))
        .await
        .unwrap();
    let err = store
        .delete_pair_allocation(&JudgeId::from("x1"), &TeamId::from("t2"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StorageError::NotFound {
            kind: "pair_allocation",
            ..
        }
    ));

    store
        .replace_pair_allocations(vec![pair("x3", "t5")])
        .await
        .unwrap();
    let all = store.list_pair_allocations(None).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].judge_id, JudgeId::from("x3"));
}

async fn score_upsert_contract<S: JudgingStore>(store: &S) {
    let first = score("j1", "t1", Round::One, 7.0);
    assert!(store.upsert_score(first.clone()).await.unwrap().is_none());

    let second = score("j1", "t1", Round::One, 9.0);
    let replaced = store.upsert_score(second.clone()).await.unwrap();
    assert_eq!(replaced.map(|s| s.total), Some(first.total));

    store
        .upsert_score(score("j1", "t1", Round::Two, 5.0))
        .await
        .unwrap();
    store
        .upsert_score(score("j2", "t1", Round::One, 6.0))
        .await
        .unwrap();

    let round_one = store
        .list_scores(&ScoreFilter::for_round(Round::One))
        .await
        .unwrap();
    assert_eq!(round_one.len(), 2);

    let mine = store
        .list_scores(&ScoreFilter::for_round(Round::One).judge(&JudgeId::from("j1")))
        .await
        .unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].total, second.total);
    assert_eq!(mine[0].rubric, second.rubric);

    assert_eq!(store.list_scores(&ScoreFilter::all()).await.unwrap().len(), 3);
}

async fn score_with_bad_total_rejected_contract<S: JudgingStore>(store: &S) {
    let mut bad = score("j1", "t1", Round::One, 7.0);
    bad.total += 1.0;
    let err = store.upsert_score(bad).await.unwrap_err();
    assert!(matches!(err, StorageError::Integrity { kind: "score", .. }));
    assert!(store.list_scores(&ScoreFilter::all()).await.unwrap().is_empty());
}

async fn score_batch_is_all_or_nothing_contract<S: JudgingStore>(store: &S) {
    let kept = score("j1", "t1", Round::One, 7.0);
    store.upsert_score(kept.clone()).await.unwrap();

    let mut bad = score("j1", "t3", Round::One, 6.0);
    bad.total += 1.0;
    let batch = vec![score("j1", "t1", Round::One, 9.0), score("j1", "t2", Round::One, 8.0), bad];
    let err = store.upsert_scores(batch).await.unwrap_err();
    assert!(matches!(err, StorageError::Integrity { kind: "score", .. }));

    let stored = store.list_scores(&ScoreFilter::all()).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].total, kept.total);

    let replaced = store
        .upsert_scores(vec![
            score("j1", "t1", Round::One, 9.0),
            score("j1", "t2", Round::One, 8.0),
        ])
        .await
        .unwrap();
    assert_eq!(replaced.len(), 2);
    assert_eq!(replaced[0].as_ref().map(|s| s.total), Some(kept.total));
    assert!(replaced[1].is_none());
    assert_eq!(store.list_scores(&ScoreFilter::all()).await.unwrap().len(), 2);
}

async fn racing_first_snapshots_contract<S: JudgingStore>(store: &S) {
    let a = ResultSnapshot::new(Round::Two, 1, Utc::now(), vec![result_row("t1", 40.0, 1)]).unwrap();
    let b = ResultSnapshot::new(Round::Two, 1, Utc::now(), vec![result_row("t2", 30.0, 1)]).unwrap();

    let (ra, rb) = tokio::join!(
        store.replace_snapshot(a, None),
        store.replace_snapshot(b, None)
    );
    let errors: Vec<StorageError> = [ra, rb].into_iter().filter_map(Result::err).collect();
    assert_eq!(errors.len(), 1);
    assert!(matches!(
        errors[0],
        StorageError::VersionConflict {
            expected: None,
            actual: Some(1),
            ..
        }
    ));

    let current = store.current_snapshot(Round::Two).await.unwrap().unwrap();
    assert_eq!(current.version, 1);
    assert_eq!(current.rows.len(), 1);
}

async fn snapshot_cas_contract<S: JudgingStore>(store: &S) {
    assert!(store.current_snapshot(Round::One).await.unwrap().is_none());

    let v1 = ResultSnapshot::new(
        Round::One,
        1,
        Utc::now(),
        vec![result_row("t1", 45.5, 1), result_row("t2", 40.5, 2)],
    )
    .unwrap();
    store.replace_snapshot(v1.clone(), None).await.unwrap();

    // A second writer that still believes no snapshot exists loses.
    let stale = ResultSnapshot::new(Round::One, 1, Utc::now(), vec![]).unwrap();
    let err = store.replace_snapshot(stale, None).await.unwrap_err();
    assert!(matches!(
        err,
        StorageError::VersionConflict {
            expected: None,
            actual: Some(1),
            ..
        }
    ));

    let v2 = ResultSnapshot::new(
        Round::One,
        2,
        Utc::now() + Duration::seconds(1),
        vec![result_row("t2", 50.5, 1)],
    )
    .unwrap();
    store.replace_snapshot(v2.clone(), Some(1)).await.unwrap();

    let current = store.current_snapshot(Round::One).await.unwrap().unwrap();
    assert_eq!(current.version, 2);
    assert_eq!(current.digest, v2.digest);
    assert_eq!(current.rows.len(), 1);
    assert!(store.current_snapshot(Round::Two).await.unwrap().is_none());
}

async fn snapshot_with_forged_digest_rejected_contract<S: JudgingStore>(store: &S) {
    let mut snapshot =
        ResultSnapshot::new(Round::Two, 1, Utc::now(), vec![result_row("t1", 30.5, 1)]).unwrap();
    snapshot.rows[0].total_score = 99.5;
    let err = store.replace_snapshot(snapshot, None).await.unwrap_err();
    assert!(matches!(err, StorageError::Integrity { .. }));
    assert!(store.current_snapshot(Round::Two).await.unwrap().is_none());
}

// ===========================================================================
// MemoryJudgingStore
// ===========================================================================

mod memory_store {
    use super::*;

    #[tokio::test]
    async fn team_crud() {
        team_crud_contract(&MemoryJudgingStore::new()).await;
    }

    #[tokio::test]
    async fn judge_code_uniqueness() {
        judge_code_uniqueness_contract(&MemoryJudgingStore::new()).await;
    }

    #[tokio::test]
    async fn domain_assignments() {
        domain_assignment_contract(&MemoryJudgingStore::new()).await;
    }

    #[tokio::test]
    async fn pair_allocations() {
        pair_allocation_contract(&MemoryJudgingStore::new()).await;
    }

    #[tokio::test]
    async fn score_upsert() {
        score_upsert_contract(&MemoryJudgingStore::new()).await;
    }

    #[tokio::test]
    async fn score_with_bad_total_rejected() {
        score_with_bad_total_rejected_contract(&MemoryJudgingStore::new()).await;
    }

    #[tokio::test]
    async fn score_batch_is_all_or_nothing() {
        score_batch_is_all_or_nothing_contract(&MemoryJudgingStore::new()).await;
    }

    #[tokio::test]
    async fn racing_first_snapshots() {
        racing_first_snapshots_contract(&MemoryJudgingStore::new()).await;
    }

    #[tokio::test]
    async fn snapshot_cas() {
        snapshot_cas_contract(&MemoryJudgingStore::new()).await;
    }

    #[tokio::test]
    async fn snapshot_with_forged_digest_rejected() {
        snapshot_with_forged_digest_rejected_contract(&MemoryJudgingStore::new()).await;
    }

    #[tokio::test]
    async fn unavailable_table_fails_with_backend_error() {
        let store = MemoryJudgingStore::new();
        store.set_unavailable("score", true);
        let err = store
            .list_scores(&ScoreFilter::all())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Backend(_)));

        // Other tables keep working.
        store.insert_team(team("t1", "agritech_rural")).await.unwrap();

        store.set_unavailable("score", false);
        assert!(store.list_scores(&ScoreFilter::all()).await.is_ok());
    }
}

// ===========================================================================
// SurrealJudgingStore (mirrors the MemoryJudgingStore tests above)
// ===========================================================================

mod surreal_store {
    use super::*;

    async fn store() -> SurrealJudgingStore {
        SurrealJudgingStore::in_memory()
            .await
            .expect("in_memory() failed")
    }

    #[tokio::test]
    async fn team_crud() {
        team_crud_contract(&store().await).await;
    }

    #[tokio::test]
    async fn judge_code_uniqueness() {
        judge_code_uniqueness_contract(&store().await).await;
    }

    #[tokio::test]
    async fn domain_assignments() {
        domain_assignment_contract(&store().await).await;
    }

    #[tokio::test]
    async fn pair_allocations() {
        pair_allocation_contract(&store().await).await;
    }

    #[tokio::test]
    async fn score_upsert() {
        score_upsert_contract(&store().await).await;
    }

    #[tokio::test]
    async fn score_with_bad_total_rejected() {
        score_with_bad_total_rejected_contract(&store().await).await;
    }

    #[tokio::test]
    async fn score_batch_is_all_or_nothing() {
        score_batch_is_all_or_nothing_contract(&store().await).await;
    }

    #[tokio::test]
    async fn racing_first_snapshots() {
        racing_first_snapshots_contract(&store().await).await;
    }

    #[tokio::test]
    async fn snapshot_cas() {
        snapshot_cas_contract(&store().await).await;
    }

    #[tokio::test]
    async fn snapshot_with_forged_digest_rejected() {
        snapshot_with_forged_digest_rejected_contract(&store().await).await;
    }
}
