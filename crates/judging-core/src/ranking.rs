//! Pure aggregation and dense ranking.
//!
//! A team's aggregate total is the mean of its per-judge totals, divided by
//! the number of judges who actually scored it. Ordering: aggregate total
//! desc, then innovation-creativity mean desc, then market-impact mean desc.
//! Teams equal on all three share a rank and are listed by team id.

use std::cmp::Ordering;

use judging_state::{DomainKey, RoundResultRecord, RubricScores, ScoreRecord, TeamId, TeamRecord};

/// A team's aggregated scores before ranking.
#[derive(Debug, Clone, PartialEq)]
pub struct TeamAggregate {
    pub team_id: TeamId,
    pub team_name: String,
    pub domain_key: DomainKey,
    pub total_score: f64,
    pub breakdown: RubricScores,
    pub judges_scored: u32,
}

impl TeamAggregate {
    /// Aggregate one team's scores. Scores are summed in judge-id order so
    /// the result does not depend on the order the ledger returned them.
    /// A team without scores aggregates to zero.
    pub fn from_scores(team: &TeamRecord, scores: &[&ScoreRecord]) -> Self {
        let mut ordered: Vec<&ScoreRecord> = scores.to_vec();
        ordered.sort_by(|a, b| a.judge_id.cmp(&b.judge_id));

        let n = ordered.len();
        let (total_score, breakdown) = if n == 0 {
            (0.0, RubricScores::default())
        } else {
            let count = n as f64;
            let mean = |field: fn(&RubricScores) -> f64| {
                ordered.iter().map(|s| field(&s.rubric)).sum::<f64>() / count
            };
            let breakdown = RubricScores {
                problem_identification: mean(|r: &RubricScores| r.problem_identification),
                innovation_creativity: mean(|r: &RubricScores| r.innovation_creativity),
                feasibility_practicality: mean(|r: &RubricScores| r.feasibility_practicality),
                market_impact_potential: mean(|r: &RubricScores| r.market_impact_potential),
                technology_domain_relevance: mean(|r: &RubricScores| r.technology_domain_relevance),
                pitch_delivery_qa: mean(|r: &RubricScores| r.pitch_delivery_qa),
                bonus: mean(|r: &RubricScores| r.bonus),
            };
            let total = ordered.iter().map(|s| s.rubric.total()).sum::<f64>() / count;
            (total, breakdown)
        };

        Self {
            team_id: team.id.clone(),
            team_name: team.name.clone(),
            domain_key: team.domain_key.clone(),
            total_score,
            breakdown,
            judges_scored: n as u32,
        }
    }

    fn rank_key(&self) -> [f64; 3] {
        [
            self.total_score,
            self.breakdown.innovation_creativity,
            self.breakdown.market_impact_potential,
        ]
    }
}

/// Ordering used for ranking: better teams first, team id last.
pub fn compare(a: &TeamAggregate, b: &TeamAggregate) -> Ordering {
    let (ka, kb) = (a.rank_key(), b.rank_key());
    kb[0]
        .total_cmp(&ka[0])
        .then_with(|| kb[1].total_cmp(&ka[1]))
        .then_with(|| kb[2].total_cmp(&ka[2]))
        .then_with(|| a.team_id.cmp(&b.team_id))
}

/// Sort and assign 1-based dense ranks.
pub fn rank_dense(mut aggregates: Vec<TeamAggregate>) -> Vec<RoundResultRecord> {
    aggregates.sort_by(compare);

    let mut rows = Vec::with_capacity(aggregates.len());
    let mut rank = 0u32;
    let mut previous: Option<[f64; 3]> = None;
    for agg in aggregates {
        let key = agg.rank_key();
        if previous != Some(key) {
            rank += 1;
            previous = Some(key);
        }
        rows.push(RoundResultRecord {
            domain_key: agg.domain_key,
            team_id: agg.team_id,
            team_name: agg.team_name,
            total_score: agg.total_score,
            breakdown: agg.breakdown,
            judges_scored: agg.judges_scored,
            rank,
        });
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use judging_state::{JudgeId, Round};

    fn team(id: &str) -> TeamRecord {
        TeamRecord {
            id: TeamId::from(id),
            name: format!("Team {id}"),
            domain_key: DomainKey::from("d"),
            problem_statement: "p".to_string(),
            idea_description: None,
            created_at: Utc::now(),
        }
    }

    /// A score whose total is `total`, carried entirely by problem
    /// identification unless tie-break fields are given.
    fn score(judge: &str, team: &str, total: f64, innovation: f64, market: f64) -> ScoreRecord {
        ScoreRecord::new(
            JudgeId::from(judge),
            TeamId::from(team),
            DomainKey::from("d"),
            Round::One,
            RubricScores {
                problem_identification: total - innovation - market,
                innovation_creativity: innovation,
                market_impact_potential: market,
                ..RubricScores::default()
            },
            Utc::now(),
        )
    }

    fn aggregate(id: &str, scores: &[ScoreRecord]) -> TeamAggregate {
        let refs: Vec<&ScoreRecord> = scores.iter().collect();
        TeamAggregate::from_scores(&team(id), &refs)
    }

    #[test]
    fn test_mean_over_judges_who_scored() {
        let t1 = aggregate("t1", &[score("j1", "t1", 8.0, 0.0, 0.0), score("j2", "t1", 9.0, 0.0, 0.0)]);
        assert_eq!(t1.total_score, 8.5);
        assert_eq!(t1.judges_scored, 2);

        let t2 = aggregate("t2", &[score("j1", "t2", 7.0, 0.0, 0.0)]);
        assert_eq!(t2.total_score, 7.0);

        let rows = rank_dense(vec![t2, t1]);
        assert_eq!(rows[0].team_id, TeamId::from("t1"));
        assert_eq!(rows[0].rank, 1);
        assert_eq!(rows[1].team_id, TeamId::from("t2"));
        assert_eq!(rows[1].rank, 2);
    }

    #[test]
    fn test_distinct_totals_get_ranks_one_to_n() {
        let aggs: Vec<TeamAggregate> = (1..=5)
            .map(|i| aggregate(&format!("t{i}"), &[score("j", "x", i as f64, 0.0, 0.0)]))
            .collect();
        let rows = rank_dense(aggs);
        let ranks: Vec<u32> = rows.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4, 5]);
        assert_eq!(rows[0].team_id, TeamId::from("t5"));
    }

    #[test]
    fn test_tie_broken_by_innovation_then_market() {
        let a = aggregate("a", &[score("j", "a", 20.0, 5.0, 5.0)]);
        let b = aggregate("b", &[score("j", "b", 20.0, 7.0, 1.0)]);
        let c = aggregate("c", &[score("j", "c", 20.0, 5.0, 6.0)]);
        let rows = rank_dense(vec![a, b, c]);
        let order: Vec<&str> = rows.iter().map(|r| r.team_id.as_str()).collect();
        assert_eq!(order, vec!["b", "c", "a"]);
        let ranks: Vec<u32> = rows.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
    }

    #[test]
    fn test_full_tie_shares_dense_rank_ordered_by_id() {
        let z = aggregate("z", &[score("j", "z", 30.0, 5.0, 5.0)]);
        let m = aggregate("m", &[score("j", "m", 30.0, 5.0, 5.0)]);
        let low = aggregate("low", &[score("j", "low", 10.0, 1.0, 1.0)]);
        let rows = rank_dense(vec![z, low, m]);
        let view: Vec<(&str, u32)> = rows.iter().map(|r| (r.team_id.as_str(), r.rank)).collect();
        assert_eq!(view, vec![("m", 1), ("z", 1), ("low", 2)]);
    }

    #[test]
    fn test_unscored_team_aggregates_to_zero() {
        let empty = aggregate("t", &[]);
        assert_eq!(empty.total_score, 0.0);
        assert_eq!(empty.judges_scored, 0);
        assert_eq!(empty.breakdown, RubricScores::default());
    }

    #[test]
    fn test_aggregate_independent_of_input_order() {
        let s1 = score("j1", "t", 7.3, 1.1, 2.2);
        let s2 = score("j2", "t", 9.1, 3.3, 0.7);
        let s3 = score("j3", "t", 4.9, 0.2, 0.9);
        let forward = aggregate("t", &[s1.clone(), s2.clone(), s3.clone()]);
        let reverse = aggregate("t", &[s3, s2, s1]);
        assert_eq!(forward, reverse);
        assert_eq!(forward.total_score.to_bits(), reverse.total_score.to_bits());
    }
}
