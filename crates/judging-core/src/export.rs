//! Delimited-text export of round results.
//!
//! One row per team. The column order is fixed; downstream tooling relies on
//! it staying the same across calculations.

use std::path::Path;

use anyhow::Context;
use judging_state::{ResultSnapshot, RoundResultRecord};

use crate::registry::DomainRegistry;

/// Header row of every export.
pub const CSV_HEADER: [&str; 14] = [
    "rank",
    "team_id",
    "team_name",
    "domain_key",
    "domain_name",
    "problem_identification",
    "innovation_creativity",
    "feasibility_practicality",
    "market_impact_potential",
    "technology_domain_relevance",
    "pitch_delivery_qa",
    "bonus",
    "total_score",
    "judges_scored",
];

/// Quote a field if it contains the delimiter, a quote or a line break.
fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

fn render_row(registry: &DomainRegistry, row: &RoundResultRecord) -> String {
    let b = &row.breakdown;
    let means = [
        b.problem_identification,
        b.innovation_creativity,
        b.feasibility_practicality,
        b.market_impact_potential,
        b.technology_domain_relevance,
        b.pitch_delivery_qa,
        b.bonus,
        row.total_score,
    ];

    let mut fields = vec![
        row.rank.to_string(),
        csv_field(row.team_id.as_str()),
        csv_field(&row.team_name),
        csv_field(row.domain_key.as_str()),
        csv_field(registry.name_of(&row.domain_key).unwrap_or_default()),
    ];
    fields.extend(means.iter().map(|m| format!("{m:.2}")));
    fields.push(row.judges_scored.to_string());
    fields.join(",")
}

/// Render a snapshot as CSV, rows in snapshot order, `\n` line endings.
pub fn render_results_csv(registry: &DomainRegistry, snapshot: &ResultSnapshot) -> String {
    let mut out = CSV_HEADER.join(",");
    out.push('\n');
    for row in &snapshot.rows {
        out.push_str(&render_row(registry, row));
        out.push('\n');
    }
    out
}

/// Render and write to `path`, replacing any existing file.
pub fn write_results_csv(
    path: &Path,
    registry: &DomainRegistry,
    snapshot: &ResultSnapshot,
) -> anyhow::Result<()> {
    let csv = render_results_csv(registry, snapshot);
    std::fs::write(path, csv)
        .with_context(|| format!("failed to write {} export to {}", snapshot.round, path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use judging_state::{DomainKey, Round, RubricScores, TeamId};

    fn row(team: &str, name: &str, rank: u32) -> RoundResultRecord {
        RoundResultRecord {
            domain_key: DomainKey::from("agritech_rural"),
            team_id: TeamId::from(team),
            team_name: name.to_string(),
            total_score: 41.0 / 3.0,
            breakdown: RubricScores {
                problem_identification: 8.5,
                innovation_creativity: 7.0,
                bonus: 1.0,
                ..RubricScores::default()
            },
            judges_scored: 3,
            rank,
        }
    }

    #[test]
    fn test_header_and_row_layout() {
        let snapshot = ResultSnapshot::new(
            Round::One,
            1,
            Utc::now(),
            vec![row("agri-01", "Soil Sense", 1)],
        )
        .unwrap();
        let csv = render_results_csv(&DomainRegistry::default(), &snapshot);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            "rank,team_id,team_name,domain_key,domain_name,problem_identification,\
             innovation_creativity,feasibility_practicality,market_impact_potential,\
             technology_domain_relevance,pitch_delivery_qa,bonus,total_score,judges_scored"
        );
        assert_eq!(
            lines[1],
            "1,agri-01,Soil Sense,agritech_rural,Agri-Tech & Rural Empowerment,\
             8.50,7.00,0.00,0.00,0.00,0.00,1.00,13.67,3"
        );
    }

    #[test]
    fn test_fields_with_delimiters_are_quoted() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("Seeds, Inc"), "\"Seeds, Inc\"");
        assert_eq!(csv_field("The \"Best\""), "\"The \"\"Best\"\"\"");
        assert_eq!(csv_field("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn test_write_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("round_one.csv");
        let snapshot =
            ResultSnapshot::new(Round::One, 1, Utc::now(), vec![row("t", "A, B", 1)]).unwrap();
        write_results_csv(&path, &DomainRegistry::default(), &snapshot).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("rank,team_id"));
        assert!(written.contains("\"A, B\""));
    }
}
