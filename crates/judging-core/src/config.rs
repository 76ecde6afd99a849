//! Judging configuration.
//!
//! Loaded from TOML (every field optional, defaults below) and then
//! adjusted from the environment:
//!
//! ```toml
//! enforce_judge_type = true
//!
//! [rubric]
//! criterion_max = 10.0
//! bonus_max = 5.0
//!
//! [round_two]
//! promotion_cutoff = 3
//!
//! [[domains]]
//! key = "fintech_ecommerce"
//! name = "Fintech and E-commerce"
//! ```

use std::collections::HashSet;
use std::path::Path;

use judging_state::{DomainKey, DomainRecord, RubricScores};
use serde::{Deserialize, Serialize};

use crate::domain::{validate_identifier, JudgingError, Result};

/// Environment variable overriding `round_two.promotion_cutoff`.
pub const PROMOTION_CUTOFF_ENV: &str = "JUDGING_PROMOTION_CUTOFF";

/// Inclusive upper bounds for rubric fields. The lower bound is always 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RubricBounds {
    pub criterion_max: f64,
    pub bonus_max: f64,
}

impl Default for RubricBounds {
    fn default() -> Self {
        Self {
            criterion_max: 10.0,
            bonus_max: 5.0,
        }
    }
}

impl RubricBounds {
    /// Check every criterion against `criterion_max` and the bonus against
    /// `bonus_max`. NaN and infinities are rejected.
    pub fn check(&self, rubric: &RubricScores) -> Result<()> {
        for (name, value) in RubricScores::CRITERIA.iter().zip(rubric.criteria()) {
            check_field(name, value, self.criterion_max)?;
        }
        check_field("bonus", rubric.bonus, self.bonus_max)
    }

    /// Highest total a single judge can award.
    pub fn max_total(&self) -> f64 {
        self.criterion_max * RubricScores::CRITERIA.len() as f64 + self.bonus_max
    }
}

fn check_field(name: &str, value: f64, max: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 || value > max {
        return Err(JudgingError::validation(
            "rubric",
            format!("{name} = {value} is outside 0..={max}"),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoundTwoConfig {
    /// Teams ranked at or above this position in their domain qualify.
    pub promotion_cutoff: u32,
}

impl Default for RoundTwoConfig {
    fn default() -> Self {
        Self { promotion_cutoff: 3 }
    }
}

/// Top-level judging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgingConfig {
    pub rubric: RubricBounds,
    pub round_two: RoundTwoConfig,
    /// Internal judges only for Round 1 domains, External only for Round 2.
    pub enforce_judge_type: bool,
    /// Domain catalog, in display order.
    pub domains: Vec<DomainRecord>,
}

impl Default for JudgingConfig {
    fn default() -> Self {
        Self {
            rubric: RubricBounds::default(),
            round_two: RoundTwoConfig::default(),
            enforce_judge_type: true,
            domains: default_domains(),
        }
    }
}

/// The five tracks of the event.
pub fn default_domains() -> Vec<DomainRecord> {
    [
        ("fintech_ecommerce", "Fintech and E-commerce"),
        ("health_biotech", "Health and BioTech"),
        ("agritech_rural", "Agri-Tech & Rural Empowerment"),
        ("sustainable_smart_cities", "Sustainable solutions and smart cities"),
        ("skills_edtech", "Skills and Edtech"),
    ]
    .into_iter()
    .map(|(key, name)| DomainRecord {
        key: DomainKey::from(key),
        name: name.to_string(),
    })
    .collect()
}

impl JudgingConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: JudgingConfig =
            toml::from_str(raw).map_err(|e| JudgingError::Config(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            JudgingError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Apply environment overrides (currently `JUDGING_PROMOTION_CUTOFF`).
    pub fn with_env_overrides(self) -> Result<Self> {
        let cutoff = std::env::var(PROMOTION_CUTOFF_ENV).ok();
        self.with_cutoff_override(cutoff.as_deref())
    }

    /// Apply an optional raw promotion cutoff, e.g. from the environment.
    pub fn with_cutoff_override(mut self, raw: Option<&str>) -> Result<Self> {
        if let Some(raw) = raw {
            let cutoff = raw.trim().parse::<u32>().map_err(|e| {
                JudgingError::Config(format!("{PROMOTION_CUTOFF_ENV}={raw:?}: {e}"))
            })?;
            self.round_two.promotion_cutoff = cutoff;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, max) in [
            ("rubric.criterion_max", self.rubric.criterion_max),
            ("rubric.bonus_max", self.rubric.bonus_max),
        ] {
            if !max.is_finite() || max <= 0.0 {
                return Err(JudgingError::Config(format!(
                    "{name} must be finite and positive, got {max}"
                )));
            }
        }
        if self.round_two.promotion_cutoff == 0 {
            return Err(JudgingError::Config(
                "round_two.promotion_cutoff must be at least 1".to_string(),
            ));
        }
        if self.domains.is_empty() {
            return Err(JudgingError::Config("at least one domain is required".to_string()));
        }

        let mut seen = HashSet::new();
        for domain in &self.domains {
            validate_identifier("domain", domain.key.as_str())
                .map_err(|e| JudgingError::Config(e.to_string()))?;
            if domain.name.trim().is_empty() {
                return Err(JudgingError::Config(format!(
                    "domain {} has an empty name",
                    domain.key
                )));
            }
            if !seen.insert(domain.key.as_str()) {
                return Err(JudgingError::Config(format!(
                    "duplicate domain key {}",
                    domain.key
                )));
            }
        }
        Ok(())
    }
}
