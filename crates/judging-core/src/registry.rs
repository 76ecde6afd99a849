//! Domain registry: the immutable catalog of scoring domains.

use judging_state::{DomainKey, DomainRecord};

use crate::config::{default_domains, JudgingConfig};
use crate::domain::{JudgingError, Result};

/// Fixed key → name catalog, built once and never mutated.
///
/// Catalog order is the stable order for every per-domain listing.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainRegistry {
    domains: Vec<DomainRecord>,
}

impl DomainRegistry {
    /// Build from a validated configuration.
    pub fn from_config(config: &JudgingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            domains: config.domains.clone(),
        })
    }

    pub fn get(&self, key: &DomainKey) -> Option<&DomainRecord> {
        self.domains.iter().find(|d| d.key == *key)
    }

    /// Like [`get`](Self::get) but fails with `NotFound`.
    pub fn require(&self, key: &DomainKey) -> Result<&DomainRecord> {
        self.get(key)
            .ok_or_else(|| JudgingError::not_found("domain", key))
    }

    pub fn name_of(&self, key: &DomainKey) -> Option<&str> {
        self.get(key).map(|d| d.name.as_str())
    }

    pub fn contains(&self, key: &DomainKey) -> bool {
        self.get(key).is_some()
    }

    /// All domains in catalog order.
    pub fn list(&self) -> &[DomainRecord] {
        &self.domains
    }

    pub fn keys(&self) -> impl Iterator<Item = &DomainKey> {
        self.domains.iter().map(|d| &d.key)
    }

    /// Catalog position, used to order per-domain output.
    pub fn position(&self, key: &DomainKey) -> Option<usize> {
        self.domains.iter().position(|d| d.key == *key)
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}

impl Default for DomainRegistry {
    fn default() -> Self {
        Self {
            domains: default_domains(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog_order_and_lookup() {
        let registry = DomainRegistry::default();
        let keys: Vec<&str> = registry.keys().map(|k| k.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "fintech_ecommerce",
                "health_biotech",
                "agritech_rural",
                "sustainable_smart_cities",
                "skills_edtech"
            ]
        );
        assert_eq!(
            registry.name_of(&DomainKey::from("agritech_rural")),
            Some("Agri-Tech & Rural Empowerment")
        );
        assert_eq!(registry.position(&DomainKey::from("skills_edtech")), Some(4));
    }

    #[test]
    fn test_require_unknown_domain_is_not_found() {
        let registry = DomainRegistry::default();
        let err = registry.require(&DomainKey::from("space")).unwrap_err();
        assert!(matches!(err, JudgingError::NotFound { kind: "domain", .. }));
        assert!(!registry.contains(&DomainKey::from("space")));
    }

    #[test]
    fn test_from_config_rejects_invalid_catalog() {
        let config = JudgingConfig {
            domains: vec![],
            ..JudgingConfig::default()
        };
        assert!(DomainRegistry::from_config(&config).is_err());
    }
}
