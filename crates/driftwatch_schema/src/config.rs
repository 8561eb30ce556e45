//! Configuration for schema update passes

use driftwatch_protocol::Severity;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::error::{Result, SchemaError};

/// What to do with one category of drift evidence.
///
/// Either way the schema absorbs the evidence; the policy only decides
/// whether a `Description` is reported for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DriftPolicy {
    /// Absorb and report
    #[default]
    Flag,
    /// Absorb silently
    Widen,
}

/// Per-category drift policies, applied in this order during reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DriftPolicies {
    #[serde(default)]
    pub type_change: DriftPolicy,
    #[serde(default)]
    pub value_count: DriftPolicy,
    #[serde(default)]
    pub presence: DriftPolicy,
    #[serde(default)]
    pub new_values: DriftPolicy,
}

/// When two enums count as "similar" in `Schema::related_enum_groups`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumsSimilarConfig {
    /// Minimum Jaccard overlap (|A ∩ B| / |A ∪ B|) of the two value sets
    #[serde(default = "default_min_overlap")]
    pub min_overlap: f64,

    /// Both domains need at least this many values to be compared
    #[serde(default = "default_min_values")]
    pub min_values: usize,
}

fn default_min_overlap() -> f64 {
    0.5
}

fn default_min_values() -> usize {
    2
}

impl Default for EnumsSimilarConfig {
    fn default() -> Self {
        Self {
            min_overlap: default_min_overlap(),
            min_values: default_min_values(),
        }
    }
}

/// Configuration for `Schema::update` and friends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// Max distinct values for a new string column to become categorical
    #[serde(default = "default_enum_threshold")]
    pub enum_threshold: usize,

    /// Max L-infinity distance tolerated by skew comparators
    #[serde(default = "default_skew_threshold")]
    pub skew_threshold: f64,

    /// Severity raised when a previously unseen column is created.
    /// `UNKNOWN` turns new-column reporting off.
    #[serde(default = "default_new_column_severity")]
    pub new_column_severity: Severity,

    /// Columns never turned into features
    #[serde(default)]
    pub columns_to_ignore: BTreeSet<String>,

    /// column name -> group label; columns with the same label share one domain.
    /// A label naming a domain that already exists reuses that domain.
    #[serde(default)]
    pub grouped_enums: BTreeMap<String, String>,

    #[serde(default)]
    pub enum_similarity: EnumsSimilarConfig,

    #[serde(default)]
    pub drift: DriftPolicies,
}

fn default_enum_threshold() -> usize {
    20
}

fn default_skew_threshold() -> f64 {
    0.1
}

fn default_new_column_severity() -> Severity {
    Severity::Error
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            enum_threshold: default_enum_threshold(),
            skew_threshold: default_skew_threshold(),
            new_column_severity: default_new_column_severity(),
            columns_to_ignore: BTreeSet::new(),
            grouped_enums: BTreeMap::new(),
            enum_similarity: EnumsSimilarConfig::default(),
            drift: DriftPolicies::default(),
        }
    }
}

impl UpdateConfig {
    pub fn ignore_column(mut self, column: impl Into<String>) -> Self {
        self.columns_to_ignore.insert(column.into());
        self
    }

    pub fn group_enum(mut self, column: impl Into<String>, group: impl Into<String>) -> Self {
        self.grouped_enums.insert(column.into(), group.into());
        self
    }

    pub fn with_new_column_severity(mut self, severity: Severity) -> Self {
        self.new_column_severity = severity;
        self
    }

    pub fn with_drift(mut self, drift: DriftPolicies) -> Self {
        self.drift = drift;
        self
    }

    /// Reject thresholds that cannot mean anything.
    pub fn validate(&self) -> Result<()> {
        let overlap = self.enum_similarity.min_overlap;
        if !(0.0..=1.0).contains(&overlap) {
            return Err(SchemaError::Config(format!(
                "enum_similarity.min_overlap must be within [0, 1], got {}",
                overlap
            )));
        }
        if !self.skew_threshold.is_finite() || self.skew_threshold < 0.0 {
            return Err(SchemaError::Config(format!(
                "skew_threshold must be a non-negative number, got {}",
                self.skew_threshold
            )));
        }
        if let Some((column, _)) = self.grouped_enums.iter().find(|(_, label)| label.is_empty()) {
            return Err(SchemaError::Config(format!(
                "grouped_enums maps column '{}' to an empty group label",
                column
            )));
        }
        Ok(())
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: UpdateConfig =
            toml::from_str(content).map_err(|e| SchemaError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| SchemaError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = UpdateConfig::default();
        assert_eq!(config.enum_threshold, 20);
        assert_eq!(config.new_column_severity, Severity::Error);
        assert_eq!(config.drift.new_values, DriftPolicy::Flag);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = UpdateConfig::from_toml_str(
            r#"
            columns_to_ignore = ["row_id"]
            new_column_severity = "WARNING"

            [grouped_enums]
            ship_country = "country"
            bill_country = "country"

            [drift]
            presence = "widen"
            "#,
        )
        .unwrap();

        assert!(config.columns_to_ignore.contains("row_id"));
        assert_eq!(config.grouped_enums["bill_country"], "country");
        assert_eq!(config.new_column_severity, Severity::Warning);
        assert_eq!(config.drift.presence, DriftPolicy::Widen);
        assert_eq!(config.drift.type_change, DriftPolicy::Flag);
        assert_eq!(config.enum_threshold, 20);
    }

    #[test]
    fn test_invalid_overlap_rejected() {
        let err = UpdateConfig::from_toml_str("[enum_similarity]\nmin_overlap = 1.5\n").unwrap_err();
        assert!(matches!(err, SchemaError::Config(_)));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("update.toml");

        let config = UpdateConfig::default()
            .ignore_column("debug_blob")
            .group_enum("src_lang", "language")
            .with_new_column_severity(Severity::Unknown);
        config.save(&path).unwrap();

        let loaded = UpdateConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
