//! Update pass results

use driftwatch_protocol::{Description, Severity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything reported for one column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnAnomaly {
    pub descriptions: Vec<Description>,
    pub severity: Severity,
}

/// A column that could not be processed. The rest of the pass went on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnFailure {
    pub column: String,
    pub reason: String,
}

/// Result of `Schema::update` / `Schema::update_columns` / `Schema::check`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateReport {
    /// column -> anomalies, only for columns that reported something
    pub anomalies: BTreeMap<String, ColumnAnomaly>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ColumnFailure>,

    /// Worst severity over every column
    pub severity: Severity,

    /// Features created during the pass
    pub columns_created: usize,

    /// Columns looked at (created, reconciled, or skipped as deprecated)
    pub columns_processed: usize,
}

impl UpdateReport {
    /// Nothing reported and nothing failed.
    pub fn is_clean(&self) -> bool {
        self.anomalies.is_empty() && self.failures.is_empty()
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn descriptions_for(&self, column: &str) -> &[Description] {
        self.anomalies
            .get(column)
            .map(|a| a.descriptions.as_slice())
            .unwrap_or(&[])
    }

    /// Record anomalies for `column`, merging with anything already there.
    pub(crate) fn record(
        &mut self,
        column: &str,
        descriptions: Vec<Description>,
        severity: Severity,
    ) {
        if descriptions.is_empty() && severity == Severity::Unknown {
            return;
        }
        self.severity.raise(severity);
        let entry = self.anomalies.entry(column.to_string()).or_default();
        entry.severity.raise(severity);
        entry.descriptions.extend(descriptions);
    }

    pub(crate) fn record_failure(&mut self, column: &str, reason: impl Into<String>) {
        self.failures.push(ColumnFailure {
            column: column.to_string(),
            reason: reason.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftwatch_protocol::AnomalyKind;

    #[test]
    fn test_record_merges_and_raises() {
        let mut report = UpdateReport::default();
        assert!(report.is_clean());

        report.record(
            "a",
            vec![Description::new(AnomalyKind::ValueCountChanged, "x", "y")],
            Severity::Warning,
        );
        report.record(
            "a",
            vec![Description::new(AnomalyKind::UnexpectedType, "x", "y")],
            Severity::Error,
        );
        report.record("b", Vec::new(), Severity::Unknown);

        assert_eq!(report.severity, Severity::Error);
        assert_eq!(report.descriptions_for("a").len(), 2);
        assert!(report.descriptions_for("b").is_empty());
        assert!(!report.anomalies.contains_key("b"));
    }

    #[test]
    fn test_report_serializes() {
        let mut report = UpdateReport::default();
        report.record_failure("bad", "no observations");
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"failures\""));
        assert!(json.contains("\"severity\":\"UNKNOWN\""));
        assert!(report.has_failures());
    }
}
