//! Column Factory
//!
//! Turns the statistics of a previously unseen column into a new [`Feature`]
//! (and, for categorical columns, a string domain). One [`Updater`] lives for
//! one update pass and remembers every domain identifier it handed out.

use driftwatch_protocol::{
    field_identifier, DataType, Feature, FeaturePresence, FeatureStatsView, Severity, ValueCount,
    LARGE_VALUE_PLACEHOLDER,
};
use std::collections::BTreeSet;
use tracing::debug;

use crate::config::UpdateConfig;
use crate::domain::unique_name;
use crate::error::{Result, SchemaError};
use crate::schema::Schema;

/// Where a new categorical column gets its values from.
enum DomainPlan {
    /// Shared domain named by a `grouped_enums` label
    Grouped(String),
    /// Fresh domain minted from this identifier
    Fresh(String),
}

/// Per-pass column factory.
#[derive(Debug, Clone)]
pub struct Updater {
    config: UpdateConfig,
    issued_identifiers: BTreeSet<String>,
    grouped_labels: BTreeSet<String>,
}

impl Updater {
    pub fn new(config: UpdateConfig) -> Self {
        Self {
            config,
            issued_identifiers: BTreeSet::new(),
            grouped_labels: BTreeSet::new(),
        }
    }

    pub fn config(&self) -> &UpdateConfig {
        &self.config
    }

    pub fn is_ignored(&self, column: &str) -> bool {
        self.config.columns_to_ignore.contains(column)
    }

    /// Would a column with these statistics get a string domain?
    pub fn is_categorical(&self, view: &FeatureStatsView<'_>, data_type: DataType) -> bool {
        let distinct = view.num_distinct();
        data_type == DataType::String
            && distinct > 0
            && distinct <= self.config.enum_threshold
            && !view.has_large_values()
    }

    /// Create a feature for the unseen column described by `view`.
    ///
    /// Everything is computed before the schema is touched, so an error
    /// leaves `schema` as it was. Ignored columns are a no-op.
    pub fn create_column(
        &mut self,
        view: &FeatureStatsView<'_>,
        schema: &mut Schema,
        severity: &mut Severity,
    ) -> Result<()> {
        let name = view.name();
        if self.is_ignored(name) {
            return Ok(());
        }
        if name.is_empty() {
            return Err(SchemaError::invalid_statistics(name, "column name is empty"));
        }
        if view.is_empty() {
            return Err(SchemaError::invalid_statistics(name, "no observations"));
        }
        let data_type = view
            .observed_type()
            .ok_or_else(|| SchemaError::invalid_statistics(name, "no observed data type"))?;

        let mut feature = Feature::new(name, data_type);
        if view.max_num_values() > 0 {
            feature.value_count = Some(ValueCount::new(
                view.min_num_values(),
                view.max_num_values(),
            ));
        }
        feature.presence = if view.num_missing() == 0 {
            FeaturePresence::required()
        } else {
            FeaturePresence::optional().with_min_fraction(view.presence_fraction())
        };

        let plan = if self.is_categorical(view, data_type) {
            Some(self.plan_domain(name))
        } else {
            None
        };

        if let Some(plan) = plan {
            let domains = schema.domains_mut();
            let domain_name = match plan {
                DomainPlan::Grouped(label) => {
                    if domains.contains(&label) && !self.grouped_labels.contains(&label) {
                        debug!(
                            column = name,
                            domain = %label,
                            "Grouped column joins a domain its label did not create"
                        );
                    }
                    self.grouped_labels.insert(label.clone());
                    domains.get_or_create(&label).name.clone()
                }
                DomainPlan::Fresh(identifier) => domains.get_new(&identifier).name.clone(),
            };
            domains.extend(
                &domain_name,
                view.distinct_values().filter(|v| *v != LARGE_VALUE_PLACEHOLDER),
            );
            feature.domain = Some(domain_name);
        }

        debug!(
            column = name,
            data_type = %feature.data_type,
            domain = ?feature.domain,
            required = feature.presence.is_required(),
            "Created feature for new column"
        );
        schema.insert_feature(feature);
        severity.raise(self.config.new_column_severity);
        Ok(())
    }

    fn plan_domain(&mut self, column: &str) -> DomainPlan {
        if let Some(label) = self.config.grouped_enums.get(column) {
            return DomainPlan::Grouped(label.clone());
        }
        let identifier = unique_name(&field_identifier(column), |n| {
            self.issued_identifiers.contains(n)
        });
        self.issued_identifiers.insert(identifier.clone());
        DomainPlan::Fresh(identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftwatch_protocol::FeatureStatistics;

    fn categorical(name: &str) -> FeatureStatistics {
        FeatureStatistics::new(name)
            .with_type(DataType::String, 10)
            .with_values([("red", 6), ("blue", 4)])
    }

    #[test]
    fn test_creates_required_categorical_feature() {
        let stats = categorical("Color");
        let mut schema = Schema::new();
        let mut severity = Severity::Unknown;
        let mut updater = Updater::new(UpdateConfig::default());

        updater
            .create_column(&FeatureStatsView::new(&stats), &mut schema, &mut severity)
            .unwrap();

        let feature = schema.feature("Color").unwrap();
        assert_eq!(feature.data_type, DataType::String);
        assert!(feature.presence.is_required());
        assert_eq!(feature.value_count, Some(ValueCount::scalar()));
        assert_eq!(feature.domain.as_deref(), Some("color"));
        assert_eq!(schema.domain("color").unwrap().values, vec!["red", "blue"]);
        assert_eq!(severity, Severity::Error);
    }

    #[test]
    fn test_identifiers_unique_within_session() {
        let first = categorical("color");
        let second = categorical("COLOR");
        let mut schema = Schema::new();
        let mut severity = Severity::Unknown;
        let mut updater = Updater::new(UpdateConfig::default());

        for stats in [&first, &second] {
            updater
                .create_column(&FeatureStatsView::new(stats), &mut schema, &mut severity)
                .unwrap();
        }
        assert_eq!(schema.feature("color").unwrap().domain.as_deref(), Some("color"));
        assert_eq!(schema.feature("COLOR").unwrap().domain.as_deref(), Some("color2"));
    }

    #[test]
    fn test_grouped_columns_share_domain() {
        let ship = FeatureStatistics::new("ship_country")
            .with_type(DataType::String, 3)
            .with_values([("US", 2), ("FR", 1)]);
        let bill = FeatureStatistics::new("bill_country")
            .with_type(DataType::String, 3)
            .with_values([("DE", 3)]);
        let config = UpdateConfig::default()
            .group_enum("ship_country", "country")
            .group_enum("bill_country", "country");
        let mut schema = Schema::new();
        let mut severity = Severity::Unknown;
        let mut updater = Updater::new(config);

        for stats in [&ship, &bill] {
            updater
                .create_column(&FeatureStatsView::new(stats), &mut schema, &mut severity)
                .unwrap();
        }
        assert_eq!(schema.domains().len(), 1);
        assert_eq!(schema.domain("country").unwrap().values, vec!["US", "FR", "DE"]);
    }

    #[test]
    fn test_grouped_label_reuses_existing_domain() {
        let color = categorical("color");
        let shade = FeatureStatistics::new("shade")
            .with_type(DataType::String, 2)
            .with_values([("green", 2)]);
        let mut schema = Schema::new();
        let mut severity = Severity::Unknown;
        let mut updater = Updater::new(UpdateConfig::default().group_enum("shade", "color"));

        for stats in [&color, &shade] {
            updater
                .create_column(&FeatureStatsView::new(stats), &mut schema, &mut severity)
                .unwrap();
        }
        assert_eq!(schema.domains().len(), 1);
        assert_eq!(schema.feature("shade").unwrap().domain.as_deref(), Some("color"));
        assert_eq!(
            schema.domain("color").unwrap().values,
            vec!["red", "blue", "green"]
        );
    }

    #[test]
    fn test_mixed_types_take_covering_type() {
        let stats = FeatureStatistics::new("when")
            .with_type(DataType::Int64, 99)
            .with_type(DataType::Date, 1);
        let mut schema = Schema::new();
        let mut severity = Severity::Unknown;
        let mut updater = Updater::new(UpdateConfig::default());

        updater
            .create_column(&FeatureStatsView::new(&stats), &mut schema, &mut severity)
            .unwrap();
        assert_eq!(schema.feature("when").unwrap().data_type, DataType::String);
    }

    #[test]
    fn test_large_values_block_enum() {
        let stats = FeatureStatistics::new("comment")
            .with_type(DataType::String, 4)
            .with_values([("ok", 2), (LARGE_VALUE_PLACEHOLDER, 2)]);
        let mut schema = Schema::new();
        let mut severity = Severity::Unknown;
        let mut updater = Updater::new(UpdateConfig::default());

        updater
            .create_column(&FeatureStatsView::new(&stats), &mut schema, &mut severity)
            .unwrap();
        assert!(schema.feature("comment").unwrap().domain.is_none());
        assert!(schema.domains().is_empty());
    }

    #[test]
    fn test_optional_presence_from_missing_count() {
        let stats = FeatureStatistics::new("score")
            .with_type(DataType::Float64, 3)
            .with_missing(1);
        let mut schema = Schema::new();
        let mut severity = Severity::Unknown;
        let mut updater =
            Updater::new(UpdateConfig::default().with_new_column_severity(Severity::Unknown));

        updater
            .create_column(&FeatureStatsView::new(&stats), &mut schema, &mut severity)
            .unwrap();
        let feature = schema.feature("score").unwrap();
        assert!(!feature.presence.is_required());
        assert!((feature.presence.min_fraction - 0.75).abs() < 1e-9);
        assert_eq!(severity, Severity::Unknown);
    }

    #[test]
    fn test_invalid_statistics_leave_schema_untouched() {
        let stats = FeatureStatistics::new("ghost");
        let mut schema = Schema::new();
        let mut severity = Severity::Unknown;
        let mut updater = Updater::new(UpdateConfig::default());

        let err = updater
            .create_column(&FeatureStatsView::new(&stats), &mut schema, &mut severity)
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidStatistics { .. }));
        assert!(schema.is_empty());
        assert_eq!(severity, Severity::Unknown);
    }

    #[test]
    fn test_ignored_column_is_noop() {
        let stats = categorical("row_id");
        let mut schema = Schema::new();
        let mut severity = Severity::Unknown;
        let mut updater = Updater::new(UpdateConfig::default().ignore_column("row_id"));

        updater
            .create_column(&FeatureStatsView::new(&stats), &mut schema, &mut severity)
            .unwrap();
        assert!(schema.is_empty());
        assert_eq!(severity, Severity::Unknown);
    }
}
