//! Property tests for naming, idempotence and severity accumulation.

use driftwatch_schema::{
    AnomalyKind, DataType, DatasetStatistics, DatasetStatsView, DomainTable, FeatureStatistics,
    Schema, Severity, UpdateConfig,
};
use proptest::prelude::*;
use std::collections::HashSet;

fn data_type() -> impl Strategy<Value = DataType> {
    prop::sample::select(DataType::all())
}

/// Columns named `col0..colN` so that two generated datasets overlap.
fn dataset() -> impl Strategy<Value = DatasetStatistics> {
    let column = (
        data_type(),
        prop::option::of(data_type()),
        1u64..100,
        0u64..10,
        prop::collection::vec(prop::sample::select(vec!["a", "b", "c", "d", "e"]), 0..5),
    );
    prop::collection::vec(column, 1..8).prop_map(|columns| {
        let mut stats = DatasetStatistics::new("generated", 0);
        for (idx, (first, second, present, missing, values)) in columns.into_iter().enumerate() {
            let mut feature = FeatureStatistics::new(format!("col{}", idx))
                .with_type(first, present)
                .with_missing(missing);
            if let Some(second) = second {
                feature = feature.with_type(second, 1);
            }
            feature = feature.with_values(values.into_iter().map(|v| (v, 1u64)));
            stats.num_examples = stats.num_examples.max(feature.num_present + missing);
            stats.features.push(feature);
        }
        stats
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn test_get_new_names_are_unique(candidates in prop::collection::vec("[a-c]{1,2}[0-9]?", 1..40)) {
        let mut table = DomainTable::new();
        let mut issued = HashSet::new();
        for candidate in &candidates {
            let name = table.get_new(candidate).name.clone();
            prop_assert!(name.starts_with(candidate.as_str()));
            prop_assert!(issued.insert(name.clone()), "name {} issued twice", name);
        }
        prop_assert_eq!(table.len(), candidates.len());
    }

    #[test]
    fn test_update_is_idempotent(first in dataset(), second in dataset()) {
        let config = UpdateConfig::default();
        let mut schema = Schema::new();
        schema.update(&DatasetStatsView::new(&first), &config).unwrap();
        schema.update(&DatasetStatsView::new(&second), &config).unwrap();
        let fingerprint = schema.snapshot().fingerprint();

        let again = schema.update(&DatasetStatsView::new(&second), &config).unwrap();
        for anomaly in again.anomalies.values() {
            for description in &anomaly.descriptions {
                prop_assert_eq!(description.kind, AnomalyKind::MissingColumn);
            }
        }
        prop_assert_eq!(again.columns_created, 0);
        prop_assert_eq!(schema.snapshot().fingerprint(), fingerprint);
    }

    #[test]
    fn test_report_severity_is_worst_column(first in dataset(), second in dataset()) {
        let config = UpdateConfig::default().with_new_column_severity(Severity::Warning);
        let mut schema = Schema::new();
        schema.update(&DatasetStatsView::new(&first), &config).unwrap();
        let report = schema.update(&DatasetStatsView::new(&second), &config).unwrap();

        let worst = report
            .anomalies
            .values()
            .map(|a| a.severity)
            .max()
            .unwrap_or(Severity::Unknown);
        prop_assert_eq!(report.severity, worst);
        for anomaly in report.anomalies.values() {
            prop_assert!(!anomaly.descriptions.is_empty());
        }
    }

    #[test]
    fn test_snapshot_roundtrip_after_updates(first in dataset(), second in dataset()) {
        let config = UpdateConfig::default();
        let mut schema = Schema::new();
        schema.update(&DatasetStatsView::new(&first), &config).unwrap();
        schema.update(&DatasetStatsView::new(&second), &config).unwrap();

        let doc = schema.snapshot();
        let restored = Schema::from_document(doc.clone()).unwrap();
        prop_assert_eq!(restored.snapshot(), doc);
    }
}
