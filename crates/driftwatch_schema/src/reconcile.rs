//! Feature Reconciler
//!
//! Compares one column's statistics against its [`Feature`] and folds the
//! difference back into the feature. Evidence is always absorbed, so running
//! the same statistics twice reports nothing the second time. The
//! [`DriftPolicy`] of each category only decides whether the first run
//! reports it.
//!
//! Categories are checked in a fixed order:
//!
//! 1. data type
//! 2. values per example
//! 3. presence
//! 4. domain values

use driftwatch_protocol::{
    AnomalyKind, DataType, Description, Feature, FeatureStatsView, Severity, ValueCount,
    LARGE_VALUE_PLACEHOLDER,
};
use std::collections::BTreeSet;

use crate::config::{DriftPolicies, DriftPolicy};
use crate::domain::DomainTable;
use crate::environment;

/// Slack for comparing observed and declared presence fractions.
const PRESENCE_EPSILON: f64 = 1e-9;

/// How many new domain values a description spells out.
const MAX_LISTED_VALUES: usize = 10;

/// Outcome of reconciling one column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    pub descriptions: Vec<Description>,
    pub severity: Severity,
}

impl Reconciliation {
    pub fn is_empty(&self) -> bool {
        self.descriptions.is_empty()
    }

    fn report(&mut self, policy: DriftPolicy, severity: Severity, description: Description) {
        if policy == DriftPolicy::Widen {
            return;
        }
        self.severity.raise(severity);
        self.descriptions.push(description);
    }
}

/// Type changes that keep every value meaningful.
pub fn is_widening(from: DataType, to: DataType) -> bool {
    DataType::is_lossless_widening(from, to) || to == DataType::String
}

/// Repair internal inconsistencies of a feature in place.
///
/// Returns one description per repair; an empty result means the feature
/// was already consistent.
pub fn self_check(feature: &mut Feature, domains: &DomainTable) -> Vec<Description> {
    let mut fixes = Vec::new();
    let name = feature.name.clone();

    if let Some(domain) = feature.domain.clone() {
        if !domains.contains(&domain) {
            feature.domain = None;
            fixes.push(Description::new(
                AnomalyKind::DanglingDomain,
                "Unknown string domain",
                format!("Column '{}' referenced missing domain '{}'; reference dropped.", name, domain),
            ));
        } else if !feature.data_type.is_string_like() {
            feature.domain = None;
            fixes.push(Description::new(
                AnomalyKind::DomainTypeConflict,
                "Domain on non-string column",
                format!(
                    "Column '{}' has type {} but referenced domain '{}'; reference dropped.",
                    name, feature.data_type, domain
                ),
            ));
        }
    }

    if let Some(count) = feature.value_count.as_mut() {
        if count.min > count.max {
            let old_max = count.max;
            count.max = count.min;
            fixes.push(Description::new(
                AnomalyKind::InvalidValueCount,
                "Invalid value count",
                format!(
                    "Column '{}' declared min {} > max {}; max raised to {}.",
                    name, count.min, old_max, count.min
                ),
            ));
        }
    }

    let fraction = feature.presence.min_fraction;
    if !(0.0..=1.0).contains(&fraction) {
        let clamped = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 1.0) };
        feature.presence.min_fraction = clamped;
        fixes.push(Description::new(
            AnomalyKind::InvalidPresence,
            "Invalid presence fraction",
            format!(
                "Column '{}' declared min_fraction {}; clamped to {}.",
                name, fraction, clamped
            ),
        ));
    }

    let mut seen = BTreeSet::new();
    let before = feature.in_environment.len();
    feature.in_environment.retain(|env| seen.insert(env.clone()));
    if feature.in_environment.len() != before {
        fixes.push(Description::new(
            AnomalyKind::DuplicateEnvironment,
            "Duplicate environment",
            format!("Column '{}' listed an environment more than once; duplicates removed.", name),
        ));
    }

    fixes
}

/// Reconcile `feature` against the statistics in `view`.
///
/// `env` is the environment the statistics came from; presence is only
/// checked where the feature applies.
pub fn reconcile(
    view: &FeatureStatsView<'_>,
    env: Option<&str>,
    feature: &mut Feature,
    domains: &mut DomainTable,
    policies: &DriftPolicies,
) -> Reconciliation {
    let mut outcome = Reconciliation::default();
    let name = view.name();

    // 1. Data type
    if let Some(observed) = view.observed_type() {
        let declared = feature.data_type;
        let unified = declared.unify(observed);
        if unified != declared {
            feature.data_type = unified;
            let severity = if is_widening(declared, unified) {
                Severity::Warning
            } else {
                Severity::Error
            };
            outcome.report(
                policies.type_change,
                severity,
                Description::new(
                    AnomalyKind::UnexpectedType,
                    "Unexpected data type",
                    format!(
                        "Column '{}' declared {} but {} values were observed; type is now {}.",
                        name, declared, observed, unified
                    ),
                ),
            );
        }
    }

    // 2. Values per example
    if view.num_present() > 0 {
        if let Some(count) = feature.value_count.as_mut() {
            let (min, max) = (view.min_num_values(), view.max_num_values());
            if !count.contains(min, max) {
                let old = *count;
                *count = ValueCount::new(count.min.min(min), count.max.max(max));
                outcome.report(
                    policies.value_count,
                    Severity::Warning,
                    Description::new(
                        AnomalyKind::ValueCountChanged,
                        "Value count changed",
                        format!(
                            "Column '{}' expected {}..={} values per example but saw {}..={}; range widened to {}..={}.",
                            name, old.min, old.max, min, max, count.min, count.max
                        ),
                    ),
                );
            }
        }
    }

    // 3. Presence
    if environment::applies(&*feature, env) && !view.is_empty() {
        let fraction = view.presence_fraction();
        let expected = feature.presence.min_fraction;
        if fraction + PRESENCE_EPSILON < expected {
            feature.presence.min_fraction = fraction;
            let severity = if feature.presence.is_required() {
                Severity::Error
            } else {
                Severity::Warning
            };
            outcome.report(
                policies.presence,
                severity,
                Description::new(
                    AnomalyKind::PresenceBelowThreshold,
                    "Column dropped",
                    format!(
                        "Column '{}' present in {:.4} of examples, expected at least {:.4}; threshold relaxed.",
                        name, fraction, expected
                    ),
                ),
            );
        }
    }

    // 4. Domain values
    if let Some(domain) = feature.domain.clone() {
        let added = domains
            .extend(
                &domain,
                view.distinct_values().filter(|v| *v != LARGE_VALUE_PLACEHOLDER),
            )
            .unwrap_or_default();
        if !added.is_empty() {
            let listed: Vec<&str> = added
                .iter()
                .take(MAX_LISTED_VALUES)
                .map(String::as_str)
                .collect();
            let more = added.len().saturating_sub(MAX_LISTED_VALUES);
            let suffix = if more > 0 {
                format!(" (and {} more)", more)
            } else {
                String::new()
            };
            outcome.report(
                policies.new_values,
                Severity::Error,
                Description::new(
                    AnomalyKind::UnexpectedStringValues,
                    "Unexpected string values",
                    format!(
                        "Column '{}' has values outside domain '{}': {}{}.",
                        name,
                        domains.resolve(&domain),
                        listed.join(", "),
                        suffix
                    ),
                ),
            );
        }
    }

    outcome
}

/// Compare the current value distribution against the feature's skew reference.
///
/// A comparator without a reference records the current distribution and
/// reports nothing.
pub fn update_skew(
    view: &FeatureStatsView<'_>,
    feature: &mut Feature,
    threshold: f64,
) -> Vec<Description> {
    let comparator = match feature.skew_comparator.as_mut() {
        Some(comparator) => comparator,
        None => return Vec::new(),
    };
    let current = view.value_distribution();
    if current.is_empty() {
        return Vec::new();
    }
    if !comparator.is_established() {
        comparator.reference = current;
        return Vec::new();
    }

    let keys: BTreeSet<&String> = comparator.reference.keys().chain(current.keys()).collect();
    let mut worst: Option<(&String, f64)> = None;
    for key in keys {
        let expected = comparator.reference.get(key).copied().unwrap_or(0.0);
        let observed = current.get(key).copied().unwrap_or(0.0);
        let diff = (expected - observed).abs();
        if worst.map_or(true, |(_, d)| diff > d) {
            worst = Some((key, diff));
        }
    }

    match worst {
        Some((value, distance)) if distance > threshold => vec![Description::new(
            AnomalyKind::SkewDivergence,
            "High L-infinity distance",
            format!(
                "Column '{}' distance {:.4} exceeds threshold {:.4}; most affected value: '{}'.",
                feature.name, distance, threshold, value
            ),
        )],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftwatch_protocol::{FeatureStatistics, SkewComparator, StringDomain};

    fn domains_with(name: &str, values: &[&str]) -> DomainTable {
        let mut table = DomainTable::new();
        table
            .insert(StringDomain::new(name).with_values(values.iter().copied()))
            .unwrap();
        table
    }

    #[test]
    fn test_self_check_repairs() {
        let mut feature = Feature::new("amount", DataType::Int64)
            .with_domain("ghost")
            .with_value_count(ValueCount::new(3, 1))
            .in_environments(["TRAINING", "TRAINING"]);
        feature.presence.min_fraction = 1.5;

        let fixes = self_check(&mut feature, &DomainTable::new());
        let kinds: Vec<AnomalyKind> = fixes.iter().map(|d| d.kind).collect();
        assert_eq!(
            kinds,
            vec![
                AnomalyKind::DanglingDomain,
                AnomalyKind::InvalidValueCount,
                AnomalyKind::InvalidPresence,
                AnomalyKind::DuplicateEnvironment,
            ]
        );
        assert_eq!(feature.domain, None);
        assert_eq!(feature.value_count, Some(ValueCount::new(3, 3)));
        assert_eq!(feature.presence.min_fraction, 1.0);
        assert_eq!(feature.in_environment, vec!["TRAINING"]);
        assert!(self_check(&mut feature, &DomainTable::new()).is_empty());
    }

    #[test]
    fn test_self_check_domain_type_conflict() {
        let domains = domains_with("codes", &["1"]);
        let mut feature = Feature::new("code", DataType::Int64).with_domain("codes");
        let fixes = self_check(&mut feature, &domains);
        assert_eq!(fixes[0].kind, AnomalyKind::DomainTypeConflict);
        assert_eq!(feature.domain, None);
    }

    #[test]
    fn test_type_widening_is_warning_and_absorbed() {
        let stats = FeatureStatistics::new("amount").with_type(DataType::Float64, 5);
        let view = FeatureStatsView::new(&stats);
        let mut feature = Feature::required("amount", DataType::Int64);
        let mut domains = DomainTable::new();
        let policies = DriftPolicies::default();

        let first = reconcile(&view, None, &mut feature, &mut domains, &policies);
        assert_eq!(first.severity, Severity::Warning);
        assert_eq!(first.descriptions[0].kind, AnomalyKind::UnexpectedType);
        assert_eq!(feature.data_type, DataType::Float64);

        let second = reconcile(&view, None, &mut feature, &mut domains, &policies);
        assert!(second.is_empty());
    }

    #[test]
    fn test_incompatible_type_is_error() {
        let stats = FeatureStatistics::new("flag").with_type(DataType::Binary, 5);
        let view = FeatureStatsView::new(&stats);
        let mut feature = Feature::new("flag", DataType::Boolean);
        let outcome = reconcile(
            &view,
            None,
            &mut feature,
            &mut DomainTable::new(),
            &DriftPolicies::default(),
        );
        assert_eq!(outcome.severity, Severity::Error);
        assert_eq!(feature.data_type, DataType::Binary);
    }

    #[test]
    fn test_new_domain_values_flagged_then_absorbed() {
        let stats = FeatureStatistics::new("color")
            .with_type(DataType::String, 3)
            .with_values([("red", 1), ("green", 2)]);
        let view = FeatureStatsView::new(&stats);
        let mut feature = Feature::required("color", DataType::String).with_domain("color");
        let mut domains = domains_with("color", &["red"]);
        let policies = DriftPolicies::default();

        let first = reconcile(&view, None, &mut feature, &mut domains, &policies);
        assert_eq!(first.severity, Severity::Error);
        assert_eq!(first.descriptions.len(), 1);
        assert!(first.descriptions[0].description.contains("green"));
        assert_eq!(domains.get_existing("color").unwrap().values, vec!["red", "green"]);

        assert!(reconcile(&view, None, &mut feature, &mut domains, &policies).is_empty());
    }

    #[test]
    fn test_widen_policy_absorbs_silently() {
        let stats = FeatureStatistics::new("tags")
            .with_type(DataType::String, 4)
            .with_num_values(1, 5)
            .with_missing(4);
        let view = FeatureStatsView::new(&stats);
        let mut feature = Feature::required("tags", DataType::String)
            .with_value_count(ValueCount::new(1, 3));
        let policies = DriftPolicies {
            value_count: DriftPolicy::Widen,
            presence: DriftPolicy::Widen,
            ..Default::default()
        };

        let outcome = reconcile(&view, None, &mut feature, &mut DomainTable::new(), &policies);
        assert!(outcome.is_empty());
        assert_eq!(outcome.severity, Severity::Unknown);
        assert_eq!(feature.value_count, Some(ValueCount::new(1, 5)));
        assert!((feature.presence.min_fraction - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_presence_skipped_outside_environment() {
        let stats = FeatureStatistics::new("label")
            .with_type(DataType::Int64, 1)
            .with_missing(9);
        let view = FeatureStatsView::new(&stats);
        let mut feature = Feature::required("label", DataType::Int64).in_environments(["TRAINING"]);
        let policies = DriftPolicies::default();

        let serving = reconcile(&view, Some("SERVING"), &mut feature, &mut DomainTable::new(), &policies);
        assert!(serving.is_empty());

        let training =
            reconcile(&view, Some("TRAINING"), &mut feature, &mut DomainTable::new(), &policies);
        assert_eq!(training.severity, Severity::Error);
        assert_eq!(training.descriptions[0].kind, AnomalyKind::PresenceBelowThreshold);
    }

    #[test]
    fn test_skew_establishes_then_compares() {
        let baseline = FeatureStatistics::new("lang")
            .with_type(DataType::String, 10)
            .with_values([("en", 5), ("fr", 5)]);
        let shifted = FeatureStatistics::new("lang")
            .with_type(DataType::String, 10)
            .with_values([("en", 9), ("fr", 1)]);
        let mut feature =
            Feature::new("lang", DataType::String).with_skew_comparator(SkewComparator::default());

        assert!(update_skew(&FeatureStatsView::new(&baseline), &mut feature, 0.1).is_empty());
        assert!(feature.skew_comparator.as_ref().unwrap().is_established());

        let found = update_skew(&FeatureStatsView::new(&shifted), &mut feature, 0.1);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, AnomalyKind::SkewDivergence);
        assert!(update_skew(&FeatureStatsView::new(&baseline), &mut feature, 0.1).is_empty());
    }

    #[test]
    fn test_no_comparator_no_skew() {
        let stats = FeatureStatistics::new("lang")
            .with_type(DataType::String, 1)
            .with_values([("en", 1)]);
        let mut feature = Feature::new("lang", DataType::String);
        assert!(update_skew(&FeatureStatsView::new(&stats), &mut feature, 0.0).is_empty());
        assert!(feature.skew_comparator.is_none());
    }
}
