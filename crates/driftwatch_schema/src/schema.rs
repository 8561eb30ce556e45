//! The schema aggregate
//!
//! [`Schema`] owns features, sparse features, the domain table and the list of
//! known environments. Every mutation goes through `&mut self`; a failed
//! `init` or a failed column creation leaves the schema as it was.
//!
//! # Update pass
//!
//! For each column of the statistics:
//!
//! - ignored or sparse: skipped
//! - known and deprecated: skipped silently
//! - known: self-checked, then reconciled against the statistics
//! - unknown: a feature is synthesized by the [`Updater`]
//!
//! Required columns without statistics are reported as `missing_column`.
//! A column that cannot be processed is recorded as a failure and the pass
//! continues with the next one.

use driftwatch_protocol::{
    AnomalyKind, DatasetStatsView, Description, Feature, FeatureStatsView, SchemaDocument,
    Severity, SkewComparator, SparseFeature, StringDomain, SCHEMA_DOCUMENT_VERSION,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info, warn};

use crate::config::{EnumsSimilarConfig, UpdateConfig};
use crate::domain::DomainTable;
use crate::environment::existence_required;
use crate::error::{Result, SchemaError};
use crate::reconcile::{reconcile, self_check, update_skew};
use crate::report::UpdateReport;
use crate::updater::Updater;

#[derive(Debug, Clone, Default)]
pub struct Schema {
    features: Vec<Feature>,
    feature_index: HashMap<String, usize>,
    sparse_features: Vec<SparseFeature>,
    sparse_index: HashMap<String, usize>,
    domains: DomainTable,
    environments: Vec<String>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for `Schema::new()` followed by `init(doc)`.
    pub fn from_document(doc: SchemaDocument) -> Result<Self> {
        let mut schema = Self::new();
        schema.init(doc)?;
        Ok(schema)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Load a persisted document into an empty schema.
    ///
    /// Rejects duplicate names (features and sparse features share one
    /// namespace) and references to unknown domains. Remaining
    /// inconsistencies are repaired by the self-check.
    pub fn init(&mut self, doc: SchemaDocument) -> Result<()> {
        if !self.is_empty() {
            return Err(SchemaError::AlreadyInitialized);
        }

        let mut staged = Schema::new();
        for domain in doc.string_domains {
            staged.domains.insert(domain)?;
        }

        for sparse in doc.sparse_features {
            if sparse.name.is_empty() {
                return Err(SchemaError::InvalidSchema(
                    "sparse feature name cannot be empty".to_string(),
                ));
            }
            if staged.sparse_index.contains_key(&sparse.name) {
                return Err(SchemaError::InvalidSchema(format!(
                    "duplicate sparse feature name: '{}'",
                    sparse.name
                )));
            }
            staged
                .sparse_index
                .insert(sparse.name.clone(), staged.sparse_features.len());
            staged.sparse_features.push(sparse);
        }

        for feature in doc.features {
            if feature.name.is_empty() {
                return Err(SchemaError::InvalidSchema(
                    "feature name cannot be empty".to_string(),
                ));
            }
            if staged.feature_index.contains_key(&feature.name) {
                return Err(SchemaError::InvalidSchema(format!(
                    "duplicate feature name: '{}'",
                    feature.name
                )));
            }
            if staged.sparse_index.contains_key(&feature.name) {
                return Err(SchemaError::InvalidSchema(format!(
                    "name '{}' is used by both a feature and a sparse feature",
                    feature.name
                )));
            }
            if let Some(domain) = &feature.domain {
                if !staged.domains.contains(domain) {
                    return Err(SchemaError::InvalidSchema(format!(
                        "feature '{}' references unknown string domain '{}'",
                        feature.name, domain
                    )));
                }
            }
            staged.insert_feature(feature);
        }

        for env in doc.environments {
            staged.register_environment(&env);
        }

        for feature in staged.features.iter_mut() {
            for fix in self_check(feature, &staged.domains) {
                debug!(column = %feature.name, fix = %fix, "Repaired feature on load");
            }
        }

        *self = staged;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
            && self.sparse_features.is_empty()
            && self.domains.is_empty()
            && self.environments.is_empty()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Owned copy of the schema with every domain alias resolved.
    pub fn snapshot(&self) -> SchemaDocument {
        let features = self
            .features
            .iter()
            .cloned()
            .map(|mut feature| {
                if let Some(domain) = feature.domain.as_mut() {
                    *domain = self.domains.resolve(domain).to_string();
                }
                feature
            })
            .collect();

        SchemaDocument {
            version: SCHEMA_DOCUMENT_VERSION,
            features,
            sparse_features: self.sparse_features.clone(),
            string_domains: self.domains.to_vec(),
            environments: self.environments.clone(),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn feature(&self, name: &str) -> Option<&Feature> {
        self.feature_index.get(name).map(|&idx| &self.features[idx])
    }

    pub fn sparse_feature(&self, name: &str) -> Option<&SparseFeature> {
        self.sparse_index.get(name).map(|&idx| &self.sparse_features[idx])
    }

    /// Domain by name, following merge aliases.
    pub fn domain(&self, name: &str) -> Option<&StringDomain> {
        self.domains.get_existing(name)
    }

    /// Domain a feature draws its values from.
    pub fn domain_of(&self, feature: &str) -> Option<&StringDomain> {
        self.feature(feature)
            .and_then(|f| f.domain.as_deref())
            .and_then(|d| self.domains.get_existing(d))
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn sparse_features(&self) -> &[SparseFeature] {
        &self.sparse_features
    }

    pub fn domains(&self) -> &DomainTable {
        &self.domains
    }

    pub fn environments(&self) -> &[String] {
        &self.environments
    }

    pub(crate) fn domains_mut(&mut self) -> &mut DomainTable {
        &mut self.domains
    }

    pub(crate) fn insert_feature(&mut self, feature: Feature) {
        self.feature_index
            .insert(feature.name.clone(), self.features.len());
        self.features.push(feature);
    }

    fn register_environment(&mut self, env: &str) {
        if !self.environments.iter().any(|e| e == env) {
            self.environments.push(env.to_string());
        }
    }

    // ========================================================================
    // Update
    // ========================================================================

    /// Reconcile the schema against every column of `stats`.
    pub fn update(
        &mut self,
        stats: &DatasetStatsView<'_>,
        config: &UpdateConfig,
    ) -> Result<UpdateReport> {
        self.run_update(stats, config, None)
    }

    /// Like [`Schema::update`], restricted to `columns`. Listed columns
    /// without statistics are skipped.
    pub fn update_columns(
        &mut self,
        stats: &DatasetStatsView<'_>,
        config: &UpdateConfig,
        columns: &[&str],
    ) -> Result<UpdateReport> {
        let subset: BTreeSet<&str> = columns.iter().copied().collect();
        self.run_update(stats, config, Some(&subset))
    }

    /// Report what `update` would report, without touching this schema.
    pub fn check(&self, stats: &DatasetStatsView<'_>, config: &UpdateConfig) -> Result<UpdateReport> {
        let mut scratch = self.clone();
        scratch.update(stats, config)
    }

    fn run_update(
        &mut self,
        stats: &DatasetStatsView<'_>,
        config: &UpdateConfig,
        subset: Option<&BTreeSet<&str>>,
    ) -> Result<UpdateReport> {
        config.validate()?;
        let mut updater = Updater::new(config.clone());
        let mut report = UpdateReport::default();
        let in_scope = |name: &str| subset.map_or(true, |s| s.contains(name));

        for view in stats.features() {
            let name = view.name();
            if !in_scope(name) {
                continue;
            }
            let mut descriptions = Vec::new();
            let mut severity = Severity::Unknown;
            let known = self.features.len();

            match self.update_column(
                &mut updater,
                &view,
                stats.environment(),
                &mut descriptions,
                &mut severity,
            ) {
                Ok(()) => {
                    report.columns_processed += 1;
                    report.columns_created += self.features.len() - known;
                    report.record(name, descriptions, severity);
                }
                Err(e) => {
                    warn!(column = name, error = %e, "Skipping column");
                    report.record_failure(name, e.to_string());
                }
            }
        }

        if let Some(subset) = subset {
            for column in subset.iter().filter(|c| !stats.contains(c)) {
                debug!(column = *column, "No statistics for requested column");
            }
        }

        for column in self.missing_required_columns(stats) {
            if !in_scope(column.as_str()) || updater.is_ignored(&column) {
                continue;
            }
            let description = Description::new(
                AnomalyKind::MissingColumn,
                "Column missing",
                format!(
                    "Required column '{}' has no statistics in dataset '{}'.",
                    column,
                    stats.name()
                ),
            );
            report.record(&column, vec![description], Severity::Error);
        }

        if let Some(env) = stats.environment() {
            self.register_environment(env);
        }

        info!(
            dataset = stats.name(),
            environment = ?stats.environment(),
            processed = report.columns_processed,
            created = report.columns_created,
            failures = report.failures.len(),
            severity = %report.severity,
            "Schema update pass complete"
        );
        Ok(report)
    }

    /// Create or reconcile the feature for one column.
    ///
    /// Descriptions are appended to `descriptions` and `severity` is only
    /// ever raised.
    pub fn update_column(
        &mut self,
        updater: &mut Updater,
        view: &FeatureStatsView<'_>,
        env: Option<&str>,
        descriptions: &mut Vec<Description>,
        severity: &mut Severity,
    ) -> Result<()> {
        let name = view.name();
        if updater.is_ignored(name) || self.sparse_index.contains_key(name) {
            return Ok(());
        }

        if let Some(&idx) = self.feature_index.get(name) {
            let feature = &mut self.features[idx];
            if feature.deprecated {
                return Ok(());
            }
            if view.is_empty() {
                return Err(SchemaError::invalid_statistics(name, "no observations"));
            }

            let fixes = self_check(feature, &self.domains);
            if !fixes.is_empty() {
                severity.raise(Severity::Warning);
                descriptions.extend(fixes);
            }

            let outcome = reconcile(view, env, feature, &mut self.domains, &updater.config().drift);
            if !outcome.is_empty() {
                debug!(
                    column = name,
                    anomalies = outcome.descriptions.len(),
                    severity = %outcome.severity,
                    "Reconciled column"
                );
            }
            severity.raise(outcome.severity);
            descriptions.extend(outcome.descriptions);
            return Ok(());
        }

        let mut created = Severity::Unknown;
        updater.create_column(view, self, &mut created)?;
        if created > Severity::Unknown {
            descriptions.push(Description::new(
                AnomalyKind::NewColumn,
                "New column",
                format!("New column '{}' found in data but not in the schema.", name),
            ));
            severity.raise(created);
        }
        Ok(())
    }

    /// Mark a feature or sparse feature as deprecated. Returns false if no
    /// such name exists.
    pub fn deprecate(&mut self, name: &str) -> bool {
        if let Some(&idx) = self.feature_index.get(name) {
            self.features[idx].deprecated = true;
            return true;
        }
        if let Some(&idx) = self.sparse_index.get(name) {
            self.sparse_features[idx].deprecated = true;
            return true;
        }
        false
    }

    /// Required columns (or sparse features with a missing bound column)
    /// absent from `stats`, in schema order.
    pub fn missing_required_columns(&self, stats: &DatasetStatsView<'_>) -> Vec<String> {
        let env = stats.environment();
        let mut missing: Vec<String> = self
            .features
            .iter()
            .filter(|f| !f.deprecated && existence_required(*f, env) && !stats.contains(&f.name))
            .map(|f| f.name.clone())
            .collect();

        missing.extend(
            self.sparse_features
                .iter()
                .filter(|s| !s.deprecated && existence_required(*s, env))
                .filter(|s| s.columns().any(|c| !stats.contains(c)))
                .map(|s| s.name.clone()),
        );
        missing
    }

    // ========================================================================
    // Enum similarity and merging
    // ========================================================================

    /// domain name -> features using it. Aliases are resolved.
    pub fn enum_name_to_columns(&self) -> BTreeMap<String, BTreeSet<String>> {
        let mut users: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for feature in &self.features {
            if let Some(domain) = &feature.domain {
                users
                    .entry(self.domains.resolve(domain).to_string())
                    .or_default()
                    .insert(feature.name.clone());
            }
        }
        users
    }

    /// Groups of domains whose value sets overlap enough to be the same enum.
    ///
    /// Two domains are linked when both have at least `min_values` values and
    /// their Jaccard overlap is at least `min_overlap`; groups are the
    /// connected components with two or more members.
    pub fn similar_enum_types(&self, config: &EnumsSimilarConfig) -> Vec<BTreeSet<String>> {
        let candidates: Vec<(&str, BTreeSet<&str>)> = self
            .domains
            .iter()
            .filter(|d| d.values.len() >= config.min_values)
            .map(|d| (d.name.as_str(), d.values.iter().map(String::as_str).collect()))
            .collect();

        let mut parent: Vec<usize> = (0..candidates.len()).collect();
        for i in 0..candidates.len() {
            for j in (i + 1)..candidates.len() {
                if jaccard(&candidates[i].1, &candidates[j].1) >= config.min_overlap {
                    let (a, b) = (find_root(&mut parent, i), find_root(&mut parent, j));
                    if a != b {
                        parent[b] = a;
                    }
                }
            }
        }

        let mut components: BTreeMap<usize, BTreeSet<String>> = BTreeMap::new();
        for (idx, (name, _)) in candidates.iter().enumerate() {
            let root = find_root(&mut parent, idx);
            components.entry(root).or_default().insert(name.to_string());
        }
        let mut groups: Vec<BTreeSet<String>> = components
            .into_values()
            .filter(|group| group.len() >= 2)
            .collect();
        groups.sort();
        groups
    }

    /// Suggest column groupings for a future update.
    ///
    /// Builds a throwaway schema from `stats`, finds similar enums and writes
    /// `column -> group label` into `config.grouped_enums` (existing entries
    /// win). Nothing is merged.
    pub fn related_enum_groups(stats: &DatasetStatsView<'_>, config: &mut UpdateConfig) -> Result<()> {
        let mut scratch = Schema::new();
        scratch.update(stats, config)?;

        let users = scratch.enum_name_to_columns();
        for group in scratch.similar_enum_types(&config.enum_similarity) {
            let label = match group.iter().next() {
                Some(label) => label.clone(),
                None => continue,
            };
            for domain in &group {
                for column in users.get(domain).into_iter().flatten() {
                    config
                        .grouped_enums
                        .entry(column.clone())
                        .or_insert_with(|| label.clone());
                }
            }
        }
        debug!(groups = config.grouped_enums.len(), "Computed related enum groups");
        Ok(())
    }

    /// Merge candidates for the live schema. Apply with [`Schema::apply_merges`].
    pub fn propose_merges(&self, config: &EnumsSimilarConfig) -> Vec<BTreeSet<String>> {
        self.similar_enum_types(config)
    }

    /// Merge each group into its first (smallest) name. Every name is checked
    /// before anything changes. Returns how many domains were absorbed.
    pub fn apply_merges(&mut self, groups: &[BTreeSet<String>]) -> Result<usize> {
        if let Some(unknown) = groups
            .iter()
            .flatten()
            .find(|name| !self.domains.contains(name))
        {
            return Err(SchemaError::InvalidSchema(format!(
                "cannot merge unknown string domain '{}'",
                unknown
            )));
        }

        let mut absorbed = 0;
        for group in groups {
            let mut names = group.iter();
            let target = match names.next() {
                Some(target) => target,
                None => continue,
            };
            let sources: Vec<String> = names.cloned().collect();
            absorbed += self.domains.merge(target, &sources)?;
        }
        info!(absorbed, remaining = self.domains.len(), "Merged string domains");
        Ok(absorbed)
    }

    // ========================================================================
    // Skew
    // ========================================================================

    /// Attach an empty skew comparator; the next observation becomes its reference.
    pub fn enable_skew_comparator(&mut self, name: &str) -> Result<()> {
        let idx = *self
            .feature_index
            .get(name)
            .ok_or_else(|| SchemaError::UnknownFeature(name.to_string()))?;
        let feature = &mut self.features[idx];
        if feature.skew_comparator.is_none() {
            feature.skew_comparator = Some(SkewComparator::default());
        }
        Ok(())
    }

    /// Run the skew comparator of the feature matching `view`, if any.
    pub fn update_skew_comparator(&mut self, view: &FeatureStatsView<'_>, threshold: f64) -> Vec<Description> {
        match self.feature_index.get(view.name()) {
            Some(&idx) => update_skew(view, &mut self.features[idx], threshold),
            None => Vec::new(),
        }
    }

    /// Run every skew comparator against `stats`. Only columns that reported
    /// something appear in the result.
    pub fn update_skew_comparators(
        &mut self,
        stats: &DatasetStatsView<'_>,
        config: &UpdateConfig,
    ) -> Result<BTreeMap<String, Vec<Description>>> {
        config.validate()?;
        let mut found = BTreeMap::new();
        for view in stats.features() {
            let descriptions = self.update_skew_comparator(&view, config.skew_threshold);
            if !descriptions.is_empty() {
                found.insert(view.name().to_string(), descriptions);
            }
        }
        Ok(found)
    }
}

fn jaccard(a: &BTreeSet<&str>, b: &BTreeSet<&str>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

fn find_root(parent: &mut [usize], mut idx: usize) -> usize {
    while parent[idx] != idx {
        parent[idx] = parent[parent[idx]];
        idx = parent[idx];
    }
    idx
}
