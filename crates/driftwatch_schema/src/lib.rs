//! Driftwatch Schema Engine
//!
//! # Philosophy: the schema learns, the report tells
//!
//! A schema describes what a dataset is expected to look like: columns,
//! types, shapes, presence, categorical domains. Each batch of statistics is
//! reconciled against it:
//!
//! 1. **Create**: unseen columns become features (with a domain when they look categorical)
//! 2. **Reconcile**: known columns are compared; drift is absorbed into the schema
//! 3. **Report**: every absorbed difference is described, with a severity
//!
//! Drift is never a hard error. It shows up as a [`Description`] in the
//! [`UpdateReport`]. `Err` is reserved for broken inputs (corrupt schema
//! documents, statistics without observations, invalid configuration).
//!
//! # Modules
//!
//! - [`domain`]: shared string domains, unique naming, merging
//! - [`environment`]: which features apply to which environment
//! - [`updater`]: feature synthesis for new columns
//! - [`reconcile`]: per-column comparison and self-check
//! - [`schema`]: the aggregate tying it together
//! - [`config`]: `UpdateConfig` (TOML)
//!
//! [`Description`]: driftwatch_protocol::Description

pub mod config;
pub mod domain;
pub mod environment;
pub mod error;
pub mod reconcile;
pub mod report;
pub mod schema;
pub mod updater;

pub use config::{DriftPolicies, DriftPolicy, EnumsSimilarConfig, UpdateConfig};
pub use domain::{unique_name, DomainTable};
pub use environment::{applies, existence_required, EnvironmentScoped};
pub use error::{Result, SchemaError};
pub use reconcile::Reconciliation;
pub use report::{ColumnAnomaly, ColumnFailure, UpdateReport};
pub use schema::Schema;
pub use updater::Updater;

// Re-export the protocol types callers need alongside the engine
pub use driftwatch_protocol::{
    AnomalyKind, DataType, DatasetStatistics, DatasetStatsView, Description, Feature,
    FeaturePresence, FeatureStatistics, FeatureStatsView, SchemaDocument, Severity,
    SkewComparator, SparseFeature, StringDomain, ValueCount,
};
