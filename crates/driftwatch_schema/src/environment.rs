//! Environment Policy
//!
//! An environment is a plain name tag ("TRAINING", "SERVING", ...). A feature
//! with an empty `in_environment` list applies everywhere; a non-empty list
//! is an allow-list. When no environment is selected nothing is filtered.

use driftwatch_protocol::{Feature, FeaturePresence, SparseFeature};

/// Anything with an environment allow-list and a presence constraint.
pub trait EnvironmentScoped {
    fn environments(&self) -> &[String];
    fn presence(&self) -> &FeaturePresence;
}

impl EnvironmentScoped for Feature {
    fn environments(&self) -> &[String] {
        &self.in_environment
    }

    fn presence(&self) -> &FeaturePresence {
        &self.presence
    }
}

impl EnvironmentScoped for SparseFeature {
    /// Sparse features are never environment-scoped.
    fn environments(&self) -> &[String] {
        &[]
    }

    fn presence(&self) -> &FeaturePresence {
        &self.presence
    }
}

/// Does `item` apply to data coming from `environment`?
pub fn applies<T: EnvironmentScoped + ?Sized>(item: &T, environment: Option<&str>) -> bool {
    let allowed = item.environments();
    match environment {
        _ if allowed.is_empty() => true,
        None => true,
        Some(env) => allowed.iter().any(|e| e == env),
    }
}

/// Must the column be present in data coming from `environment`?
pub fn existence_required<T: EnvironmentScoped + ?Sized>(
    item: &T,
    environment: Option<&str>,
) -> bool {
    applies(item, environment) && item.presence().is_required()
}
