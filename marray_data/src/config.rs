//! Tunable knobs for a [[crate::Replica]].

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Configuration for a [[crate::Replica]]: position arithmetic defaults and an
/// optional value comparator for `keep_sorted`.
///
/// Defaults match the documented values: `initial_index = 1000.0`,
/// `index_spacing = 1000.0`, `auto_reindex = true`, `reindex_threshold = 1e-4`,
/// `keep_sorted = false`.
pub struct ReplicaConfig<T> {
    pub(crate) initial_index: f64,
    pub(crate) index_spacing: f64,
    pub(crate) auto_reindex: bool,
    pub(crate) reindex_threshold: f64,
    pub(crate) keep_sorted: bool,
    pub(crate) comparator: Option<Arc<dyn Fn(&T, &T) -> Ordering + Send + Sync>>,
}

impl<T> Default for ReplicaConfig<T> {
    fn default() -> Self {
        Self {
            initial_index: 1000.0,
            index_spacing: 1000.0,
            auto_reindex: true,
            reindex_threshold: 1e-4,
            keep_sorted: false,
            comparator: None,
        }
    }
}

impl<T> Clone for ReplicaConfig<T> {
    fn clone(&self) -> Self {
        Self {
            initial_index: self.initial_index,
            index_spacing: self.index_spacing,
            auto_reindex: self.auto_reindex,
            reindex_threshold: self.reindex_threshold,
            keep_sorted: self.keep_sorted,
            comparator: self.comparator.clone(),
        }
    }
}

impl<T> fmt::Debug for ReplicaConfig<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicaConfig")
            .field("initial_index", &self.initial_index)
            .field("index_spacing", &self.index_spacing)
            .field("auto_reindex", &self.auto_reindex)
            .field("reindex_threshold", &self.reindex_threshold)
            .field("keep_sorted", &self.keep_sorted)
            .field("comparator", &self.comparator.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl<T> ReplicaConfig<T> {
    pub fn builder() -> ReplicaConfigBuilder<T> {
        ReplicaConfigBuilder::default()
    }

    pub fn initial_index(&self) -> f64 {
        self.initial_index
    }

    pub fn index_spacing(&self) -> f64 {
        self.index_spacing
    }

    pub fn auto_reindex(&self) -> bool {
        self.auto_reindex
    }

    pub fn reindex_threshold(&self) -> f64 {
        self.reindex_threshold
    }

    pub fn keep_sorted(&self) -> bool {
        self.keep_sorted
    }

    pub(crate) fn comparator(&self) -> Option<&(dyn Fn(&T, &T) -> Ordering + Send + Sync)> {
        self.comparator.as_deref()
    }
}

/// Builder for [[ReplicaConfig]], in the style of the teacher's own multi-field
/// service configs.
pub struct ReplicaConfigBuilder<T> {
    config: ReplicaConfig<T>,
}

impl<T> Default for ReplicaConfigBuilder<T> {
    fn default() -> Self {
        Self {
            config: ReplicaConfig::default(),
        }
    }
}

impl<T> ReplicaConfigBuilder<T> {
    pub fn initial_index(mut self, value: f64) -> Self {
        self.config.initial_index = value;
        self
    }

    pub fn index_spacing(mut self, value: f64) -> Self {
        self.config.index_spacing = value;
        self
    }

    pub fn auto_reindex(mut self, value: bool) -> Self {
        self.config.auto_reindex = value;
        self
    }

    pub fn reindex_threshold(mut self, value: f64) -> Self {
        self.config.reindex_threshold = value;
        self
    }

    pub fn keep_sorted(mut self, value: bool) -> Self {
        self.config.keep_sorted = value;
        self
    }

    pub fn comparator(
        mut self,
        comparator: impl Fn(&T, &T) -> Ordering + Send + Sync + 'static,
    ) -> Self {
        self.config.comparator = Some(Arc::new(comparator));
        self
    }

    pub fn build(self) -> ReplicaConfig<T> {
        self.config
    }
}
