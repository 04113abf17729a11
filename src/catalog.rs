//! Per-pass context handed to state managers
//!
//! The reconciler fills an [`InfoCatalog`] with everything a state manager may
//! need (cluster facts, the ClusterPolicy snapshot) without knowing which
//! entries a given state actually reads. A catalog is built fresh for every
//! pass and dropped when the pass ends; the ClusterPolicy it carries can change
//! between passes.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use tracing::warn;

/// Tag identifying a catalog entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InfoType {
    /// Read-only [`ClusterInfo`](crate::cluster_info::ClusterInfo) snapshot
    ClusterInfo,
    /// The [`ClusterPolicy`](crate::crd::ClusterPolicy) selected for this pass
    ClusterPolicy,
}

impl fmt::Display for InfoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClusterInfo => write!(f, "ClusterInfo"),
            Self::ClusterPolicy => write!(f, "ClusterPolicy"),
        }
    }
}

/// Typed registry mapping an [`InfoType`] tag to an opaque value
#[derive(Default)]
pub struct InfoCatalog {
    entries: HashMap<InfoType, Box<dyn Any + Send + Sync>>,
}

impl InfoCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry. Adding the same tag twice replaces the first value and
    /// is logged, since a pass is expected to add each tag once.
    pub fn add<T: Any + Send + Sync>(&mut self, info_type: InfoType, value: T) {
        if self.entries.insert(info_type, Box::new(value)).is_some() {
            warn!(info_type = %info_type, "catalog entry added twice, keeping the last value");
        }
    }

    /// Get an entry, or `None` if it is absent or was stored as another type
    pub fn get<T: Any>(&self, info_type: InfoType) -> Option<&T> {
        self.entries
            .get(&info_type)
            .and_then(|value| value.downcast_ref::<T>())
    }
}

impl fmt::Debug for InfoCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}
