//! State manager boundary
//!
//! A [`StateManager`] owns the knowledge of which child objects an
//! NVIDIADriver needs and how to apply them. The reconciler only decides when
//! to call it and how to react to the [`SyncOutcome`]. The manager also
//! declares which child kinds it creates ([`WatchSource`]) so that changes to
//! them are routed back to the owning NVIDIADriver.

mod driver;

use async_trait::async_trait;
use kube::core::ApiResource;
use kube::Resource;

#[cfg(test)]
use mockall::automock;

use crate::catalog::InfoCatalog;
use crate::crd::NVIDIADriver;

pub use driver::{build_daemonset, daemonset_name, rollout_complete, DriverDaemonSetState};

/// Result of one sync attempt
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Every child object is applied and healthy
    Ready,
    /// Child objects are applied but still rolling out
    NotReady,
    /// The sync failed
    Error(String),
}

impl std::fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready => write!(f, "ready"),
            Self::NotReady => write!(f, "notReady"),
            Self::Error(msg) => write!(f, "error: {}", msg),
        }
    }
}

/// A child kind whose changes must be routed to its controlling owner
#[derive(Clone, Debug)]
pub struct WatchSource {
    /// Child kind to watch
    pub resource: ApiResource,
    /// API group of the owner kind (e.g. `nvidia.com`)
    pub owner_group: String,
    /// Owner kind (e.g. `NVIDIADriver`)
    pub owner_kind: String,
}

impl WatchSource {
    /// Watch `K` objects controlled by an `O`
    pub fn owned<K, O>() -> Self
    where
        K: Resource<DynamicType = ()>,
        O: Resource<DynamicType = ()>,
    {
        Self {
            resource: ApiResource::erase::<K>(&()),
            owner_group: O::group(&()).into_owned(),
            owner_kind: O::kind(&()).into_owned(),
        }
    }
}

/// Computes and applies the child objects of an NVIDIADriver
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StateManager: Send + Sync {
    /// Apply the children for `driver` and report whether they are ready
    async fn sync_state(&self, driver: &NVIDIADriver, catalog: &InfoCatalog) -> SyncOutcome;

    /// Child kinds this manager creates
    fn watch_sources(&self) -> Vec<WatchSource>;
}
