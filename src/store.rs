//! Read access to NVIDIADriver and ClusterPolicy objects
//!
//! The reconciler and the event router only see these traits, so both run
//! against in-memory fakes in tests. In production the reconciler reads
//! through [`KubeStore`] and the router lists from the controller's reflector
//! [`Store`].

use std::sync::Arc;

use async_trait::async_trait;
use kube::api::{Api, ListParams};
use kube::runtime::reflector::Store;
use kube::Client;

#[cfg(test)]
use mockall::automock;

use crate::crd::{ClusterPolicy, NVIDIADriver};
use crate::{Error, ReconcileRequest};

/// Lookups performed by a reconcile pass
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DriverStore: Send + Sync {
    /// Fetch the NVIDIADriver named by the request; `Ok(None)` if it is gone
    async fn get_driver(&self, request: &ReconcileRequest) -> Result<Option<NVIDIADriver>, Error>;

    /// List every ClusterPolicy in the cluster, unfiltered
    async fn list_cluster_policies(&self) -> Result<Vec<ClusterPolicy>, Error>;
}

/// Enumerates NVIDIADrivers for ClusterPolicy fan-out
///
/// Called from inside watch mappers, so it must not block or await.
#[cfg_attr(test, automock)]
pub trait DriverLister: Send + Sync {
    /// List every NVIDIADriver currently known
    fn list_drivers(&self) -> Result<Vec<Arc<NVIDIADriver>>, Error>;
}

impl DriverLister for Store<NVIDIADriver> {
    fn list_drivers(&self) -> Result<Vec<Arc<NVIDIADriver>>, Error> {
        // Empty until the first list completes; the initial list queues
        // every driver on its own
        Ok(self.state())
    }
}

/// [`DriverStore`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeStore {
    drivers: Api<NVIDIADriver>,
    policies: Api<ClusterPolicy>,
}

impl KubeStore {
    /// Create a store over cluster-scoped APIs
    pub fn new(client: Client) -> Self {
        Self {
            drivers: Api::all(client.clone()),
            policies: Api::all(client),
        }
    }
}

#[async_trait]
impl DriverStore for KubeStore {
    async fn get_driver(&self, request: &ReconcileRequest) -> Result<Option<NVIDIADriver>, Error> {
        // NVIDIADriver is cluster-scoped; the request namespace is always empty
        Ok(self.drivers.get_opt(&request.name).await?)
    }

    async fn list_cluster_policies(&self) -> Result<Vec<ClusterPolicy>, Error> {
        Ok(self.policies.list(&ListParams::default()).await?.items)
    }
}
