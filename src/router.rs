//! Watch events to reconcile requests
//!
//! Three kinds of objects feed the controller:
//! - an NVIDIADriver change requests a pass for that NVIDIADriver;
//! - a ClusterPolicy change requests a pass for every NVIDIADriver;
//! - a change to a child object requests a pass for the NVIDIADriver named by
//!   its controller owner reference, and nothing if there is none.
//!
//! Routing is synchronous so it can sit directly inside kube-runtime watch
//! mappers. The ClusterPolicy fan-out reads NVIDIADrivers from a
//! [`DriverLister`], which in production is the controller's own reflector
//! cache.

use std::sync::Arc;

use kube::api::DynamicObject;
use kube::runtime::reflector::ObjectRef;
use kube::{Resource, ResourceExt};
use tracing::{debug, error, trace};

use crate::crd::{ClusterPolicy, NVIDIADriver};
use crate::state::WatchSource;
use crate::store::DriverLister;
use crate::ReconcileRequest;

/// A raw change notification from one of the watched kinds
#[derive(Clone, Debug)]
pub enum WatchEvent {
    /// An NVIDIADriver was created, updated or deleted
    Primary(NVIDIADriver),
    /// A ClusterPolicy was created, updated or deleted
    Singleton(ClusterPolicy),
    /// A child object declared by a [`WatchSource`] changed
    Owned(DynamicObject),
}

/// Maps [`WatchEvent`]s to [`ReconcileRequest`]s
pub struct EventRouter {
    lister: Arc<dyn DriverLister>,
    owner_group: String,
    owner_kind: String,
}

impl EventRouter {
    /// Create a router for NVIDIADriver owners
    pub fn new(lister: Arc<dyn DriverLister>) -> Self {
        Self {
            lister,
            owner_group: NVIDIADriver::group(&()).into_owned(),
            owner_kind: NVIDIADriver::kind(&()).into_owned(),
        }
    }

    /// Returns true if the watch source's children are owned by our kind
    pub fn accepts(&self, source: &WatchSource) -> bool {
        source.owner_group == self.owner_group && source.owner_kind == self.owner_kind
    }

    /// Translate one event into zero or more requests
    pub fn route(&self, event: &WatchEvent) -> Vec<ReconcileRequest> {
        match event {
            WatchEvent::Primary(driver) => vec![ObjectRef::from_obj(driver)],
            WatchEvent::Singleton(policy) => self.fan_out(policy),
            WatchEvent::Owned(obj) => self.owner_of(obj).into_iter().collect(),
        }
    }

    fn fan_out(&self, policy: &ClusterPolicy) -> Vec<ReconcileRequest> {
        match self.lister.list_drivers() {
            Ok(drivers) => {
                debug!(
                    cluster_policy = %policy.name_any(),
                    drivers = drivers.len(),
                    "ClusterPolicy changed, requeueing all NVIDIADrivers"
                );
                drivers.iter().map(|d| ObjectRef::from_obj(d.as_ref())).collect()
            }
            Err(e) => {
                // Recovered by the next ClusterPolicy event or watcher relist
                error!(error = %e, "Unable to list NVIDIADriver resources");
                Vec::new()
            }
        }
    }

    fn owner_of(&self, obj: &DynamicObject) -> Option<ReconcileRequest> {
        let owner = obj
            .owner_references()
            .iter()
            .find(|o| o.controller == Some(true))?;

        if api_group(&owner.api_version) != self.owner_group || owner.kind != self.owner_kind {
            trace!(
                object = %obj.name_any(),
                owner_kind = %owner.kind,
                "ignoring child with foreign controller"
            );
            return None;
        }

        // NVIDIADriver is cluster-scoped, so the child's namespace is dropped
        Some(ObjectRef::new(&owner.name))
    }
}

/// `nvidia.com/v1alpha1` -> `nvidia.com`, `v1` -> `""`
fn api_group(api_version: &str) -> &str {
    match api_version.rsplit_once('/') {
        Some((group, _)) => group,
        None => "",
    }
}
