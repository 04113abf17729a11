//! Driver daemonset state
//!
//! Renders one driver DaemonSet per NVIDIADriver, applies it with
//! server-side apply (controller-owned by the NVIDIADriver, so deleting the
//! NVIDIADriver garbage-collects it) and reports Ready once the rollout
//! covers every scheduled node.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::DaemonSet;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, Resource, ResourceExt};
use serde_json::json;
use tracing::{debug, info};

use super::{StateManager, SyncOutcome, WatchSource};
use crate::catalog::{InfoCatalog, InfoType};
use crate::cluster_info::{ClusterInfo, GPU_PRESENT_LABEL};
use crate::crd::{ClusterPolicy, NVIDIADriver, Toleration};
use crate::{Error, FIELD_MANAGER};

const COMPONENT_LABEL: &str = "app.kubernetes.io/component";
const DRIVER_NAME_LABEL: &str = "nvidia.com/nvidia-driver";
const COMPONENT: &str = "nvidia-driver";
const FALLBACK_RUNTIME: &str = "containerd";

/// Name of the DaemonSet rendered for an NVIDIADriver
pub fn daemonset_name(driver_name: &str) -> String {
    format!("nvidia-{}-driver", driver_name)
}

/// Applies the driver DaemonSet for each NVIDIADriver
pub struct DriverDaemonSetState {
    client: Client,
    namespace: String,
}

impl DriverDaemonSetState {
    /// Create the state, deploying into `namespace`
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    async fn apply(
        &self,
        driver: &NVIDIADriver,
        policy: &ClusterPolicy,
        cluster_info: Option<&ClusterInfo>,
    ) -> Result<DaemonSet, Error> {
        let manifest = build_daemonset(driver, policy, cluster_info, &self.namespace)?;
        let name = daemonset_name(&driver.name_any());

        let api: Api<DaemonSet> = Api::namespaced(self.client.clone(), &self.namespace);
        let applied = api
            .patch(
                &name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(&manifest),
            )
            .await?;

        debug!(daemonset = %name, namespace = %self.namespace, "applied driver daemonset");
        Ok(applied)
    }
}

#[async_trait]
impl StateManager for DriverDaemonSetState {
    async fn sync_state(&self, driver: &NVIDIADriver, catalog: &InfoCatalog) -> SyncOutcome {
        let Some(policy) = catalog.get::<ClusterPolicy>(InfoType::ClusterPolicy) else {
            return SyncOutcome::Error("ClusterPolicy missing from info catalog".to_string());
        };
        let cluster_info = catalog
            .get::<Arc<ClusterInfo>>(InfoType::ClusterInfo)
            .map(Arc::as_ref);

        match self.apply(driver, policy, cluster_info).await {
            Ok(ds) if rollout_complete(&ds) => SyncOutcome::Ready,
            Ok(ds) => {
                info!(daemonset = %ds.name_any(), "driver daemonset still rolling out");
                SyncOutcome::NotReady
            }
            Err(e) => SyncOutcome::Error(e.to_string()),
        }
    }

    fn watch_sources(&self) -> Vec<WatchSource> {
        vec![WatchSource::owned::<DaemonSet, NVIDIADriver>()]
    }
}

/// Render the driver DaemonSet manifest for server-side apply
pub fn build_daemonset(
    driver: &NVIDIADriver,
    policy: &ClusterPolicy,
    cluster_info: Option<&ClusterInfo>,
    namespace: &str,
) -> Result<serde_json::Value, Error> {
    let driver_name = driver.name_any();
    let owner = driver
        .controller_owner_ref(&())
        .ok_or_else(|| Error::internal("NVIDIADriver has no UID"))?;

    let mut selector_labels = BTreeMap::new();
    selector_labels.insert(COMPONENT_LABEL.to_string(), COMPONENT.to_string());
    selector_labels.insert(DRIVER_NAME_LABEL.to_string(), driver_name.clone());

    let mut pod_labels = policy.spec.daemonsets.labels.clone();
    pod_labels.extend(driver.spec.labels.clone());
    pod_labels.extend(selector_labels.clone());

    let node_selector = if driver.spec.node_selector.is_empty() {
        BTreeMap::from([(GPU_PRESENT_LABEL.to_string(), "true".to_string())])
    } else {
        driver.spec.node_selector.clone()
    };

    let tolerations: Vec<&Toleration> = policy
        .spec
        .daemonsets
        .tolerations
        .iter()
        .chain(driver.spec.tolerations.iter())
        .collect();

    let priority_class = driver
        .spec
        .priority_class_name
        .as_deref()
        .or(policy.spec.daemonsets.priority_class_name.as_deref());

    let runtime = cluster_info
        .and_then(ClusterInfo::container_runtime)
        .or(policy.spec.operator.default_runtime.as_deref())
        .unwrap_or(FALLBACK_RUNTIME);

    let mut pod_spec = json!({
        "nodeSelector": node_selector,
        "tolerations": tolerations,
        "hostPID": true,
        "containers": [{
            "name": "nvidia-driver-ctr",
            "image": driver.spec.image_path(),
            "imagePullPolicy": driver.spec.image_pull_policy.to_string(),
            "securityContext": {"privileged": true},
            "env": [
                {"name": "DRIVER_TYPE", "value": driver.spec.driver_type.to_string()},
                {"name": "CONTAINER_RUNTIME", "value": runtime},
            ],
        }],
    });
    if let Some(priority_class) = priority_class {
        pod_spec["priorityClassName"] = json!(priority_class);
    }

    Ok(json!({
        "apiVersion": "apps/v1",
        "kind": "DaemonSet",
        "metadata": {
            "name": daemonset_name(&driver_name),
            "namespace": namespace,
            "labels": selector_labels,
            "ownerReferences": [owner],
        },
        "spec": {
            "selector": {"matchLabels": selector_labels},
            "updateStrategy": {"type": "OnDelete"},
            "template": {
                "metadata": {"labels": pod_labels},
                "spec": pod_spec,
            },
        },
    }))
}

/// Returns true once the DaemonSet runs the current revision on every
/// scheduled node. A DaemonSet that matches no node counts as complete.
pub fn rollout_complete(ds: &DaemonSet) -> bool {
    let Some(status) = ds.status.as_ref() else {
        return false;
    };

    let generation = ds.metadata.generation.unwrap_or(0);
    if status.observed_generation.unwrap_or(0) < generation {
        return false;
    }

    let desired = status.desired_number_scheduled;
    desired == 0
        || (status.number_ready >= desired
            && status.updated_number_scheduled.unwrap_or(0) >= desired)
}
