//! NVIDIADriver Custom Resource Definition
//!
//! An NVIDIADriver describes which driver build to install and on which
//! nodes. Several instances may coexist, each targeting a disjoint node pool.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{Condition, DriverState, ImagePullPolicy, Labels, Toleration};

/// Kind of driver build to deploy
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DriverType {
    /// Standard GPU driver
    #[default]
    Gpu,
    /// vGPU guest driver
    Vgpu,
    /// vGPU host manager
    VgpuHostManager,
}

impl std::fmt::Display for DriverType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gpu => write!(f, "gpu"),
            Self::Vgpu => write!(f, "vgpu"),
            Self::VgpuHostManager => write!(f, "vgpuhostmanager"),
        }
    }
}

/// Specification for an NVIDIADriver
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "nvidia.com",
    version = "v1alpha1",
    kind = "NVIDIADriver",
    plural = "nvidiadrivers",
    shortname = "nvd",
    status = "NVIDIADriverStatus",
    namespaced = false,
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NVIDIADriverSpec {
    /// Driver build to deploy
    #[serde(default)]
    pub driver_type: DriverType,

    /// Container registry holding the driver image
    pub repository: String,

    /// Driver image name
    pub image: String,

    /// Driver version (image tag prefix)
    pub version: String,

    /// Image pull policy for the driver container
    #[serde(default)]
    pub image_pull_policy: ImagePullPolicy,

    /// Nodes this driver instance is deployed to
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,

    /// Extra tolerations for the driver pods
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Toleration>,

    /// Priority class for the driver pods; falls back to the ClusterPolicy value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_class_name: Option<String>,

    /// Extra labels for the driver pods
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: Labels,
}

impl NVIDIADriverSpec {
    /// Full image reference (`repository/image:version`)
    pub fn image_path(&self) -> String {
        let repository = self.repository.trim_end_matches('/');
        if repository.is_empty() {
            format!("{}:{}", self.image, self.version)
        } else {
            format!("{}/{}:{}", repository, self.image, self.version)
        }
    }
}

/// Status for an NVIDIADriver
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NVIDIADriverStatus {
    /// Aggregate state of the driver deployment
    #[serde(default)]
    pub state: DriverState,

    /// Human-readable message about current state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Conditions representing the driver state
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}
