//! ClusterPolicy Custom Resource Definition
//!
//! Exactly one ClusterPolicy is expected per cluster. Only the fields the
//! driver state consumes are modelled here; unknown fields are ignored on read.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{Labels, Toleration};

/// Specification for the cluster-wide ClusterPolicy
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "nvidia.com",
    version = "v1",
    kind = "ClusterPolicy",
    plural = "clusterpolicies",
    namespaced = false
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterPolicySpec {
    /// Operator-wide settings
    #[serde(default)]
    pub operator: OperatorSpec,

    /// Settings shared by every operator-managed daemonset
    #[serde(default)]
    pub daemonsets: DaemonsetsSpec,
}

/// Operator-wide settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OperatorSpec {
    /// Container runtime assumed when it cannot be detected from the nodes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_runtime: Option<String>,
}

/// Settings shared by every operator-managed daemonset
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DaemonsetsSpec {
    /// Default priority class for daemonset pods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_class_name: Option<String>,

    /// Labels added to every daemonset pod
    #[serde(default, skip_serializing_if = "Labels::is_empty")]
    pub labels: Labels,

    /// Tolerations added to every daemonset pod
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Toleration>,
}
