//! Cluster facts collected once at startup
//!
//! [`ClusterInfo`] is built before the controller starts and shared read-only
//! (behind an `Arc`) by every reconcile pass.

use std::collections::BTreeSet;

use k8s_openapi::api::core::v1::Node;
use kube::api::{Api, ListParams};
use kube::{Client, ResourceExt};
use tracing::{debug, info};

use crate::Error;

/// Node label set by GPU feature discovery on nodes with an NVIDIA GPU
pub const GPU_PRESENT_LABEL: &str = "nvidia.com/gpu.present";

/// Immutable snapshot of cluster metadata
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClusterInfo {
    /// API server version (e.g. `v1.30.2`)
    pub kubernetes_version: String,
    /// Container runtimes reported by the nodes (e.g. `containerd`)
    pub container_runtimes: BTreeSet<String>,
    /// Kernel versions of GPU nodes
    pub gpu_node_kernels: BTreeSet<String>,
    /// Number of nodes labelled as having a GPU
    pub gpu_node_count: usize,
}

impl ClusterInfo {
    /// Query the API server and node list to build the snapshot
    pub async fn discover(client: &Client) -> Result<Self, Error> {
        let version = client.apiserver_version().await?;
        let nodes: Api<Node> = Api::all(client.clone());
        let node_list = nodes.list(&ListParams::default()).await?;

        let info = Self::from_nodes(version.git_version, &node_list.items);
        info!(
            kubernetes_version = %info.kubernetes_version,
            gpu_nodes = info.gpu_node_count,
            runtimes = ?info.container_runtimes,
            "collected cluster info"
        );
        Ok(info)
    }

    /// Build the snapshot from an API server version and a node list
    pub fn from_nodes(kubernetes_version: impl Into<String>, nodes: &[Node]) -> Self {
        let mut info = Self {
            kubernetes_version: kubernetes_version.into(),
            ..Default::default()
        };

        for node in nodes {
            let node_info = node.status.as_ref().and_then(|s| s.node_info.as_ref());

            if let Some(runtime) = node_info.map(|ni| runtime_name(&ni.container_runtime_version))
            {
                info.container_runtimes.insert(runtime.to_string());
            }

            if is_gpu_node(node) {
                info.gpu_node_count += 1;
                if let Some(ni) = node_info {
                    info.gpu_node_kernels.insert(ni.kernel_version.clone());
                }
            } else {
                debug!(node = %node.name_any(), "skipping non-GPU node");
            }
        }

        info
    }

    /// The single runtime used by the cluster, if every node agrees on one
    pub fn container_runtime(&self) -> Option<&str> {
        match self.container_runtimes.len() {
            1 => self.container_runtimes.iter().next().map(String::as_str),
            _ => None,
        }
    }
}

fn is_gpu_node(node: &Node) -> bool {
    node.labels()
        .get(GPU_PRESENT_LABEL)
        .is_some_and(|v| v == "true")
}

/// `containerd://1.7.2` -> `containerd`
fn runtime_name(version: &str) -> &str {
    version.split("://").next().unwrap_or(version)
}
