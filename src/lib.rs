//! NVIDIA driver operator - convergence core for NVIDIADriver resources
//!
//! Drives each NVIDIADriver toward its desired state through repeated,
//! idempotent reconcile passes. A pass reads the NVIDIADriver and the
//! cluster-wide ClusterPolicy, hands both to a [`state::StateManager`], and
//! turns the manager's answer into a requeue decision.
//!
//! # Modules
//!
//! - [`crd`] - NVIDIADriver and ClusterPolicy custom resources
//! - [`catalog`] - Per-pass context handed to state managers
//! - [`cluster_info`] - Cluster facts collected once at startup
//! - [`state`] - State manager boundary and the driver daemonset state
//! - [`store`] - Read access to NVIDIADriver and ClusterPolicy objects
//! - [`router`] - Watch events to reconcile requests
//! - [`retry`] - Requeue timing (fixed not-ready delay, per-key error backoff)
//! - [`controller`] - The reconcile pass and its kube-runtime controller
//! - [`events`] - Kubernetes Event publishing
//! - [`config`] - Controller configuration
//! - [`telemetry`] - Logging setup
//! - [`error`] - Error types

#![deny(missing_docs)]

use std::time::Duration;

pub mod catalog;
pub mod cluster_info;
pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod events;
pub mod retry;
pub mod router;
pub mod state;
pub mod store;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Identity of the NVIDIADriver a reconcile pass works on
pub type ReconcileRequest = kube::runtime::reflector::ObjectRef<crd::NVIDIADriver>;

/// Delay before re-checking a driver that is converging but not ready yet
pub const DEFAULT_NOT_READY_REQUEUE: Duration = Duration::from_secs(5);

/// First delay of the per-key error backoff
pub const DEFAULT_MIN_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Upper bound of the per-key error backoff
pub const DEFAULT_MAX_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Field manager used for server-side apply
pub const FIELD_MANAGER: &str = "nvidia-driver-operator";

/// Controller name reported on Kubernetes Events
pub const CONTROLLER_NAME: &str = "nvidia-driver-controller";

/// Namespace the operator deploys driver daemonsets into by default
pub const DEFAULT_OPERATOR_NAMESPACE: &str = "gpu-operator";
