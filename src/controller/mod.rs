//! NVIDIADriver controller
//!
//! - [`Reconciler`] runs one reconcile pass for one request
//! - [`reconcile`] and [`error_policy`] adapt the pass to kube-runtime and
//!   pick the requeue delay
//! - [`build_controller`] wires the watches into a kube-runtime `Controller`

mod reconcile;
mod runner;

pub use reconcile::{select_cluster_policy, ReconcileAction, Reconciler};
pub use runner::{build_controller, error_policy, reconcile, Context, WATCH_TIMEOUT_SECS};
