//! Custom Resource Definitions read by the controller

mod cluster_policy;
mod driver;
mod types;

pub use cluster_policy::{ClusterPolicy, ClusterPolicySpec, DaemonsetsSpec, OperatorSpec};
pub use driver::{DriverType, NVIDIADriver, NVIDIADriverSpec, NVIDIADriverStatus};
pub use types::{
    Condition, ConditionStatus, DriverState, ImagePullPolicy, Labels, Toleration,
};
