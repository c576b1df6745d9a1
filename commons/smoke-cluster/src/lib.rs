//! Cluster-side collaborators for the readiness poller: a kube-rs backed
//! resource client, a wrapper around the `oc` binary, and the JSON-path
//! subset both of them use to extract state.

mod error;
pub mod jsonpath;
mod kube_cluster;
mod oc;
mod resources;

pub use error::{ClusterError, OcError, classify_kube_error};
pub use kube_cluster::KubeCluster;
pub use oc::OcCli;
pub use resources::{ClusterResources, PRESENT, canonical_kind, state_of};
