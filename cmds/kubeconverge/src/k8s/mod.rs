//! Kubernetes API access using kube-rs.

pub mod client;
pub mod cluster;
