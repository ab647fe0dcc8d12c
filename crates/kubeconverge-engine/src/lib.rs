//! Desired-state reconciliation for Kubernetes resources.
//!
//! [`contains`] decides whether live state already satisfies a desired
//! manifest, [`Reconciler`] turns that into create/replace calls through a
//! [`ClusterClient`], and [`PlanSynthesizer`] produces tagged lifecycle plans
//! for an external executor.

pub mod client;
pub mod contains;
pub mod kind;
pub mod plan;
pub mod playbook;
pub mod reconcile;
pub mod resource;
#[cfg(test)]
pub mod test_utils;

pub use client::{ApiError, ApiOperation, ClusterClient};
pub use contains::{contains, equals, ContainmentVerdict, FieldPath, PathSegment};
pub use kind::{ResourceKind, UnsupportedKind};
pub use plan::{
	synthesize, LifecyclePlan, LifecycleTask, Operation, PlanSynthesizer, Tag, TaskState,
	TaskTarget,
};
pub use playbook::PlaybookOptions;
pub use reconcile::{
	reconcile, Mismatch, ReconcileAction, ReconcileError, ReconcileOutcome, ReconcileReport,
	Reconciler,
};
pub use resource::{
	ActualResource, ConfigSource, DesiredResource, NamespaceSpec, Resource, ResourceBatch,
	ResourcesByKind, ValidationError,
};
