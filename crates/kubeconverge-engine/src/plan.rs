//! Ordered, tagged lifecycle plans for an external task executor.

use std::{collections::BTreeSet, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{
	kind::ResourceKind,
	resource::{NamespaceSpec, Resource, ResourceBatch, ResourcesByKind, ValidationError},
};

/// Lifecycle transition a task takes part in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tag {
	Start,
	Stop,
	Restart,
	Destroy,
}

impl Tag {
	pub const ALL: [Tag; 4] = [Tag::Start, Tag::Stop, Tag::Restart, Tag::Destroy];

	pub fn as_str(self) -> &'static str {
		match self {
			Tag::Start => "start",
			Tag::Stop => "stop",
			Tag::Restart => "restart",
			Tag::Destroy => "destroy",
		}
	}
}

impl fmt::Display for Tag {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown tag {0:?}, valid tags are start, stop, restart and destroy")]
pub struct UnknownTag(pub String);

impl FromStr for Tag {
	type Err = UnknownTag;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Tag::ALL
			.into_iter()
			.find(|tag| tag.as_str() == s)
			.ok_or_else(|| UnknownTag(s.to_string()))
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
	Ensure,
	/// Keep the deployment but run zero replicas.
	ScaleDown,
	Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskTarget {
	Namespace,
	Resource(ResourceKind),
}

impl fmt::Display for TaskTarget {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			TaskTarget::Namespace => write!(f, "namespace"),
			TaskTarget::Resource(ResourceKind::PersistentVolumeClaim) => {
				write!(f, "persistent volume claim")
			}
			TaskTarget::Resource(kind) => write!(f, "{}", kind.as_str().to_lowercase()),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
	Present,
	Absent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleTask {
	pub description: String,
	pub operation: Operation,
	pub target: TaskTarget,
	pub resource_name: String,
	pub state: TaskState,
	pub tags: BTreeSet<Tag>,
	/// Manifest handed to the executor, namespaced to the plan namespace.
	pub definition: Value,
}

impl LifecycleTask {
	pub fn has_tag(&self, tag: Tag) -> bool {
		self.tags.contains(&tag)
	}
}

/// Ordered task list. Order is significant: executors run tasks top to bottom.
#[derive(Debug, Clone, PartialEq)]
pub struct LifecyclePlan {
	pub project_name: String,
	pub namespace: NamespaceSpec,
	tasks: Vec<LifecycleTask>,
}

impl LifecyclePlan {
	pub fn tasks(&self) -> &[LifecycleTask] {
		&self.tasks
	}

	pub fn len(&self) -> usize {
		self.tasks.len()
	}

	pub fn is_empty(&self) -> bool {
		self.tasks.is_empty()
	}

	pub fn iter(&self) -> std::slice::Iter<'_, LifecycleTask> {
		self.tasks.iter()
	}

	/// Tasks an executor runs for `tag`, in plan order.
	pub fn select(&self, tag: Tag) -> Vec<&LifecycleTask> {
		self.tasks.iter().filter(|t| t.has_tag(tag)).collect()
	}

	/// Copy of the plan keeping only tasks tagged `tag`.
	pub fn filtered(&self, tag: Tag) -> Self {
		Self {
			project_name: self.project_name.clone(),
			namespace: self.namespace.clone(),
			tasks: self.select(tag).into_iter().cloned().collect(),
		}
	}
}

impl<'a> IntoIterator for &'a LifecyclePlan {
	type Item = &'a LifecycleTask;
	type IntoIter = std::slice::Iter<'a, LifecycleTask>;

	fn into_iter(self) -> Self::IntoIter {
		self.tasks.iter()
	}
}

/// Builds [`LifecyclePlan`]s.
///
/// Task order:
/// 1. namespace present (`start`)
/// 2. namespace absent (`destroy`)
/// 3. services (`start`)
/// 4. routes (`start`)
/// 5. deployments scaled to zero (`stop`, `restart`)
/// 6. deployments (`start`, `restart`)
/// 7. persistent volume claims (`start`)
/// 8. secrets (`start`)
///
/// Running the `restart` selection therefore always scales every deployment
/// down before bringing any of them back.
#[derive(Debug, Clone)]
pub struct PlanSynthesizer {
	project_name: String,
	namespace: NamespaceSpec,
}

impl PlanSynthesizer {
	/// Plans into a namespace named after the project.
	pub fn new(project_name: impl Into<String>) -> Self {
		let project_name = project_name.into();
		Self {
			namespace: NamespaceSpec::named(project_name.clone()),
			project_name,
		}
	}

	pub fn namespace(mut self, namespace: NamespaceSpec) -> Self {
		self.namespace = namespace;
		self
	}

	/// Fails on the first manifest that does not validate.
	pub fn synthesize(&self, resources: &ResourcesByKind) -> Result<LifecyclePlan, ValidationError> {
		let ns = &self.namespace.name;
		let of_kind = |kind: ResourceKind| -> Result<Vec<Resource>, ValidationError> {
			resources
				.get(&kind)
				.into_iter()
				.flatten()
				.map(|manifest| Resource::from_manifest_of_kind(kind, manifest.clone()))
				.collect()
		};

		let mut tasks = vec![
			LifecycleTask {
				description: format!("Create namespace {ns}"),
				operation: Operation::Ensure,
				target: TaskTarget::Namespace,
				resource_name: ns.clone(),
				state: TaskState::Present,
				tags: BTreeSet::from([Tag::Start]),
				definition: self.namespace.manifest(),
			},
			LifecycleTask {
				description: format!("Destroy namespace {ns}"),
				operation: Operation::Remove,
				target: TaskTarget::Namespace,
				resource_name: ns.clone(),
				state: TaskState::Absent,
				tags: BTreeSet::from([Tag::Destroy]),
				definition: self.namespace.manifest(),
			},
		];

		let services = of_kind(ResourceKind::Service)?;
		let routes = of_kind(ResourceKind::Route)?;
		let deployments = of_kind(ResourceKind::Deployment)?;
		let claims = of_kind(ResourceKind::PersistentVolumeClaim)?;
		let secrets = of_kind(ResourceKind::Secret)?;

		tasks.extend(services.iter().map(|r| self.ensure(r, &[Tag::Start])));
		tasks.extend(routes.iter().map(|r| self.ensure(r, &[Tag::Start])));
		tasks.extend(deployments.iter().map(|r| self.scale_down(r)));
		tasks.extend(
			deployments
				.iter()
				.map(|r| self.ensure(r, &[Tag::Start, Tag::Restart])),
		);
		tasks.extend(claims.iter().map(|r| self.ensure(r, &[Tag::Start])));
		tasks.extend(secrets.iter().map(|r| self.ensure(r, &[Tag::Start])));

		Ok(LifecyclePlan {
			project_name: self.project_name.clone(),
			namespace: self.namespace.clone(),
			tasks,
		})
	}

	/// Plan the batch's own project and namespace.
	pub fn for_batch(batch: &ResourceBatch) -> Self {
		Self::new(batch.project_name.clone()).namespace(batch.namespace.clone())
	}

	fn ensure(&self, resource: &Resource, tags: &[Tag]) -> LifecycleTask {
		let target = TaskTarget::Resource(resource.kind());
		LifecycleTask {
			description: format!("Create {target} {}", resource.name()),
			operation: Operation::Ensure,
			target,
			resource_name: resource.name().to_string(),
			state: TaskState::Present,
			tags: tags.iter().copied().collect(),
			definition: resource.manifest_in_namespace(&self.namespace.name),
		}
	}

	fn scale_down(&self, deployment: &Resource) -> LifecycleTask {
		let mut definition = deployment.manifest_in_namespace(&self.namespace.name);
		if let Value::Object(ref mut obj) = definition {
			let spec = obj
				.entry("spec")
				.or_insert_with(|| Value::Object(Default::default()));
			if let Value::Object(spec) = spec {
				spec.insert("replicas".to_string(), Value::from(0));
			}
		}
		LifecycleTask {
			description: format!("Stop deployment {}", deployment.name()),
			operation: Operation::ScaleDown,
			target: TaskTarget::Resource(ResourceKind::Deployment),
			resource_name: deployment.name().to_string(),
			state: TaskState::Present,
			tags: BTreeSet::from([Tag::Stop, Tag::Restart]),
			definition,
		}
	}
}

/// Plan `resources` into a namespace named after `project_name`.
pub fn synthesize(
	project_name: &str,
	resources: &ResourcesByKind,
) -> Result<LifecyclePlan, ValidationError> {
	PlanSynthesizer::new(project_name).synthesize(resources)
}
