//! Validated resource manifests and desired-state batches.

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

use crate::kind::ResourceKind;

/// Reasons a manifest cannot be reconciled.
///
/// Raised before any cluster call is made for the resource.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
	#[error("manifest is not an object")]
	NotAnObject,

	#[error("manifest missing kind")]
	MissingKind,

	#[error("manifest missing metadata.name")]
	MissingName,

	#[error("unsupported resource kind: {0}")]
	UnsupportedKind(String),

	#[error("expected a {expected} manifest, found {found}")]
	KindMismatch {
		expected: ResourceKind,
		found: ResourceKind,
	},

	#[error("metadata.labels of {kind}/{name} must map strings to strings")]
	InvalidLabels { kind: ResourceKind, name: String },
}

/// A manifest whose kind and name have been checked.
///
/// Used for desired resources handed in by a [`ConfigSource`] as well as for
/// actual resources read back from the cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
	kind: ResourceKind,
	name: String,
	manifest: Value,
}

pub type DesiredResource = Resource;
pub type ActualResource = Resource;

impl Resource {
	pub fn from_manifest(manifest: Value) -> Result<Self, ValidationError> {
		let object = manifest.as_object().ok_or(ValidationError::NotAnObject)?;
		let kind = object
			.get("kind")
			.and_then(Value::as_str)
			.filter(|k| !k.is_empty())
			.ok_or(ValidationError::MissingKind)?;
		let kind: ResourceKind = kind
			.parse()
			.map_err(|_| ValidationError::UnsupportedKind(kind.to_string()))?;
		let name = manifest
			.pointer("/metadata/name")
			.and_then(Value::as_str)
			.filter(|n| !n.is_empty())
			.ok_or(ValidationError::MissingName)?
			.to_string();

		match manifest.pointer("/metadata/labels") {
			None | Some(Value::Null) => {}
			Some(Value::Object(labels)) if labels.values().all(Value::is_string) => {}
			Some(_) => return Err(ValidationError::InvalidLabels { kind, name }),
		}

		Ok(Self {
			kind,
			name,
			manifest,
		})
	}

	/// Like [`Resource::from_manifest`], additionally requiring `expected` kind.
	pub fn from_manifest_of_kind(
		expected: ResourceKind,
		manifest: Value,
	) -> Result<Self, ValidationError> {
		let resource = Self::from_manifest(manifest)?;
		if resource.kind != expected {
			return Err(ValidationError::KindMismatch {
				expected,
				found: resource.kind,
			});
		}
		Ok(resource)
	}

	pub fn kind(&self) -> ResourceKind {
		self.kind
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn namespace(&self) -> Option<&str> {
		self.manifest
			.pointer("/metadata/namespace")
			.and_then(Value::as_str)
			.filter(|ns| !ns.is_empty())
	}

	/// Look up a field by JSON pointer.
	pub fn field(&self, pointer: &str) -> Option<&Value> {
		self.manifest.pointer(pointer)
	}

	pub fn manifest(&self) -> &Value {
		&self.manifest
	}

	/// Copy of the manifest with `metadata.namespace` and `apiVersion` filled in.
	///
	/// A namespace the manifest sets itself is kept.
	pub fn namespaced_manifest(&self, namespace: &str) -> Value {
		self.manifest_with_namespace(namespace, false)
	}

	/// Like [`Resource::namespaced_manifest`], but `namespace` replaces any
	/// namespace the manifest sets itself.
	pub fn manifest_in_namespace(&self, namespace: &str) -> Value {
		self.manifest_with_namespace(namespace, true)
	}

	fn manifest_with_namespace(&self, namespace: &str, overwrite: bool) -> Value {
		let mut manifest = self.manifest.clone();
		if let Value::Object(ref mut obj) = manifest {
			obj.entry("apiVersion")
				.or_insert_with(|| Value::String(self.kind.api_version()));
			if let Some(Value::Object(ref mut metadata)) = obj.get_mut("metadata") {
				let namespace = Value::String(namespace.to_string());
				if overwrite {
					metadata.insert("namespace".to_string(), namespace);
				} else {
					metadata.entry("namespace").or_insert(namespace);
				}
			}
		}
		manifest
	}
}

/// Raw desired manifests grouped by kind, in kind declaration order.
pub type ResourcesByKind = BTreeMap<ResourceKind, Vec<Value>>;

/// Namespace the project is deployed into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceSpec {
	pub name: String,
	pub display_name: Option<String>,
	pub description: Option<String>,
}

impl NamespaceSpec {
	pub fn named(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			display_name: None,
			description: None,
		}
	}

	/// Namespace manifest, display name and description become annotations.
	pub fn manifest(&self) -> Value {
		let mut annotations = serde_json::Map::new();
		if let Some(display_name) = &self.display_name {
			annotations.insert(
				"openshift.io/display-name".to_string(),
				Value::String(display_name.clone()),
			);
		}
		if let Some(description) = &self.description {
			annotations.insert(
				"openshift.io/description".to_string(),
				Value::String(description.clone()),
			);
		}

		let mut metadata = serde_json::Map::new();
		metadata.insert("name".to_string(), Value::String(self.name.clone()));
		if !annotations.is_empty() {
			metadata.insert("annotations".to_string(), Value::Object(annotations));
		}

		serde_json::json!({
			"apiVersion": "v1",
			"kind": "Namespace",
			"metadata": metadata,
		})
	}
}

/// Everything a [`ConfigSource`] hands to the engine for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceBatch {
	pub project_name: String,
	pub namespace: NamespaceSpec,
	pub resources: ResourcesByKind,
	/// Where a manifest came from, keyed by kind and position in [`Self::resources`].
	origins: BTreeMap<(ResourceKind, usize), String>,
}

impl ResourceBatch {
	/// Empty batch deploying into a namespace named after the project.
	pub fn new(project_name: impl Into<String>) -> Self {
		let project_name = project_name.into();
		Self {
			namespace: NamespaceSpec::named(project_name.clone()),
			project_name,
			resources: ResourcesByKind::new(),
			origins: BTreeMap::new(),
		}
	}

	pub fn push(&mut self, kind: ResourceKind, manifest: Value) {
		self.resources.entry(kind).or_default().push(manifest);
	}

	/// Like [`ResourceBatch::push`], remembering `origin` (a file and document,
	/// usually) for error reporting.
	pub fn push_from(&mut self, kind: ResourceKind, manifest: Value, origin: impl Into<String>) {
		let manifests = self.resources.entry(kind).or_default();
		self.origins.insert((kind, manifests.len()), origin.into());
		manifests.push(manifest);
	}

	/// Origin of the `index`th manifest of `kind`, if it was pushed with one.
	pub fn origin(&self, kind: ResourceKind, index: usize) -> Option<&str> {
		self.origins.get(&(kind, index)).map(String::as_str)
	}

	pub fn of_kind(&self, kind: ResourceKind) -> &[Value] {
		self.resources
			.get(&kind)
			.map(Vec::as_slice)
			.unwrap_or_default()
	}

	pub fn len(&self) -> usize {
		self.resources.values().map(Vec::len).sum()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

/// Supplier of desired state.
pub trait ConfigSource {
	type Error: std::error::Error + Send + Sync + 'static;

	fn load(&self) -> Result<ResourceBatch, Self::Error>;
}
