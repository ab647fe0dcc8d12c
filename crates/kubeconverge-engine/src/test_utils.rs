//! In-memory cluster for engine tests.

use std::{
	collections::{BTreeMap, HashSet},
	io,
	sync::Mutex,
};

use serde_json::Value;

use crate::{
	client::{ApiError, ApiOperation, ClusterClient},
	kind::ResourceKind,
	resource::Resource,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
	Fetch {
		kind: ResourceKind,
		namespace: String,
		name: String,
	},
	Create {
		kind: ResourceKind,
		namespace: String,
		name: String,
	},
	Replace {
		kind: ResourceKind,
		namespace: String,
		name: String,
	},
}

type Key = (ResourceKind, String, String);

#[derive(Default)]
pub struct MemoryCluster {
	objects: Mutex<BTreeMap<Key, Value>>,
	calls: Mutex<Vec<Call>>,
	failures: HashSet<(ApiOperation, String)>,
}

impl MemoryCluster {
	/// Seed a live object. Panics on manifests the engine would reject.
	pub fn with_object(self, namespace: &str, manifest: Value) -> Self {
		let resource = Resource::from_manifest(manifest).expect("seeded object must be valid");
		self.objects.lock().unwrap().insert(
			(
				resource.kind(),
				namespace.to_string(),
				resource.name().to_string(),
			),
			resource.namespaced_manifest(namespace),
		);
		self
	}

	/// Make `operation` on any resource called `name` fail.
	pub fn failing(mut self, operation: ApiOperation, name: &str) -> Self {
		self.failures.insert((operation, name.to_string()));
		self
	}

	pub fn calls(&self) -> Vec<Call> {
		self.calls.lock().unwrap().clone()
	}

	/// Recorded creates and replaces.
	pub fn writes(&self) -> Vec<Call> {
		self.calls()
			.into_iter()
			.filter(|c| !matches!(c, Call::Fetch { .. }))
			.collect()
	}

	pub fn object(&self, kind: ResourceKind, namespace: &str, name: &str) -> Option<Value> {
		self.objects
			.lock()
			.unwrap()
			.get(&(kind, namespace.to_string(), name.to_string()))
			.cloned()
	}

	fn check(&self, operation: ApiOperation, kind: ResourceKind, name: &str) -> Result<(), ApiError> {
		if self.failures.contains(&(operation, name.to_string())) {
			return Err(ApiError::new(
				operation,
				kind,
				name,
				io::Error::other("injected failure"),
			));
		}
		Ok(())
	}

	fn write(&self, operation: ApiOperation, namespace: &str, resource: &Resource) -> Result<(), ApiError> {
		let kind = resource.kind();
		let name = resource.name().to_string();
		let call = match operation {
			ApiOperation::Create => Call::Create {
				kind,
				namespace: namespace.to_string(),
				name: name.clone(),
			},
			_ => Call::Replace {
				kind,
				namespace: namespace.to_string(),
				name: name.clone(),
			},
		};
		self.calls.lock().unwrap().push(call);
		self.check(operation, kind, &name)?;

		let mut objects = self.objects.lock().unwrap();
		let key = (kind, namespace.to_string(), name);
		let exists = objects.contains_key(&key);
		if exists == matches!(operation, ApiOperation::Create) {
			let reason = if exists { "already exists" } else { "not found" };
			return Err(ApiError::new(operation, kind, key.2, io::Error::other(reason)));
		}
		objects.insert(key, resource.namespaced_manifest(namespace));
		Ok(())
	}
}

impl ClusterClient for MemoryCluster {
	async fn fetch_by_name(
		&self,
		kind: ResourceKind,
		namespace: &str,
		name: &str,
	) -> Result<Option<Resource>, ApiError> {
		self.calls.lock().unwrap().push(Call::Fetch {
			kind,
			namespace: namespace.to_string(),
			name: name.to_string(),
		});
		self.check(ApiOperation::Fetch, kind, name)?;

		self.object(kind, namespace, name)
			.map(Resource::from_manifest)
			.transpose()
			.map_err(|e| ApiError::new(ApiOperation::Fetch, kind, name, e))
	}

	async fn create(&self, namespace: &str, resource: &Resource) -> Result<(), ApiError> {
		self.write(ApiOperation::Create, namespace, resource)
	}

	async fn replace(&self, namespace: &str, resource: &Resource) -> Result<(), ApiError> {
		self.write(ApiOperation::Replace, namespace, resource)
	}
}
