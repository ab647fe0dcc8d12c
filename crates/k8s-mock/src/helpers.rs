//! Helper functions for mock Kubernetes testing.

use kubeconverge_engine::ResourceKind;
use serde_json::{json, Map, Value};

/// Storage key: collection path plus object name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey {
	/// e.g. `/api/v1/namespaces/default/services`
	pub path: String,
	pub name: String,
}

impl ObjectKey {
	/// Key for a manifest of a supported kind.
	pub fn for_manifest(manifest: &Value) -> Option<Self> {
		let kind: ResourceKind = manifest.get("kind")?.as_str()?.parse().ok()?;
		let name = manifest.pointer("/metadata/name")?.as_str()?.to_string();
		let namespace = manifest
			.pointer("/metadata/namespace")
			.and_then(Value::as_str)
			.unwrap_or("default");
		Some(Self {
			path: collection_path(kind, namespace),
			name,
		})
	}

	/// Namespace segment of the collection path.
	fn namespace(&self) -> Option<&str> {
		let (_, rest) = self.path.split_once("/namespaces/")?;
		rest.split('/').next()
	}
}

pub fn collection_path(kind: ResourceKind, namespace: &str) -> String {
	let root = match kind.group() {
		"" => format!("/api/{}", kind.version()),
		group => format!("/apis/{}/{}", group, kind.version()),
	};
	format!("{root}/namespaces/{namespace}/{}", kind.plural())
}

/// Split a Kubernetes API object path into its collection path and name.
///
/// Examples:
/// - `/api/v1/namespaces/default/services/web` -> (`/api/v1/namespaces/default/services`, `web`)
/// - `/apis/apps/v1/namespaces/shop/deployments/web` -> (`/apis/apps/v1/namespaces/shop/deployments`, `web`)
pub fn parse_resource_path(path: &str) -> ObjectKey {
	let path = path.trim_end_matches('/');
	match path.rsplit_once('/') {
		Some((collection, name)) => ObjectKey {
			path: collection.to_string(),
			name: name.to_string(),
		},
		None => ObjectKey {
			path: path.to_string(),
			name: String::new(),
		},
	}
}

/// `Status` object returned by the API server on failures.
pub fn status_body(code: u16, reason: &str, message: &str) -> Value {
	json!({
		"kind": "Status",
		"apiVersion": "v1",
		"metadata": {},
		"status": "Failure",
		"message": message,
		"reason": reason,
		"code": code
	})
}

/// Fill in what a real API server adds on write: identity metadata and the
/// defaulted spec fields a client usually leaves out.
pub fn stamp_server_fields(manifest: &mut Value, key: &ObjectKey, resource_version: u64) {
	let Value::Object(obj) = manifest else {
		return;
	};
	let kind = obj.get("kind").and_then(Value::as_str).unwrap_or_default().to_string();

	let metadata = object_entry(obj, "metadata");
	if let Some(namespace) = key.namespace() {
		metadata
			.entry("namespace")
			.or_insert_with(|| json!(namespace));
	}
	metadata
		.entry("uid")
		.or_insert_with(|| json!(format!("mock-{}", key.name)));
	metadata
		.entry("creationTimestamp")
		.or_insert_with(|| json!("2024-01-01T00:00:00Z"));
	metadata.insert(
		"resourceVersion".to_string(),
		json!(resource_version.to_string()),
	);

	match kind.as_str() {
		"Service" => {
			let spec = object_entry(obj, "spec");
			spec.entry("type").or_insert_with(|| json!("ClusterIP"));
			spec.entry("clusterIP").or_insert_with(|| json!("10.96.0.10"));
			if let Some(Value::Array(ports)) = spec.get_mut("ports") {
				for port in ports.iter_mut().filter_map(Value::as_object_mut) {
					port.entry("protocol").or_insert_with(|| json!("TCP"));
					if let Some(number) = port.get("port").cloned() {
						port.entry("targetPort").or_insert(number);
					}
				}
			}
		}
		"Deployment" => {
			let spec = object_entry(obj, "spec");
			spec.entry("replicas").or_insert_with(|| json!(1));
			spec.entry("revisionHistoryLimit")
				.or_insert_with(|| json!(10));
			object_entry(spec, "strategy")
				.entry("type")
				.or_insert_with(|| json!("RollingUpdate"));
		}
		"PersistentVolumeClaim" => {
			object_entry(obj, "spec")
				.entry("volumeMode")
				.or_insert_with(|| json!("Filesystem"));
		}
		"Secret" => {
			obj.entry("type").or_insert_with(|| json!("Opaque"));
		}
		_ => {}
	}
}

fn object_entry<'a>(obj: &'a mut Map<String, Value>, key: &str) -> &'a mut Map<String, Value> {
	let entry = obj
		.entry(key)
		.or_insert_with(|| Value::Object(Map::new()));
	if !entry.is_object() {
		*entry = Value::Object(Map::new());
	}
	match entry {
		Value::Object(map) => map,
		_ => unreachable!("entry was just made an object"),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_collection_paths() {
		assert_eq!(
			collection_path(ResourceKind::Service, "shop"),
			"/api/v1/namespaces/shop/services"
		);
		assert_eq!(
			collection_path(ResourceKind::Route, "shop"),
			"/apis/route.openshift.io/v1/namespaces/shop/routes"
		);
	}

	#[test]
	fn test_parse_resource_path() {
		let key = parse_resource_path("/apis/apps/v1/namespaces/shop/deployments/web");
		assert_eq!(key.path, "/apis/apps/v1/namespaces/shop/deployments");
		assert_eq!(key.name, "web");
		assert_eq!(key.namespace(), Some("shop"));
	}

	#[test]
	fn test_stamp_service_defaults() {
		let mut service = json!({
			"apiVersion": "v1",
			"kind": "Service",
			"metadata": {"name": "web"},
			"spec": {"ports": [{"port": 80}]}
		});
		let key = ObjectKey::for_manifest(&service).expect("supported kind");
		stamp_server_fields(&mut service, &key, 3);

		assert_eq!(service.pointer("/metadata/namespace"), Some(&json!("default")));
		assert_eq!(service.pointer("/metadata/resourceVersion"), Some(&json!("3")));
		assert_eq!(
			service.pointer("/spec/ports/0"),
			Some(&json!({"port": 80, "protocol": "TCP", "targetPort": 80}))
		);
	}
}
