//! HTTP-based mock Kubernetes server using wiremock.
//!
//! This provides a real HTTP server that can be used with actual kubeconfig-based
//! connections. Only the endpoints a reconciler needs are served: single object
//! GET, create (POST) and whole-object replace (PUT).

use std::{
	collections::{HashMap, HashSet},
	sync::{Arc, RwLock},
};

use bon::Builder;
use kube::config::{
	AuthInfo, Cluster, Context, Kubeconfig, NamedAuthInfo, NamedCluster, NamedContext,
};
use kubeconverge_engine::ResourceKind;
use serde_json::Value;
use tracing::{debug, trace};
use wiremock::{
	matchers::{method, path, path_regex},
	Mock, MockServer, Request, ResponseTemplate,
};

use super::helpers::{
	collection_path, parse_resource_path, stamp_server_fields, status_body, ObjectKey,
};

/// Objects stored by the server, keyed by collection path and name.
pub type SharedResources = Arc<RwLock<HashMap<ObjectKey, Value>>>;

/// A mock Kubernetes server exposed over HTTP.
#[derive(Builder)]
pub struct HttpMockK8sServer {
	/// Live objects as raw manifests. Objects without `metadata.namespace` are
	/// placed in `default`; kinds outside [`ResourceKind`] are ignored.
	#[builder(default)]
	resources: Vec<Value>,
	/// Object names whose create and replace requests are rejected with
	/// 409 Conflict, as if another writer got there first.
	#[builder(default)]
	conflicts: Vec<String>,
}

/// A running HTTP mock server instance.
pub struct RunningHttpMockK8sServer {
	server: MockServer,
	resources: SharedResources,
}

impl HttpMockK8sServer {
	/// Start the mock server with all configured resources.
	pub async fn start(self) -> RunningHttpMockK8sServer {
		let server = MockServer::start().await;

		debug!(uri = %server.uri(), "Started mock K8s server");

		let mut resources = HashMap::new();
		for mut manifest in self.resources {
			let Some(key) = ObjectKey::for_manifest(&manifest) else {
				continue;
			};
			stamp_server_fields(&mut manifest, &key, 1);
			trace!(path = %key.path, name = %key.name, "Registered resource");
			resources.insert(key, manifest);
		}

		let shared_resources = Arc::new(RwLock::new(resources));
		let conflicts: Arc<HashSet<String>> = Arc::new(self.conflicts.into_iter().collect());

		mount_version(&server).await;
		mount_resources(&server, &shared_resources, &conflicts).await;

		RunningHttpMockK8sServer {
			server,
			resources: shared_resources,
		}
	}
}

impl RunningHttpMockK8sServer {
	/// Get the server's URI (e.g., "http://127.0.0.1:12345").
	pub fn uri(&self) -> String {
		self.server.uri()
	}

	/// Create a Kubeconfig pointing to this mock server.
	pub fn kubeconfig(&self) -> Kubeconfig {
		self.kubeconfig_with_context("mock-context")
	}

	/// Create a Kubeconfig pointing to this mock server with a custom context name.
	pub fn kubeconfig_with_context(&self, context_name: &str) -> Kubeconfig {
		let cluster_name = "mock-cluster";
		let user_name = "mock-user";

		Kubeconfig {
			clusters: vec![NamedCluster {
				name: cluster_name.to_string(),
				cluster: Some(Cluster {
					server: Some(self.uri()),
					insecure_skip_tls_verify: Some(true),
					..Default::default()
				}),
			}],
			contexts: vec![NamedContext {
				name: context_name.to_string(),
				context: Some(Context {
					cluster: cluster_name.to_string(),
					user: Some(user_name.to_string()),
					namespace: Some("default".to_string()),
					..Default::default()
				}),
			}],
			auth_infos: vec![NamedAuthInfo {
				name: user_name.to_string(),
				auth_info: Some(AuthInfo::default()),
			}],
			current_context: Some(context_name.to_string()),
			..Default::default()
		}
	}

	/// Current state of a stored object.
	pub fn resource(&self, kind: ResourceKind, namespace: &str, name: &str) -> Option<Value> {
		let key = ObjectKey {
			path: collection_path(kind, namespace),
			name: name.to_string(),
		};
		self.resources.read().ok()?.get(&key).cloned()
	}

	/// Number of stored objects.
	pub fn resource_count(&self) -> usize {
		self.resources.read().map(|r| r.len()).unwrap_or_default()
	}

	/// `(method, path)` of every POST and PUT received so far, in arrival order.
	pub async fn writes(&self) -> Vec<(String, String)> {
		self.server
			.received_requests()
			.await
			.unwrap_or_default()
			.into_iter()
			.filter(|r| matches!(r.method.as_str(), "POST" | "PUT"))
			.map(|r| (r.method.to_string(), r.url.path().to_string()))
			.collect()
	}
}

async fn mount_version(server: &MockServer) {
	Mock::given(method("GET"))
		.and(path("/version"))
		.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
			"major": "1",
			"minor": "31",
			"gitVersion": "v1.31.0",
			"gitCommit": "fake",
			"gitTreeState": "clean",
			"buildDate": "2024-08-13T00:00:00Z",
			"goVersion": "go1.22.5",
			"compiler": "gc",
			"platform": "linux/amd64"
		})))
		.mount(server)
		.await;
}

async fn mount_resources(
	server: &MockServer,
	resources: &SharedResources,
	conflicts: &Arc<HashSet<String>>,
) {
	let get_resources = Arc::clone(resources);
	let post_resources = Arc::clone(resources);
	let post_conflicts = Arc::clone(conflicts);
	let put_resources = Arc::clone(resources);
	let put_conflicts = Arc::clone(conflicts);

	Mock::given(method("GET"))
		.and(path_regex(r"^/api(s)?/.*"))
		.respond_with(move |req: &Request| {
			let key = parse_resource_path(req.url.path());
			let resources = get_resources.read().unwrap();
			match resources.get(&key) {
				Some(resource) => ResponseTemplate::new(200).set_body_json(resource.clone()),
				None => not_found(&key),
			}
		})
		.mount(server)
		.await;

	// POST to the collection path, name comes from the body
	Mock::given(method("POST"))
		.and(path_regex(r"^/api(s)?/.*"))
		.respond_with(move |req: &Request| {
			let mut body: Value = serde_json::from_slice(&req.body).unwrap_or(Value::Null);
			let name = body
				.pointer("/metadata/name")
				.and_then(Value::as_str)
				.unwrap_or_default()
				.to_string();
			let key = ObjectKey {
				path: req.url.path().trim_end_matches('/').to_string(),
				name,
			};
			if post_conflicts.contains(&key.name) {
				return conflict(&key);
			}

			let mut resources = post_resources.write().unwrap();
			if resources.contains_key(&key) {
				return ResponseTemplate::new(409).set_body_json(status_body(
					409,
					"AlreadyExists",
					&format!("{} already exists", key.name),
				));
			}
			stamp_server_fields(&mut body, &key, 1);
			resources.insert(key, body.clone());
			ResponseTemplate::new(201).set_body_json(body)
		})
		.mount(server)
		.await;

	// PUT replaces the whole object
	Mock::given(method("PUT"))
		.and(path_regex(r"^/api(s)?/.*"))
		.respond_with(move |req: &Request| {
			let key = parse_resource_path(req.url.path());
			if put_conflicts.contains(&key.name) {
				return conflict(&key);
			}

			let mut body: Value = serde_json::from_slice(&req.body).unwrap_or(Value::Null);
			let mut resources = put_resources.write().unwrap();
			let Some(existing) = resources.get(&key) else {
				return not_found(&key);
			};
			let generation = existing
				.pointer("/metadata/resourceVersion")
				.and_then(Value::as_str)
				.and_then(|v| v.parse::<u64>().ok())
				.unwrap_or_default();
			stamp_server_fields(&mut body, &key, generation + 1);
			resources.insert(key, body.clone());
			ResponseTemplate::new(200).set_body_json(body)
		})
		.mount(server)
		.await;
}

fn not_found(key: &ObjectKey) -> ResponseTemplate {
	ResponseTemplate::new(404).set_body_json(status_body(
		404,
		"NotFound",
		&format!("{} not found", key.name),
	))
}

fn conflict(key: &ObjectKey) -> ResponseTemplate {
	ResponseTemplate::new(409).set_body_json(status_body(
		409,
		"Conflict",
		&format!(
			"Operation cannot be fulfilled on {}: the object has been modified",
			key.name
		),
	))
}
