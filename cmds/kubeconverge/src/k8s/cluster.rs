//! [`ClusterClient`] backed by the Kubernetes API.

use kube::{
	api::{Api, ApiResource, DynamicObject, PostParams},
	core::GroupVersionKind,
	Client,
};
use kubeconverge_engine::{
	client::BoxError, ApiError, ApiOperation, ClusterClient, Resource, ResourceKind,
};
use tracing::instrument;

use super::client::ClusterConnection;

/// Talks to the API server through dynamic objects.
///
/// API paths come straight from the [`ResourceKind`] table, so no discovery
/// round-trip is made.
#[derive(Clone)]
pub struct KubeCluster {
	client: Client,
}

impl KubeCluster {
	pub fn new(client: Client) -> Self {
		Self { client }
	}

	pub fn from_connection(connection: &ClusterConnection) -> Self {
		Self::new(connection.client().clone())
	}

	fn api(&self, kind: ResourceKind, namespace: &str) -> Api<DynamicObject> {
		Api::namespaced_with(self.client.clone(), namespace, &api_resource(kind))
	}
}

pub fn api_resource(kind: ResourceKind) -> ApiResource {
	ApiResource::from_gvk_with_plural(
		&GroupVersionKind::gvk(kind.group(), kind.version(), kind.as_str()),
		kind.plural(),
	)
}

fn to_object(
	operation: ApiOperation,
	namespace: &str,
	resource: &Resource,
) -> Result<DynamicObject, ApiError> {
	serde_json::from_value(resource.namespaced_manifest(namespace))
		.map_err(|e| ApiError::new(operation, resource.kind(), resource.name(), e))
}

impl ClusterClient for KubeCluster {
	#[instrument(skip(self, kind), fields(kind = %kind))]
	async fn fetch_by_name(
		&self,
		kind: ResourceKind,
		namespace: &str,
		name: &str,
	) -> Result<Option<Resource>, ApiError> {
		let fail = |e: BoxError| ApiError::new(ApiOperation::Fetch, kind, name, e);

		let Some(object) = self
			.api(kind, namespace)
			.get_opt(name)
			.await
			.map_err(|e| fail(e.into()))?
		else {
			return Ok(None);
		};
		let manifest = serde_json::to_value(object).map_err(|e| fail(e.into()))?;
		Resource::from_manifest(manifest)
			.map(Some)
			.map_err(|e| fail(e.into()))
	}

	#[instrument(skip_all, fields(kind = %resource.kind(), name = resource.name()))]
	async fn create(&self, namespace: &str, resource: &Resource) -> Result<(), ApiError> {
		let object = to_object(ApiOperation::Create, namespace, resource)?;
		self.api(resource.kind(), namespace)
			.create(&PostParams::default(), &object)
			.await
			.map_err(|e| ApiError::new(ApiOperation::Create, resource.kind(), resource.name(), e))?;
		Ok(())
	}

	#[instrument(skip_all, fields(kind = %resource.kind(), name = resource.name()))]
	async fn replace(&self, namespace: &str, resource: &Resource) -> Result<(), ApiError> {
		let object = to_object(ApiOperation::Replace, namespace, resource)?;
		self.api(resource.kind(), namespace)
			.replace(resource.name(), &PostParams::default(), &object)
			.await
			.map_err(|e| {
				ApiError::new(ApiOperation::Replace, resource.kind(), resource.name(), e)
			})?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use rstest::rstest;

	use super::*;

	#[rstest]
	#[case::service(ResourceKind::Service, "", "v1", "services")]
	#[case::route(ResourceKind::Route, "route.openshift.io", "route.openshift.io/v1", "routes")]
	#[case::deployment(ResourceKind::Deployment, "apps", "apps/v1", "deployments")]
	fn test_api_resource(
		#[case] kind: ResourceKind,
		#[case] group: &str,
		#[case] api_version: &str,
		#[case] plural: &str,
	) {
		let ar = api_resource(kind);
		assert_eq!(ar.group, group);
		assert_eq!(ar.api_version, api_version);
		assert_eq!(ar.plural, plural);
		assert_eq!(ar.kind, kind.as_str());
	}
}
