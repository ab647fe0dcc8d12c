//! The cluster capability the reconciler drives.

use std::{fmt, future::Future};

use thiserror::Error;

use crate::{kind::ResourceKind, resource::Resource};

/// Boxed cause carried by [`ApiError`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Cluster call that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiOperation {
	Fetch,
	Create,
	Replace,
}

impl fmt::Display for ApiOperation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ApiOperation::Fetch => write!(f, "fetching"),
			ApiOperation::Create => write!(f, "creating"),
			ApiOperation::Replace => write!(f, "replacing"),
		}
	}
}

/// A cluster call failed for a reason other than the resource being absent.
#[derive(Debug, Error)]
#[error("{operation} {kind}/{name}")]
pub struct ApiError {
	pub operation: ApiOperation,
	pub kind: ResourceKind,
	pub name: String,
	#[source]
	pub source: BoxError,
}

impl ApiError {
	pub fn new(
		operation: ApiOperation,
		kind: ResourceKind,
		name: impl Into<String>,
		source: impl Into<BoxError>,
	) -> Self {
		Self {
			operation,
			kind,
			name: name.into(),
			source: source.into(),
		}
	}
}

/// Access to live cluster state.
///
/// Implementations own transport, authentication and timeouts. Absence of a
/// resource is reported as `Ok(None)` from [`ClusterClient::fetch_by_name`],
/// never as an error.
pub trait ClusterClient {
	fn fetch_by_name(
		&self,
		kind: ResourceKind,
		namespace: &str,
		name: &str,
	) -> impl Future<Output = Result<Option<Resource>, ApiError>> + Send;

	fn create(
		&self,
		namespace: &str,
		resource: &Resource,
	) -> impl Future<Output = Result<(), ApiError>> + Send;

	/// Replace the whole resource with `resource`.
	fn replace(
		&self,
		namespace: &str,
		resource: &Resource,
	) -> impl Future<Output = Result<(), ApiError>> + Send;
}

impl<C: ClusterClient + ?Sized> ClusterClient for &C {
	fn fetch_by_name(
		&self,
		kind: ResourceKind,
		namespace: &str,
		name: &str,
	) -> impl Future<Output = Result<Option<Resource>, ApiError>> + Send {
		(**self).fetch_by_name(kind, namespace, name)
	}

	fn create(
		&self,
		namespace: &str,
		resource: &Resource,
	) -> impl Future<Output = Result<(), ApiError>> + Send {
		(**self).create(namespace, resource)
	}

	fn replace(
		&self,
		namespace: &str,
		resource: &Resource,
	) -> impl Future<Output = Result<(), ApiError>> + Send {
		(**self).replace(namespace, resource)
	}
}
