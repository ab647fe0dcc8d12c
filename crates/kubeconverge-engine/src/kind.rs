//! Supported resource kinds and the fields each one is reconciled on.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Resource kinds the engine knows how to reconcile.
///
/// Declaration order is the order used by [`crate::ResourcesByKind`] iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
	Service,
	Route,
	Deployment,
	PersistentVolumeClaim,
	Secret,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unsupported resource kind: {0}")]
pub struct UnsupportedKind(pub String);

/// How a checklist entry compares desired and actual values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckRule {
	/// [`crate::contains::contains`], partial specs allowed.
	Contains,
	/// [`crate::contains::equals`], for fields without sub-structure.
	Equals,
}

/// One entry of a kind's ordered checklist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldCheck {
	/// Short name reported as the mismatch field.
	pub field: &'static str,
	/// JSON pointer into the manifest.
	pub pointer: &'static str,
	pub rule: CheckRule,
}

const fn check(field: &'static str, pointer: &'static str, rule: CheckRule) -> FieldCheck {
	FieldCheck {
		field,
		pointer,
		rule,
	}
}

const LABELS: FieldCheck = check("labels", "/metadata/labels", CheckRule::Contains);

const SERVICE_CHECKS: &[FieldCheck] = &[
	LABELS,
	check("selector", "/spec/selector", CheckRule::Contains),
	check("ports", "/spec/ports", CheckRule::Contains),
];

const ROUTE_CHECKS: &[FieldCheck] = &[
	LABELS,
	check("to", "/spec/to", CheckRule::Contains),
	check("targetPort", "/spec/targetPort", CheckRule::Equals),
];

const DEPLOYMENT_CHECKS: &[FieldCheck] = &[
	LABELS,
	check(
		"template labels",
		"/spec/template/metadata/labels",
		CheckRule::Contains,
	),
	check(
		"containers",
		"/spec/template/spec/containers",
		CheckRule::Contains,
	),
	check("replicas", "/spec/replicas", CheckRule::Equals),
	check("strategy", "/spec/strategy/type", CheckRule::Equals),
];

const PVC_CHECKS: &[FieldCheck] = &[
	LABELS,
	check("access modes", "/spec/accessModes", CheckRule::Contains),
	check("capacity", "/spec/resources/requests", CheckRule::Contains),
	check(
		"storage class",
		"/spec/storageClassName",
		CheckRule::Equals,
	),
];

const SECRET_CHECKS: &[FieldCheck] = &[
	LABELS,
	check("type", "/type", CheckRule::Equals),
	check("data", "/data", CheckRule::Contains),
];

impl ResourceKind {
	pub const ALL: [ResourceKind; 5] = [
		ResourceKind::Service,
		ResourceKind::Route,
		ResourceKind::Deployment,
		ResourceKind::PersistentVolumeClaim,
		ResourceKind::Secret,
	];

	pub fn as_str(self) -> &'static str {
		match self {
			ResourceKind::Service => "Service",
			ResourceKind::Route => "Route",
			ResourceKind::Deployment => "Deployment",
			ResourceKind::PersistentVolumeClaim => "PersistentVolumeClaim",
			ResourceKind::Secret => "Secret",
		}
	}

	/// API group, empty for the core group.
	pub fn group(self) -> &'static str {
		match self {
			ResourceKind::Service | ResourceKind::PersistentVolumeClaim | ResourceKind::Secret => "",
			ResourceKind::Route => "route.openshift.io",
			ResourceKind::Deployment => "apps",
		}
	}

	pub fn version(self) -> &'static str {
		"v1"
	}

	/// `apiVersion` as written in manifests.
	pub fn api_version(self) -> String {
		match self.group() {
			"" => self.version().to_string(),
			group => format!("{}/{}", group, self.version()),
		}
	}

	/// Plural resource name used in API paths.
	pub fn plural(self) -> &'static str {
		match self {
			ResourceKind::Service => "services",
			ResourceKind::Route => "routes",
			ResourceKind::Deployment => "deployments",
			ResourceKind::PersistentVolumeClaim => "persistentvolumeclaims",
			ResourceKind::Secret => "secrets",
		}
	}

	/// Ordered checks deciding whether an existing resource needs replacing.
	pub fn checklist(self) -> &'static [FieldCheck] {
		match self {
			ResourceKind::Service => SERVICE_CHECKS,
			ResourceKind::Route => ROUTE_CHECKS,
			ResourceKind::Deployment => DEPLOYMENT_CHECKS,
			ResourceKind::PersistentVolumeClaim => PVC_CHECKS,
			ResourceKind::Secret => SECRET_CHECKS,
		}
	}
}

impl fmt::Display for ResourceKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for ResourceKind {
	type Err = UnsupportedKind;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		ResourceKind::ALL
			.into_iter()
			.find(|kind| kind.as_str() == s)
			.ok_or_else(|| UnsupportedKind(s.to_string()))
	}
}
