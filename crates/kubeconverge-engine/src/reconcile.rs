//! Per-resource reconciliation: decide NoOp / Create / Update and act on it.

use std::fmt;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::{
	client::{ApiError, ClusterClient},
	contains::{contains, equals, ContainmentVerdict, FieldPath},
	kind::{CheckRule, ResourceKind},
	resource::{Resource, ResourceBatch, ValidationError},
};

/// Kind order used by [`Reconciler::reconcile_batch`]: configuration and
/// storage first, then the services workloads are reached through, then the
/// workloads, then routes pointing at services.
pub const BATCH_ORDER: [ResourceKind; 5] = [
	ResourceKind::Secret,
	ResourceKind::PersistentVolumeClaim,
	ResourceKind::Service,
	ResourceKind::Deployment,
	ResourceKind::Route,
];

/// What the reconciler did (or, in dry-run mode, would do) for a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
	NoOp,
	Create,
	Update,
}

impl ReconcileAction {
	pub fn has_changes(&self) -> bool {
		!matches!(self, ReconcileAction::NoOp)
	}
}

impl fmt::Display for ReconcileAction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ReconcileAction::NoOp => write!(f, "unchanged"),
			ReconcileAction::Create => write!(f, "create"),
			ReconcileAction::Update => write!(f, "update"),
		}
	}
}

/// The first checklist entry an existing resource failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
	/// Checklist field name, e.g. `ports`.
	pub field: &'static str,
	/// Full path inside the manifest, e.g. `spec.ports[0]`.
	pub path: FieldPath,
}

impl fmt::Display for Mismatch {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} ({})", self.field, self.path)
	}
}

/// Record of one reconciled resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
	pub kind: ResourceKind,
	pub name: String,
	pub namespace: String,
	pub action: ReconcileAction,
	/// Set when `action` is [`ReconcileAction::Update`].
	pub mismatch: Option<Mismatch>,
	/// False when the action was only computed (dry run) or is a no-op.
	pub applied: bool,
}

#[derive(Debug, Error)]
pub enum ReconcileError {
	#[error("invalid {kind} manifest at position {index}")]
	Validation {
		kind: ResourceKind,
		index: usize,
		#[source]
		source: ValidationError,
	},

	#[error(transparent)]
	Api(#[from] ApiError),
}

pub type ReconcileOutcome = Result<ReconcileReport, ReconcileError>;

/// Run `desired`'s checklist against `actual`, stopping at the first failure.
pub fn find_mismatch(desired: &Resource, actual: &Resource) -> Option<Mismatch> {
	desired.kind().checklist().iter().find_map(|check| {
		let want = desired.field(check.pointer).unwrap_or(&Value::Null);
		let have = actual.field(check.pointer).unwrap_or(&Value::Null);
		let verdict = match check.rule {
			CheckRule::Contains => contains(want, have),
			CheckRule::Equals => equals(want, have),
		};
		match verdict {
			ContainmentVerdict::Satisfied => None,
			ContainmentVerdict::Unsatisfied { path } => Some(Mismatch {
				field: check.field,
				path: FieldPath::from_pointer(check.pointer).join(&path),
			}),
		}
	})
}

/// Decide what to do given the live resource, if any.
pub fn decide(
	desired: &Resource,
	actual: Option<&Resource>,
) -> (ReconcileAction, Option<Mismatch>) {
	match actual {
		None => (ReconcileAction::Create, None),
		Some(actual) => match find_mismatch(desired, actual) {
			None => (ReconcileAction::NoOp, None),
			Some(mismatch) => (ReconcileAction::Update, Some(mismatch)),
		},
	}
}

/// Reconciles desired resources against a cluster, one resource at a time.
pub struct Reconciler<C> {
	client: C,
	namespace: String,
	dry_run: bool,
}

impl<C: ClusterClient> Reconciler<C> {
	/// `namespace` is used for manifests that do not set `metadata.namespace`.
	pub fn new(client: C, namespace: impl Into<String>) -> Self {
		Self {
			client,
			namespace: namespace.into(),
			dry_run: false,
		}
	}

	/// Only compute actions, never call `create`/`replace`.
	pub fn dry_run(mut self, dry_run: bool) -> Self {
		self.dry_run = dry_run;
		self
	}

	pub fn client(&self) -> &C {
		&self.client
	}

	pub fn namespace(&self) -> &str {
		&self.namespace
	}

	/// Reconcile every manifest of `kind`, in order.
	///
	/// A failing resource does not stop its siblings; each position of the
	/// returned list corresponds to the same position in `desired`.
	#[instrument(skip(self, kind, desired), fields(kind = %kind, count = desired.len()))]
	pub async fn reconcile(&self, kind: ResourceKind, desired: &[Value]) -> Vec<ReconcileOutcome> {
		let mut outcomes = Vec::with_capacity(desired.len());
		for (index, manifest) in desired.iter().enumerate() {
			let outcome = match Resource::from_manifest_of_kind(kind, manifest.clone()) {
				Ok(resource) => self
					.reconcile_resource(&resource)
					.await
					.map_err(ReconcileError::from),
				Err(source) => Err(ReconcileError::Validation {
					kind,
					index,
					source,
				}),
			};
			if let Err(e) = &outcome {
				warn!(kind = %kind, index, error = %e, "reconciliation failed");
			}
			outcomes.push(outcome);
		}
		outcomes
	}

	/// Reconcile every kind of `batch` in [`BATCH_ORDER`].
	pub async fn reconcile_batch(&self, batch: &ResourceBatch) -> Vec<ReconcileOutcome> {
		let mut outcomes = Vec::with_capacity(batch.len());
		for kind in BATCH_ORDER {
			let desired = batch.of_kind(kind);
			if desired.is_empty() {
				continue;
			}
			outcomes.extend(self.reconcile(kind, desired).await);
		}
		outcomes
	}

	/// Reconcile a single validated resource.
	pub async fn reconcile_resource(&self, desired: &Resource) -> Result<ReconcileReport, ApiError> {
		let kind = desired.kind();
		let name = desired.name();
		let namespace = desired.namespace().unwrap_or(&self.namespace);

		debug!(kind = %kind, name, namespace, "checking resource");
		let actual = self.client.fetch_by_name(kind, namespace, name).await?;
		let (action, mismatch) = decide(desired, actual.as_ref());

		match (&action, &mismatch) {
			(ReconcileAction::NoOp, _) => {
				debug!(kind = %kind, name, "no differences detected");
			}
			(ReconcileAction::Create, _) => {
				info!(kind = %kind, name, namespace, dry_run = self.dry_run, "creating resource");
			}
			(ReconcileAction::Update, Some(m)) => {
				info!(
					kind = %kind,
					name,
					namespace,
					field = m.field,
					path = %m.path,
					dry_run = self.dry_run,
					"resource differs, replacing"
				);
			}
			(ReconcileAction::Update, None) => {}
		}

		let applied = if self.dry_run {
			false
		} else {
			match action {
				ReconcileAction::NoOp => false,
				ReconcileAction::Create => {
					self.client.create(namespace, desired).await?;
					true
				}
				ReconcileAction::Update => {
					self.client.replace(namespace, desired).await?;
					true
				}
			}
		};

		Ok(ReconcileReport {
			kind,
			name: name.to_string(),
			namespace: namespace.to_string(),
			action,
			mismatch,
			applied,
		})
	}
}

/// Reconcile `desired` manifests of `kind` through `client`.
///
/// Shorthand for [`Reconciler::reconcile`] with a borrowed client.
pub async fn reconcile<C: ClusterClient>(
	kind: ResourceKind,
	desired: &[Value],
	client: &C,
	namespace: &str,
) -> Vec<ReconcileOutcome> {
	Reconciler::new(client, namespace)
		.reconcile(kind, desired)
		.await
}
