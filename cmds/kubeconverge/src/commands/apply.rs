//! Apply command handler.
//!
//! Reconciles every manifest of a project against the cluster and prints one
//! line per resource.

use std::{io::Write, path::PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use kubeconverge_engine::{
	ClusterClient, ReconcileAction, ReconcileError, ReconcileReport, Reconciler, ResourceBatch,
};
use tabwriter::TabWriter;
use tracing::{error, info, instrument};

use super::util::error_chain;
use crate::{
	k8s::{client::ClusterConnection, cluster::KubeCluster},
	project::Project,
};

#[derive(Args)]
pub struct ApplyArgs {
	/// Directory holding the manifests
	pub path: PathBuf,

	/// Settings file, defaults to settings.yml inside the manifest directory
	#[arg(long)]
	pub settings: Option<PathBuf>,

	/// Namespace to apply into, overrides k8s_namespace.name
	#[arg(short, long)]
	pub namespace: Option<String>,

	/// Only report what would change
	#[arg(long)]
	pub dry_run: bool,
}

/// Outcome of an apply run.
#[derive(Debug, Default)]
pub struct ApplySummary {
	pub reports: Vec<ReconcileReport>,
	pub failures: Vec<ReconcileError>,
}

impl ApplySummary {
	pub fn changed(&self) -> usize {
		self.reports
			.iter()
			.filter(|r| r.action.has_changes())
			.count()
	}

	pub fn is_success(&self) -> bool {
		self.failures.is_empty()
	}
}

/// Run the apply command.
pub fn run<W: Write>(args: ApplyArgs, writer: W) -> Result<()> {
	let runtime = tokio::runtime::Builder::new_multi_thread()
		.enable_all()
		.build()
		.context("creating tokio runtime")?;

	let summary = runtime.block_on(run_async(args, writer))?;
	if !summary.is_success() {
		anyhow::bail!("{} resource(s) failed to reconcile", summary.failures.len());
	}
	Ok(())
}

async fn run_async<W: Write>(args: ApplyArgs, writer: W) -> Result<ApplySummary> {
	let project = Project::load(&args.path, args.settings.as_deref(), args.namespace.as_deref())?;

	// Settings problems are reported before anything talks to the cluster
	let access = project
		.settings
		.k8s_auth
		.resolve()
		.context("resolving cluster access")?;
	let connection = ClusterConnection::connect(&access)
		.await
		.with_context(|| format!("connecting to cluster (context:{})", access.context))?;

	apply_batch(
		&project.batch,
		KubeCluster::from_connection(&connection),
		args.dry_run,
		writer,
	)
	.await
}

/// Reconcile `batch` through `client` and print the result table.
#[instrument(skip_all, fields(project = %batch.project_name, namespace = %batch.namespace.name, dry_run = dry_run))]
pub async fn apply_batch<C: ClusterClient, W: Write>(
	batch: &ResourceBatch,
	client: C,
	dry_run: bool,
	writer: W,
) -> Result<ApplySummary> {
	let outcomes = Reconciler::new(client, batch.namespace.name.clone())
		.dry_run(dry_run)
		.reconcile_batch(batch)
		.await;

	let mut summary = ApplySummary::default();
	for outcome in outcomes {
		match outcome {
			Ok(report) => summary.reports.push(report),
			Err(e) => {
				error!(error = %error_chain(&e), "resource failed");
				summary.failures.push(e);
			}
		}
	}

	write_table(batch, &summary, dry_run, writer).context("writing apply results")?;
	info!(
		changed = summary.changed(),
		failed = summary.failures.len(),
		total = summary.reports.len() + summary.failures.len(),
		"apply finished"
	);
	Ok(summary)
}

fn write_table<W: Write>(
	batch: &ResourceBatch,
	summary: &ApplySummary,
	dry_run: bool,
	writer: W,
) -> std::io::Result<()> {
	let mut tw = TabWriter::new(writer);
	writeln!(tw, "KIND\tNAME\tACTION\tMISMATCH")?;
	for report in &summary.reports {
		let action = match (report.action, dry_run) {
			(ReconcileAction::NoOp, _) | (_, false) => report.action.to_string(),
			(_, true) => format!("{} (dry run)", report.action),
		};
		let mismatch = report
			.mismatch
			.as_ref()
			.map(ToString::to_string)
			.unwrap_or_default();
		writeln!(tw, "{}\t{}\t{}\t{}", report.kind, report.name, action, mismatch)?;
	}
	for failure in &summary.failures {
		let (kind, name) = match failure {
			ReconcileError::Validation { kind, index, .. } => (
				kind,
				batch
					.origin(*kind, *index)
					.map_or_else(|| format!("{kind}[{index}]"), ToString::to_string),
			),
			ReconcileError::Api(e) => (&e.kind, e.name.clone()),
		};
		writeln!(tw, "{}\t{}\tfailed\t{}", kind, name, error_chain(failure))?;
	}
	tw.flush()
}

#[cfg(test)]
mod tests {
	use kubeconverge_engine::ResourceKind;
	use serde_json::json;

	use super::*;

	/// Cluster where nothing exists yet and every write succeeds.
	struct EmptyCluster;

	impl ClusterClient for EmptyCluster {
		async fn fetch_by_name(
			&self,
			_kind: ResourceKind,
			_namespace: &str,
			_name: &str,
		) -> Result<Option<kubeconverge_engine::Resource>, kubeconverge_engine::ApiError> {
			Ok(None)
		}

		async fn create(
			&self,
			_namespace: &str,
			_resource: &kubeconverge_engine::Resource,
		) -> Result<(), kubeconverge_engine::ApiError> {
			Ok(())
		}

		async fn replace(
			&self,
			_namespace: &str,
			_resource: &kubeconverge_engine::Resource,
		) -> Result<(), kubeconverge_engine::ApiError> {
			Ok(())
		}
	}

	#[tokio::test]
	async fn test_table_lists_actions_and_failures() {
		let mut batch = ResourceBatch::new("shop");
		batch.push(
			ResourceKind::Service,
			json!({"kind": "Service", "metadata": {"name": "web"}}),
		);
		batch.push_from(
			ResourceKind::Secret,
			json!({"kind": "Secret", "metadata": {}}),
			"secrets.yaml (document 2)",
		);
		batch.push(ResourceKind::Deployment, json!({"kind": "Deployment"}));

		let mut out = Vec::new();
		let summary = apply_batch(&batch, EmptyCluster, true, &mut out)
			.await
			.expect("apply should run");
		let out = String::from_utf8(out).expect("utf-8 output");

		assert_eq!(summary.changed(), 1);
		assert!(!summary.is_success());
		let lines: Vec<_> = out.lines().collect();
		assert_eq!(lines.len(), 4);
		assert!(lines[0].starts_with("KIND"));
		assert!(lines[1].starts_with("Service"));
		assert!(lines[1].contains("create (dry run)"));
		// Failures follow batch order: secrets before deployments
		assert!(lines[2].starts_with("Secret"));
		assert!(lines[2].contains("secrets.yaml (document 2)"));
		assert!(lines[2].contains("manifest missing metadata.name"));
		assert!(lines[3].starts_with("Deployment"));
		assert!(lines[3].contains("Deployment[0]"));
	}
}
