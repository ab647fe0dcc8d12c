//! Plan command handler.
//!
//! Prints the lifecycle playbook for a project, optionally narrowed to the
//! tasks of one lifecycle tag.

use std::{io::Write, path::PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use kubeconverge_engine::{LifecyclePlan, PlanSynthesizer, PlaybookOptions, Tag};
use serde_json::Value;
use tracing::warn;

use crate::project::Project;

#[derive(Args)]
pub struct PlanArgs {
	/// Directory holding the manifests
	pub path: PathBuf,

	/// Settings file, defaults to settings.yml inside the manifest directory
	#[arg(long)]
	pub settings: Option<PathBuf>,

	/// Namespace to plan into, overrides k8s_namespace.name
	#[arg(short, long)]
	pub namespace: Option<String>,

	/// Only emit tasks for this lifecycle transition: start, stop, restart or destroy
	#[arg(short, long)]
	pub tag: Option<Tag>,
}

/// Run the plan command.
pub fn run<W: Write>(args: PlanArgs, mut writer: W) -> Result<()> {
	let project = Project::load(&args.path, args.settings.as_deref(), args.namespace.as_deref())?;
	let plan = build_plan(&project, args.tag)?;
	if plan.is_empty() {
		warn!(tag = ?args.tag, "no tasks to run");
	}
	for key in project.settings.k8s_auth.executor_omitted_keys() {
		warn!(
			key = %format!("k8s_auth.{key}"),
			"setting is not passed to the executor, the playbook authenticates without it"
		);
	}

	let options = PlaybookOptions {
		display_name: None,
		environment: project.settings.k8s_auth.executor_environment(),
	};
	let yaml = render_yaml(&plan.to_playbook(&options))?;
	writer
		.write_all(yaml.as_bytes())
		.context("writing playbook")?;
	Ok(())
}

pub fn build_plan(project: &Project, tag: Option<Tag>) -> Result<LifecyclePlan> {
	let plan = PlanSynthesizer::for_batch(&project.batch)
		.synthesize(&project.batch.resources)
		.context("building lifecycle plan")?;
	Ok(match tag {
		Some(tag) => plan.filtered(tag),
		None => plan,
	})
}

pub fn render_yaml(playbook: &Value) -> Result<String> {
	let mut output = String::new();
	let mut options = serde_saphyr::SerializerOptions::default();
	options.indent_step = 2;
	serde_saphyr::to_fmt_writer_with_options(&mut output, playbook, options)
	.map_err(|e| anyhow::anyhow!("serializing playbook: {e}"))?;
	Ok(output)
}

#[cfg(test)]
mod tests {
	use std::fs;

	use tempfile::TempDir;

	use super::*;

	fn project_dir() -> TempDir {
		let dir = TempDir::new().expect("tempdir");
		fs::write(
			dir.path().join("settings.yml"),
			"project_name: shop\nk8s_auth:\n  config_file: /etc/kube/config\n",
		)
		.expect("write settings");
		fs::write(
			dir.path().join("app.yaml"),
			"kind: Deployment\nmetadata:\n  name: web\nspec:\n  replicas: 2\n---\nkind: Service\nmetadata:\n  name: web\n",
		)
		.expect("write manifests");
		dir
	}

	#[test]
	fn test_plan_output() {
		let dir = project_dir();
		let mut out = Vec::new();
		run(
			PlanArgs {
				path: dir.path().to_path_buf(),
				settings: None,
				namespace: None,
				tag: None,
			},
			&mut out,
		)
		.expect("plan should succeed");

		let yaml = String::from_utf8(out).expect("utf-8 output");
		assert!(yaml.contains("Manage the lifecycle of shop on shop"));
		assert!(yaml.contains("K8S_AUTH_KUBECONFIG"));
		assert!(yaml.contains("/etc/kube/config"));
		assert!(yaml.contains("Stop deployment web"));
	}

	#[test]
	fn test_plan_filtered_by_tag() {
		let dir = project_dir();
		let project = Project::load(dir.path(), None, None).expect("valid project");
		let plan = build_plan(&project, Some(Tag::Destroy)).expect("valid plan");
		assert_eq!(plan.len(), 1);
		assert_eq!(plan.tasks()[0].description, "Destroy namespace shop");
	}
}
