//! A manifest directory together with its settings.

use std::path::Path;

use anyhow::{Context, Result};
use kubeconverge_engine::{ConfigSource, ResourceBatch};
use tracing::{debug, instrument};

use crate::{config::Settings, source::ManifestDir};

#[derive(Debug, Clone)]
pub struct Project {
	pub settings: Settings,
	pub batch: ResourceBatch,
}

impl Project {
	/// Read settings and manifests.
	///
	/// `settings` defaults to `settings.yml` inside `path`. `namespace`
	/// overrides `k8s_namespace.name`.
	#[instrument(skip_all, fields(path = %path.display()))]
	pub fn load(path: &Path, settings: Option<&Path>, namespace: Option<&str>) -> Result<Self> {
		let settings = match settings {
			Some(file) => Settings::load_from_file(file)?,
			None => Settings::load_from_directory(path)?.unwrap_or_default(),
		};

		let mut source = ManifestDir::new(path);
		if let Some(project_name) = &settings.project_name {
			source = source.project_name(project_name.clone());
		}
		let mut namespace_spec = settings.namespace_spec(&source.resolved_project_name());
		if let Some(namespace) = namespace {
			namespace_spec.name = namespace.to_string();
		}
		let batch = source
			.namespace(namespace_spec)
			.load()
			.with_context(|| format!("loading manifests from {}", path.display()))?;

		debug!(
			project = %batch.project_name,
			namespace = %batch.namespace.name,
			resources = batch.len(),
			"loaded project"
		);
		Ok(Self { settings, batch })
	}
}
