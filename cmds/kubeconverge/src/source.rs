//! Desired state read from a directory of manifest files.

use std::{
	fs, io,
	path::{Path, PathBuf},
};

use kubeconverge_engine::{ConfigSource, NamespaceSpec, ResourceBatch, ResourceKind};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::SETTINGS_FILE_NAME;

const MANIFEST_EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

#[derive(Debug, Error)]
pub enum SourceError {
	#[error("{} is not a directory", .0.display())]
	NotADirectory(PathBuf),

	#[error("walking manifest directory")]
	Walk(#[from] walkdir::Error),

	#[error("reading {}", path.display())]
	Read {
		path: PathBuf,
		#[source]
		source: io::Error,
	},

	#[error("parsing {}: {message}", path.display())]
	Parse { path: PathBuf, message: String },

	#[error("{}: document {index} has no kind", path.display())]
	MissingKind { path: PathBuf, index: usize },
}

/// Every `*.yaml`, `*.yml` and `*.json` file below a directory.
///
/// Files are read in path order. A file may hold a single document, a YAML
/// stream or a `List` whose `items` are the documents. `settings.yml` at the
/// root is not a manifest and is skipped.
#[derive(Debug, Clone)]
pub struct ManifestDir {
	root: PathBuf,
	project_name: Option<String>,
	namespace: Option<NamespaceSpec>,
}

impl ManifestDir {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self {
			root: root.into(),
			project_name: None,
			namespace: None,
		}
	}

	/// Defaults to the directory name.
	pub fn project_name(mut self, project_name: impl Into<String>) -> Self {
		self.project_name = Some(project_name.into());
		self
	}

	/// Defaults to a namespace named after the project.
	pub fn namespace(mut self, namespace: NamespaceSpec) -> Self {
		self.namespace = Some(namespace);
		self
	}

	/// The configured project name, or the directory name.
	pub fn resolved_project_name(&self) -> String {
		if let Some(project_name) = &self.project_name {
			return project_name.clone();
		}
		self.root
			.canonicalize()
			.ok()
			.as_deref()
			.unwrap_or(&self.root)
			.file_name()
			.and_then(|n| n.to_str())
			.unwrap_or("default")
			.to_string()
	}

	fn manifest_files(&self) -> Result<Vec<PathBuf>, SourceError> {
		let settings = self.root.join(SETTINGS_FILE_NAME);
		let mut files = Vec::new();
		for entry in WalkDir::new(&self.root).follow_links(true).sort_by_file_name() {
			let entry = entry?;
			let path = entry.path();
			let is_manifest = entry.file_type().is_file()
				&& path
					.extension()
					.and_then(|e| e.to_str())
					.is_some_and(|e| MANIFEST_EXTENSIONS.contains(&e));
			if is_manifest && path != settings {
				files.push(path.to_path_buf());
			}
		}
		Ok(files)
	}
}

impl ConfigSource for ManifestDir {
	type Error = SourceError;

	fn load(&self) -> Result<ResourceBatch, SourceError> {
		if !self.root.is_dir() {
			return Err(SourceError::NotADirectory(self.root.clone()));
		}

		let mut batch = ResourceBatch::new(self.resolved_project_name());
		if let Some(namespace) = &self.namespace {
			batch.namespace = namespace.clone();
		}

		for path in self.manifest_files()? {
			let content = fs::read_to_string(&path).map_err(|source| SourceError::Read {
				path: path.clone(),
				source,
			})?;
			let documents = parse_documents(&path, &content)?;
			debug!(path = %path.display(), documents = documents.len(), "read manifest file");

			for (index, document) in documents.into_iter().enumerate() {
				let Some(kind) = document.get("kind").and_then(Value::as_str) else {
					return Err(SourceError::MissingKind { path, index });
				};
				match kind.parse::<ResourceKind>() {
					Ok(kind) => {
						let relative = path.strip_prefix(&self.root).unwrap_or(&path);
						batch.push_from(
							kind,
							document,
							format!("{} (document {index})", relative.display()),
						);
					}
					Err(e) => warn!(path = %path.display(), index, "skipping document: {e}"),
				}
			}
		}

		Ok(batch)
	}
}

/// Split a file into documents, flattening `List` objects.
fn parse_documents(path: &Path, content: &str) -> Result<Vec<Value>, SourceError> {
	let parse_error = |message: String| SourceError::Parse {
		path: path.to_path_buf(),
		message,
	};

	let documents: Vec<Value> = if path.extension().is_some_and(|e| e == "json") {
		vec![serde_json::from_str(content).map_err(|e| parse_error(e.to_string()))?]
	} else {
		let mut options = serde_saphyr::Options::default();
		options.budget = None;
		serde_saphyr::from_multiple_with_options(content, options)
			.map_err(|e| parse_error(e.to_string()))?
	};

	let mut flattened = Vec::with_capacity(documents.len());
	for document in documents {
		match document {
			// Empty documents in a stream
			Value::Null => {}
			Value::Object(ref obj) if obj.get("kind").and_then(Value::as_str) == Some("List") => {
				if let Some(Value::Array(items)) = obj.get("items") {
					flattened.extend(items.iter().filter(|i| !i.is_null()).cloned());
				}
			}
			other => flattened.push(other),
		}
	}
	Ok(flattened)
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;
	use indoc::indoc;
	use tempfile::TempDir;

	use super::*;

	fn write(dir: &Path, name: &str, content: &str) {
		let path = dir.join(name);
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent).expect("create fixture dir");
		}
		fs::write(path, content).expect("write fixture");
	}

	#[test]
	fn test_load_streams_and_lists() {
		let dir = TempDir::new().expect("tempdir");
		write(
			dir.path(),
			"10-web.yaml",
			indoc! {"
				apiVersion: v1
				kind: Service
				metadata:
				  name: web
				---
				apiVersion: apps/v1
				kind: Deployment
				metadata:
				  name: web
				---
			"},
		);
		write(
			dir.path(),
			"nested/20-secrets.json",
			r#"{"kind": "List", "items": [{"kind": "Secret", "metadata": {"name": "creds"}}]}"#,
		);
		write(dir.path(), "README.md", "# not a manifest");
		write(dir.path(), SETTINGS_FILE_NAME, "project_name: shop\n");

		let batch = ManifestDir::new(dir.path())
			.project_name("shop")
			.load()
			.expect("valid directory");

		assert_eq!(batch.project_name, "shop");
		assert_eq!(batch.namespace.name, "shop");
		assert_eq!(batch.len(), 3);
		assert_eq!(batch.of_kind(ResourceKind::Service).len(), 1);
		assert_eq!(batch.of_kind(ResourceKind::Deployment).len(), 1);
		assert_eq!(
			batch.of_kind(ResourceKind::Secret)[0].pointer("/metadata/name"),
			Some(&Value::String("creds".to_string()))
		);
		assert_eq!(
			batch.origin(ResourceKind::Deployment, 0),
			Some("10-web.yaml (document 1)")
		);
		assert_eq!(
			batch.origin(ResourceKind::Secret, 0),
			Some("nested/20-secrets.json (document 0)")
		);
	}

	#[test]
	fn test_unsupported_kinds_are_skipped() {
		let dir = TempDir::new().expect("tempdir");
		write(
			dir.path(),
			"cm.yaml",
			"kind: ConfigMap\nmetadata:\n  name: cfg\n---\nkind: Secret\nmetadata:\n  name: creds\n",
		);

		let batch = ManifestDir::new(dir.path()).load().expect("valid directory");
		assert_eq!(batch.len(), 1);
	}

	#[test]
	fn test_document_without_kind_fails() {
		let dir = TempDir::new().expect("tempdir");
		write(dir.path(), "bad.yaml", "metadata:\n  name: web\n");

		assert_matches!(
			ManifestDir::new(dir.path()).load(),
			Err(SourceError::MissingKind { index: 0, .. })
		);
	}

	#[test]
	fn test_invalid_yaml_fails() {
		let dir = TempDir::new().expect("tempdir");
		write(dir.path(), "bad.yaml", "kind: [Service\n");

		assert_matches!(
			ManifestDir::new(dir.path()).load(),
			Err(SourceError::Parse { .. })
		);
	}

	#[test]
	fn test_project_name_and_namespace() {
		let dir = TempDir::new().expect("tempdir");
		let shop = dir.path().join("shop");
		write(&shop, "web.yaml", "kind: Service\nmetadata:\n  name: web\n");

		let source = ManifestDir::new(&shop);
		assert_eq!(source.resolved_project_name(), "shop");

		let batch = source
			.project_name("storefront")
			.namespace(NamespaceSpec::named("storefront-dev"))
			.load()
			.expect("valid directory");
		assert_eq!(batch.project_name, "storefront");
		assert_eq!(batch.namespace.name, "storefront-dev");
	}

	#[test]
	fn test_missing_directory() {
		let dir = TempDir::new().expect("tempdir");
		assert_matches!(
			ManifestDir::new(dir.path().join("absent")).load(),
			Err(SourceError::NotADirectory(_))
		);
	}
}
