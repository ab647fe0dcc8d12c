//! Settings file support for kubeconverge
//!
//! A project keeps a `settings.yml` next to its manifests describing the project
//! name, the namespace to deploy into and how to reach the cluster. Every field
//! is optional.

use std::{
	collections::BTreeMap,
	fs,
	path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use kube::config::{KubeconfigError, Kubeconfig};
use kubeconverge_engine::NamespaceSpec;
use serde::Deserialize;
use thiserror::Error;

/// The name of the settings file kubeconverge looks for in the manifest directory
pub const SETTINGS_FILE_NAME: &str = "settings.yml";

/// Kubeconfig used when `k8s_auth.config_file` is not set, relative to `$HOME`
pub const DEFAULT_KUBECONFIG: &str = ".kube/config";

/// Missing or invalid cluster access parameters.
///
/// Raised while resolving [`K8sAuth`], before any connection is attempted.
#[derive(Debug, Error)]
pub enum ConfigurationError {
	#[error("no home directory to locate the default kubeconfig, set k8s_auth.config_file")]
	NoHomeDirectory,

	#[error("k8s_auth.{key}: {} does not exist", path.display())]
	MissingFile { key: &'static str, path: PathBuf },

	#[error("reading kubeconfig {}", path.display())]
	Kubeconfig {
		path: PathBuf,
		#[source]
		source: Box<KubeconfigError>,
	},

	#[error("no context named `{0}` was found in the kubeconfig")]
	ContextNotFound(String),

	#[error("the kubeconfig has no current context, set k8s_auth.context")]
	NoCurrentContext,

	#[error("context `{context}` references unknown {entry} `{name}`")]
	DanglingContext {
		context: String,
		entry: &'static str,
		name: String,
	},

	#[error("applying k8s_auth.api_key to user `{user}`")]
	Token {
		user: String,
		#[source]
		source: serde_json::Error,
	},
}

/// Root structure of `settings.yml`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
	/// Defaults to the manifest directory name
	#[serde(default)]
	pub project_name: Option<String>,

	#[serde(default)]
	pub k8s_namespace: NamespaceSettings,

	#[serde(default)]
	pub k8s_auth: K8sAuth,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NamespaceSettings {
	/// Defaults to the project name
	#[serde(default)]
	pub name: Option<String>,
	#[serde(default)]
	pub display_name: Option<String>,
	#[serde(default)]
	pub description: Option<String>,
}

/// How to reach the cluster.
///
/// Everything except `config_file` overrides what the kubeconfig says for the
/// selected context.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct K8sAuth {
	#[serde(default)]
	pub config_file: Option<PathBuf>,
	#[serde(default)]
	pub context: Option<String>,
	#[serde(default)]
	pub host: Option<String>,
	#[serde(default)]
	pub api_key: Option<String>,
	#[serde(default)]
	pub ssl_ca_cert: Option<PathBuf>,
	#[serde(default)]
	pub cert_file: Option<PathBuf>,
	#[serde(default)]
	pub key_file: Option<PathBuf>,
}

impl Settings {
	/// Load settings from a specific file path
	pub fn load_from_file(path: &Path) -> Result<Self> {
		let content = fs::read_to_string(path)
			.with_context(|| format!("failed to read settings file: {}", path.display()))?;
		let settings: Settings = serde_yaml_with_quirks::from_str(&content)
			.with_context(|| format!("failed to parse settings file: {}", path.display()))?;
		Ok(settings)
	}

	/// Load `settings.yml` from `dir` if there is one
	pub fn load_from_directory(dir: &Path) -> Result<Option<Self>> {
		let path = dir.join(SETTINGS_FILE_NAME);
		if !path.is_file() {
			return Ok(None);
		}
		Self::load_from_file(&path).map(Some)
	}

	/// Namespace for `project_name`, named after it unless configured otherwise
	pub fn namespace_spec(&self, project_name: &str) -> NamespaceSpec {
		NamespaceSpec {
			name: self
				.k8s_namespace
				.name
				.clone()
				.unwrap_or_else(|| project_name.to_string()),
			display_name: self.k8s_namespace.display_name.clone(),
			description: self.k8s_namespace.description.clone(),
		}
	}
}

/// Cluster access after resolving [`K8sAuth`] against the kubeconfig file.
#[derive(Debug, Clone)]
pub struct ClusterAccess {
	/// Kubeconfig with the settings overrides applied to the selected context.
	pub kubeconfig: Kubeconfig,
	pub context: String,
	pub config_file: PathBuf,
}

impl K8sAuth {
	/// Path of the kubeconfig file, `~` expanded.
	pub fn config_path(&self) -> Result<PathBuf, ConfigurationError> {
		match &self.config_file {
			Some(path) => expand_home(path),
			None => home_dir()
				.map(|home| home.join(DEFAULT_KUBECONFIG))
				.ok_or(ConfigurationError::NoHomeDirectory),
		}
	}

	/// Check every referenced file and build the effective kubeconfig.
	pub fn resolve(&self) -> Result<ClusterAccess, ConfigurationError> {
		let config_file = self.config_path()?;
		let ssl_ca_cert = self.existing_file("ssl_ca_cert", self.ssl_ca_cert.as_deref())?;
		let cert_file = self.existing_file("cert_file", self.cert_file.as_deref())?;
		let key_file = self.existing_file("key_file", self.key_file.as_deref())?;
		if !config_file.is_file() {
			return Err(ConfigurationError::MissingFile {
				key: "config_file",
				path: config_file,
			});
		}

		let mut kubeconfig =
			Kubeconfig::read_from(&config_file).map_err(|e| ConfigurationError::Kubeconfig {
				path: config_file.clone(),
				source: Box::new(e),
			})?;

		let context = match &self.context {
			Some(context) => context.clone(),
			None => kubeconfig
				.current_context
				.clone()
				.ok_or(ConfigurationError::NoCurrentContext)?,
		};
		let (cluster_name, user_name) = kubeconfig
			.contexts
			.iter()
			.find(|c| c.name == context)
			.and_then(|c| c.context.as_ref())
			.map(|c| (c.cluster.clone(), c.user.clone()))
			.ok_or_else(|| ConfigurationError::ContextNotFound(context.clone()))?;
		kubeconfig.current_context = Some(context.clone());

		if self.host.is_some() || ssl_ca_cert.is_some() {
			let cluster = kubeconfig
				.clusters
				.iter_mut()
				.find(|c| c.name == cluster_name)
				.ok_or_else(|| ConfigurationError::DanglingContext {
					context: context.clone(),
					entry: "cluster",
					name: cluster_name.clone(),
				})?
				.cluster
				.get_or_insert_with(Default::default);
			if let Some(host) = &self.host {
				cluster.server = Some(host.clone());
			}
			if let Some(ca) = ssl_ca_cert {
				cluster.certificate_authority = Some(ca.display().to_string());
				cluster.certificate_authority_data = None;
			}
		}

		if self.api_key.is_some() || cert_file.is_some() || key_file.is_some() {
			let user_name = user_name.unwrap_or_default();
			let user = kubeconfig
				.auth_infos
				.iter_mut()
				.find(|u| u.name == user_name)
				.ok_or_else(|| ConfigurationError::DanglingContext {
					context: context.clone(),
					entry: "user",
					name: user_name.clone(),
				})?;
			let mut auth_info = user.auth_info.take().unwrap_or_default();
			if let Some(cert) = cert_file {
				auth_info.client_certificate = Some(cert.display().to_string());
				auth_info.client_certificate_data = None;
			}
			if let Some(key) = key_file {
				auth_info.client_key = Some(key.display().to_string());
				auth_info.client_key_data = None;
			}
			if let Some(api_key) = &self.api_key {
				auth_info = with_token(auth_info, api_key).map_err(|source| {
					ConfigurationError::Token {
						user: user_name.clone(),
						source,
					}
				})?;
			}
			user.auth_info = Some(auth_info);
		}

		Ok(ClusterAccess {
			kubeconfig,
			context,
			config_file,
		})
	}

	/// Settings `apply` authenticates with that [`K8sAuth::executor_environment`]
	/// does not hand to the executor.
	pub fn executor_omitted_keys(&self) -> Vec<&'static str> {
		let mut omitted = Vec::new();
		if self.api_key.is_some() {
			omitted.push("api_key");
		}
		omitted
	}

	/// `K8S_AUTH_*` variables for the playbook executor.
	///
	/// The api key is never exported.
	pub fn executor_environment(&self) -> BTreeMap<String, String> {
		let mut env = BTreeMap::new();
		if let Ok(path) = self.config_path() {
			env.insert(
				"K8S_AUTH_KUBECONFIG".to_string(),
				path.display().to_string(),
			);
		}
		let paths = [
			("SSL_CA_CERT", &self.ssl_ca_cert),
			("CERT_FILE", &self.cert_file),
			("KEY_FILE", &self.key_file),
		];
		for (key, path) in paths {
			if let Some(path) = path.as_deref().and_then(|p| expand_home(p).ok()) {
				env.insert(format!("K8S_AUTH_{key}"), path.display().to_string());
			}
		}
		if let Some(context) = &self.context {
			env.insert("K8S_AUTH_CONTEXT".to_string(), context.clone());
		}
		if let Some(host) = &self.host {
			env.insert("K8S_AUTH_HOST".to_string(), host.clone());
		}
		env
	}

	fn existing_file(
		&self,
		key: &'static str,
		path: Option<&Path>,
	) -> Result<Option<PathBuf>, ConfigurationError> {
		let Some(path) = path else {
			return Ok(None);
		};
		let path = expand_home(path)?;
		if !path.is_file() {
			return Err(ConfigurationError::MissingFile { key, path });
		}
		Ok(Some(path))
	}
}

/// Bearer token auth replacing whatever the user entry had.
fn with_token(
	auth_info: kube::config::AuthInfo,
	token: &str,
) -> Result<kube::config::AuthInfo, serde_json::Error> {
	// The token field is a secret type, go through serde to set it
	let mut value = serde_json::to_value(&auth_info)?;
	if let serde_json::Value::Object(map) = &mut value {
		map.insert("token".to_string(), serde_json::Value::String(token.to_string()));
	}
	serde_json::from_value(value)
}

fn home_dir() -> Option<PathBuf> {
	std::env::var_os("HOME")
		.filter(|h| !h.is_empty())
		.map(PathBuf::from)
}

fn expand_home(path: &Path) -> Result<PathBuf, ConfigurationError> {
	match path.strip_prefix("~") {
		Ok(rest) => home_dir()
			.map(|home| home.join(rest))
			.ok_or(ConfigurationError::NoHomeDirectory),
		Err(_) => Ok(path.to_path_buf()),
	}
}
