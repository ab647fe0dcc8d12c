//! Rendering a [`LifecyclePlan`] as an Ansible play using the `k8s` module.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use crate::plan::{LifecyclePlan, LifecycleTask};

#[derive(Debug, Clone, Default)]
pub struct PlaybookOptions {
	/// Cluster or environment name shown in the play title, defaults to the
	/// namespace display name.
	pub display_name: Option<String>,
	/// Play-level `environment`, e.g. `K8S_AUTH_KUBECONFIG`. Omitted when empty.
	pub environment: BTreeMap<String, String>,
}

impl LifecyclePlan {
	/// Render the plan as a playbook: a list holding a single play.
	pub fn to_playbook(&self, options: &PlaybookOptions) -> Value {
		let display = options
			.display_name
			.as_deref()
			.or(self.namespace.display_name.as_deref())
			.unwrap_or(&self.namespace.name);

		let mut play = Map::new();
		play.insert(
			"name".to_string(),
			Value::String(format!(
				"Manage the lifecycle of {} on {}",
				self.project_name, display
			)),
		);
		play.insert("hosts".to_string(), json!("localhost"));
		play.insert("gather_facts".to_string(), json!(false));
		play.insert("connection".to_string(), json!("local"));
		if !options.environment.is_empty() {
			play.insert("environment".to_string(), json!(options.environment));
		}
		play.insert(
			"tasks".to_string(),
			Value::Array(self.iter().map(task_entry).collect()),
		);

		Value::Array(vec![Value::Object(play)])
	}
}

fn task_entry(task: &LifecycleTask) -> Value {
	json!({
		"name": task.description,
		"k8s": {
			"state": task.state,
			"definition": task.definition,
		},
		"tags": task.tags,
	})
}
