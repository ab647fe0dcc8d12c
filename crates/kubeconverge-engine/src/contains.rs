//! Structural containment of desired documents in actual documents.
//!
//! `contains(desired, actual)` answers "does the cluster already have everything
//! the operator asked for?". It is deliberately one-directional: fields the
//! desired document does not mention are never inspected, so partial specs do
//! not trigger updates just because the server filled in defaults.
//!
//! Comparison stops at the first mismatch and reports where it happened. A
//! collecting variant (returning every mismatching path) would slot in next to
//! [`contains`] without changing [`ContainmentVerdict`]'s consumers.

use std::{borrow::Cow, collections::HashSet, fmt, num::FpCategory};

use serde_json::Value;

/// One step of a [`FieldPath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
	/// Mapping key.
	Key(String),
	/// Position in the desired sequence.
	Index(usize),
}

/// Location of a mismatch inside a document, e.g. `spec.ports[0].port`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FieldPath(Vec<PathSegment>);

impl FieldPath {
	pub fn root() -> Self {
		Self::default()
	}

	/// Build a path from a JSON pointer (`/spec/template/metadata/labels`).
	///
	/// Numeric pointer tokens are kept as keys, pointers address mappings here.
	pub fn from_pointer(pointer: &str) -> Self {
		Self(
			pointer
				.split('/')
				.filter(|s| !s.is_empty())
				.map(|s| PathSegment::Key(s.replace("~1", "/").replace("~0", "~")))
				.collect(),
		)
	}

	/// Prepend `segment`, used while unwinding the recursion.
	fn under(mut self, segment: PathSegment) -> Self {
		self.0.insert(0, segment);
		self
	}

	/// Append all segments of `other` to this path.
	pub fn join(mut self, other: &FieldPath) -> Self {
		self.0.extend(other.0.iter().cloned());
		self
	}
}

impl fmt::Display for FieldPath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.0.is_empty() {
			return write!(f, "<root>");
		}
		for (i, segment) in self.0.iter().enumerate() {
			match segment {
				PathSegment::Key(key) if i == 0 => write!(f, "{key}")?,
				PathSegment::Key(key) => write!(f, ".{key}")?,
				PathSegment::Index(idx) => write!(f, "[{idx}]")?,
			}
		}
		Ok(())
	}
}

/// Outcome of a containment check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainmentVerdict {
	Satisfied,
	/// `path` points at the first desired field that is not matched.
	Unsatisfied {
		path: FieldPath,
	},
}

impl ContainmentVerdict {
	pub fn is_satisfied(&self) -> bool {
		matches!(self, Self::Satisfied)
	}

	pub fn mismatch_path(&self) -> Option<&FieldPath> {
		match self {
			Self::Satisfied => None,
			Self::Unsatisfied { path } => Some(path),
		}
	}

	fn at_root() -> Self {
		Self::Unsatisfied {
			path: FieldPath::root(),
		}
	}

	fn under(self, segment: PathSegment) -> Self {
		match self {
			Self::Satisfied => Self::Satisfied,
			Self::Unsatisfied { path } => Self::Unsatisfied {
				path: path.under(segment),
			},
		}
	}
}

/// Check whether everything `desired` specifies is present in `actual`.
pub fn contains(desired: &Value, actual: &Value) -> ContainmentVerdict {
	if asserts_nothing(desired) {
		return ContainmentVerdict::Satisfied;
	}
	if is_truthy(desired) && is_empty(actual) {
		return ContainmentVerdict::at_root();
	}

	match (desired, actual) {
		(Value::Object(want), Value::Object(have)) => {
			for (key, value) in want {
				// Not specified is not the same as must be absent
				if !is_truthy(value) {
					continue;
				}
				let verdict = contains(value, have.get(key).unwrap_or(&Value::Null));
				if !verdict.is_satisfied() {
					return verdict.under(PathSegment::Key(key.clone()));
				}
			}
			ContainmentVerdict::Satisfied
		}
		(Value::Object(_), _) => ContainmentVerdict::at_root(),
		(Value::Array(want), Value::Array(have)) => {
			if want.iter().all(is_scalar) {
				scalar_subset(want, have)
			} else {
				every_item_matched(want, have)
			}
		}
		(Value::Array(_), _) => ContainmentVerdict::at_root(),
		(want, have) if is_scalar(have) => {
			if canonical_text(want) == canonical_text(have) {
				ContainmentVerdict::Satisfied
			} else {
				ContainmentVerdict::at_root()
			}
		}
		_ => ContainmentVerdict::at_root(),
	}
}

/// Direct equality for fields without partial structure (replica counts,
/// strategy names, target ports).
///
/// Scalars are compared by canonical text like in [`contains`], so `3` and
/// `"3"` are equal. An absent desired value is not checked.
pub fn equals(desired: &Value, actual: &Value) -> ContainmentVerdict {
	let same = match (desired, actual) {
		(Value::Null, _) => true,
		(want, have) if is_scalar(want) && is_scalar(have) => {
			canonical_text(want) == canonical_text(have)
		}
		(want, have) => want == have,
	};
	if same {
		ContainmentVerdict::Satisfied
	} else {
		ContainmentVerdict::at_root()
	}
}

/// Sequences of scalars are sets: every desired element has to be present.
fn scalar_subset(want: &[Value], have: &[Value]) -> ContainmentVerdict {
	let available: HashSet<Cow<'_, str>> = have
		.iter()
		.filter(|v| is_scalar(v))
		.map(canonical_text)
		.collect();
	match want
		.iter()
		.position(|item| !available.contains(&canonical_text(item)))
	{
		Some(idx) => ContainmentVerdict::at_root().under(PathSegment::Index(idx)),
		None => ContainmentVerdict::Satisfied,
	}
}

/// Every desired item needs at least one actual item containing it.
///
/// Matching is unordered and non-injective: two desired items may be matched
/// by the same actual item.
fn every_item_matched(want: &[Value], have: &[Value]) -> ContainmentVerdict {
	match want.iter().position(|item| {
		!have
			.iter()
			.any(|candidate| contains(item, candidate).is_satisfied())
	}) {
		Some(idx) => ContainmentVerdict::at_root().under(PathSegment::Index(idx)),
		None => ContainmentVerdict::Satisfied,
	}
}

/// Null, `{}` and `[]` make no assertion at all.
fn asserts_nothing(value: &Value) -> bool {
	match value {
		Value::Null => true,
		Value::Object(map) => map.is_empty(),
		Value::Array(items) => items.is_empty(),
		_ => false,
	}
}

fn is_empty(value: &Value) -> bool {
	match value {
		Value::String(s) => s.is_empty(),
		other => asserts_nothing(other),
	}
}

fn is_scalar(value: &Value) -> bool {
	!matches!(value, Value::Object(_) | Value::Array(_))
}

/// Truthiness as understood by manifest authors: null, `false`, zero, `""`,
/// `{}` and `[]` are all "unset".
pub(crate) fn is_truthy(value: &Value) -> bool {
	match value {
		Value::Null => false,
		Value::Bool(b) => *b,
		Value::Number(n) => n
			.as_f64()
			.map_or(true, |f| f.classify() != FpCategory::Zero),
		Value::String(s) => !s.is_empty(),
		Value::Array(items) => !items.is_empty(),
		Value::Object(map) => !map.is_empty(),
	}
}

/// Text form used to compare scalars produced by different serializers.
fn canonical_text(value: &Value) -> Cow<'_, str> {
	match value {
		Value::String(s) => Cow::Borrowed(s.as_str()),
		Value::Null => Cow::Borrowed(""),
		Value::Bool(true) => Cow::Borrowed("true"),
		Value::Bool(false) => Cow::Borrowed("false"),
		Value::Number(n) => Cow::Owned(n.to_string()),
		// Containers never reach here, keep the output stable anyway
		other => Cow::Owned(other.to_string()),
	}
}

#[cfg(test)]
mod tests {
	use rstest::rstest;
	use serde_json::json;

	use super::*;

	fn path_of(verdict: &ContainmentVerdict) -> Option<String> {
		verdict.mismatch_path().map(ToString::to_string)
	}

	#[rstest]
	#[case::mapping(json!({"a": 1, "b": {"c": [1, 2]}}))]
	#[case::sequence_of_mappings(json!([{"port": 80}, {"port": 443, "protocol": "TCP"}]))]
	#[case::sequence_of_scalars(json!(["a", "b", "c"]))]
	#[case::string(json!("web"))]
	#[case::number(json!(3))]
	#[case::falsy_scalar(json!(false))]
	#[case::empty_string(json!(""))]
	#[case::null(json!(null))]
	fn test_reflexive(#[case] doc: Value) {
		assert!(contains(&doc, &doc).is_satisfied());
	}

	#[rstest]
	#[case::mapping(json!({"a": 1}))]
	#[case::sequence(json!([1, 2]))]
	#[case::scalar(json!("x"))]
	#[case::null(json!(null))]
	fn test_empty_desired_is_vacuously_satisfied(#[case] actual: Value) {
		assert!(contains(&json!({}), &actual).is_satisfied());
		assert!(contains(&json!([]), &actual).is_satisfied());
		assert!(contains(&Value::Null, &actual).is_satisfied());
	}

	#[rstest]
	#[case::null(json!(null))]
	#[case::empty_mapping(json!({}))]
	#[case::empty_sequence(json!([]))]
	#[case::empty_string(json!(""))]
	fn test_truthy_desired_against_empty_actual(#[case] actual: Value) {
		let verdict = contains(&json!({"app": "web"}), &actual);
		assert_eq!(path_of(&verdict).as_deref(), Some("<root>"));
	}

	#[test]
	fn test_extra_actual_keys_are_ignored() {
		let desired = json!({"selector": {"app": "web"}});
		let actual = json!({
			"selector": {"app": "web", "tier": "frontend"},
			"clusterIP": "10.0.0.1",
			"type": "ClusterIP"
		});
		assert!(contains(&desired, &actual).is_satisfied());
	}

	#[test]
	fn test_monotonic_under_additions() {
		let desired = json!({"ports": [{"port": 80}], "labels": {"app": "web"}});
		let actual = json!({"ports": [{"port": 80}], "labels": {"app": "web"}});
		assert!(contains(&desired, &actual).is_satisfied());

		let grown = json!({
			"ports": [{"port": 80, "targetPort": 8080}, {"port": 9090}],
			"labels": {"app": "web", "team": "a"},
			"sessionAffinity": "None"
		});
		assert!(contains(&desired, &grown).is_satisfied());
	}

	#[test]
	fn test_falsy_desired_keys_are_not_checked() {
		let desired = json!({"name": "web", "replicas": 0, "paused": false, "env": [], "annotations": {}, "note": ""});
		let actual = json!({"name": "web", "replicas": 3, "paused": true});
		assert!(contains(&desired, &actual).is_satisfied());
	}

	#[test]
	fn test_scalar_set_subset() {
		assert!(contains(&json!({"tags": ["a"]}), &json!({"tags": ["a", "b"]})).is_satisfied());

		let verdict = contains(&json!({"tags": ["a", "c"]}), &json!({"tags": ["a", "b"]}));
		assert_eq!(path_of(&verdict).as_deref(), Some("tags[1]"));
	}

	#[test]
	fn test_scalar_set_ignores_order_and_duplicates() {
		let desired = json!(["ReadWriteOnce", "ReadOnlyMany", "ReadWriteOnce"]);
		let actual = json!(["ReadOnlyMany", "ReadWriteOnce"]);
		assert!(contains(&desired, &actual).is_satisfied());
	}

	#[test]
	fn test_sequence_of_mappings() {
		let desired = json!({"ports": [{"port": 80}]});
		let actual = json!({"ports": [{"port": 80, "protocol": "TCP"}, {"port": 443}]});
		assert!(contains(&desired, &actual).is_satisfied());
	}

	#[test]
	fn test_sequence_of_mappings_reports_unmatched_item() {
		let desired = json!({"ports": [{"port": 80}, {"port": 8443}]});
		let actual = json!({"ports": [{"port": 80}, {"port": 443}]});
		let verdict = contains(&desired, &actual);
		assert_eq!(path_of(&verdict).as_deref(), Some("ports[1]"));
	}

	#[test]
	fn test_sequence_matching_is_non_injective() {
		let desired = json!([{"name": "web"}, {"name": "web", "image": "nginx"}]);
		let actual = json!([{"name": "web", "image": "nginx", "ports": [{"containerPort": 80}]}]);
		assert!(contains(&desired, &actual).is_satisfied());
	}

	#[test]
	fn test_nested_containers() {
		let desired = json!({
			"containers": [{
				"name": "web",
				"env": [{"name": "MODE", "value": "prod"}],
				"ports": [{"containerPort": 8080}]
			}]
		});
		let actual = json!({
			"containers": [
				{"name": "sidecar", "image": "envoy"},
				{
					"name": "web",
					"image": "nginx:1.25",
					"env": [{"name": "MODE", "value": "prod"}, {"name": "DEBUG", "value": "0"}],
					"ports": [{"containerPort": 8080, "protocol": "TCP"}]
				}
			]
		});
		assert!(contains(&desired, &actual).is_satisfied());

		let changed = json!({
			"containers": [{
				"name": "web",
				"env": [{"name": "MODE", "value": "dev"}],
				"ports": [{"containerPort": 8080}]
			}]
		});
		assert_eq!(
			path_of(&contains(&desired, &changed)).as_deref(),
			Some("containers[0]")
		);
	}

	#[rstest]
	#[case::int_vs_string(json!({"replicas": 3}), json!({"replicas": "3"}))]
	#[case::string_vs_int(json!({"port": "8080"}), json!({"port": 8080}))]
	#[case::bool_vs_string(json!({"tty": true}), json!({"tty": "true"}))]
	#[case::in_set(json!({"ids": [1, 2]}), json!({"ids": ["2", "1", "3"]}))]
	fn test_scalar_type_tolerance(#[case] desired: Value, #[case] actual: Value) {
		assert!(contains(&desired, &actual).is_satisfied());
	}

	#[rstest]
	#[case::mapping_vs_scalar(json!({"to": {"name": "web"}}), json!({"to": "web"}), "to")]
	#[case::sequence_vs_mapping(json!({"ports": [{"port": 80}]}), json!({"ports": {"port": 80}}), "ports")]
	#[case::scalar_vs_sequence(json!({"image": "nginx"}), json!({"image": ["nginx"]}), "image")]
	#[case::missing_key(json!({"selector": {"app": "web"}}), json!({"type": "ClusterIP"}), "selector")]
	#[case::deep(json!({"a": {"b": {"c": 1}}}), json!({"a": {"b": {"c": 2}}}), "a.b.c")]
	fn test_mismatch_paths(#[case] desired: Value, #[case] actual: Value, #[case] path: &str) {
		assert_eq!(path_of(&contains(&desired, &actual)).as_deref(), Some(path));
	}

	#[rstest]
	#[case::same(json!(3), json!(3), true)]
	#[case::stringly(json!(3), json!("3"), true)]
	#[case::different(json!(3), json!(2), false)]
	#[case::unset(json!(null), json!("Recreate"), true)]
	#[case::missing_actual(json!("Recreate"), json!(null), false)]
	#[case::structural(json!({"a": 1}), json!({"a": 1, "b": 2}), false)]
	fn test_equals(#[case] desired: Value, #[case] actual: Value, #[case] expected: bool) {
		assert_eq!(equals(&desired, &actual).is_satisfied(), expected);
	}

	#[test]
	fn test_field_path_display() {
		let path = FieldPath::from_pointer("/spec/template/metadata/labels");
		assert_eq!(path.to_string(), "spec.template.metadata.labels");

		let nested = FieldPath::from_pointer("/spec/ports").join(&FieldPath(vec![
			PathSegment::Index(0),
			PathSegment::Key("port".to_string()),
		]));
		assert_eq!(nested.to_string(), "spec.ports[0].port");
		assert_eq!(FieldPath::root().to_string(), "<root>");
	}
}
