// Shared mutable context threaded between steps (spec.md §4.1).

use serde_json::{Map, Value};

use crate::error::{RecipeError, Result};

/// Key/value store shared within one executor frame. `artifacts` is the
/// mutable side; `config` is seeded once at construction and never
/// written to by the core afterward.
#[derive(Debug, Clone, Default)]
pub struct Context {
	artifacts: Map<String, Value>,
	config: Map<String, Value>,
}

impl Context {
	/// Construct a context seeded with initial artifacts and a read-only
	/// config map.
	pub fn new(artifacts: Map<String, Value>, config: Map<String, Value>) -> Self {
		Self { artifacts, config }
	}

	pub fn empty() -> Self {
		Self::default()
	}

	/// Returns the value at `key`, or `Value::Null` if absent.
	pub fn get(&self, key: &str) -> Value {
		self.get_or(key, Value::Null)
	}

	/// Returns the value at `key`, or `default` if absent.
	pub fn get_or(&self, key: &str, default: Value) -> Value {
		self.artifacts.get(key).cloned().unwrap_or(default)
	}

	pub fn set(&mut self, key: impl Into<String>, value: Value) {
		self.artifacts.insert(key.into(), value);
	}

	/// Removes `key`. Fails with `KeyNotFound` if absent.
	pub fn delete(&mut self, key: &str) -> Result<()> {
		self
			.artifacts
			.remove(key)
			.map(|_| ())
			.ok_or_else(|| RecipeError::KeyNotFound(key.to_string()))
	}

	pub fn contains(&self, key: &str) -> bool {
		self.artifacts.contains_key(key)
	}

	/// Snapshot of the current artifact keys. Callers may mutate the
	/// context afterward without invalidating the returned `Vec`.
	pub fn keys(&self) -> Vec<String> {
		self.artifacts.keys().cloned().collect()
	}

	/// Deep copy of the artifacts map, independent of later mutation.
	pub fn snapshot(&self) -> Map<String, Value> {
		self.artifacts.clone()
	}

	/// Read-only view of the config map.
	pub fn config_view(&self) -> &Map<String, Value> {
		&self.config
	}

	/// Deep copy of both artifacts and config, with no aliasing of nested
	/// mutable values with `self` (`serde_json::Value`'s `Clone` impl is
	/// already structural, so this is a plain field-wise clone).
	pub fn clone_deep(&self) -> Self {
		self.clone()
	}

	/// Render helper: expose the full artifact map plus a `config` key,
	/// used by `TemplateRenderer` to build its template object.
	pub fn template_object(&self) -> Map<String, Value> {
		let mut obj = self.artifacts.clone();
		obj.insert("config".to_string(), Value::Object(self.config.clone()));
		obj
	}

	/// Resolve a dotted path (`"a.b.c"`) into the artifacts map, used by the
	/// `loop` step's `items` field. Absent paths resolve to `Value::Null`
	/// rather than erroring; only a malformed path string is a
	/// `StepConfigError`.
	pub fn resolve_path(&self, path: &str) -> Result<Value> {
		let expr = format!("$.{path}");
		let query = serde_json_path::JsonPath::parse(&expr)
			.map_err(|e| RecipeError::StepConfigError(format!("invalid items path {path:?}: {e}")))?;
		let root = Value::Object(self.artifacts.clone());
		Ok(query.query(&root).first().cloned().unwrap_or(Value::Null))
	}
}
