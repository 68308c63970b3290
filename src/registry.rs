// Process-wide mapping from step-type tag to step constructor (spec.md §4.4).

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::Span;

use crate::error::{RecipeError, Result};
use crate::steps::Step;

pub type StepFactory = Arc<dyn Fn(&Value, Span) -> Result<Box<dyn Step>> + Send + Sync>;

/// Read-only after construction: `StepRegistry::with_builtins()` is the
/// single registration path (spec.md §9's resolved open question —
/// there is no module-side-effect registration anywhere else in this
/// crate).
#[derive(Clone)]
pub struct StepRegistry {
	factories: HashMap<String, StepFactory>,
}

impl StepRegistry {
	pub fn new() -> Self {
		Self { factories: HashMap::new() }
	}

	/// Build the registry with every built-in step type registered.
	pub fn with_builtins() -> Self {
		let mut registry = Self::new();
		crate::steps::register_builtins(&mut registry);
		registry
	}

	pub fn register(&mut self, tag: impl Into<String>, factory: StepFactory) {
		self.factories.insert(tag.into(), factory);
	}

	/// Unknown tags surface as `UnknownStepType` only at recipe execution
	/// time, never at registration.
	pub fn lookup(&self, tag: &str) -> Result<&StepFactory> {
		self.factories.get(tag).ok_or_else(|| RecipeError::UnknownStepType(tag.to_string()))
	}
}

impl Default for StepRegistry {
	fn default() -> Self {
		Self::new()
	}
}
