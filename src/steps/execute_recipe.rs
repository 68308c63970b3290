// `execute_recipe` (spec.md §4.6.1): invokes a sub-recipe against the
// same context, after applying templated overrides.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::Span;

use crate::context::Context;
use crate::error::{RecipeError, Result};
use crate::executor::{resolve_relative_to, Executor, RecipeSource, Runtime};
use crate::registry::StepRegistry;
use crate::steps::Step;
use crate::template;

pub fn register(registry: &mut StepRegistry) {
	registry.register(
		"execute_recipe",
		Arc::new(|config: &Value, _span: Span| Ok(Box::new(ExecuteRecipeStep::from_config(config)?) as Box<dyn Step>)),
	);
}

struct ExecuteRecipeStep {
	recipe_path: String,
	context_overrides: Vec<(String, String)>,
}

impl ExecuteRecipeStep {
	fn from_config(config: &Value) -> Result<Self> {
		let recipe_path = config
			.get("recipe_path")
			.and_then(Value::as_str)
			.ok_or_else(|| RecipeError::StepConfigError("execute_recipe requires \"recipe_path\"".into()))?
			.to_string();

		let context_overrides = match config.get("context_overrides") {
			Some(Value::Object(map)) => map
				.iter()
				.map(|(k, v)| {
					v.as_str()
						.map(|s| (k.clone(), s.to_string()))
						.ok_or_else(|| RecipeError::StepConfigError(format!("context_overrides.{k} must be a string")))
				})
				.collect::<Result<Vec<_>>>()?,
			Some(other) => return Err(RecipeError::StepConfigError(format!("context_overrides must be an object, got {other}"))),
			None => Vec::new(),
		};

		Ok(Self { recipe_path, context_overrides })
	}
}

#[async_trait]
impl Step for ExecuteRecipeStep {
	async fn execute(&self, context: &mut Context, runtime: &Runtime) -> Result<()> {
		let rendered_path = template::render(&self.recipe_path, context)?;

		for (key, raw_value) in &self.context_overrides {
			let rendered_value = template::render(raw_value, context)?;
			context.set(key.clone(), Value::String(rendered_value));
		}

		if !runtime.fs.exists(&rendered_path).await {
			return Err(RecipeError::FileNotFound(rendered_path));
		}

		let executor = Executor::new(Arc::new(runtime.clone()));
		executor.execute(RecipeSource::Path(rendered_path), context).await
	}
}

/// Resolves `sub_recipe_path` relative to the recipe that invoked it, for
/// callers that already hold the parent path rather than letting
/// `Executor` resolve it from the current working directory.
pub fn resolve_sub_recipe_path(parent_recipe_path: &str, sub_recipe_path: &str) -> String {
	resolve_relative_to(parent_recipe_path, sub_recipe_path)
}
