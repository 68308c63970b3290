// Top-level error taxonomy for the recipe executor.

use thiserror::Error;

/// Every fallible operation in the core surfaces one of these variants.
#[derive(Error, Debug)]
pub enum RecipeError {
	#[error("failed to parse recipe: {0}")]
	RecipeParseError(String),

	#[error("unknown step type: {0}")]
	UnknownStepType(String),

	#[error("invalid step configuration: {0}")]
	StepConfigError(String),

	#[error("template error: {0}")]
	TemplateError(String),

	#[error("schema error: {0}")]
	SchemaError(String),

	#[error("file not found: {0}")]
	FileNotFound(String),

	#[error("LLM call failed for model '{model}': {message}")]
	LLMError { model: String, message: String },

	#[error("tool invocation failed against '{service}': {message}")]
	ToolInvocationError { service: String, message: String },

	#[error("condition error: {0}")]
	ConditionError(String),

	#[error("key not found: {0}")]
	KeyNotFound(String),

	#[error("step {index} ({step_type}) failed: {source}")]
	StepFailed {
		index: usize,
		step_type: String,
		#[source]
		source: Box<RecipeError>,
	},
}

impl RecipeError {
	/// Wrap an error with the index/type of the step that produced it,
	/// per the executor's no-retry, wrap-and-reraise policy (spec.md §4.5).
	pub fn wrap_step(index: usize, step_type: impl Into<String>, source: RecipeError) -> Self {
		RecipeError::StepFailed {
			index,
			step_type: step_type.into(),
			source: Box::new(source),
		}
	}
}

pub type Result<T> = std::result::Result<T, RecipeError>;
