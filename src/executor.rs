// Sequential step driver (spec.md §4.5). `Executor` is the one thing in
// this crate that both the CLI entrypoint and every control-flow step
// (`execute_recipe`, `loop`, `parallel`, `conditional`) hold a handle to,
// since each of those needs to recurse back into "run this sequence of
// steps against a context" (grounded on the teacher's `Box::pin`
// self-recursion in `mcp/registry/executor/mod.rs::execute_pattern`).

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{info_span, Instrument};

use crate::capabilities::fs::FileSystem;
use crate::capabilities::llm::LLMProvider;
use crate::capabilities::mcp::MCPClient;
use crate::context::Context;
use crate::error::{RecipeError, Result};
use crate::registry::StepRegistry;
use crate::steps::Step;

/// One step entry as it appears in a recipe's `steps` array: a `type` tag
/// plus a `config` object whose shape is entirely owned by that step's
/// factory (spec.md §6). Unknown keys inside `config` are ignored by
/// every built-in step for forward compatibility.
#[derive(Debug, Clone, Deserialize)]
pub struct StepDescriptor {
	#[serde(rename = "type")]
	pub step_type: String,
	#[serde(default)]
	pub config: Value,
}

/// A parsed recipe: an ordered sequence of step descriptors (spec.md §4.1).
#[derive(Debug, Clone, Deserialize)]
pub struct Recipe {
	pub steps: Vec<StepDescriptor>,
}

impl Recipe {
	pub fn from_json(raw: &str) -> Result<Self> {
		serde_json::from_str(raw).map_err(|e| RecipeError::RecipeParseError(e.to_string()))
	}

	pub fn from_value(raw: Value) -> Result<Self> {
		serde_json::from_value(raw).map_err(|e| RecipeError::RecipeParseError(e.to_string()))
	}
}

/// Where a recipe comes from when handed to `Executor::execute`. A nested
/// `execute_recipe` step resolves `sub_recipe_path` into `Path`; a `loop`
/// or `parallel` substep sequence is wrapped as `Parsed` in memory.
pub enum RecipeSource {
	Path(String),
	Json(String),
	Parsed(Recipe),
}

/// Bundles the external collaborators every step needs, plus the registry
/// used to resolve nested step types. Cheap to clone (everything behind
/// an `Arc`) so control-flow steps can hand a copy to each substep
/// `Executor` they spin up.
#[derive(Clone)]
pub struct Runtime {
	pub registry: Arc<StepRegistry>,
	pub llm: Arc<dyn LLMProvider>,
	pub mcp: Arc<dyn MCPClient>,
	pub fs: Arc<dyn FileSystem>,
}

impl Runtime {
	pub fn new(
		registry: Arc<StepRegistry>,
		llm: Arc<dyn LLMProvider>,
		mcp: Arc<dyn MCPClient>,
		fs: Arc<dyn FileSystem>,
	) -> Self {
		Self { registry, llm, mcp, fs }
	}
}

/// Runs the steps of one recipe, in order, against a single mutable
/// `Context`. Stateless itself — all state lives in the `Context` the
/// caller owns and in the `Runtime` it was built with.
#[derive(Clone)]
pub struct Executor {
	runtime: Arc<Runtime>,
}

impl Executor {
	pub fn new(runtime: Arc<Runtime>) -> Self {
		Self { runtime }
	}

	pub fn runtime(&self) -> &Arc<Runtime> {
		&self.runtime
	}

	/// Resolves `source` into a `Recipe` and runs its steps sequentially.
	/// Each step's own failure is wrapped in `RecipeError::StepFailed` with
	/// its 0-based index and type tag so nested failures read like a
	/// breadcrumb trail rather than a single opaque error.
	pub async fn execute(&self, source: RecipeSource, context: &mut Context) -> Result<()> {
		let recipe = self.resolve(source).await?;
		for (index, descriptor) in recipe.steps.iter().enumerate() {
			let span = info_span!(
				target: "recipe_executor",
				"step",
				index,
				step_type = %descriptor.step_type,
			);
			self
				.run_step(descriptor, context)
				.instrument(span)
				.await
				.map_err(|source| RecipeError::wrap_step(index, descriptor.step_type.clone(), source))?;
		}
		Ok(())
	}

	async fn resolve(&self, source: RecipeSource) -> Result<Recipe> {
		match source {
			RecipeSource::Parsed(recipe) => Ok(recipe),
			RecipeSource::Json(raw) => Recipe::from_json(&raw),
			RecipeSource::Path(path) => {
				let raw = self
					.runtime
					.fs
					.read_text(&path)
					.await
					.map_err(|_| RecipeError::FileNotFound(path.clone()))?;
				Recipe::from_json(&raw)
			},
		}
	}

	async fn run_step(&self, descriptor: &StepDescriptor, context: &mut Context) -> Result<()> {
		let factory = self.runtime.registry.lookup(&descriptor.step_type)?;
		let step: Box<dyn Step> = factory(&descriptor.config, tracing::Span::current())?;
		step.execute(context, &self.runtime).await
	}
}

/// Joins a possibly-relative sub-recipe path against the directory of the
/// recipe that referenced it, matching how the §4.6.3 `execute_recipe`
/// step resolves `recipe_path`.
pub fn resolve_relative_to(base: &str, candidate: &str) -> String {
	let candidate_path = Path::new(candidate);
	if candidate_path.is_absolute() {
		return candidate.to_string();
	}
	match Path::new(base).parent() {
		Some(parent) if !parent.as_os_str().is_empty() => parent.join(candidate_path).to_string_lossy().into_owned(),
		_ => candidate.to_string(),
	}
}
