// `conditional` (spec.md §4.6.4): evaluates a closed expression against
// the context and runs one of two branches in place (no context clone —
// this is inline control flow, not a fork).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::Span;

use crate::condition::{self, Expr};
use crate::context::Context;
use crate::error::{RecipeError, Result};
use crate::executor::{Executor, Recipe, RecipeSource, Runtime, StepDescriptor};
use crate::registry::StepRegistry;
use crate::steps::Step;
use crate::template;

pub fn register(registry: &mut StepRegistry) {
	registry.register(
		"conditional",
		Arc::new(|config: &Value, _span: Span| Ok(Box::new(ConditionalStep::from_config(config)?) as Box<dyn Step>)),
	);
}

struct ConditionalStep {
	condition: String,
	if_true: Vec<StepDescriptor>,
	if_false: Vec<StepDescriptor>,
}

fn branch_steps(value: Option<&Value>) -> Result<Vec<StepDescriptor>> {
	match value {
		None => Ok(Vec::new()),
		Some(branch) => {
			let steps = branch
				.get("steps")
				.ok_or_else(|| RecipeError::StepConfigError("conditional branch must have a \"steps\" array".into()))?;
			serde_json::from_value(steps.clone())
				.map_err(|e| RecipeError::StepConfigError(format!("conditional branch steps malformed: {e}")))
		},
	}
}

impl ConditionalStep {
	fn from_config(config: &Value) -> Result<Self> {
		let condition = config
			.get("condition")
			.and_then(Value::as_str)
			.ok_or_else(|| RecipeError::StepConfigError("conditional requires \"condition\"".into()))?
			.to_string();
		let if_true = branch_steps(config.get("if_true"))?;
		let if_false = branch_steps(config.get("if_false"))?;

		Ok(Self { condition, if_true, if_false })
	}
}

#[async_trait]
impl Step for ConditionalStep {
	async fn execute(&self, context: &mut Context, runtime: &Runtime) -> Result<()> {
		let rendered = template::render(&self.condition, context)?;
		let expr: Expr = condition::parse(&rendered)?;
		let outcome = condition::eval(&expr, context, runtime.fs.as_ref()).await?;

		let branch = if outcome { &self.if_true } else { &self.if_false };
		if branch.is_empty() {
			return Ok(());
		}

		let executor = Executor::new(Arc::new(runtime.clone()));
		executor.execute(RecipeSource::Parsed(Recipe { steps: branch.clone() }), context).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::capabilities::fs::TokioFileSystem;
	use crate::capabilities::llm::echo_provider;
	use crate::capabilities::mcp::testing::StubMcpClient;
	use serde_json::json;
	use std::collections::HashMap;

	fn runtime() -> Runtime {
		Runtime::new(
			Arc::new(StepRegistry::with_builtins()),
			Arc::new(echo_provider()),
			Arc::new(StubMcpClient { responses: HashMap::new() }),
			Arc::new(TokioFileSystem),
		)
	}

	#[tokio::test]
	async fn true_branch_runs_and_mutates_parent_context() {
		let step = ConditionalStep::from_config(&json!({
			"condition": "context[\"flag\"] == true",
			"if_true": {"steps": [{"type": "read_files", "config": {"path": "/dev/null", "artifact": "x", "optional": true}}]},
			"if_false": {"steps": [{"type": "read_files", "config": {"path": "/dev/null", "artifact": "y", "optional": true}}]},
		}))
		.unwrap();
		let mut ctx = Context::empty();
		ctx.set("flag", json!(true));
		step.execute(&mut ctx, &runtime()).await.unwrap();
		assert!(ctx.contains("x"));
		assert!(!ctx.contains("y"));
	}

	#[tokio::test]
	async fn missing_if_false_on_false_condition_is_a_no_op() {
		let step = ConditionalStep::from_config(&json!({
			"condition": "false",
			"if_true": {"steps": [{"type": "read_files", "config": {"path": "/dev/null", "artifact": "x", "optional": true}}]},
		}))
		.unwrap();
		let mut ctx = Context::empty();
		step.execute(&mut ctx, &runtime()).await.unwrap();
		assert!(!ctx.contains("x"));
	}
}
