// `llm_generate` (spec.md §4.8): renders a prompt, compiles the expected
// output shape, invokes the configured `LLMProvider`, and stores the
// validated result.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, Span};

use crate::capabilities::mcp::McpServerConfig;
use crate::context::Context;
use crate::error::{RecipeError, Result};
use crate::executor::Runtime;
use crate::registry::StepRegistry;
use crate::schema::SchemaCompiler;
use crate::steps::Step;
use crate::template;

pub fn register(registry: &mut StepRegistry) {
	registry.register(
		"llm_generate",
		Arc::new(|config: &Value, _span: Span| Ok(Box::new(LLMGenerateStep::from_config(config)?) as Box<dyn Step>)),
	);
}

struct LLMGenerateStep {
	prompt: String,
	model: String,
	output_format: Value,
	output_key: String,
	mcp_servers: Vec<Value>,
}

impl LLMGenerateStep {
	fn from_config(config: &Value) -> Result<Self> {
		let prompt = config
			.get("prompt")
			.and_then(Value::as_str)
			.ok_or_else(|| RecipeError::StepConfigError("llm_generate requires \"prompt\"".into()))?
			.to_string();
		let model = config
			.get("model")
			.and_then(Value::as_str)
			.ok_or_else(|| RecipeError::StepConfigError("llm_generate requires \"model\"".into()))?
			.to_string();
		let output_format = config
			.get("output_format")
			.cloned()
			.ok_or_else(|| RecipeError::StepConfigError("llm_generate requires \"output_format\"".into()))?;
		let output_key = config
			.get("output_key")
			.and_then(Value::as_str)
			.ok_or_else(|| RecipeError::StepConfigError("llm_generate requires \"output_key\"".into()))?
			.to_string();
		let mcp_servers = config.get("mcp_servers").and_then(Value::as_array).cloned().unwrap_or_default();

		Ok(Self { prompt, model, output_format, output_key, mcp_servers })
	}
}

#[async_trait]
impl Step for LLMGenerateStep {
	async fn execute(&self, context: &mut Context, runtime: &Runtime) -> Result<()> {
		let prompt = template::render(&self.prompt, context)?;
		let model = template::render(&self.model, context)?;
		let output_key = template::render(&self.output_key, context)?;

		let validator = SchemaCompiler::compile(&self.output_format)?;

		let mut server_values = self.mcp_servers.clone();
		if let Some(Value::Array(from_config)) = context.config_view().get("mcp_servers") {
			server_values.extend(from_config.iter().cloned());
		}
		let mut servers = Vec::with_capacity(server_values.len());
		for raw in &server_values {
			let rendered = template::render_value(raw, context)?;
			let server: McpServerConfig = serde_json::from_value(rendered)
				.map_err(|e| RecipeError::StepConfigError(format!("invalid mcp_servers entry: {e}")))?;
			servers.push(server);
		}

		info!(target: "recipe_executor", model = %model, "invoking llm provider");
		debug!(target: "recipe_executor", %prompt, "llm prompt");

		let raw_response = runtime
			.llm
			.generate(&prompt, &model, &servers)
			.await
			.map_err(|message| RecipeError::LLMError { model: model.clone(), message })?;

		debug!(target: "recipe_executor", response = %raw_response, "llm response");

		let shape = SchemaCompiler::validate(&validator, &raw_response)
			.map_err(|schema_err| RecipeError::LLMError { model: model.clone(), message: schema_err.to_string() })?;

		context.set(output_key, shape.into_stored_value());
		Ok(())
	}
}
