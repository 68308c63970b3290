// `mcp` (spec.md §4.9): opens a scoped session against a tool server,
// invokes one tool, and stores the structured result.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::Span;

use crate::capabilities::mcp::McpServerConfig;
use crate::context::Context;
use crate::error::{RecipeError, Result};
use crate::executor::Runtime;
use crate::registry::StepRegistry;
use crate::steps::Step;
use crate::template;

pub fn register(registry: &mut StepRegistry) {
	registry.register(
		"mcp",
		Arc::new(|config: &Value, _span: Span| Ok(Box::new(MCPStep::from_config(config)?) as Box<dyn Step>)),
	);
}

struct MCPStep {
	server: Value,
	tool_name: String,
	arguments: Value,
	result_key: String,
}

impl MCPStep {
	fn from_config(config: &Value) -> Result<Self> {
		let server = config
			.get("server")
			.cloned()
			.ok_or_else(|| RecipeError::StepConfigError("mcp requires \"server\"".into()))?;
		let tool_name = config
			.get("tool_name")
			.and_then(Value::as_str)
			.ok_or_else(|| RecipeError::StepConfigError("mcp requires \"tool_name\"".into()))?
			.to_string();
		let arguments = config.get("arguments").cloned().unwrap_or_else(|| Value::Object(Default::default()));
		let result_key = config.get("result_key").and_then(Value::as_str).unwrap_or("tool_result").to_string();

		Ok(Self { server, tool_name, arguments, result_key })
	}
}

fn describe(server: &McpServerConfig) -> String {
	match server {
		McpServerConfig::Stdio { command, args, .. } => format!("{command} {}", args.join(" ")),
		McpServerConfig::Http { url, .. } => url.clone(),
	}
}

#[async_trait]
impl Step for MCPStep {
	async fn execute(&self, context: &mut Context, runtime: &Runtime) -> Result<()> {
		let rendered_server = template::render_value(&self.server, context)?;
		let server: McpServerConfig = serde_json::from_value(rendered_server)
			.map_err(|e| RecipeError::StepConfigError(format!("mcp \"server\" is malformed: {e}")))?;
		let service = describe(&server);

		let tool_name = template::render(&self.tool_name, context)?;
		let arguments = template::render_value(&self.arguments, context)?;

		let mut session = runtime
			.mcp
			.open(&server)
			.await
			.map_err(|message| RecipeError::ToolInvocationError { service: service.clone(), message })?;

		let invoke_result = session.invoke(&tool_name, arguments).await;
		let close_result = session.close().await;

		let result = invoke_result.map_err(|message| RecipeError::ToolInvocationError { service: service.clone(), message })?;
		close_result.map_err(|message| RecipeError::ToolInvocationError { service, message })?;

		context.set(self.result_key.clone(), result);
		Ok(())
	}
}
