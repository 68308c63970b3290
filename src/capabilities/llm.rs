// LLMProvider capability (spec.md §4.10) consumed by `LLMGenerateStep`.

use async_trait::async_trait;
use serde_json::Value;

use crate::capabilities::mcp::McpServerConfig;

/// External collaborator that turns a prompt + expected output shape into
/// a validated value. Concrete provider clients (OpenAI, Anthropic,
/// Azure, Ollama) are deliberately out of scope (spec.md §1); the core
/// depends only on this trait.
#[async_trait]
pub trait LLMProvider: Send + Sync {
	/// `model` is the rendered, provider-qualified identifier
	/// (`provider/name` or `provider/name/deployment`). `mcp_servers`
	/// become callable tools during generation when non-empty.
	async fn generate(
		&self,
		prompt: &str,
		model: &str,
		mcp_servers: &[McpServerConfig],
	) -> Result<Value, String>;
}

/// Deterministic provider used by the §8 end-to-end scenarios and by CLI
/// users who want to dry-run a recipe without a live model. Available
/// under the `testing` feature or in test builds.
#[cfg(any(test, feature = "testing"))]
pub struct StubLLMProvider<F>(pub F)
where
	F: Fn(&str, &str) -> Result<Value, String> + Send + Sync;

#[cfg(any(test, feature = "testing"))]
#[async_trait]
impl<F> LLMProvider for StubLLMProvider<F>
where
	F: Fn(&str, &str) -> Result<Value, String> + Send + Sync,
{
	async fn generate(&self, prompt: &str, model: &str, _mcp_servers: &[McpServerConfig]) -> Result<Value, String> {
		(self.0)(prompt, model)
	}
}

/// Provider that echoes the prompt back as `"text"`-shaped output,
/// used in scenario S2.
#[cfg(any(test, feature = "testing"))]
pub fn echo_provider() -> StubLLMProvider<impl Fn(&str, &str) -> Result<Value, String> + Send + Sync> {
	StubLLMProvider(|prompt, _model| Ok(Value::String(prompt.to_string())))
}
