// `read_files` (spec.md §4.7.1): renders one or more paths, reads each as
// UTF-8 text, and writes an aggregated result to an artifact key.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::Span;

use crate::context::Context;
use crate::error::{RecipeError, Result};
use crate::executor::Runtime;
use crate::registry::StepRegistry;
use crate::steps::Step;
use crate::template;

pub fn register(registry: &mut StepRegistry) {
	registry.register(
		"read_files",
		Arc::new(|config: &Value, _span: Span| Ok(Box::new(ReadFilesStep::from_config(config)?) as Box<dyn Step>)),
	);
}

#[derive(Debug, Clone, PartialEq)]
enum MergeMode {
	Concat,
	Dict,
}

struct ReadFilesStep {
	paths: Vec<String>,
	artifact: String,
	optional: bool,
	merge_mode: MergeMode,
}

impl ReadFilesStep {
	fn from_config(config: &Value) -> Result<Self> {
		let raw_path = config.get("path").ok_or_else(|| RecipeError::StepConfigError("read_files requires \"path\"".into()))?;
		let paths = match raw_path {
			Value::String(s) => s.split(',').map(|p| p.trim().to_string()).filter(|p| !p.is_empty()).collect(),
			Value::Array(items) => items
				.iter()
				.map(|v| {
					v.as_str()
						.map(str::to_string)
						.ok_or_else(|| RecipeError::StepConfigError(format!("read_files path entries must be strings, got {v}")))
				})
				.collect::<Result<Vec<_>>>()?,
			other => return Err(RecipeError::StepConfigError(format!("read_files \"path\" must be a string or array, got {other}"))),
		};

		let artifact = config
			.get("artifact")
			.and_then(Value::as_str)
			.ok_or_else(|| RecipeError::StepConfigError("read_files requires \"artifact\"".into()))?
			.to_string();

		let optional = config.get("optional").and_then(Value::as_bool).unwrap_or(false);

		let merge_mode = match config.get("merge_mode").and_then(Value::as_str).unwrap_or("concat") {
			"concat" => MergeMode::Concat,
			"dict" => MergeMode::Dict,
			other => return Err(RecipeError::StepConfigError(format!("read_files merge_mode must be \"concat\" or \"dict\", got {other:?}"))),
		};

		Ok(Self { paths, artifact, optional, merge_mode })
	}
}

#[async_trait]
impl Step for ReadFilesStep {
	async fn execute(&self, context: &mut Context, runtime: &Runtime) -> Result<()> {
		let mut entries: Vec<(String, String)> = Vec::with_capacity(self.paths.len());
		for raw in &self.paths {
			let rendered = template::render(raw, context)?;
			let basename = Path::new(&rendered)
				.file_name()
				.map(|n| n.to_string_lossy().into_owned())
				.unwrap_or_else(|| rendered.clone());

			let content = match runtime.fs.read_text(&rendered).await {
				Ok(text) => text,
				Err(_) if self.optional => String::new(),
				Err(_) => return Err(RecipeError::FileNotFound(rendered.clone())),
			};
			entries.push((basename, content));
		}

		let result = match (entries.len(), &self.merge_mode) {
			(0, _) => Value::String(String::new()),
			(1, MergeMode::Concat) => Value::String(entries[0].1.clone()),
			(1, MergeMode::Dict) => {
				let mut map = serde_json::Map::new();
				map.insert(entries[0].0.clone(), Value::String(entries[0].1.clone()));
				Value::Object(map)
			},
			(_, MergeMode::Concat) => {
				let blocks: Vec<String> = entries.iter().map(|(name, content)| format!("{name}:\n{content}")).collect();
				Value::String(blocks.join("\n"))
			},
			(_, MergeMode::Dict) => {
				let mut map = serde_json::Map::new();
				for (name, content) in &entries {
					map.insert(name.clone(), Value::String(content.clone()));
				}
				Value::Object(map)
			},
		};

		context.set(self.artifact.clone(), result);
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::capabilities::fs::TokioFileSystem;
	use crate::capabilities::llm::echo_provider;
	use crate::capabilities::mcp::testing::StubMcpClient;
	use crate::registry::StepRegistry;
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
	async fn single_file_concat_stores_raw_content() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("a.txt");
		fs_err::write(&path, "hello").unwrap();

		let step = ReadFilesStep::from_config(&json!({
			"path": path.to_str().unwrap(),
			"artifact": "out",
		}))
		.unwrap();
		let mut ctx = Context::empty();
		step.execute(&mut ctx, &runtime()).await.unwrap();
		assert_eq!(ctx.get("out"), json!("hello"));
	}

	#[tokio::test]
	async fn missing_required_file_fails() {
		let step = ReadFilesStep::from_config(&json!({"path": "/no/such/file.txt", "artifact": "out"})).unwrap();
		let mut ctx = Context::empty();
		assert!(matches!(step.execute(&mut ctx, &runtime()).await, Err(RecipeError::FileNotFound(_))));
	}

	#[tokio::test]
	async fn optional_missing_file_substitutes_empty_string() {
		let step = ReadFilesStep::from_config(&json!({"path": "/no/such/file.txt", "artifact": "out", "optional": true})).unwrap();
		let mut ctx = Context::empty();
		step.execute(&mut ctx, &runtime()).await.unwrap();
		assert_eq!(ctx.get("out"), json!(""));
	}

	#[tokio::test]
	async fn multiple_files_dict_mode_keys_by_basename() {
		let dir = tempfile::tempdir().unwrap();
		let a = dir.path().join("a.txt");
		let b = dir.path().join("b.txt");
		fs_err::write(&a, "A").unwrap();
		fs_err::write(&b, "B").unwrap();

		let step = ReadFilesStep::from_config(&json!({
			"path": [a.to_str().unwrap(), b.to_str().unwrap()],
			"artifact": "out",
			"merge_mode": "dict",
		}))
		.unwrap();
		let mut ctx = Context::empty();
		step.execute(&mut ctx, &runtime()).await.unwrap();
		assert_eq!(ctx.get("out"), json!({"a.txt": "A", "b.txt": "B"}));
	}
}
