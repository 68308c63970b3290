// `write_files` (spec.md §4.7.2): writes a FileGenerationResult (or bare
// FileSpec sequence) found at `artifact` onto disk under `root`.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::Span;

use crate::context::Context;
use crate::error::{RecipeError, Result};
use crate::executor::Runtime;
use crate::registry::StepRegistry;
use crate::schema::FileSpec;
use crate::steps::Step;
use crate::template;

pub fn register(registry: &mut StepRegistry) {
	registry.register(
		"write_files",
		Arc::new(|config: &Value, _span: Span| Ok(Box::new(WriteFilesStep::from_config(config)?) as Box<dyn Step>)),
	);
}

struct WriteFilesStep {
	artifact: String,
	root: String,
}

impl WriteFilesStep {
	fn from_config(config: &Value) -> Result<Self> {
		let artifact = config
			.get("artifact")
			.and_then(Value::as_str)
			.ok_or_else(|| RecipeError::StepConfigError("write_files requires \"artifact\"".into()))?
			.to_string();
		let root = config.get("root").and_then(Value::as_str).unwrap_or(".").to_string();
		Ok(Self { artifact, root })
	}
}

fn extract_files(value: &Value) -> Result<Vec<FileSpec>> {
	if let Ok(files) = serde_json::from_value::<Vec<FileSpec>>(value.clone()) {
		return Ok(files);
	}
	if let Some(files) = value.get("files") {
		return serde_json::from_value(files.clone())
			.map_err(|e| RecipeError::StepConfigError(format!("write_files artifact.files must be FileSpec entries: {e}")));
	}
	Err(RecipeError::StepConfigError(
		"write_files artifact must be a FileGenerationResult or a list of FileSpec".into(),
	))
}

/// Joins `root` and `file_path`, dropping a duplicated leading path segment
/// when `root`'s last component matches `file_path`'s first component
/// (guards against `<root>/<root>/…` layouts). Absolute `file_path`
/// bypasses `root` entirely.
fn join_with_dedup(root: &str, file_path: &str) -> PathBuf {
	let file = Path::new(file_path);
	if file.is_absolute() {
		return file.to_path_buf();
	}

	let root_path = Path::new(root);
	let root_last = root_path.components().next_back();
	let mut file_components = file.components();
	let file_first = file_components.clone().next();

	let duplicated = matches!(
		(root_last, file_first),
		(Some(Component::Normal(r)), Some(Component::Normal(f))) if r == f
	);
	if duplicated {
		file_components.next();
		root_path.join(file_components.as_path())
	} else {
		root_path.join(file)
	}
}

#[async_trait]
impl Step for WriteFilesStep {
	async fn execute(&self, context: &mut Context, runtime: &Runtime) -> Result<()> {
		let value = context.get(&self.artifact);
		let files = extract_files(&value)?;
		let rendered_root = template::render(&self.root, context)?;
		let root = runtime.fs.expand_user(&rendered_root);

		for file in &files {
			let rendered_path = template::render(&file.path, context)?;
			let rendered_path = runtime.fs.expand_user(&rendered_path);
			let final_path = join_with_dedup(&root, &rendered_path);
			runtime
				.fs
				.write_text(&final_path.to_string_lossy(), &file.content)
				.await
				.map_err(|e| RecipeError::StepConfigError(format!("failed to write {}: {e}", final_path.display())))?;
		}
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
	async fn writes_file_generation_result_under_root() {
		let dir = tempfile::tempdir().unwrap();
		let mut ctx = Context::empty();
		ctx.set(
			"files",
			json!({"files": [{"path": "a.txt", "content": "hi"}], "commentary": "done"}),
		);

		let step = WriteFilesStep::from_config(&json!({
			"artifact": "files",
			"root": dir.path().to_str().unwrap(),
		}))
		.unwrap();
		step.execute(&mut ctx, &runtime()).await.unwrap();

		assert_eq!(fs_err::read_to_string(dir.path().join("a.txt")).unwrap(), "hi");
	}

	#[tokio::test]
	async fn writes_bare_filespec_list() {
		let dir = tempfile::tempdir().unwrap();
		let mut ctx = Context::empty();
		ctx.set("files", json!([{"path": "b.txt", "content": "yo"}]));

		let step = WriteFilesStep::from_config(&json!({"artifact": "files", "root": dir.path().to_str().unwrap()})).unwrap();
		step.execute(&mut ctx, &runtime()).await.unwrap();
		assert_eq!(fs_err::read_to_string(dir.path().join("b.txt")).unwrap(), "yo");
	}

	#[test]
	fn duplicated_leading_segment_is_dropped() {
		let joined = join_with_dedup("out", "out/a.txt");
		assert_eq!(joined, Path::new("out/a.txt"));
	}

	#[test]
	fn distinct_segments_are_joined_normally() {
		let joined = join_with_dedup("out", "a.txt");
		assert_eq!(joined, Path::new("out/a.txt"));
	}

	#[test]
	fn absolute_file_path_bypasses_root() {
		let joined = join_with_dedup("out", "/tmp/a.txt");
		assert_eq!(joined, Path::new("/tmp/a.txt"));
	}
}
