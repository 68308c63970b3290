// `parallel` (spec.md §4.6.3): fans out independent substeps against
// private context clones, bounded by `max_concurrency` and staggered by
// `delay`. Fail-fast aborts further launches but lets in-flight substeps
// finish; results are never merged back into the parent context.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::Span;

use crate::context::Context;
use crate::error::{RecipeError, Result};
use crate::executor::{Executor, Recipe, RecipeSource, Runtime, StepDescriptor};
use crate::registry::StepRegistry;
use crate::steps::Step;

pub fn register(registry: &mut StepRegistry) {
	registry.register(
		"parallel",
		Arc::new(|config: &Value, _span: Span| Ok(Box::new(ParallelStep::from_config(config)?) as Box<dyn Step>)),
	);
}

struct ParallelStep {
	substeps: Vec<StepDescriptor>,
	max_concurrency: usize,
	delay: f64,
}

impl ParallelStep {
	fn from_config(config: &Value) -> Result<Self> {
		let substeps: Vec<StepDescriptor> = config
			.get("substeps")
			.cloned()
			.map(serde_json::from_value)
			.transpose()
			.map_err(|e| RecipeError::StepConfigError(format!("parallel substeps malformed: {e}")))?
			.ok_or_else(|| RecipeError::StepConfigError("parallel requires \"substeps\"".into()))?;
		let max_concurrency = config
			.get("max_concurrency")
			.and_then(Value::as_u64)
			.unwrap_or(0) as usize;
		let delay = config.get("delay").and_then(Value::as_f64).unwrap_or(0.0);

		Ok(Self { substeps, max_concurrency, delay })
	}
}

#[async_trait]
impl Step for ParallelStep {
	async fn execute(&self, context: &mut Context, runtime: &Runtime) -> Result<()> {
		let semaphore = (self.max_concurrency > 0).then(|| Arc::new(Semaphore::new(self.max_concurrency)));
		let aborted = Arc::new(AtomicBool::new(false));
		let first_error: Arc<Mutex<Option<RecipeError>>> = Arc::new(Mutex::new(None));
		let mut handles = Vec::with_capacity(self.substeps.len());

		for (index, descriptor) in self.substeps.iter().enumerate() {
			if aborted.load(Ordering::SeqCst) {
				break;
			}
			if index > 0 && self.delay > 0.0 {
				tokio::time::sleep(Duration::from_secs_f64(self.delay)).await;
			}

			let permit = match &semaphore {
				Some(sem) => Some(sem.clone().acquire_owned().await.expect("semaphore is never closed")),
				None => None,
			};

			let executor = Executor::new(Arc::new(runtime.clone()));
			let mut child = context.clone_deep();
			let recipe = Recipe { steps: vec![descriptor.clone()] };
			let aborted = Arc::clone(&aborted);
			let first_error = Arc::clone(&first_error);

			handles.push(tokio::spawn(async move {
				let _permit = permit;
				if let Err(e) = executor.execute(RecipeSource::Parsed(recipe), &mut child).await {
					let mut guard = first_error.lock().expect("parallel error mutex poisoned");
					if guard.is_none() {
						*guard = Some(e);
					}
					aborted.store(true, Ordering::SeqCst);
				}
			}));
		}

		for handle in handles {
			handle.await.expect("parallel substep task panicked");
		}

		match first_error.lock().expect("parallel error mutex poisoned").take() {
			Some(e) => Err(e),
			None => Ok(()),
		}
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
	async fn writes_from_both_substeps_land_on_disk() {
		let dir = tempfile::tempdir().unwrap();
		let a = dir.path().join("a.txt");
		let b = dir.path().join("b.txt");

		let step = ParallelStep::from_config(&json!({
			"substeps": [
				{"type": "write_files", "config": {"artifact": "fa", "root": dir.path().to_str().unwrap()}},
				{"type": "write_files", "config": {"artifact": "fb", "root": dir.path().to_str().unwrap()}},
			],
			"max_concurrency": 2,
		}))
		.unwrap();

		let mut ctx = Context::empty();
		ctx.set("fa", json!([{"path": "a.txt", "content": "A"}]));
		ctx.set("fb", json!([{"path": "b.txt", "content": "B"}]));
		step.execute(&mut ctx, &runtime()).await.unwrap();

		assert_eq!(fs_err::read_to_string(&a).unwrap(), "A");
		assert_eq!(fs_err::read_to_string(&b).unwrap(), "B");
	}

	#[tokio::test]
	async fn first_failure_is_propagated() {
		let step = ParallelStep::from_config(&json!({
			"substeps": [{"type": "does_not_exist"}],
		}))
		.unwrap();
		let mut ctx = Context::empty();
		assert!(step.execute(&mut ctx, &runtime()).await.is_err());
	}
}
