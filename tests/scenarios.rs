// End-to-end scenarios from the executor's testable-properties section:
// a recipe parsed from JSON, driven through the public `Executor`, against
// stub capability adapters.

use std::collections::HashMap;
use std::sync::Arc;

use recipe_executor::capabilities::fs::TokioFileSystem;
use recipe_executor::capabilities::llm::{echo_provider, StubLLMProvider};
use recipe_executor::capabilities::mcp::testing::StubMcpClient;
use recipe_executor::{Context, Executor, Recipe, RecipeSource, Runtime, StepRegistry};
use serde_json::json;

fn runtime_with(llm: impl recipe_executor::capabilities::llm::LLMProvider + 'static) -> Arc<Runtime> {
	Arc::new(Runtime::new(
		Arc::new(StepRegistry::with_builtins()),
		Arc::new(llm),
		Arc::new(StubMcpClient { responses: HashMap::new() }),
		Arc::new(TokioFileSystem),
	))
}

/// S1 — a single `llm_generate` call against an echoing stub provider.
#[tokio::test]
async fn s1_echo() {
	let executor = Executor::new(runtime_with(echo_provider()));
	let recipe = Recipe::from_json(
		r#"{"steps":[{"type":"llm_generate","config":{"prompt":"hi","model":"stub/echo","output_format":"text","output_key":"out"}}]}"#,
	)
	.unwrap();

	let mut context = Context::empty();
	executor.execute(RecipeSource::Parsed(recipe), &mut context).await.unwrap();
	assert_eq!(context.get("out"), json!("hi"));
}

/// S2 — the prompt template is rendered before the provider sees it.
#[tokio::test]
async fn s2_template() {
	let executor = Executor::new(runtime_with(echo_provider()));
	let recipe = Recipe::from_json(
		r#"{"steps":[{"type":"llm_generate","config":{"prompt":"hello {{name}}","model":"stub/echo","output_format":"text","output_key":"out"}}]}"#,
	)
	.unwrap();

	let mut context = Context::empty();
	context.set("name", json!("world"));
	executor.execute(RecipeSource::Parsed(recipe), &mut context).await.unwrap();
	assert_eq!(context.get("out"), json!("hello world"));
}

/// S3 — loop aggregation preserves input order.
#[tokio::test]
async fn s3_loop() {
	let executor = Executor::new(runtime_with(echo_provider()));
	let recipe = Recipe::from_json(
		r#"{"steps":[{"type":"loop","config":{
			"items":"xs",
			"item_key":"v",
			"result_key":"tripled",
			"substeps":[
				{"type":"llm_generate","config":{"prompt":"{{v}}0","model":"stub/echo","output_format":"text","output_key":"v"}}
			]
		}}]}"#,
	)
	.unwrap();

	let mut context = Context::empty();
	context.set("xs", json!([1, 2, 3]));
	executor.execute(RecipeSource::Parsed(recipe), &mut context).await.unwrap();
	assert_eq!(context.get("tripled"), json!(["10", "20", "30"]));
}

/// S4 — parallel substeps each write a distinct file; both land on disk.
#[tokio::test]
async fn s4_parallel_writes() {
	let dir = tempfile::tempdir().unwrap();
	let executor = Executor::new(runtime_with(echo_provider()));

	let recipe_json = format!(
		r#"{{"steps":[{{"type":"parallel","config":{{
			"substeps":[
				{{"type":"write_files","config":{{"artifact":"fa","root":"{root}"}}}},
				{{"type":"write_files","config":{{"artifact":"fb","root":"{root}"}}}}
			],
			"max_concurrency":2
		}}}}]}}"#,
		root = dir.path().to_str().unwrap().replace('\\', "\\\\")
	);

	let recipe = Recipe::from_json(&recipe_json).unwrap();
	let mut context = Context::empty();
	context.set("fa", json!([{"path": "a.txt", "content": "A"}]));
	context.set("fb", json!([{"path": "b.txt", "content": "B"}]));
	executor.execute(RecipeSource::Parsed(recipe), &mut context).await.unwrap();

	assert_eq!(fs_err::read_to_string(dir.path().join("a.txt")).unwrap(), "A");
	assert_eq!(fs_err::read_to_string(dir.path().join("b.txt")).unwrap(), "B");
}

/// S5 — conditional branch selection.
#[tokio::test]
async fn s5_conditional() {
	let executor = Executor::new(runtime_with(echo_provider()));
	let recipe = Recipe::from_json(
		r#"{"steps":[{"type":"conditional","config":{
			"condition":"context[\"flag\"] == true",
			"if_true":{"steps":[{"type":"llm_generate","config":{"prompt":"1","model":"stub/echo","output_format":"text","output_key":"x"}}]},
			"if_false":{"steps":[{"type":"llm_generate","config":{"prompt":"2","model":"stub/echo","output_format":"text","output_key":"x"}}]}
		}}]}"#,
	)
	.unwrap();

	let mut context = Context::empty();
	context.set("flag", json!(true));
	executor.execute(RecipeSource::Parsed(recipe), &mut context).await.unwrap();
	assert_eq!(context.get("x"), json!("1"));
}

/// S6 — object schema validation, both the success and failure paths.
#[tokio::test]
async fn s6_schema_success() {
	let provider = StubLLMProvider(|_prompt, _model| Ok(json!({"n": 7, "s": "ok"})));
	let executor = Executor::new(runtime_with(provider));
	let recipe = Recipe::from_json(
		r#"{"steps":[{"type":"llm_generate","config":{
			"prompt":"x","model":"stub/echo",
			"output_format":{"type":"object","properties":{"n":{"type":"integer"},"s":{"type":"string"}},"required":["n","s"]},
			"output_key":"out"
		}}]}"#,
	)
	.unwrap();

	let mut context = Context::empty();
	executor.execute(RecipeSource::Parsed(recipe), &mut context).await.unwrap();
	assert_eq!(context.get("out"), json!({"n": 7, "s": "ok"}));
}

#[tokio::test]
async fn s6_schema_failure_wraps_as_llm_error() {
	let provider = StubLLMProvider(|_prompt, _model| Ok(json!({"n": "not-a-number"})));
	let executor = Executor::new(runtime_with(provider));
	let recipe = Recipe::from_json(
		r#"{"steps":[{"type":"llm_generate","config":{
			"prompt":"x","model":"stub/echo",
			"output_format":{"type":"object","properties":{"n":{"type":"integer"}},"required":["n"]},
			"output_key":"out"
		}}]}"#,
	)
	.unwrap();

	let mut context = Context::empty();
	let err = executor.execute(RecipeSource::Parsed(recipe), &mut context).await.unwrap_err();
	let message = err.to_string();
	assert!(message.contains("llm_generate") || message.contains("LLM call failed"), "{message}");
}
