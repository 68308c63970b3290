// CLI entrypoint (spec.md §6): peripheral glue over the library's
// Executor. Wires the default capability adapters and seeds the context
// from `--context key=value` pairs.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use serde_json::{Map, Value};
use tracing_subscriber::EnvFilter;

use recipe_executor::capabilities::fs::TokioFileSystem;
use recipe_executor::capabilities::llm::LLMProvider;
use recipe_executor::capabilities::mcp::{McpServerConfig, RmcpClient};
use recipe_executor::{Context, Executor, RecipeSource, Runtime, StepRegistry};

#[derive(Parser)]
#[command(name = "recipe_executor", about = "Runs a declarative recipe against a seeded context")]
struct Cli {
	/// Path to the recipe JSON file to run.
	recipe_path: PathBuf,

	/// Seed an artifact: `--context key=value` (repeatable).
	#[arg(long = "context", value_parser = parse_key_value)]
	context: Vec<(String, String)>,

	/// Write logs to this directory instead of stderr.
	#[arg(long = "log-dir")]
	log_dir: Option<PathBuf>,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
	raw.split_once('=')
		.map(|(k, v)| (k.to_string(), v.to_string()))
		.ok_or_else(|| format!("--context entries must be key=value, got {raw:?}"))
}

/// Placeholder `LLMProvider` wired in by default. Concrete provider
/// clients are out of core scope (spec.md §1); embedders replace this
/// with a real one when building the binary for production use.
struct UnconfiguredLLMProvider;

#[async_trait]
impl LLMProvider for UnconfiguredLLMProvider {
	async fn generate(&self, _prompt: &str, model: &str, _mcp_servers: &[McpServerConfig]) -> Result<Value, String> {
		Err(format!("no LLMProvider configured for model '{model}' — link a concrete provider when embedding this crate"))
	}
}

fn init_logging(log_dir: Option<&PathBuf>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	match log_dir {
		Some(dir) => {
			let appender = tracing_appender::rolling::daily(dir, "recipe_executor.log");
			let (non_blocking, guard) = tracing_appender::non_blocking(appender);
			tracing_subscriber::fmt().with_env_filter(filter).with_writer(non_blocking).json().init();
			Some(guard)
		},
		None => {
			tracing_subscriber::fmt().with_env_filter(filter).init();
			None
		},
	}
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
	let cli = Cli::parse();
	let _log_guard = init_logging(cli.log_dir.as_ref());

	let mut artifacts = Map::new();
	for (key, value) in cli.context {
		artifacts.insert(key, Value::String(value));
	}
	let mut context = Context::new(artifacts, Map::new());

	let runtime = Arc::new(Runtime::new(
		Arc::new(StepRegistry::with_builtins()),
		Arc::new(UnconfiguredLLMProvider),
		Arc::new(RmcpClient),
		Arc::new(TokioFileSystem),
	));
	let executor = Executor::new(runtime);

	let recipe_path = cli.recipe_path.to_string_lossy().into_owned();
	match executor.execute(RecipeSource::Path(recipe_path), &mut context).await {
		Ok(()) => std::process::ExitCode::SUCCESS,
		Err(e) => {
			tracing::error!(target: "recipe_executor", error = %e, "recipe execution failed");
			eprintln!("error: {e}");
			std::process::ExitCode::FAILURE
		},
	}
}
