// Built-in step implementations (spec.md §4.6-§4.9).

mod conditional;
mod execute_recipe;
mod llm_generate;
mod loop_step;
mod mcp;
mod parallel;
mod read_files;
mod write_files;

use async_trait::async_trait;

use crate::context::Context;
use crate::error::Result;
use crate::executor::Runtime;
use crate::registry::StepRegistry;

/// One unit of work inside a recipe. Built from a `StepDescriptor`'s
/// config by a factory registered under its `type` tag, then executed
/// once against the shared context.
#[async_trait]
pub trait Step: Send + Sync {
	async fn execute(&self, context: &mut Context, runtime: &Runtime) -> Result<()>;
}

/// The single place every built-in step type is registered (spec.md §9's
/// resolved open question: one registration path, no side-effect
/// registration scattered across modules).
pub fn register_builtins(registry: &mut StepRegistry) {
	read_files::register(registry);
	write_files::register(registry);
	llm_generate::register(registry);
	execute_recipe::register(registry);
	loop_step::register(registry);
	parallel::register(registry);
	conditional::register(registry);
	mcp::register(registry);
}
