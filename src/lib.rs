//! Workflow engine that interprets declarative JSON recipes against a
//! shared, cloneable context (see `README`/`DESIGN.md` for the full
//! component map).

pub mod capabilities;
pub mod condition;
pub mod context;
pub mod error;
pub mod executor;
pub mod registry;
pub mod schema;
pub mod steps;
pub mod template;

pub use context::Context;
pub use error::{RecipeError, Result};
pub use executor::{Executor, Recipe, RecipeSource, Runtime, StepDescriptor};
pub use registry::StepRegistry;
