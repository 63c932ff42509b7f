//! Mocks and fixtures shared by the Flowpilot test suites.

mod fixtures;
mod llm;
mod tools;

pub use fixtures::{test_app_config, test_model_config};
pub use llm::{ScriptedLlm, ScriptedTurn};
pub use tools::{EchoTool, FailingTool, SlowTool};
