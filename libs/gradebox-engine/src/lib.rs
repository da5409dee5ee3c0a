//! Sandboxed execution and grading of challenge submissions.
//!
//! [`Engine`] runs a submission inside a [`Sandbox`] and evaluates every test
//! case; [`RunSession`] serializes runs for a single editor.

pub mod config;
pub mod engine;
pub mod evaluator;
pub mod harness;
pub mod sandbox;
pub mod session;
pub mod transcript;

mod engine_tests;

pub use config::{Backend, EngineConfig, LanguageConfigManager};
pub use engine::{Engine, RunRequest, MAX_SOURCE_CODE_BYTES, MAX_TEST_INPUT_BYTES};
pub use sandbox::{DockerSandbox, ProcessSandbox, RawExecution, Sandbox, SandboxError};
pub use session::{RunError, RunHandle, RunSession, RunState};
