pub mod catalog;
pub mod types;

pub use catalog::{Catalog, CatalogError};
pub use types::{
    Challenge, CompletionReport, Difficulty, EntryPoint, ExecutionResult, Language, RunStatus,
    SubmissionAttempt, TestCase, TestResult,
};
