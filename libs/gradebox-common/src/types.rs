use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Languages the grader knows how to wrap in a harness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[serde(alias = "js", alias = "node")]
    JavaScript,
    #[serde(alias = "py", alias = "python3")]
    Python,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::JavaScript, Language::Python];

    /// Source file extension, without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            Language::JavaScript => "js",
            Language::Python => "py",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::JavaScript => write!(f, "javascript"),
            Language::Python => write!(f, "python"),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unsupported language: {0}")]
pub struct UnsupportedLanguage(pub String);

impl FromStr for Language {
    type Err = UnsupportedLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "javascript" | "js" | "node" => Ok(Language::JavaScript),
            "python" | "py" | "python3" => Ok(Language::Python),
            other => Err(UnsupportedLanguage(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

/// Function a challenge expects the submission to define.
///
/// The grader calls `name` once per test case with exactly `arity`
/// arguments parsed from the case input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPoint {
    pub name: String,
    pub arity: usize,
}

impl EntryPoint {
    pub fn new(name: impl Into<String>, arity: usize) -> Self {
        Self {
            name: name.into(),
            arity,
        }
    }

    /// True when `name` is a plain identifier in both supported languages
    pub fn is_valid(&self) -> bool {
        let mut chars = self.name.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
            _ => return false,
        }
        chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.arity)
    }
}

impl FromStr for EntryPoint {
    type Err = String;

    /// Parses `name/arity`, e.g. `add/2`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, arity) = s
            .split_once('/')
            .ok_or_else(|| format!("expected NAME/ARITY, got '{}'", s))?;
        let arity = arity
            .trim()
            .parse()
            .map_err(|_| format!("invalid arity '{}'", arity))?;
        let entry = EntryPoint::new(name.trim(), arity);
        if !entry.is_valid() {
            return Err(format!("invalid function name '{}'", entry.name));
        }
        Ok(entry)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    /// Comma separated literal arguments, e.g. `2, 3` or `"abc"`
    pub input: String,
    pub expected_output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub hidden: bool,
}

impl TestCase {
    pub fn new(input: impl Into<String>, expected_output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            expected_output: expected_output.into(),
            description: None,
            hidden: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    pub id: String,
    pub title: String,
    pub description: String,
    pub difficulty: Difficulty,
    pub language: Language,
    pub starter_code: String,
    pub test_cases: Vec<TestCase>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<String>,
    /// Authoring allowance shown to the user, in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_point: Option<EntryPoint>,
}

impl Challenge {
    pub fn submission(&self, source_text: impl Into<String>) -> SubmissionAttempt {
        SubmissionAttempt {
            challenge_id: self.id.clone(),
            source_text: source_text.into(),
            language: self.language,
        }
    }
}

/// One user request to run code. Owned by the caller for a single run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionAttempt {
    pub challenge_id: String,
    pub source_text: String,
    pub language: Language,
}

/// Terminal state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunStatus {
    /// Program ran to completion; individual tests may still have failed
    Completed,
    /// Submitted code raised, failed to parse or exited abnormally
    Faulted,
    /// Time budget exhausted or the run was cancelled
    TimedOut,
    /// The sandbox could not be set up; not the submission's fault
    EngineError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub passed: bool,
    pub input: String,
    pub expected: String,
    pub actual: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub hidden: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub status: RunStatus,
    pub success: bool,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_results: Option<Vec<TestResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
}

/// What the caller forwards to progress tracking once a verdict is final
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionReport {
    pub passed: bool,
    pub score: u8,
}

pub const HIDDEN_PLACEHOLDER: &str = "hidden";

impl ExecutionResult {
    /// Empty `test_results` collapse to `None`: a raw run has no breakdown
    pub fn completed(
        output: String,
        test_results: Vec<TestResult>,
        execution_time_ms: u64,
    ) -> Self {
        Self {
            status: RunStatus::Completed,
            success: true,
            output,
            error: None,
            test_results: if test_results.is_empty() {
                None
            } else {
                Some(test_results)
            },
            execution_time_ms: Some(execution_time_ms),
        }
    }

    pub fn faulted(output: String, error: impl Into<String>, execution_time_ms: u64) -> Self {
        Self {
            status: RunStatus::Faulted,
            success: false,
            output,
            error: Some(error.into()),
            test_results: None,
            execution_time_ms: Some(execution_time_ms),
        }
    }

    pub fn timed_out(error: impl Into<String>, execution_time_ms: Option<u64>) -> Self {
        Self {
            status: RunStatus::TimedOut,
            success: false,
            output: String::new(),
            error: Some(error.into()),
            test_results: None,
            execution_time_ms,
        }
    }

    pub fn engine_error(error: impl fmt::Display) -> Self {
        Self {
            status: RunStatus::EngineError,
            success: false,
            output: String::new(),
            error: Some(format!("Could not run your code: {}", error)),
            test_results: None,
            execution_time_ms: None,
        }
    }

    pub fn passed_count(&self) -> usize {
        self.test_results
            .as_deref()
            .map_or(0, |results| results.iter().filter(|r| r.passed).count())
    }

    pub fn total_count(&self) -> usize {
        self.test_results.as_deref().map_or(0, |results| results.len())
    }

    /// Percentage of passed tests, rounded to the nearest integer
    pub fn score(&self) -> u8 {
        let total = self.total_count();
        if !self.success || total == 0 {
            return 0;
        }
        let passed = self.passed_count();
        ((passed * 100 + total / 2) / total) as u8
    }

    /// `None` for a completed run without test cases, which has no verdict
    pub fn completion_report(&self) -> Option<CompletionReport> {
        if self.success && self.total_count() == 0 {
            return None;
        }
        let total = self.total_count();
        Some(CompletionReport {
            passed: self.success && total > 0 && self.passed_count() == total,
            score: self.score(),
        })
    }

    /// Blank out input, expected and actual values of hidden test cases
    pub fn redact_hidden(&mut self) {
        for result in self.test_results.iter_mut().flatten() {
            if result.hidden {
                result.input = HIDDEN_PLACEHOLDER.to_string();
                result.expected = HIDDEN_PLACEHOLDER.to_string();
                result.actual = HIDDEN_PLACEHOLDER.to_string();
            }
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}
