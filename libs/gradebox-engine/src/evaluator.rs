/// Test Evaluator - Language-Agnostic Verdicts
///
/// **Core Responsibility:**
/// Compare what a submission produced for each test case against the expected
/// output and build the ordered `TestResult` list.
///
/// **Critical Properties:**
/// - Knows nothing about sandboxes or language runtimes
/// - Pure function: (test cases, case outcomes) → test results
/// - `results[i]` always describes `test_cases[i]`
///
/// **Normalization Rules (Applied to All Languages):**
/// - Trim leading and trailing whitespace on both sides: YES
/// - Case sensitivity: YES (exact match required)
/// - Anything else: NO
use gradebox_common::types::{TestCase, TestResult};
use tracing::debug;

/// `actual` for a case whose input could not be turned into a call
pub const UNMAPPABLE_ACTUAL: &str = "Error";
/// `actual` for a case the program never answered
pub const MISSING_ACTUAL: &str = "Incorrect output";

/// What the engine learned about one test case
#[derive(Debug, Clone, PartialEq)]
pub enum CaseOutcome {
    Produced {
        actual: String,
        execution_time_ms: Option<u64>,
    },
    /// Input did not match the entry point's contract
    Unmappable,
    /// Program finished without reporting this case
    Missing,
}

/// Normalize output string for comparison
fn normalize_output(output: &str) -> &str {
    output.trim()
}

pub fn outputs_match(actual: &str, expected: &str) -> bool {
    normalize_output(actual) == normalize_output(expected)
}

/// Evaluate a single test case
pub fn evaluate_test(test_case: &TestCase, outcome: CaseOutcome) -> TestResult {
    let (passed, actual, execution_time_ms) = match outcome {
        CaseOutcome::Produced {
            actual,
            execution_time_ms,
        } => (
            outputs_match(&actual, &test_case.expected_output),
            actual,
            execution_time_ms,
        ),
        CaseOutcome::Unmappable => (false, UNMAPPABLE_ACTUAL.to_string(), None),
        CaseOutcome::Missing => (false, MISSING_ACTUAL.to_string(), None),
    };

    TestResult {
        passed,
        input: test_case.input.clone(),
        expected: test_case.expected_output.clone(),
        actual,
        description: test_case.description.clone(),
        hidden: test_case.hidden,
        execution_time_ms,
    }
}

/// Evaluate every test case in declared order.
///
/// Outcomes are positional; a short `outcomes` list marks the remaining cases
/// as `Missing` so every declared case appears in the result.
pub fn evaluate(test_cases: &[TestCase], outcomes: Vec<CaseOutcome>) -> Vec<TestResult> {
    let mut outcomes = outcomes.into_iter();
    let results: Vec<TestResult> = test_cases
        .iter()
        .map(|test_case| {
            let outcome = outcomes.next().unwrap_or(CaseOutcome::Missing);
            evaluate_test(test_case, outcome)
        })
        .collect();

    for (idx, result) in results.iter().enumerate() {
        if result.passed {
            debug!(test_num = idx + 1, "Output matched");
        } else {
            debug!(
                test_num = idx + 1,
                expected = normalize_output(&result.expected),
                actual = normalize_output(&result.actual),
                "Output mismatch"
            );
        }
    }

    results
}
