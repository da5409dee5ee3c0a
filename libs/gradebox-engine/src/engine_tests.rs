/// End-to-end tests against real interpreters
///
/// These tests verify the full path through a real sandbox:
/// 1. The harness loads the submission and calls the entry point
/// 2. Console output and results are separated
/// 3. Exceptions fault the run without test results
/// 4. Infinite loops are killed at the deadline
/// 5. Stdin programs see each case's input

#[cfg(test)]
mod process_backend_tests {
    use crate::config::LanguageConfigManager;
    use crate::engine::{Engine, RunRequest};
    use crate::sandbox::ProcessSandbox;
    use gradebox_common::catalog::Catalog;
    use gradebox_common::types::{EntryPoint, Language, RunStatus, TestCase};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn engine() -> Engine {
        let sandbox = ProcessSandbox::new(LanguageConfigManager::defaults());
        Engine::new(Arc::new(sandbox), Duration::from_secs(5))
    }

    /// Test: Add Two Numbers, correct solution scores 100
    #[tokio::test]
    #[ignore] // Requires node
    async fn test_javascript_add_two_numbers_passes() {
        let catalog = Catalog::builtin().expect("Failed to load catalog");
        let challenge = catalog.get("add-two-numbers").expect("Missing challenge");

        let result = engine()
            .run_challenge(
                challenge,
                "function add(a, b) {\n  console.log('adding', a, b);\n  return a + b;\n}\n",
            )
            .await;

        assert_eq!(result.status, RunStatus::Completed, "{:?}", result.error);
        assert_eq!(result.score(), 100);
        assert!(result.output.contains("adding 2 3"));
        let tests = result.test_results.unwrap();
        assert_eq!(tests[0].actual, "5");
        assert_eq!(tests[1].actual, "3");
    }

    /// Test: Add Two Numbers, wrong solution scores 0
    #[tokio::test]
    #[ignore] // Requires node
    async fn test_javascript_add_two_numbers_fails() {
        let catalog = Catalog::builtin().expect("Failed to load catalog");
        let challenge = catalog.get("add-two-numbers").expect("Missing challenge");

        let result = engine()
            .run_challenge(challenge, "function add(a, b) { return 0; }")
            .await;

        assert_eq!(result.status, RunStatus::Completed);
        assert_eq!(result.score(), 0);
        let tests = result.test_results.unwrap();
        assert_eq!(tests[0].actual, "0");
        assert_eq!(tests[1].actual, "0");
    }

    /// Test: Uncaught exception faults the whole run
    #[tokio::test]
    #[ignore] // Requires node
    async fn test_javascript_exception_faults() {
        let catalog = Catalog::builtin().expect("Failed to load catalog");
        let challenge = catalog.get("add-two-numbers").expect("Missing challenge");

        let result = engine()
            .run_challenge(challenge, "function add() { throw new Error('boom'); }")
            .await;

        assert_eq!(result.status, RunStatus::Faulted);
        assert_eq!(result.error.as_deref(), Some("Error: boom"));
        assert!(result.test_results.is_none());
    }

    /// Test: Missing entry point is named in the error
    #[tokio::test]
    #[ignore] // Requires node
    async fn test_javascript_missing_entry_point() {
        let catalog = Catalog::builtin().expect("Failed to load catalog");
        let challenge = catalog.get("add-two-numbers").expect("Missing challenge");

        let result = engine()
            .run_challenge(challenge, "function plus(a, b) { return a + b; }")
            .await;

        assert_eq!(result.status, RunStatus::Faulted);
        assert!(result.error.unwrap().contains("'add'"));
    }

    /// Test: Infinite loop is killed at the deadline
    #[tokio::test]
    #[ignore] // Requires node
    async fn test_javascript_infinite_loop_times_out() {
        let engine = engine();
        let request = RunRequest::new(Language::JavaScript, "while (true) {}")
            .with_timeout(Duration::from_millis(500));

        let started = Instant::now();
        let result = engine.run(request).await;

        assert_eq!(result.status, RunStatus::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(3));

        let result = engine
            .run(RunRequest::new(Language::JavaScript, "console.log('still alive')"))
            .await;
        assert_eq!(result.output.trim(), "still alive");
    }

    /// Test: Python function challenge with float results
    #[tokio::test]
    #[ignore] // Requires python3
    async fn test_python_calculate_average() {
        let catalog = Catalog::builtin().expect("Failed to load catalog");
        let challenge = catalog.get("calculate-average").expect("Missing challenge");

        let result = engine()
            .run_challenge(
                challenge,
                "def calculate_average(grades):\n    if not grades:\n        return 0\n    return sum(grades) / len(grades)\n",
            )
            .await;

        assert_eq!(result.status, RunStatus::Completed, "{:?}", result.error);
        assert_eq!(result.score(), 100);
    }

    /// Test: Stdin program runs once per case
    #[tokio::test]
    #[ignore] // Requires python3
    async fn test_python_stdin_program() {
        let request = RunRequest::new(Language::Python, "n = int(input())\nprint(n * 2)\n")
            .with_test_cases(vec![TestCase::new("5", "10"), TestCase::new("10", "20")]);

        let result = engine().run(request).await;

        assert_eq!(result.status, RunStatus::Completed, "{:?}", result.error);
        assert_eq!(result.output, "10\n20\n");
        assert_eq!(result.score(), 100);
    }

    /// Test: Python booleans render the same as nested ones
    #[tokio::test]
    #[ignore] // Requires python3
    async fn test_python_bool_renders_lowercase() {
        let request = RunRequest::new(Language::Python, "def is_even(n):\n    return n % 2 == 0\n")
            .with_test_cases(vec![TestCase::new("4", "true"), TestCase::new("3", "false")])
            .with_entry_point(EntryPoint::new("is_even", 1));

        let result = engine().run(request).await;

        assert_eq!(result.status, RunStatus::Completed, "{:?}", result.error);
        let tests = result.test_results.unwrap();
        assert_eq!(tests[0].actual, "true");
        assert_eq!(tests[1].actual, "false");
    }

    /// Test: The harness payload is gone before user code runs
    #[tokio::test]
    #[ignore] // Requires python3
    async fn test_python_cannot_read_payload() {
        let source = "import os\n\ndef add(a, b):\n    return os.path.exists('payload.json')\n";
        let request = RunRequest::new(Language::Python, source)
            .with_test_cases(vec![TestCase::new("2, 3", "false")])
            .with_entry_point(EntryPoint::new("add", 2));

        let result = engine().run(request).await;

        assert_eq!(result.status, RunStatus::Completed, "{:?}", result.error);
        assert_eq!(result.score(), 100);
    }

    /// Test: Reading the payload from a submission fails, so nothing can be forged
    #[tokio::test]
    #[ignore] // Requires python3
    async fn test_python_forged_records_do_not_score() {
        let catalog = Catalog::builtin().expect("Failed to load catalog");
        let challenge = catalog.get("add-two-numbers").expect("Missing challenge");
        let mut challenge = challenge.clone();
        challenge.language = Language::Python;
        let source = r#"
import json
try:
    p = json.load(open('payload.json'))
    for c in p['cases']:
        print('\x1e' + p['nonce'] + ' ' + json.dumps({'type': 'result', 'index': c['index'], 'value': sum(c['args'])}))
except OSError:
    pass

def add(a, b):
    return 0
"#;

        let result = engine().run_challenge(&challenge, source).await;

        assert_eq!(result.status, RunStatus::Completed, "{:?}", result.error);
        assert_eq!(result.score(), 0);
        let tests = result.test_results.unwrap();
        assert_eq!(tests[0].actual, "0");
        assert_eq!(tests[1].actual, "0");
    }

    /// Test: JavaScript numbers keep String() formatting
    #[tokio::test]
    #[ignore] // Requires node
    async fn test_javascript_number_formatting() {
        let request = RunRequest::new(Language::JavaScript, "function big(n) { return n * 1e21; }")
            .with_test_cases(vec![TestCase::new("1", "1e+21"), TestCase::new("2", "2e+21")])
            .with_entry_point(EntryPoint::new("big", 1));

        let result = engine().run(request).await;

        assert_eq!(result.status, RunStatus::Completed, "{:?}", result.error);
        assert_eq!(result.score(), 100);
    }

    /// Test: Python syntax errors fault the run
    #[tokio::test]
    #[ignore] // Requires python3
    async fn test_python_syntax_error() {
        let request = RunRequest::new(Language::Python, "def f(:\n    return 1\n")
            .with_test_cases(vec![TestCase::new("", "1")])
            .with_entry_point(EntryPoint::new("f", 0));

        let result = engine().run(request).await;

        assert_eq!(result.status, RunStatus::Faulted);
        assert!(result.error.unwrap().starts_with("SyntaxError"));
    }
}

#[cfg(test)]
mod docker_backend_tests {
    use crate::config::LanguageConfigManager;
    use crate::engine::{Engine, RunRequest};
    use crate::sandbox::DockerSandbox;
    use gradebox_common::types::{Language, RunStatus, TestCase};
    use std::sync::Arc;
    use std::time::Duration;

    fn engine() -> Engine {
        let sandbox = DockerSandbox::connect(LanguageConfigManager::defaults())
            .expect("Failed to connect to Docker");
        Engine::new(Arc::new(sandbox), Duration::from_secs(30))
    }

    /// Test: Stdin program inside a container
    #[tokio::test]
    #[ignore] // Requires Docker
    async fn test_docker_python_stdin_program() {
        let request = RunRequest::new(Language::Python, "n = int(input())\nprint(n * 2)\n")
            .with_test_cases(vec![TestCase::new("5", "10"), TestCase::new("-21", "-42")]);

        let result = engine().run(request).await;

        assert_eq!(result.status, RunStatus::Completed, "{:?}", result.error);
        assert_eq!(result.score(), 100);
    }

    /// Test: Network is disabled inside the container
    #[tokio::test]
    #[ignore] // Requires Docker
    async fn test_docker_network_disabled() {
        let source = r#"
import socket
try:
    socket.create_connection(("1.1.1.1", 53), timeout=2)
    print("connected")
except OSError:
    print("offline")
"#;
        let result = engine().run(RunRequest::new(Language::Python, source)).await;

        assert_eq!(result.status, RunStatus::Completed, "{:?}", result.error);
        assert_eq!(result.output.trim(), "offline");
    }
}
