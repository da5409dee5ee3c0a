// HTTP route handlers for the gradebox API

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use gradebox_common::types::{
    Challenge, Difficulty, EntryPoint, ExecutionResult, Language, TestCase, HIDDEN_PLACEHOLDER,
};
use gradebox_engine::RunRequest;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::error::ApiError;
use crate::AppState;

/// Upper bound on a caller-supplied time budget
const MAX_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeSummary {
    pub id: String,
    pub title: String,
    pub difficulty: Difficulty,
    pub language: Language,
}

#[derive(Debug, Deserialize)]
pub struct RunChallengeRequest {
    pub source: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    pub source: String,
    pub language: Language,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
    #[serde(default)]
    pub entry_point: Option<EntryPoint>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// GET /status - Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /metrics - Prometheus exposition
pub async fn metrics(State(state): State<Arc<AppState>>) -> Result<String, ApiError> {
    state.metrics.render().map_err(|e| {
        error!(error = %e, "Failed to render metrics");
        ApiError::Internal(e.to_string())
    })
}

/// GET /challenges - Catalog summaries in id order
pub async fn list_challenges(State(state): State<Arc<AppState>>) -> Json<Vec<ChallengeSummary>> {
    let summaries = state
        .catalog
        .list()
        .map(|challenge| ChallengeSummary {
            id: challenge.id.clone(),
            title: challenge.title.clone(),
            difficulty: challenge.difficulty,
            language: challenge.language,
        })
        .collect();
    Json(summaries)
}

/// GET /challenges/{id} - Challenge definition with hidden cases blanked out
pub async fn get_challenge(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Challenge>, ApiError> {
    let challenge = state
        .catalog
        .get(&id)
        .ok_or_else(|| ApiError::ChallengeNotFound(id.clone()))?;

    let mut challenge = challenge.clone();
    for test_case in challenge.test_cases.iter_mut().filter(|t| t.hidden) {
        test_case.input = HIDDEN_PLACEHOLDER.to_string();
        test_case.expected_output = HIDDEN_PLACEHOLDER.to_string();
    }
    Ok(Json(challenge))
}

/// POST /challenges/{id}/run - Grade a submission against a catalog challenge
pub async fn run_challenge(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<RunChallengeRequest>,
) -> Result<Json<ExecutionResult>, ApiError> {
    let challenge = state
        .catalog
        .get(&id)
        .ok_or_else(|| ApiError::ChallengeNotFound(id.clone()))?;

    let mut result = run_bounded(&state, RunRequest::for_challenge(challenge, payload.source)).await?;
    info!(
        challenge_id = %id,
        status = ?result.status,
        score = result.score(),
        "Challenge run finished"
    );

    result.redact_hidden();
    Ok(Json(result))
}

/// POST /execute - Run arbitrary code with caller-supplied test cases
pub async fn execute(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ExecuteRequest>,
) -> Result<Json<ExecutionResult>, ApiError> {
    let mut request = RunRequest::new(payload.language, payload.source)
        .with_test_cases(payload.test_cases);
    if let Some(entry_point) = payload.entry_point {
        request = request.with_entry_point(entry_point);
    }
    if let Some(ms) = payload.timeout_ms {
        request = request.with_timeout(Duration::from_millis(ms.clamp(1, MAX_TIMEOUT_MS)));
    }

    let result = run_bounded(&state, request).await?;
    Ok(Json(result))
}

/// Wait for a free run slot, then run
async fn run_bounded(state: &AppState, request: RunRequest) -> Result<ExecutionResult, ApiError> {
    let _permit = state
        .runs
        .acquire()
        .await
        .map_err(|_| ApiError::ShuttingDown)?;

    let result = state.engine.run(request).await;
    state.metrics.record(&result);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gradebox_common::catalog::Catalog;
    use gradebox_common::types::RunStatus;
    use gradebox_engine::harness::{HarnessPayload, Program, PAYLOAD_FILE};
    use gradebox_engine::transcript::{frame, HarnessRecord};
    use gradebox_engine::{Engine, RawExecution, Sandbox, SandboxError};
    use serde_json::{json, Value};

    /// Answers `add` and `isEven` calls the way a correct submission would
    struct ReferenceSandbox;

    #[async_trait]
    impl Sandbox for ReferenceSandbox {
        fn name(&self) -> &'static str {
            "reference"
        }

        async fn execute(&self, program: &Program) -> Result<RawExecution, SandboxError> {
            let Some(payload) = program.file(PAYLOAD_FILE) else {
                return Ok(RawExecution {
                    stdout: format!("{}\n", program.stdin.trim()),
                    exit_code: Some(0),
                    ..Default::default()
                });
            };
            let payload: HarnessPayload = serde_json::from_str(payload)
                .map_err(|e| SandboxError::Setup(e.to_string()))?;

            let mut stdout = String::new();
            for case in &payload.cases {
                let value = match payload.entry.as_str() {
                    "add" => json!(case.args.iter().filter_map(Value::as_i64).sum::<i64>()),
                    "isEven" => json!(case.args[0].as_i64().map(|n| n % 2 == 0)),
                    _ => Value::Null,
                };
                let record = HarnessRecord::Result {
                    index: case.index,
                    value: Some(value),
                    text: None,
                    ms: None,
                };
                stdout.push_str(&frame(&payload.nonce, &record));
            }
            Ok(RawExecution {
                stdout,
                exit_code: Some(0),
                ..Default::default()
            })
        }
    }

    fn state() -> Arc<AppState> {
        let catalog = Catalog::builtin().unwrap();
        let engine = Engine::new(Arc::new(ReferenceSandbox), Duration::from_secs(1));
        Arc::new(AppState::new(Arc::new(catalog), engine, 2).unwrap())
    }

    #[tokio::test]
    async fn test_health_check() {
        let response = health_check().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_list_challenges() {
        let state = state();
        let Json(summaries) = list_challenges(State(state.clone())).await;

        assert_eq!(summaries.len(), state.catalog.len());
        assert!(summaries.iter().any(|s| s.id == "add-two-numbers"));
        let ids: Vec<&str> = summaries.iter().map(|s| s.id.as_str()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[tokio::test]
    async fn test_unknown_challenge_is_not_found() {
        let err = get_challenge(State(state()), Path("no-such-challenge".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::ChallengeNotFound(_)));
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);

        let err = run_challenge(
            State(state()),
            Path("no-such-challenge".to_string()),
            Json(RunChallengeRequest {
                source: String::new(),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::ChallengeNotFound(_)));
    }

    #[tokio::test]
    async fn test_get_challenge_hides_hidden_cases() {
        let Json(challenge) = get_challenge(State(state()), Path("is-even".to_string()))
            .await
            .unwrap();

        let hidden: Vec<&TestCase> = challenge.test_cases.iter().filter(|t| t.hidden).collect();
        assert!(!hidden.is_empty());
        for test_case in hidden {
            assert_eq!(test_case.input, HIDDEN_PLACEHOLDER);
            assert_eq!(test_case.expected_output, HIDDEN_PLACEHOLDER);
        }
        assert_eq!(challenge.test_cases[0].input, "4");
    }

    #[tokio::test]
    async fn test_run_challenge_scores_and_redacts() {
        let state = state();
        let Json(result) = run_challenge(
            State(state.clone()),
            Path("is-even".to_string()),
            Json(RunChallengeRequest {
                source: "function isEven(n) { return n % 2 === 0; }".to_string(),
            }),
        )
        .await
        .unwrap();

        assert_eq!(result.status, RunStatus::Completed);
        assert_eq!(result.score(), 100);
        let tests = result.test_results.unwrap();
        let hidden = tests.iter().find(|t| t.hidden).unwrap();
        assert!(hidden.passed);
        assert_eq!(hidden.actual, HIDDEN_PLACEHOLDER);

        let metrics = state.metrics.render().unwrap();
        assert!(metrics.contains("gradebox_runs_total{status=\"completed\"} 1"));
    }

    #[tokio::test]
    async fn test_execute_with_caller_cases() {
        let body: ExecuteRequest = serde_json::from_value(json!({
            "source": "function add(a, b) { return a + b; }",
            "language": "js",
            "testCases": [
                { "input": "2, 3", "expectedOutput": "5" },
                { "input": "-1, 4", "expectedOutput": "4" }
            ],
            "entryPoint": { "name": "add", "arity": 2 },
            "timeoutMs": 999999
        }))
        .unwrap();

        let Json(result) = execute(State(state()), Json(body)).await.unwrap();
        assert_eq!(result.status, RunStatus::Completed);
        assert_eq!(result.passed_count(), 1);
        assert_eq!(result.score(), 50);
    }

    #[tokio::test]
    async fn test_execute_stdin_program_without_cases() {
        let body: ExecuteRequest = serde_json::from_value(json!({
            "source": "print('hi')",
            "language": "python"
        }))
        .unwrap();

        let Json(result) = execute(State(state()), Json(body)).await.unwrap();
        assert_eq!(result.status, RunStatus::Completed);
        assert!(result.test_results.is_none());
    }

    #[test]
    fn test_routes_build() {
        let _router: axum::Router = crate::routes::routes().with_state(state());
    }
}
