/// Execution Engine - Run Once, Judge Every Case
///
/// **Core Responsibility:**
/// Take a submission and a list of test cases, run the submission exactly once
/// per request inside a [`Sandbox`], and turn what it printed into an
/// [`ExecutionResult`].
///
/// **Critical Architectural Boundary:**
/// - Engine owns the time budget; sandboxes never time themselves out
/// - The budget starts after `Sandbox::prepare`, so image pulls never count
///   against the submission
/// - Engine never evaluates submitted code in its own process
/// - Evaluator owns the comparison rules
/// - `run` always returns a result; every failure is mapped to a status
///
/// **Invocation Modes:**
/// - Function mode (entry point declared): one harness execution calls the
///   entry point for every mappable case
/// - Stdin mode (no entry point): the program runs as a script, once per case
///   with the case input on stdin, all executions sharing one deadline
use crate::config::{Backend, EngineConfig, LanguageConfigManager};
use crate::evaluator::{evaluate, CaseOutcome};
use crate::harness::{function_program, plan_invocations, script_program, CaseInvocation, Program};
use crate::sandbox::{DockerSandbox, ProcessSandbox, RawExecution, Sandbox, SandboxError};
use crate::transcript::Transcript;
use gradebox_common::types::{Challenge, EntryPoint, ExecutionResult, Language, TestCase};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Safety limits to prevent pathological inputs from reaching a sandbox
pub const MAX_SOURCE_CODE_BYTES: usize = 1024 * 1024; // 1MB
pub const MAX_TEST_INPUT_BYTES: usize = 10 * 1024 * 1024; // 10MB

/// One request to run a submission
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub source: String,
    pub language: Language,
    pub test_cases: Vec<TestCase>,
    pub entry_point: Option<EntryPoint>,
    /// Overrides the engine's default time budget
    pub timeout: Option<Duration>,
}

impl RunRequest {
    pub fn new(language: Language, source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            language,
            test_cases: Vec::new(),
            entry_point: None,
            timeout: None,
        }
    }

    pub fn for_challenge(challenge: &Challenge, source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            language: challenge.language,
            test_cases: challenge.test_cases.clone(),
            entry_point: challenge.entry_point.clone(),
            timeout: None,
        }
    }

    pub fn with_test_cases(mut self, test_cases: Vec<TestCase>) -> Self {
        self.test_cases = test_cases;
        self
    }

    pub fn with_entry_point(mut self, entry_point: EntryPoint) -> Self {
        self.entry_point = Some(entry_point);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn validate(&self) -> Result<(), String> {
        if self.source.len() > MAX_SOURCE_CODE_BYTES {
            return Err(format!(
                "source code is {} bytes, the limit is {} bytes",
                self.source.len(),
                MAX_SOURCE_CODE_BYTES
            ));
        }

        let input_bytes: usize = self.test_cases.iter().map(|t| t.input.len()).sum();
        if input_bytes > MAX_TEST_INPUT_BYTES {
            return Err(format!(
                "test inputs total {} bytes, the limit is {} bytes",
                input_bytes, MAX_TEST_INPUT_BYTES
            ));
        }

        if let Some(entry) = &self.entry_point {
            if !entry.is_valid() {
                return Err(format!("invalid entry point name '{}'", entry.name));
            }
        }

        Ok(())
    }
}

/// Why a single sandbox execution produced no output
enum ExecutionFailure {
    TimedOut,
    Sandbox(SandboxError),
}

/// Runs submissions against a [`Sandbox`]. Cheap to clone; holds no per-run state.
#[derive(Clone)]
pub struct Engine {
    sandbox: Arc<dyn Sandbox>,
    default_timeout: Duration,
}

impl Engine {
    pub fn new(sandbox: Arc<dyn Sandbox>, default_timeout: Duration) -> Self {
        Self {
            sandbox,
            default_timeout,
        }
    }

    /// Build the engine with the backend selected in `config`
    pub fn from_config(
        config: &EngineConfig,
        languages: LanguageConfigManager,
    ) -> Result<Self, SandboxError> {
        let sandbox: Arc<dyn Sandbox> = match config.backend {
            Backend::Process => Arc::new(ProcessSandbox::new(languages)),
            Backend::Docker => Arc::new(DockerSandbox::connect(languages)?),
        };
        info!(
            backend = sandbox.name(),
            timeout_ms = config.timeout.as_millis() as u64,
            "Execution engine ready"
        );
        Ok(Self::new(sandbox, config.timeout))
    }

    pub fn backend_name(&self) -> &'static str {
        self.sandbox.name()
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Run a challenge's test cases against `source`
    pub async fn run_challenge(&self, challenge: &Challenge, source: &str) -> ExecutionResult {
        self.run(RunRequest::for_challenge(challenge, source)).await
    }

    pub async fn run(&self, request: RunRequest) -> ExecutionResult {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", %run_id, language = %request.language);
        self.run_inner(request).instrument(span).await
    }

    async fn run_inner(&self, request: RunRequest) -> ExecutionResult {
        if let Err(reason) = request.validate() {
            warn!(reason = %reason, "Rejected run request");
            return ExecutionResult::engine_error(reason);
        }

        // Image pulls and similar one-off setup stay outside the run's budget
        if let Err(e) = self.sandbox.prepare(request.language).await {
            error!(error = %e, "Sandbox preparation failed");
            return ExecutionResult::engine_error(e);
        }

        let timeout = request.timeout.unwrap_or(self.default_timeout);
        let started = Instant::now();
        let deadline = started + timeout;

        info!(
            backend = self.sandbox.name(),
            test_count = request.test_cases.len(),
            entry_point = ?request.entry_point.as_ref().map(ToString::to_string),
            timeout_ms = timeout.as_millis() as u64,
            "Run started"
        );

        let attempt = match &request.entry_point {
            Some(entry) => self.run_function(&request, entry, deadline, started).await,
            None => self.run_script(&request, deadline, started).await,
        };

        let result = match attempt {
            Ok(result) => result,
            Err(ExecutionFailure::TimedOut) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "Run timed out");
                ExecutionResult::timed_out(
                    format!("Execution timed out after {}ms", timeout.as_millis()),
                    Some(timeout.as_millis() as u64),
                )
            }
            Err(ExecutionFailure::Sandbox(e)) => {
                error!(error = %e, "Sandbox failure");
                ExecutionResult::engine_error(e)
            }
        };

        info!(
            status = ?result.status,
            passed = result.passed_count(),
            total = result.total_count(),
            execution_ms = ?result.execution_time_ms,
            "Run finished"
        );
        result
    }

    async fn run_function(
        &self,
        request: &RunRequest,
        entry: &EntryPoint,
        deadline: Instant,
        started: Instant,
    ) -> Result<ExecutionResult, ExecutionFailure> {
        let plans = plan_invocations(&request.test_cases, entry);
        let invocations: Vec<CaseInvocation> = plans.iter().flatten().cloned().collect();
        let unmappable = plans.len() - invocations.len();
        if unmappable > 0 {
            debug!(unmappable, "Some test inputs do not fit the entry point");
        }

        let nonce = Uuid::new_v4().simple().to_string();
        let program = function_program(request.language, &request.source, entry, invocations, &nonce)
            .map_err(|e| ExecutionFailure::Sandbox(SandboxError::Setup(e.to_string())))?;

        let planned: Vec<usize> = plans.iter().flatten().map(|plan| plan.index).collect();
        let raw = self.execute(&program, deadline).await?;
        let elapsed = elapsed_ms(started);
        let transcript = Transcript::parse(&raw.stdout, &nonce);

        if let Some(index) = transcript.unexpected_result(&planned) {
            warn!(case_index = index, "Rejected result records not written by the harness");
            return Ok(ExecutionResult::faulted(
                transcript.console,
                format!("Unexpected result reported for test case {}", index + 1),
                elapsed,
            ));
        }
        if let Some(message) = transcript.fault() {
            warn!(error = %message, "Submission faulted");
            return Ok(ExecutionResult::faulted(
                transcript.console.clone(),
                message,
                elapsed,
            ));
        }
        if !raw.succeeded() {
            let message = raw.failure_summary();
            warn!(error = %message, exit_code = ?raw.exit_code, "Harness exited abnormally");
            return Ok(ExecutionResult::faulted(transcript.console, message, elapsed));
        }

        let outcomes = plans
            .iter()
            .map(|plan| match plan {
                None => CaseOutcome::Unmappable,
                Some(invocation) => match transcript.value_for(invocation.index) {
                    Some(value) => CaseOutcome::Produced {
                        actual: value.actual,
                        execution_time_ms: value.execution_time_ms,
                    },
                    None => CaseOutcome::Missing,
                },
            })
            .collect();

        let results = evaluate(&request.test_cases, outcomes);
        Ok(ExecutionResult::completed(transcript.console, results, elapsed))
    }

    async fn run_script(
        &self,
        request: &RunRequest,
        deadline: Instant,
        started: Instant,
    ) -> Result<ExecutionResult, ExecutionFailure> {
        if request.test_cases.is_empty() {
            let program = script_program(request.language, &request.source, "");
            let raw = self.execute(&program, deadline).await?;
            let elapsed = elapsed_ms(started);
            if !raw.succeeded() {
                let message = raw.failure_summary();
                warn!(error = %message, exit_code = ?raw.exit_code, "Program exited abnormally");
                return Ok(ExecutionResult::faulted(raw.stdout, message, elapsed));
            }
            return Ok(ExecutionResult::completed(raw.stdout, Vec::new(), elapsed));
        }

        let mut output = String::new();
        let mut outcomes = Vec::with_capacity(request.test_cases.len());

        for (idx, test_case) in request.test_cases.iter().enumerate() {
            debug!(test_num = idx + 1, "Executing test case");
            let program = script_program(request.language, &request.source, &test_case.input);
            let raw = self.execute(&program, deadline).await?;
            output.push_str(&raw.stdout);

            if !raw.succeeded() {
                let message = raw.failure_summary();
                warn!(test_num = idx + 1, error = %message, exit_code = ?raw.exit_code, "Program exited abnormally");
                return Ok(ExecutionResult::faulted(output, message, elapsed_ms(started)));
            }

            outcomes.push(CaseOutcome::Produced {
                actual: raw.stdout,
                execution_time_ms: Some(raw.execution_time_ms),
            });
        }

        let results = evaluate(&request.test_cases, outcomes);
        Ok(ExecutionResult::completed(output, results, elapsed_ms(started)))
    }

    /// Execute one program, giving up at `deadline`. Dropping the sandbox
    /// future on expiry tears down its process or container.
    async fn execute(
        &self,
        program: &Program,
        deadline: Instant,
    ) -> Result<RawExecution, ExecutionFailure> {
        match tokio::time::timeout_at(deadline, self.sandbox.execute(program)).await {
            Ok(Ok(raw)) => {
                debug!(
                    exit_code = ?raw.exit_code,
                    stdout_bytes = raw.stdout.len(),
                    stderr_bytes = raw.stderr.len(),
                    execution_ms = raw.execution_time_ms,
                    "Sandbox execution finished"
                );
                Ok(raw)
            }
            Ok(Err(e)) => Err(ExecutionFailure::Sandbox(e)),
            Err(_) => Err(ExecutionFailure::TimedOut),
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
