/// Run Session - One Outstanding Run Per Editor
///
/// **Core Responsibility:**
/// Serialize runs coming from one editor instance. A request that arrives
/// while another run is in flight is rejected with [`RunError::Busy`] instead
/// of queued.
///
/// **State Machine:**
/// `Idle → Running → {Completed | Faulted | TimedOut}`; the terminal state is
/// kept until the next run starts. Engine failures surface as `Faulted`.
/// Observers follow it through [`RunSession::subscribe`].
///
/// The state is also the lock: a run is admitted by swapping a non-running
/// state for `Running`, and released by publishing its terminal state, so an
/// observer that sees a terminal state can start the next run immediately.
use crate::engine::{Engine, RunRequest};
use gradebox_common::types::{ExecutionResult, RunStatus};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub const CANCELLED_MESSAGE: &str = "Run cancelled";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Faulted,
    TimedOut,
}

impl From<RunStatus> for RunState {
    fn from(status: RunStatus) -> Self {
        match status {
            RunStatus::Completed => RunState::Completed,
            RunStatus::Faulted | RunStatus::EngineError => RunState::Faulted,
            RunStatus::TimedOut => RunState::TimedOut,
        }
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("a run is already in progress")]
    Busy,

    #[error("run task aborted: {0}")]
    Aborted(String),
}

#[derive(Clone)]
pub struct RunSession {
    engine: Engine,
    state: Arc<watch::Sender<RunState>>,
}

impl RunSession {
    pub fn new(engine: Engine) -> Self {
        let (state, _) = watch::channel(RunState::Idle);
        Self {
            engine,
            state: Arc::new(state),
        }
    }

    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    /// Run to completion. Dropping the returned future does not stop the run.
    pub async fn run(&self, request: RunRequest) -> Result<ExecutionResult, RunError> {
        self.spawn(request)?.wait().await
    }

    /// Start a run on the runtime and return a handle to await or cancel it
    pub fn spawn(&self, request: RunRequest) -> Result<RunHandle, RunError> {
        let admitted = self.state.send_if_modified(|state| {
            if *state == RunState::Running {
                return false;
            }
            *state = RunState::Running;
            true
        });
        if !admitted {
            warn!("Rejected run: session busy");
            return Err(RunError::Busy);
        }

        let release = Release {
            state: self.state.clone(),
            terminal: RunState::Faulted,
        };
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let engine = self.engine.clone();
        let task = tokio::spawn(drive(engine, request, release, cancel_rx));

        Ok(RunHandle {
            task,
            cancel: Some(cancel_tx),
        })
    }
}

/// Publishes the run's terminal state when dropped, which frees the session.
/// A task torn down before finishing leaves the session `Faulted`.
struct Release {
    state: Arc<watch::Sender<RunState>>,
    terminal: RunState,
}

impl Drop for Release {
    fn drop(&mut self) {
        self.state.send_replace(self.terminal);
    }
}

async fn drive(
    engine: Engine,
    request: RunRequest,
    mut release: Release,
    cancel: oneshot::Receiver<()>,
) -> ExecutionResult {
    let result = tokio::select! {
        result = engine.run(request) => result,
        // A dropped handle closes the channel without cancelling
        Ok(()) = cancel => {
            info!("Run cancelled by caller");
            ExecutionResult::timed_out(CANCELLED_MESSAGE, None)
        }
    };

    release.terminal = RunState::from(result.status);
    drop(release);
    result
}

pub struct RunHandle {
    task: JoinHandle<ExecutionResult>,
    cancel: Option<oneshot::Sender<()>>,
}

impl RunHandle {
    /// Stop the run and tear down its sandbox. The run then resolves as timed out.
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }

    pub async fn wait(self) -> Result<ExecutionResult, RunError> {
        self.task
            .await
            .map_err(|e| RunError::Aborted(e.to_string()))
    }
}
