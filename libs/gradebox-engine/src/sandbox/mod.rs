/// Isolation boundary
///
/// A [`Sandbox`] runs a [`Program`] outside the host process and hands back
/// what it printed. Backends never interpret the output and never enforce the
/// run's time budget themselves: the engine wraps `execute` in a timeout and
/// drops the future when it expires, so every backend must release its
/// process or container on drop.
mod docker;
mod process;

pub use docker::DockerSandbox;
pub use process::ProcessSandbox;

use crate::harness::Program;
use async_trait::async_trait;
use gradebox_common::types::Language;
use thiserror::Error;

/// Cap on captured stdout/stderr per execution
pub const MAX_CAPTURE_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, Default)]
pub struct RawExecution {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was killed by a signal
    pub exit_code: Option<i64>,
    pub execution_time_ms: u64,
}

impl RawExecution {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Short human-readable reason for a non-zero exit
    pub fn failure_summary(&self) -> String {
        let last_line = self
            .stderr
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty());
        match (last_line, self.exit_code) {
            (Some(line), _) => line.to_string(),
            (None, Some(137)) => "Process killed: likely exceeded memory limit".to_string(),
            (None, Some(139)) => "Process killed: segmentation fault".to_string(),
            (None, Some(code)) => format!("Process exited with code {}", code),
            (None, None) => "Process terminated by signal".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("no execution configuration for {0}")]
    UnsupportedLanguage(Language),

    #[error("execution backend unavailable: {0}")]
    Unavailable(String),

    #[error("sandbox setup failed: {0}")]
    Setup(String),

    #[error("sandbox I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    /// One-off setup for `language`, awaited before the run's deadline starts
    async fn prepare(&self, _language: Language) -> Result<(), SandboxError> {
        Ok(())
    }

    async fn execute(&self, program: &Program) -> Result<RawExecution, SandboxError>;
}

/// Output collector that keeps the first [`MAX_CAPTURE_BYTES`] and drops the rest
#[derive(Debug, Default)]
pub(crate) struct CaptureBuffer {
    bytes: Vec<u8>,
    truncated: bool,
}

impl CaptureBuffer {
    pub(crate) fn push(&mut self, chunk: &[u8]) {
        let room = MAX_CAPTURE_BYTES.saturating_sub(self.bytes.len());
        if chunk.len() > room {
            self.truncated = true;
        }
        self.bytes.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }

    pub(crate) fn into_string(self) -> String {
        let mut text = String::from_utf8_lossy(&self.bytes).into_owned();
        if self.truncated {
            text.push_str("\n[output truncated]\n");
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_summary_prefers_last_stderr_line() {
        let raw = RawExecution {
            stderr: "Traceback (most recent call last):\n  File \"main.py\"\nValueError: bad\n\n"
                .to_string(),
            exit_code: Some(1),
            ..Default::default()
        };
        assert_eq!(raw.failure_summary(), "ValueError: bad");
        assert!(!raw.succeeded());
    }

    #[test]
    fn test_failure_summary_signals() {
        let oom = RawExecution {
            exit_code: Some(137),
            ..Default::default()
        };
        assert!(oom.failure_summary().contains("memory"));

        let killed = RawExecution::default();
        assert_eq!(killed.failure_summary(), "Process terminated by signal");
    }

    #[test]
    fn test_capture_buffer_truncates() {
        let mut buffer = CaptureBuffer::default();
        buffer.push(b"hello ");
        buffer.push(&vec![b'x'; MAX_CAPTURE_BYTES]);
        let text = buffer.into_string();

        assert!(text.starts_with("hello xxx"));
        assert!(text.ends_with("[output truncated]\n"));
        assert_eq!(text.len(), MAX_CAPTURE_BYTES + "\n[output truncated]\n".len());
    }

    #[test]
    fn test_capture_buffer_small_output() {
        let mut buffer = CaptureBuffer::default();
        buffer.push(b"hi\n");
        assert_eq!(buffer.into_string(), "hi\n");
    }
}
