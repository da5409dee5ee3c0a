// Child-process backend: one interpreter process per execution, started in a
// private scratch directory with a scrubbed environment.

use super::{CaptureBuffer, RawExecution, Sandbox, SandboxError};
use crate::config::LanguageConfigManager;
use crate::harness::Program;
use async_trait::async_trait;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, warn};
use uuid::Uuid;

const READ_CHUNK: usize = 8192;
const FALLBACK_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// Scratch directory removed on drop, including when a run is cancelled
struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    fn create(root: &Path) -> io::Result<Self> {
        let path = root.join(format!("gradebox-{}", Uuid::new_v4()));
        std::fs::create_dir(&path)?;
        Ok(Self { path })
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to remove scratch directory");
        }
    }
}

pub struct ProcessSandbox {
    languages: LanguageConfigManager,
    scratch_root: PathBuf,
    path_env: OsString,
}

impl ProcessSandbox {
    pub fn new(languages: LanguageConfigManager) -> Self {
        Self {
            languages,
            scratch_root: std::env::temp_dir(),
            path_env: std::env::var_os("PATH").unwrap_or_else(|| FALLBACK_PATH.into()),
        }
    }

    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = root.into();
        self
    }
}

#[async_trait]
impl Sandbox for ProcessSandbox {
    fn name(&self) -> &'static str {
        "process"
    }

    async fn execute(&self, program: &Program) -> Result<RawExecution, SandboxError> {
        let config = self
            .languages
            .get_config(&program.language)
            .map_err(|_| SandboxError::UnsupportedLanguage(program.language))?;

        let scratch = ScratchDir::create(&self.scratch_root)?;
        for file in &program.files {
            tokio::fs::write(scratch.path.join(&file.name), &file.contents).await?;
        }

        let mut command = Command::new(&config.execution.command);
        command
            .args(&config.execution.args)
            .arg(&program.entry_file)
            .current_dir(&scratch.path)
            .env_clear()
            .env("PATH", &self.path_env)
            .env("HOME", &scratch.path)
            .env("LANG", "C.UTF-8")
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let start_time = Instant::now();
        let mut child = command.spawn().map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => SandboxError::Unavailable(format!(
                "interpreter '{}' not found",
                config.execution.command
            )),
            _ => SandboxError::Io(e),
        })?;
        debug!(pid = ?child.id(), command = %config.execution.command, "Spawned submission process");

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let input = program.stdin.clone().into_bytes();

        let feed = async move {
            if let Some(mut stdin) = stdin {
                // The program may exit without reading its input
                let _ = stdin.write_all(&input).await;
            }
        };

        let (_, stdout, stderr, status) =
            tokio::join!(feed, capture(stdout), capture(stderr), child.wait());
        let status = status?;

        Ok(RawExecution {
            stdout: stdout?,
            stderr: stderr?,
            exit_code: status.code().map(i64::from),
            execution_time_ms: start_time.elapsed().as_millis() as u64,
        })
    }
}

async fn capture<R: AsyncRead + Unpin>(reader: Option<R>) -> io::Result<String> {
    let mut buffer = CaptureBuffer::default();
    let Some(mut reader) = reader else {
        return Ok(String::new());
    };
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buffer.push(&chunk[..n]);
    }
    Ok(buffer.into_string())
}
