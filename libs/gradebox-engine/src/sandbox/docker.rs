/// Docker backend
///
/// **Docker Execution Rules:**
/// 1. Pulls the language image in `prepare`, before the run's deadline starts
/// 2. Creates one container per execution with:
///    - Network disabled
///    - CPU/memory/pid limits from `languages.json`
/// 3. Ships program files and stdin as base64 environment variables, decodes
///    them inside the container and unsets them before exec'ing the
///    interpreter
/// 4. Captures stdout/stderr streams and the exit code
/// 5. Force-removes the container when the execution ends or is dropped
use super::{CaptureBuffer, RawExecution, Sandbox, SandboxError};
use crate::config::LanguageConfigManager;
use crate::harness::Program;
use async_trait::async_trait;
use gradebox_common::types::Language;
use base64::{engine::general_purpose, Engine as _};
use bollard::container::{
    Config, CreateContainerOptions, LogOutput, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, WaitContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::Docker;
use futures_util::stream::StreamExt;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Linux caps a single environment string at 128 KiB
const MAX_ENV_VALUE_BYTES: usize = 128 * 1024;
const WORK_DIR: &str = "/tmp/gradebox";
const STDIN_FILE: &str = "/tmp/gradebox.stdin";
const PIDS_LIMIT: i64 = 64;

/// Container cleanup guard - guarantees container removal on drop.
/// This ensures containers are cleaned up even if the run times out or is cancelled.
struct ContainerGuard {
    docker: Docker,
    container_id: String,
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        // Cannot be async in Drop
        let container_id = self.container_id.clone();
        let docker = self.docker.clone();

        tokio::spawn(async move {
            let remove_options = RemoveContainerOptions {
                force: true,
                ..Default::default()
            };

            if let Err(e) = docker
                .remove_container(&container_id, Some(remove_options))
                .await
            {
                warn!(container_id = %container_id, error = %e, "Failed to clean up container");
            }
        });
    }
}

pub struct DockerSandbox {
    docker: Docker,
    languages: LanguageConfigManager,
}

impl DockerSandbox {
    pub fn connect(languages: LanguageConfigManager) -> Result<Self, SandboxError> {
        let docker = Docker::connect_with_local_defaults().map_err(|e| {
            SandboxError::Unavailable(format!("failed to connect to Docker daemon: {}", e))
        })?;
        Ok(Self { docker, languages })
    }

    /// Ensure Docker image is available (pull if needed)
    async fn ensure_image(&self, image: &str) -> Result<(), SandboxError> {
        if self.docker.inspect_image(image).await.is_ok() {
            debug!(image = %image, "Image cache hit");
            return Ok(());
        }

        warn!(image = %image, "Image cache miss, pulling");

        let options = Some(CreateImageOptions {
            from_image: image,
            ..Default::default()
        });

        let mut stream = self.docker.create_image(options, None, None);
        while let Some(result) = stream.next().await {
            result.map_err(|e| {
                SandboxError::Unavailable(format!("failed to pull image '{}': {}", image, e))
            })?;
        }

        info!(image = %image, "Image pulled");
        Ok(())
    }
}

/// Shell script that materializes the program and runs it. The transport
/// variables are unset and the shell replaced by the interpreter, so neither
/// the submission's environment nor `/proc/1/environ` still carries them.
fn bootstrap_script(program: &Program, command: &str, args: &[String]) -> String {
    let mut script = format!("set -e\nmkdir -p {0}\ncd {0}\n", WORK_DIR);
    let mut transport = Vec::with_capacity(program.files.len() + 1);
    for (idx, file) in program.files.iter().enumerate() {
        script.push_str(&format!(
            "printf '%s' \"$GRADEBOX_FILE_{}\" | base64 -d > {}\n",
            idx,
            shell_quote(&file.name)
        ));
        transport.push(format!("GRADEBOX_FILE_{}", idx));
    }
    script.push_str(&format!(
        "printf '%s' \"$GRADEBOX_STDIN\" | base64 -d > {}\n",
        STDIN_FILE
    ));
    transport.push("GRADEBOX_STDIN".to_string());
    script.push_str(&format!("unset {}\n", transport.join(" ")));

    let mut argv = vec![shell_quote(command)];
    argv.extend(args.iter().map(|arg| shell_quote(arg)));
    argv.push(shell_quote(&program.entry_file));
    script.push_str(&format!("exec {} < {}\n", argv.join(" "), STDIN_FILE));
    script
}

fn bootstrap_env(program: &Program) -> Result<Vec<String>, SandboxError> {
    let mut env = Vec::with_capacity(program.files.len() + 1);
    for (idx, file) in program.files.iter().enumerate() {
        env.push(format!(
            "GRADEBOX_FILE_{}={}",
            idx,
            general_purpose::STANDARD.encode(&file.contents)
        ));
    }
    env.push(format!(
        "GRADEBOX_STDIN={}",
        general_purpose::STANDARD.encode(&program.stdin)
    ));

    if let Some(oversized) = env.iter().find(|value| value.len() > MAX_ENV_VALUE_BYTES) {
        let name = oversized.split('=').next().unwrap_or_default();
        return Err(SandboxError::Setup(format!(
            "{} exceeds the docker backend limit of {} bytes",
            name, MAX_ENV_VALUE_BYTES
        )));
    }
    Ok(env)
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[async_trait]
impl Sandbox for DockerSandbox {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn prepare(&self, language: Language) -> Result<(), SandboxError> {
        let config = self
            .languages
            .get_config(&language)
            .map_err(|_| SandboxError::UnsupportedLanguage(language))?;
        self.ensure_image(&config.image).await
    }

    async fn execute(&self, program: &Program) -> Result<RawExecution, SandboxError> {
        let config = self
            .languages
            .get_config(&program.language)
            .map_err(|_| SandboxError::UnsupportedLanguage(program.language))?;

        let env = bootstrap_env(program)?;
        let script = bootstrap_script(program, &config.execution.command, &config.execution.args);

        let memory_limit = (config.memory_limit_mb as i64) * 1024 * 1024;
        let cpu_limit = (config.cpu_limit as f64 * 1_000_000_000.0) as i64;
        let container_name = format!("gradebox-{}", uuid::Uuid::new_v4());

        let container_config = Config {
            image: Some(config.image.clone()),
            cmd: Some(vec!["sh".to_string(), "-c".to_string(), script]),
            entrypoint: Some(vec![]),
            env: Some(env),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            network_disabled: Some(true),
            host_config: Some(bollard::models::HostConfig {
                memory: Some(memory_limit),
                memory_swap: Some(memory_limit),
                nano_cpus: Some(cpu_limit),
                pids_limit: Some(PIDS_LIMIT),
                readonly_rootfs: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        };

        let create_options = CreateContainerOptions {
            name: container_name.as_str(),
            platform: None,
        };

        let container = self
            .docker
            .create_container(Some(create_options), container_config)
            .await
            .map_err(|e| SandboxError::Setup(format!("failed to create container: {}", e)))?;

        // Set up the guard immediately after creation so a dropped future
        // still removes the container
        let _guard = ContainerGuard {
            docker: self.docker.clone(),
            container_id: container.id.clone(),
        };

        let start_time = Instant::now();

        self.docker
            .start_container(&container.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| SandboxError::Setup(format!("failed to start container: {}", e)))?;

        let mut stdout = CaptureBuffer::default();
        let mut stderr = CaptureBuffer::default();

        let logs_options = Some(LogsOptions::<String> {
            stdout: true,
            stderr: true,
            follow: true,
            ..Default::default()
        });
        let mut logs_stream = self.docker.logs(&container.id, logs_options);
        while let Some(output) = logs_stream.next().await {
            match output {
                Ok(LogOutput::StdOut { message }) => stdout.push(&message),
                Ok(LogOutput::StdErr { message }) => stderr.push(&message),
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "Error reading container logs");
                    break;
                }
            }
        }

        let wait_options = WaitContainerOptions {
            condition: "not-running",
        };
        let mut exit_code = None;
        let mut wait_stream = self.docker.wait_container(&container.id, Some(wait_options));
        match wait_stream.next().await {
            Some(Ok(response)) => exit_code = Some(response.status_code),
            // bollard reports a non-zero exit as an error carrying the code
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => {
                exit_code = Some(code)
            }
            Some(Err(e)) => warn!(error = %e, "Failed to get container exit code"),
            None => warn!("No wait response from container"),
        }

        let execution_time_ms = start_time.elapsed().as_millis() as u64;
        debug!(
            container = %container_name,
            exit_code = ?exit_code,
            execution_time_ms = execution_time_ms,
            "Container finished"
        );

        Ok(RawExecution {
            stdout: stdout.into_string(),
            stderr: stderr.into_string(),
            exit_code,
            execution_time_ms,
        })
    }
}
