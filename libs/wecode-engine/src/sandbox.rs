/// Sandbox Launcher - runs one job's chained command in a fresh container
///
/// **Docker Execution Rules:**
/// 1. Pulls the language image if not present (when enabled)
/// 2. Creates a container with:
///    - The job workspace bind-mounted read-write at the fixed workdir
///    - Memory, CPU and process-count ceilings from the engine config
///    - Network disabled
/// 3. Captures stdout/stderr until exit or the wall-clock deadline
/// 4. Kills the container on deadline expiry
///
/// Steps 1 and 2 (plus start) run under their own setup deadline, so a
/// stalled daemon or image pull surfaces as an infrastructure failure.
/// 5. Removes the container on every exit path (no reuse between jobs)
///
/// The launcher reports raw outcomes only. Deciding what counts as a build
/// failure, runtime failure or timeout is the executor's job.
use crate::error::{EngineError, Result};
use crate::registry::{LanguageDescriptor, CONTAINER_WORKDIR};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, KillContainerOptions, LogOutput,
    LogsOptions, RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::HostConfig;
use bollard::Docker;
use futures_util::stream::StreamExt;
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};
use wecode_common::config::EngineConfig;

const TRUNCATION_NOTE: &str = "\n[output truncated]";

/// Raw outcome of one sandboxed invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SandboxOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the container was killed before reporting a status
    pub exit_code: Option<i64>,
    pub timed_out: bool,
    /// The daemon reported the container as killed by the OOM killer
    pub oom_killed: bool,
}

impl SandboxOutput {
    pub fn exit_failed(&self) -> bool {
        self.timed_out || self.exit_code != Some(0)
    }
}

/// An isolation backend able to run a staged workspace
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Run `command` with `workspace` mounted, capped by `descriptor.limits`
    async fn run(
        &self,
        workspace: &Path,
        descriptor: &LanguageDescriptor,
        command: &str,
    ) -> Result<SandboxOutput>;
}

/// Container cleanup guard - guarantees container removal on drop
/// This ensures containers are cleaned up even if execution panics or is cancelled
struct ContainerGuard<'a> {
    docker: &'a Docker,
    container_id: String,
}

impl<'a> ContainerGuard<'a> {
    fn new(docker: &'a Docker, container_id: String) -> Self {
        Self {
            docker,
            container_id,
        }
    }
}

impl<'a> Drop for ContainerGuard<'a> {
    fn drop(&mut self) {
        // Best-effort cleanup - cannot be async in Drop
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
                warn!(container_id = %container_id, error = %e, "Failed to cleanup container");
            }
        });
    }
}

/// Docker-backed sandbox
pub struct DockerSandbox {
    docker: Docker,
    timeout: Duration,
    setup_timeout: Duration,
    pids_limit: i64,
    max_output_bytes: usize,
    pull_images: bool,
}

impl DockerSandbox {
    /// Connect to the local Docker daemon
    pub fn connect(config: &EngineConfig) -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| EngineError::Infra(format!("Failed to connect to Docker daemon: {}", e)))?;

        Ok(Self {
            docker,
            timeout: config.timeout,
            setup_timeout: config.setup_timeout,
            pids_limit: config.pids_limit,
            max_output_bytes: config.max_output_bytes,
            pull_images: config.pull_images,
        })
    }

    /// Ensure Docker image is available (pull if needed)
    async fn ensure_image(&self, image: &str) -> Result<()> {
        if self.docker.inspect_image(image).await.is_ok() {
            debug!(image = image, "Image cache hit");
            return Ok(());
        }

        if !self.pull_images {
            return Err(EngineError::Infra(format!(
                "Image '{}' is not present and pulling is disabled",
                image
            )));
        }

        warn!(image = image, "Image cache miss, pulling now");

        let options = Some(CreateImageOptions {
            from_image: image,
            ..Default::default()
        });
        let mut stream = self.docker.create_image(options, None, None);
        while let Some(result) = stream.next().await {
            result.map_err(|e| {
                EngineError::Infra(format!("Failed to pull image '{}': {}", image, e))
            })?;
        }

        info!(image = image, "Image pulled successfully");
        Ok(())
    }

    fn container_config(
        &self,
        workspace: &Path,
        descriptor: &LanguageDescriptor,
        command: &str,
    ) -> Config<String> {
        let memory = (descriptor.limits.memory_mb as i64) * 1024 * 1024;
        let nano_cpus = (descriptor.limits.cpus * 1_000_000_000.0) as i64;

        Config {
            image: Some(descriptor.image.to_string()),
            cmd: Some(vec!["sh".to_string(), "-c".to_string(), command.to_string()]),
            working_dir: Some(CONTAINER_WORKDIR.to_string()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            network_disabled: Some(true),
            host_config: Some(HostConfig {
                binds: Some(vec![format!(
                    "{}:{}:rw",
                    workspace.display(),
                    CONTAINER_WORKDIR
                )]),
                memory: Some(memory),
                // Same as memory: no swap headroom beyond the ceiling
                memory_swap: Some(memory),
                nano_cpus: Some(nano_cpus),
                pids_limit: Some(self.pids_limit),
                network_mode: Some("none".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

#[async_trait]
impl Sandbox for DockerSandbox {
    async fn run(
        &self,
        workspace: &Path,
        descriptor: &LanguageDescriptor,
        command: &str,
    ) -> Result<SandboxOutput> {
        let workspace = tokio::fs::canonicalize(workspace).await.map_err(|e| {
            EngineError::Infra(format!(
                "Cannot resolve workspace {}: {}",
                workspace.display(),
                e
            ))
        })?;

        let container_name = format!("wecode-{}", uuid::Uuid::new_v4());

        let setup = async {
            self.ensure_image(descriptor.image).await?;

            let config = self.container_config(&workspace, descriptor, command);
            let create_options = CreateContainerOptions {
                name: container_name.as_str(),
                platform: None,
            };
            let container = self
                .docker
                .create_container(Some(create_options), config)
                .await
                .map_err(|e| EngineError::Infra(format!("Failed to create container: {}", e)))?;

            let guard = ContainerGuard::new(&self.docker, container.id.clone());

            self.docker
                .start_container(&container.id, None::<StartContainerOptions<String>>)
                .await
                .map_err(|e| EngineError::Infra(format!("Failed to start container: {}", e)))?;

            Ok::<_, EngineError>((container.id, guard))
        };
        let (container_id, _guard) =
            with_deadline(self.setup_timeout, "Sandbox setup", setup).await?;

        debug!(container = %container_name, image = descriptor.image, "Container started");

        let mut stdout = Capture::new(self.max_output_bytes);
        let mut stderr = Capture::new(self.max_output_bytes);

        let execution = async {
            let logs_options = Some(LogsOptions::<String> {
                stdout: true,
                stderr: true,
                follow: true,
                ..Default::default()
            });
            let mut logs = self.docker.logs(&container_id, logs_options);
            while let Some(chunk) = logs.next().await {
                match chunk {
                    Ok(LogOutput::StdOut { message }) => stdout.push(&message),
                    Ok(LogOutput::StdErr { message }) => stderr.push(&message),
                    Ok(_) => {}
                    Err(e) => {
                        warn!(container = %container_name, error = %e, "Error reading container logs");
                        break;
                    }
                }
            }

            let wait_options = Some(WaitContainerOptions {
                condition: "not-running",
            });
            let mut wait = self.docker.wait_container(&container_id, wait_options);
            match wait.next().await {
                Some(Ok(response)) => Some(response.status_code),
                // bollard reports a non-zero exit status as an error
                Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => {
                    Some(code)
                }
                Some(Err(e)) => {
                    warn!(container = %container_name, error = %e, "Failed to get container exit code");
                    None
                }
                None => None,
            }
        };

        let outcome = tokio::time::timeout(self.timeout, execution).await;
        let exit_code = match outcome {
            Ok(code) => code,
            Err(_) => {
                warn!(
                    container = %container_name,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Execution timed out - killing container"
                );
                if let Err(e) = self
                    .docker
                    .kill_container(&container_id, None::<KillContainerOptions<String>>)
                    .await
                {
                    warn!(container = %container_name, error = %e, "Failed to kill timed-out container");
                }
                return Ok(SandboxOutput {
                    stdout: stdout.finish(),
                    stderr: stderr.finish(),
                    exit_code: None,
                    timed_out: true,
                    oom_killed: false,
                });
            }
        };

        let oom_killed = match self
            .docker
            .inspect_container(&container_id, None::<InspectContainerOptions>)
            .await
        {
            Ok(inspect) => inspect
                .state
                .and_then(|state| state.oom_killed)
                .unwrap_or(false),
            Err(e) => {
                debug!(container = %container_name, error = %e, "Failed to inspect container");
                false
            }
        };

        // A confirmed OOM kill is reported by the executor from `oom_killed`
        let mut stderr = stderr.finish();
        match exit_code {
            Some(137) if !oom_killed => {
                stderr.push_str("\n[Container killed: likely OOM or exceeded memory limit]")
            }
            Some(139) => stderr.push_str("\n[Container killed: segmentation fault]"),
            _ => {}
        }

        debug!(container = %container_name, exit_code = ?exit_code, oom_killed, "Container exited");

        Ok(SandboxOutput {
            stdout: stdout.finish(),
            stderr,
            exit_code,
            timed_out: false,
            oom_killed,
        })
    }
}

/// Await `fut`, turning expiry of `deadline` into an infrastructure failure
async fn with_deadline<T, F>(deadline: Duration, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => {
            warn!(timeout_ms = deadline.as_millis() as u64, "{} timed out", what);
            Err(EngineError::Infra(format!(
                "{} timed out after {} ms",
                what,
                deadline.as_millis()
            )))
        }
    }
}

/// Bounded output buffer for one stream
struct Capture {
    buf: Vec<u8>,
    limit: usize,
    truncated: bool,
}

impl Capture {
    fn new(limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            limit,
            truncated: false,
        }
    }

    fn push(&mut self, bytes: &[u8]) {
        let room = self.limit.saturating_sub(self.buf.len());
        if bytes.len() > room {
            self.truncated = true;
        }
        self.buf.extend_from_slice(&bytes[..bytes.len().min(room)]);
    }

    fn finish(&mut self) -> String {
        let mut out = String::from_utf8_lossy(&std::mem::take(&mut self.buf)).into_owned();
        if self.truncated {
            out.push_str(TRUNCATION_NOTE);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_within_limit() {
        let mut capture = Capture::new(16);
        capture.push(b"hello ");
        capture.push(b"world");
        assert_eq!(capture.finish(), "hello world");
    }

    #[test]
    fn test_capture_truncates() {
        let mut capture = Capture::new(4);
        capture.push(b"abcdef");
        capture.push(b"gh");
        assert_eq!(capture.finish(), format!("abcd{}", TRUNCATION_NOTE));
    }

    #[tokio::test]
    async fn test_setup_deadline_is_infra_failure() {
        let stalled = std::future::pending::<Result<()>>();
        let err = with_deadline(Duration::from_millis(20), "Sandbox setup", stalled)
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Infra(_)));
        assert_eq!(err.to_string(), "Sandbox unavailable: Sandbox setup timed out after 20 ms");
    }

    #[tokio::test]
    async fn test_setup_deadline_passes_result_through() {
        let ok = with_deadline(Duration::from_secs(5), "Sandbox setup", async { Ok(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        let failed = with_deadline(Duration::from_secs(5), "Sandbox setup", async {
            Err::<(), _>(EngineError::Infra("Failed to start container".into()))
        })
        .await;
        assert!(failed.unwrap_err().to_string().contains("Failed to start container"));
    }

    #[test]
    fn test_exit_failed() {
        let ok = SandboxOutput {
            exit_code: Some(0),
            ..Default::default()
        };
        assert!(!ok.exit_failed());

        let crashed = SandboxOutput {
            exit_code: Some(1),
            ..Default::default()
        };
        assert!(crashed.exit_failed());

        let killed = SandboxOutput {
            timed_out: true,
            ..Default::default()
        };
        assert!(killed.exit_failed());
        assert!(SandboxOutput::default().exit_failed());
    }
}
