/// Job Executor - the engine's public entry point
///
/// **Responsibility:**
/// Turn (language, source, stdin) into exactly one `ExecutionResult`.
///
/// **Flow:**
/// 1. Resolve the language (unsupported languages never get a workspace)
/// 2. Validate request sizes
/// 3. Stage the workspace
/// 4. Run the chained command in the sandbox
/// 5. Tear the workspace down, whatever happened in 4
/// 6. Classify the outcome
///
/// `execute` never returns an error and never retries.
use crate::error::EngineError;
use crate::registry::{LanguageDescriptor, LanguageRegistry};
use crate::sandbox::{Sandbox, SandboxOutput};
use crate::workspace::Workspace;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use wecode_common::config::EngineConfig;
use wecode_common::types::{ExecutionRequest, ExecutionResult, FailureKind, Job};

/// Safety limits to prevent pathological inputs from reaching Docker
pub const MAX_SOURCE_CODE_BYTES: usize = 1024 * 1024; // 1MB
pub const MAX_STDIN_BYTES: usize = 10 * 1024 * 1024; // 10MB

const MEMORY_LIMIT_NOTE: &str = "[Container killed: exceeded memory limit]";

#[derive(Clone)]
pub struct Executor {
    config: Arc<EngineConfig>,
    registry: Arc<LanguageRegistry>,
    sandbox: Arc<dyn Sandbox>,
}

impl Executor {
    pub fn new(config: EngineConfig, registry: LanguageRegistry, sandbox: Arc<dyn Sandbox>) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            sandbox,
        }
    }

    pub fn registry(&self) -> &LanguageRegistry {
        &self.registry
    }

    pub async fn execute_request(&self, request: &ExecutionRequest) -> ExecutionResult {
        self.execute(&request.language, &request.source, &request.stdin)
            .await
    }

    /// Run one submission to completion
    pub async fn execute(&self, language: &str, source: &str, stdin: &str) -> ExecutionResult {
        let start = Instant::now();

        let resolved = self
            .registry
            .resolve(language)
            .and_then(|descriptor| validate(source, stdin).map(|_| descriptor));
        let descriptor = match resolved {
            Ok(descriptor) => descriptor,
            Err(e) => {
                warn!(language = language, error = %e, "Rejected job");
                return ExecutionResult::failure(e.kind(), e.to_string(), elapsed_ms(start));
            }
        };

        let job = Job::new(descriptor.id, source, stdin);

        let result = match self.run_job(&job, descriptor).await {
            Ok(output) => classify(descriptor, output, self.config.timeout.as_millis() as u64),
            Err(e) => ExecutionResult::failure(e.kind(), e.to_string(), 0),
        };
        let result = ExecutionResult {
            execution_time_ms: elapsed_ms(start),
            ..result
        };

        info!(
            job_id = %job.id,
            language = descriptor.id,
            failed = result.failed,
            kind = result.kind.map(|k| k.as_str()).unwrap_or("ok"),
            execution_ms = result.execution_time_ms,
            "Job completed"
        );

        result
    }

    /// Stage, run, and always tear down. Returns the raw outcome plus whether
    /// the build step completed.
    async fn run_job(
        &self,
        job: &Job,
        descriptor: &LanguageDescriptor,
    ) -> Result<RunOutcome, EngineError> {
        let workspace = Workspace::stage(&self.config.workspace_root, job, descriptor).await?;

        let command = descriptor.shell_command(&job.source);
        info!(job_id = %job.id, language = descriptor.id, "Running job");

        let output = self.sandbox.run(workspace.path(), descriptor, &command).await;
        let built = descriptor.is_compiled() && workspace.build_marker_exists().await;

        workspace.teardown().await;

        Ok(RunOutcome {
            output: output?,
            built,
        })
    }
}

struct RunOutcome {
    output: SandboxOutput,
    built: bool,
}

fn validate(source: &str, stdin: &str) -> Result<(), EngineError> {
    if source.len() > MAX_SOURCE_CODE_BYTES {
        return Err(EngineError::InvalidRequest(format!(
            "Source code exceeds maximum size of {} bytes",
            MAX_SOURCE_CODE_BYTES
        )));
    }
    if stdin.len() > MAX_STDIN_BYTES {
        return Err(EngineError::InvalidRequest(format!(
            "Standard input exceeds maximum size of {} bytes",
            MAX_STDIN_BYTES
        )));
    }
    Ok(())
}

/// Map a raw sandbox outcome onto the result shape
fn classify(descriptor: &LanguageDescriptor, outcome: RunOutcome, timeout_ms: u64) -> ExecutionResult {
    let RunOutcome { output, built } = outcome;

    if output.timed_out {
        let mut message = output.stderr;
        if !message.is_empty() && !message.ends_with('\n') {
            message.push('\n');
        }
        message.push_str(&format!("Execution timed out after {} ms", timeout_ms));
        return ExecutionResult::failure(FailureKind::Timeout, message, 0);
    }

    if !output.exit_failed() {
        return ExecutionResult::success(output.stdout, 0);
    }

    let kind = if descriptor.is_compiled() && !built {
        FailureKind::Build
    } else {
        FailureKind::Runtime
    };
    let mut message = if output.stderr.trim().is_empty() {
        match output.exit_code {
            Some(code) => format!("Process exited with code {}", code),
            None => "Process exited without a status".to_string(),
        }
    } else {
        output.stderr
    };
    if output.oom_killed {
        if !message.ends_with('\n') {
            message.push('\n');
        }
        message.push_str(MEMORY_LIMIT_NOTE);
    }
    ExecutionResult::failure(kind, message, 0)
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
