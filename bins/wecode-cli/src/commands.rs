// CLI commands for running code locally through the engine
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use wecode_common::config::EngineConfig;
use wecode_common::types::ExecutionResult;
use wecode_engine::{DockerSandbox, Executor, LanguageRegistry};

/// Execute `file` as `language`; returns whether the run succeeded
pub async fn run_file(
    language: &str,
    file: &Path,
    stdin_file: Option<&Path>,
    json: bool,
) -> Result<bool> {
    let source = fs::read_to_string(file)
        .with_context(|| format!("Failed to read source file {}", file.display()))?;
    let stdin = match stdin_file {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read stdin file {}", path.display()))?,
        None => String::new(),
    };

    let config = EngineConfig::from_env().context("Failed to load engine configuration")?;
    let registry = LanguageRegistry::from_config(&config);
    let sandbox = DockerSandbox::connect(&config).context("Failed to initialize Docker sandbox")?;
    let executor = Executor::new(config, registry, Arc::new(sandbox));

    let result = executor.execute(language, &source, &stdin).await;
    print!("{}", render(&result, json)?);

    Ok(!result.failed)
}

/// List supported languages
pub fn list_languages() -> Result<()> {
    let config = EngineConfig::from_env().context("Failed to load engine configuration")?;
    for id in LanguageRegistry::from_config(&config).ids() {
        println!("{}", id);
    }
    Ok(())
}

/// Text shown for a result: raw output, or pretty JSON when requested
fn render(result: &ExecutionResult, json: bool) -> Result<String> {
    if json {
        let mut out = serde_json::to_string_pretty(result).context("Failed to serialize result")?;
        out.push('\n');
        return Ok(out);
    }

    let mut out = result.output.clone();
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    if let Some(kind) = result.kind {
        out.push_str(&format!("✗ {} ({} ms)\n", kind, result.execution_time_ms));
    }
    Ok(out)
}
