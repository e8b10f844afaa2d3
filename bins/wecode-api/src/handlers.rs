// HTTP route handlers for the WeCode API

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info};

use crate::AppState;

/// Body of `POST /execute`. Older clients send `code`/`input`.
#[derive(Debug, Deserialize)]
pub struct ExecuteBody {
    pub language: Option<String>,
    #[serde(alias = "code")]
    pub source: Option<String>,
    #[serde(alias = "input")]
    pub stdin: Option<String>,
}

fn error_body(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

/// POST /execute - Run a submission and return its result
pub async fn execute_code(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ExecuteBody>,
) -> Response {
    let (language, source) = match (body.language, body.source) {
        (Some(language), Some(source)) if !language.is_empty() && !source.is_empty() => {
            (language, source)
        }
        _ => return error_body(StatusCode::BAD_REQUEST, "Code and language are required"),
    };
    let stdin = body.stdin.unwrap_or_default();

    info!(language = %language, source_size = source.len(), "Execution requested");

    // Run on its own task so a panic inside the engine becomes a 500, not a dropped connection
    let executor = state.executor.clone();
    let task =
        tokio::spawn(async move { executor.execute(&language, &source, &stdin).await });

    match task.await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(e) => {
            error!(error = %e, "Execution task failed");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, "Internal execution error")
        }
    }
}

/// GET /status - Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /languages - Supported language identifiers
pub async fn list_languages(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.executor.registry().ids())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::to_bytes;
    use std::path::Path;
    use wecode_common::config::EngineConfig;
    use wecode_common::types::ExecutionResult;
    use wecode_engine::registry::{LanguageDescriptor, STDIN_FILENAME};
    use wecode_engine::{EngineError, Executor, LanguageRegistry, Sandbox, SandboxOutput};

    struct StaticSandbox;

    #[async_trait]
    impl Sandbox for StaticSandbox {
        async fn run(
            &self,
            workspace: &Path,
            _descriptor: &LanguageDescriptor,
            _command: &str,
        ) -> Result<SandboxOutput, EngineError> {
            let stdin = std::fs::read_to_string(workspace.join(STDIN_FILENAME)).unwrap_or_default();
            Ok(SandboxOutput {
                stdout: format!("echo:{}", stdin),
                exit_code: Some(0),
                ..Default::default()
            })
        }
    }

    fn state(root: &Path) -> Arc<AppState> {
        let config = EngineConfig {
            workspace_root: root.to_path_buf(),
            ..EngineConfig::default()
        };
        let registry = LanguageRegistry::from_config(&config);
        Arc::new(AppState {
            executor: Executor::new(config, registry, Arc::new(StaticSandbox)),
        })
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn body(language: Option<&str>, source: Option<&str>, stdin: Option<&str>) -> ExecuteBody {
        ExecuteBody {
            language: language.map(str::to_string),
            source: source.map(str::to_string),
            stdin: stdin.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_missing_fields_rejected() {
        let root = tempfile::tempdir().unwrap();
        for payload in [
            body(None, Some("print(1)"), None),
            body(Some("python"), None, None),
            body(Some(""), Some("print(1)"), None),
        ] {
            let response = execute_code(State(state(root.path())), Json(payload)).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let json = body_json(response).await;
            assert_eq!(json["error"], "Code and language are required");
        }
    }

    #[tokio::test]
    async fn test_execute_returns_result() {
        let root = tempfile::tempdir().unwrap();
        let response = execute_code(
            State(state(root.path())),
            Json(body(Some("python"), Some("print(input())"), Some("abc"))),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let result: ExecutionResult = serde_json::from_value(body_json(response).await).unwrap();
        assert!(!result.failed);
        assert_eq!(result.output, "echo:abc");
    }

    #[tokio::test]
    async fn test_unsupported_language_is_a_result_not_an_error() {
        let root = tempfile::tempdir().unwrap();
        let response = execute_code(
            State(state(root.path())),
            Json(body(Some("cobol"), Some("DISPLAY 'HI'."), None)),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["failed"], true);
        assert_eq!(json["kind"], "unsupported_language");
    }

    #[test]
    fn test_legacy_field_names_accepted() {
        let parsed: ExecuteBody =
            serde_json::from_str(r#"{"language":"cpp","code":"int main(){}","input":"5"}"#)
                .unwrap();
        assert_eq!(parsed.source.as_deref(), Some("int main(){}"));
        assert_eq!(parsed.stdin.as_deref(), Some("5"));
    }

    #[tokio::test]
    async fn test_list_languages() {
        let root = tempfile::tempdir().unwrap();
        let response = list_languages(State(state(root.path()))).await.into_response();
        let json = body_json(response).await;
        assert_eq!(json, serde_json::json!(["cpp", "java", "javascript", "python"]));
    }
}
