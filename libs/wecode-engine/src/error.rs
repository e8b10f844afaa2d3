use std::path::PathBuf;
use thiserror::Error;
use wecode_common::types::FailureKind;

/// Failures that stop a job before the guest program produces a verdict.
///
/// Build and runtime failures are not errors here: they are ordinary sandbox
/// outcomes, classified by the executor.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Failed to stage workspace {path}: {source}")]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Sandbox unavailable: {0}")]
    Infra(String),
}

impl EngineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            EngineError::UnsupportedLanguage(_) => FailureKind::UnsupportedLanguage,
            EngineError::InvalidRequest(_) => FailureKind::InvalidRequest,
            EngineError::Staging { .. } => FailureKind::Staging,
            EngineError::Infra(_) => FailureKind::Infra,
        }
    }

    pub(crate) fn staging(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EngineError::Staging {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(
            EngineError::UnsupportedLanguage("cobol".into()).kind(),
            FailureKind::UnsupportedLanguage
        );
        assert_eq!(EngineError::Infra("down".into()).kind(), FailureKind::Infra);
        let staging = EngineError::staging(
            "/tmp/x",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(staging.kind(), FailureKind::Staging);
        assert!(staging.to_string().contains("/tmp/x"));
    }

    #[test]
    fn test_unsupported_message() {
        let err = EngineError::UnsupportedLanguage("cobol".into());
        assert_eq!(err.to_string(), "Unsupported language: cobol");
    }
}
