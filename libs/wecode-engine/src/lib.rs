//! Sandboxed execution engine.
//!
//! Maps a (language, source, stdin) triple onto a disposable, resource-capped
//! container and normalizes whatever happens into an [`ExecutionResult`].
//!
//! Flow: [`registry`] resolves the language, [`workspace`] stages the files,
//! [`sandbox`] runs the container, [`executor`] ties it together and always
//! tears the workspace down.

pub mod error;
pub mod executor;
pub mod registry;
pub mod sandbox;
pub mod workspace;


pub use error::EngineError;
pub use executor::Executor;
pub use registry::{LanguageDescriptor, LanguageRegistry};
pub use sandbox::{DockerSandbox, Sandbox, SandboxOutput};
pub use wecode_common::types::{ExecutionRequest, ExecutionResult, FailureKind};
