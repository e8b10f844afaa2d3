/// Workspace Manager - one exclusively owned directory per job
///
/// A workspace is created under the configured root, named after the job id,
/// and holds the staged source, the staged stdin, and whatever the build
/// step writes back through the container mount.
///
/// Removal is guaranteed on every path: `teardown` on the normal path, and a
/// Drop guard if the owning future panics or is cancelled first.
use crate::error::{EngineError, Result};
use crate::registry::{LanguageDescriptor, BUILD_MARKER, STDIN_FILENAME};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use wecode_common::types::Job;

#[cfg(unix)]
const WORKSPACE_MODE: u32 = 0o770;

pub struct Workspace {
    path: PathBuf,
    source_file: PathBuf,
    torn_down: bool,
}

impl Workspace {
    /// Create the job directory and write the stdin and source files into it.
    ///
    /// The leaf directory is created with `create_dir`, so an id collision is
    /// reported as a staging failure rather than silently sharing a directory.
    /// Anything created before a failure is removed again.
    pub async fn stage(root: &Path, job: &Job, descriptor: &LanguageDescriptor) -> Result<Self> {
        tokio::fs::create_dir_all(root)
            .await
            .map_err(|e| EngineError::staging(root, e))?;

        let path = root.join(&job.id);
        tokio::fs::create_dir(&path)
            .await
            .map_err(|e| EngineError::staging(&path, e))?;

        let workspace = Workspace {
            source_file: path.join(descriptor.source_filename(&job.source)),
            path,
            torn_down: false,
        };

        if let Err(e) = workspace.write_files(job).await {
            workspace.teardown().await;
            return Err(e);
        }

        debug!(job_id = %job.id, path = %workspace.path.display(), "Workspace staged");
        Ok(workspace)
    }

    async fn write_files(&self, job: &Job) -> Result<()> {
        let stdin_file = self.path.join(STDIN_FILENAME);
        tokio::fs::write(&stdin_file, job.stdin.as_bytes())
            .await
            .map_err(|e| EngineError::staging(&stdin_file, e))?;

        tokio::fs::write(&self.source_file, job.source.as_bytes())
            .await
            .map_err(|e| EngineError::staging(&self.source_file, e))?;

        // The container must write build artifacts back into the mount;
        // other local users get no access.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::Permissions::from_mode(WORKSPACE_MODE);
            tokio::fs::set_permissions(&self.path, mode)
                .await
                .map_err(|e| EngineError::staging(&self.path, e))?;
        }

        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn source_file(&self) -> &Path {
        &self.source_file
    }

    /// Whether the chained command got past its build step
    pub async fn build_marker_exists(&self) -> bool {
        tokio::fs::try_exists(self.path.join(BUILD_MARKER))
            .await
            .unwrap_or(false)
    }

    /// Remove the workspace. Failures are logged, never returned.
    pub async fn teardown(mut self) {
        self.torn_down = true;
        match tokio::fs::remove_dir_all(&self.path).await {
            Ok(()) => debug!(path = %self.path.display(), "Workspace removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove workspace"),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.torn_down {
            return;
        }
        // Cannot await in Drop; the blocking removal is bounded by the
        // size of one job's files.
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "Failed to cleanup workspace");
            }
        }
    }
}
