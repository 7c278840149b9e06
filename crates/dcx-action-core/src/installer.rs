//! Installer: `uv tool install`, falling back to a user-scoped `pip install`.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::TempDir;
use tracing::{info, warn};

use crate::error::BootstrapError;
use crate::exec::{CommandSpec, ProcessOutput, ProcessRunner};
use crate::fetcher::Artifact;
use crate::obs;
use crate::Result;

/// Lines of installer output kept in an installation error.
const FAILURE_TAIL_LINES: usize = 20;

/// Mechanism that installed the tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallMethod {
    /// `uv tool install <artifact> --force`
    UvTool,
    /// `python3 -m pip install --user --upgrade <artifact>`
    PipUser,
}

impl std::fmt::Display for InstallMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstallMethod::UvTool => write!(f, "uv tool"),
            InstallMethod::PipUser => write!(f, "pip --user"),
        }
    }
}

/// Primary tool-manager command. `--force` replaces an earlier install.
pub fn primary_command(artifact: &Path) -> CommandSpec {
    CommandSpec::new(
        "uv",
        [
            "tool".to_string(),
            "install".to_string(),
            artifact.to_string_lossy().to_string(),
            "--force".to_string(),
        ],
    )
}

/// Fallback package-manager command, restricted to the current user.
pub fn fallback_command(artifact: &Path) -> CommandSpec {
    CommandSpec::new(
        "python3",
        [
            "-m".to_string(),
            "pip".to_string(),
            "install".to_string(),
            "--user".to_string(),
            "--upgrade".to_string(),
            artifact.to_string_lossy().to_string(),
        ],
    )
}

/// Artifact written to a private temporary directory.
///
/// The directory is removed when this value is dropped.
pub struct StagedArtifact {
    _dir: TempDir,
    path: PathBuf,
}

impl StagedArtifact {
    pub async fn write(artifact: &Artifact) -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("dcx_").tempdir()?;
        let path = dir.path().join(&artifact.file_name);
        tokio::fs::write(&path, &artifact.bytes).await?;
        Ok(StagedArtifact { _dir: dir, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub struct Installer<'a> {
    runner: &'a dyn ProcessRunner,
}

impl<'a> Installer<'a> {
    pub fn new(runner: &'a dyn ProcessRunner) -> Self {
        Installer { runner }
    }

    /// Stage the artifact on disk and install it.
    pub async fn install(&self, artifact: &Artifact) -> Result<InstallMethod> {
        let staged = StagedArtifact::write(artifact).await?;
        self.install_path(staged.path()).await
    }

    /// Install from a file already on disk.
    ///
    /// Tries the primary mechanism, then the fallback exactly once. Safe to
    /// repeat: both mechanisms replace an existing install of the same tool.
    pub async fn install_path(&self, artifact: &Path) -> Result<InstallMethod> {
        let primary = primary_command(artifact);
        info!(command = %primary, "Installing dcx");
        let primary_failure = match describe(self.runner.run(&primary).await, &primary) {
            Ok(()) => return Ok(InstallMethod::UvTool),
            Err(reason) => reason,
        };

        obs::emit_install_fallback(&primary_failure);
        let fallback = fallback_command(artifact);
        match describe(self.runner.run(&fallback).await, &fallback) {
            Ok(()) => Ok(InstallMethod::PipUser),
            Err(fallback_failure) => {
                warn!(fallback = %fallback_failure, "Fallback installation failed");
                Err(BootstrapError::Install {
                    primary: primary_failure,
                    fallback: fallback_failure,
                })
            }
        }
    }
}

/// `Ok` for a zero exit, otherwise a one-paragraph failure description.
fn describe(
    result: std::io::Result<ProcessOutput>,
    command: &CommandSpec,
) -> std::result::Result<(), String> {
    match result {
        Ok(output) if output.success() => Ok(()),
        Ok(output) => {
            let tail = output.tail(FAILURE_TAIL_LINES);
            if tail.is_empty() {
                Err(format!("`{command}` exited with code {}", output.exit_code))
            } else {
                Err(format!(
                    "`{command}` exited with code {}: {tail}",
                    output.exit_code
                ))
            }
        }
        Err(e) => Err(format!("`{}` could not be started: {e}", command.program)),
    }
}
