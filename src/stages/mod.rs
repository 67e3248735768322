//! Stage handlers for the bootstrap sequence.

mod deployer;
mod keyvault;
mod library;
mod migrate;

pub use deployer::DeployerBootstrap;
pub use keyvault::KeyvaultValidation;
pub use library::LibraryBootstrap;
pub use migrate::{MigrationTarget, StateMigration};

use std::fmt;
use std::path::Path;

use crate::error::BootstrapError;
use crate::tools::{ToolInvocation, ToolResult, ToolRunner};

/// Fold a stage-internal failure into the stage's exit code.
pub(crate) fn stage_failure(
    stage: &'static str,
    code: i32,
    detail: impl fmt::Display,
) -> BootstrapError {
    tracing::error!("[{}] {}", stage, detail);
    BootstrapError::Stage { stage, code }
}

/// Run the stage's external tool and interpret its exit code.
pub(crate) async fn run_stage_tool(
    runner: &dyn ToolRunner,
    invocation: &ToolInvocation,
    stage: &'static str,
    code: i32,
) -> Result<ToolResult, BootstrapError> {
    let result = runner
        .run(invocation)
        .await
        .map_err(|err| stage_failure(stage, code, err))?;

    if !result.success() {
        let last_line = result.stderr.lines().last().unwrap_or("no output");
        return Err(stage_failure(
            stage,
            code,
            format!(
                "{} exited with {}: {}",
                invocation.program, result.exit_code, last_line
            ),
        ));
    }
    Ok(result)
}

/// Destructive reset of local Terraform artifacts in a workspace, used when
/// the operator forces a re-bootstrap.
pub(crate) fn reset_local_state(workspace: &Path) -> std::io::Result<()> {
    let dir = workspace.join(".terraform");
    match std::fs::remove_dir_all(&dir) {
        Ok(()) => tracing::info!("[Stages] removed {}", dir.display()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(err),
    }

    for name in ["terraform.tfstate", "terraform.tfstate.backup"] {
        let file = workspace.join(name);
        match std::fs::remove_file(&file) {
            Ok(()) => tracing::info!("[Stages] removed {}", file.display()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

/// Basename of a parameter file, as passed to installers running inside the
/// parameter file's directory.
pub(crate) fn parameter_file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
