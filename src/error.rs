//! Error taxonomy and process exit codes.
//!
//! Every fatal path maps to a distinct exit code so an operator (or a
//! pipeline wrapping this tool) can tell argument problems, store I/O
//! problems, and individual stage failures apart without parsing output.

use std::path::PathBuf;

use crate::store::StoreError;

/// Exit code for malformed or inconsistent arguments.
pub const EXIT_BAD_ARGUMENTS: i32 = 1;
/// Exit code when a required parameter file does not exist.
pub const EXIT_MISSING_PARAMETER_FILE: i32 = 2;
/// Exit code for persistence failures (store directory or record unwritable).
pub const EXIT_STORE_FAILURE: i32 = 3;
/// Exit code when the deployer bootstrap stage fails.
pub const EXIT_DEPLOYER_BOOTSTRAP: i32 = 10;
/// Exit code when deployer state migration fails.
pub const EXIT_DEPLOYER_MIGRATION: i32 = 11;
/// Exit code when the library bootstrap stage fails.
pub const EXIT_LIBRARY_BOOTSTRAP: i32 = 20;
/// Exit code when library state migration fails.
pub const EXIT_LIBRARY_MIGRATION: i32 = 21;

/// Fatal errors surfaced to the binary.
///
/// Stage handlers fold every internal failure (tool launch, non-zero exit,
/// secret reconciliation) into [`BootstrapError::Stage`] carrying their own
/// exit code; the step counter is never advanced past a failed stage, so a
/// re-run retries exactly that stage.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("invalid arguments: {0}")]
    Args(String),

    #[error("parameter file not found: {0}")]
    ParameterFile(PathBuf),

    #[error("stage {stage} failed (exit code {code})")]
    Stage { stage: &'static str, code: i32 },

    #[error("dependency check for {tool} failed (exit code {code})")]
    Dependency { tool: String, code: i32 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl BootstrapError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            BootstrapError::Args(_) => EXIT_BAD_ARGUMENTS,
            BootstrapError::ParameterFile(_) => EXIT_MISSING_PARAMETER_FILE,
            BootstrapError::Stage { code, .. } => *code,
            BootstrapError::Dependency { code, .. } => {
                if *code == 0 {
                    EXIT_BAD_ARGUMENTS
                } else {
                    *code
                }
            }
            BootstrapError::Store(_) => EXIT_STORE_FAILURE,
        }
    }
}
