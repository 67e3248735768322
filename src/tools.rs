//! External tool invocation.
//!
//! Installer tools and the infrastructure CLI are collaborators, not code we
//! control; everything goes through the [`ToolRunner`] trait so the
//! sequencer and stages can be exercised with a scripted double in tests.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::BootstrapError;

/// Directory prefix for installer tools. When unset, tools are resolved on
/// `PATH`.
pub const TOOLS_PATH_ENV: &str = "BOOTSTRAP_TOOLS_PATH";

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// A single external tool invocation: program, arguments and working
/// directory. The working directory matters, installers operate on whatever
/// workspace they are started in.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl ToolInvocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, value: impl Into<String>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn args<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(values.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Rendered command line for logging.
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Captured result of a completed tool invocation.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ToolResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Blocking-await execution of external tools.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(&self, invocation: &ToolInvocation) -> Result<ToolResult, ToolError>;
}

/// Production runner: spawns a child process and waits for completion.
/// No timeout is enforced at this layer; a hung tool blocks the sequence.
#[derive(Debug, Default)]
pub struct ProcessToolRunner;

impl ProcessToolRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ToolRunner for ProcessToolRunner {
    async fn run(&self, invocation: &ToolInvocation) -> Result<ToolResult, ToolError> {
        tracing::info!("[ToolRunner] running: {}", invocation.command_line());

        let mut command = Command::new(&invocation.program);
        command.args(&invocation.args);
        if let Some(dir) = &invocation.cwd {
            command.current_dir(dir);
        }

        let output = command.output().await.map_err(|source| ToolError::Launch {
            program: invocation.program.clone(),
            source,
        })?;

        let result = ToolResult {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if result.success() {
            tracing::info!("[ToolRunner] {} completed", invocation.program);
        } else {
            tracing::error!(
                "[ToolRunner] {} exited with {}: {}",
                invocation.program,
                result.exit_code,
                result.stderr.lines().last().unwrap_or("no output")
            );
        }

        Ok(result)
    }
}

/// Resolve an installer tool name against `BOOTSTRAP_TOOLS_PATH`.
pub fn tool_command(name: &str) -> String {
    match std::env::var(TOOLS_PATH_ENV) {
        Ok(dir) if !dir.is_empty() => Path::new(&dir).join(name).to_string_lossy().into_owned(),
        _ => name.to_string(),
    }
}

/// Query a single Terraform output value in a workspace.
///
/// A missing output is `Ok(None)`: many outputs only exist after later
/// stages, so callers treat absence as "not yet known".
pub async fn terraform_output(
    runner: &dyn ToolRunner,
    workspace: &Path,
    name: &str,
) -> Result<Option<String>, ToolError> {
    let invocation = ToolInvocation::new("terraform")
        .args(["output", "-no-color", "-raw", name])
        .current_dir(workspace);

    let result = runner.run(&invocation).await?;
    if !result.success() {
        tracing::debug!(
            "[ToolRunner] terraform output {} not available in {}",
            name,
            workspace.display()
        );
        return Ok(None);
    }

    let value = result.stdout.trim().to_string();
    if value.is_empty() {
        Ok(None)
    } else {
        Ok(Some(value))
    }
}

/// Verify the external collaborators are present before sequencing starts.
/// A failing check propagates the check's own exit code.
pub async fn validate_dependencies(runner: &dyn ToolRunner) -> Result<(), BootstrapError> {
    for tool in ["terraform", "az"] {
        let invocation = ToolInvocation::new(tool).arg("version");
        match runner.run(&invocation).await {
            Ok(result) if result.success() => {
                tracing::debug!("[ToolRunner] dependency {} present", tool);
            }
            Ok(result) => {
                return Err(BootstrapError::Dependency {
                    tool: tool.to_string(),
                    code: result.exit_code,
                });
            }
            Err(err) => {
                tracing::error!("[ToolRunner] dependency {} missing: {}", tool, err);
                return Err(BootstrapError::Dependency {
                    tool: tool.to_string(),
                    code: 127,
                });
            }
        }
    }
    Ok(())
}
