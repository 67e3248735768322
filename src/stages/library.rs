//! Stage 2: bootstrap the library of shared resources.

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::BootstrapContext;
use crate::error::{BootstrapError, EXIT_LIBRARY_BOOTSTRAP};
use crate::secrets::{reconcile_secret, SecretVault};
use crate::sequencer::{BootstrapStep, Stage, StageOutcome};
use crate::stages::{parameter_file_name, reset_local_state, run_stage_tool, stage_failure};
use crate::tools::{terraform_output, tool_command, ToolInvocation, ToolRunner};

const STAGE_NAME: &str = "bootstrap-library";

/// Secret holding the shared artifact storage connection string.
pub const SAPBITS_CONNECTION_SECRET: &str = "sapbits-sa-connection-string";

pub struct LibraryBootstrap {
    runner: Arc<dyn ToolRunner>,
    vault: Arc<dyn SecretVault>,
}

impl LibraryBootstrap {
    pub fn new(runner: Arc<dyn ToolRunner>, vault: Arc<dyn SecretVault>) -> Self {
        Self { runner, vault }
    }
}

#[async_trait]
impl Stage for LibraryBootstrap {
    fn name(&self) -> &'static str {
        STAGE_NAME
    }

    fn trigger(&self) -> BootstrapStep {
        BootstrapStep::BootstrapLibrary
    }

    async fn run(&self, ctx: &mut BootstrapContext) -> Result<StageOutcome, BootstrapError> {
        if ctx.record.step != self.trigger() {
            tracing::info!("[LibraryBootstrap] step mismatch, already complete");
            return Ok(StageOutcome::Skipped);
        }

        let workspace = ctx.library_workspace();
        if ctx.options.force {
            reset_local_state(&workspace)
                .map_err(|err| stage_failure(STAGE_NAME, EXIT_LIBRARY_BOOTSTRAP, err))?;
        }

        let mut invocation = ToolInvocation::new(tool_command("install_library"))
            .arg("--parameterfile")
            .arg(parameter_file_name(&ctx.library_parameter_file))
            .arg("--deployer_statefile_foldername")
            .arg(ctx.deployer_workspace().display().to_string())
            .current_dir(&workspace);
        if ctx.options.auto_approve {
            invocation = invocation.arg("--auto-approve");
        }
        if ctx.options.ado {
            invocation = invocation.arg("--ado");
        }

        run_stage_tool(
            self.runner.as_ref(),
            &invocation,
            STAGE_NAME,
            EXIT_LIBRARY_BOOTSTRAP,
        )
        .await?;

        if let Some(group) =
            terraform_output(self.runner.as_ref(), &workspace, "sapbits_sa_resource_group_name")
                .await
                .map_err(|err| stage_failure(STAGE_NAME, EXIT_LIBRARY_BOOTSTRAP, err))?
        {
            tracing::info!("[LibraryBootstrap] shared artifact resource group: {}", group);
        }

        if let Some(vault_name) = ctx.record.keyvault.clone() {
            if let Some(connection) =
                terraform_output(self.runner.as_ref(), &workspace, "sa_connection_string")
                    .await
                    .map_err(|err| stage_failure(STAGE_NAME, EXIT_LIBRARY_BOOTSTRAP, err))?
            {
                reconcile_secret(
                    self.vault.as_ref(),
                    &vault_name,
                    SAPBITS_CONNECTION_SECRET,
                    &connection,
                )
                .await
                .map_err(|err| stage_failure(STAGE_NAME, EXIT_LIBRARY_BOOTSTRAP, err))?;
            }
        } else {
            tracing::warn!("[LibraryBootstrap] no key vault recorded, connection string not stored");
        }

        Ok(StageOutcome::Completed {
            next: BootstrapStep::MigrateDeployerState,
        })
    }
}
