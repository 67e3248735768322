//! Stage 0: bootstrap the deployer.

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::BootstrapContext;
use crate::error::{BootstrapError, EXIT_DEPLOYER_BOOTSTRAP};
use crate::sequencer::{BootstrapStep, Stage, StageOutcome};
use crate::stages::{parameter_file_name, reset_local_state, run_stage_tool, stage_failure};
use crate::tools::{terraform_output, tool_command, ToolInvocation, ToolRunner};

const STAGE_NAME: &str = "bootstrap-deployer";

/// Runs the deployer installer and records the key vault it provisioned.
pub struct DeployerBootstrap {
    runner: Arc<dyn ToolRunner>,
}

impl DeployerBootstrap {
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl Stage for DeployerBootstrap {
    fn name(&self) -> &'static str {
        STAGE_NAME
    }

    fn trigger(&self) -> BootstrapStep {
        BootstrapStep::BootstrapDeployer
    }

    async fn run(&self, ctx: &mut BootstrapContext) -> Result<StageOutcome, BootstrapError> {
        if ctx.record.step != self.trigger() {
            tracing::info!("[DeployerBootstrap] step mismatch, already complete");
            return Ok(StageOutcome::Skipped);
        }

        let workspace = ctx.deployer_workspace();
        if ctx.options.force {
            reset_local_state(&workspace)
                .map_err(|err| stage_failure(STAGE_NAME, EXIT_DEPLOYER_BOOTSTRAP, err))?;
        }

        let mut invocation = ToolInvocation::new(tool_command("install_deployer"))
            .arg("--parameterfile")
            .arg(parameter_file_name(&ctx.deployer_parameter_file))
            .current_dir(&workspace);
        if ctx.options.auto_approve {
            invocation = invocation.arg("--auto-approve");
        }
        if ctx.options.msi {
            invocation = invocation.arg("--msi");
        }
        if ctx.options.ado {
            invocation = invocation.arg("--ado");
        }

        run_stage_tool(
            self.runner.as_ref(),
            &invocation,
            STAGE_NAME,
            EXIT_DEPLOYER_BOOTSTRAP,
        )
        .await?;

        if ctx.record.keyvault.is_none() {
            let vault = terraform_output(self.runner.as_ref(), &workspace, "deployer_keyvault_name")
                .await
                .map_err(|err| stage_failure(STAGE_NAME, EXIT_DEPLOYER_BOOTSTRAP, err))?;
            match vault {
                Some(vault) => {
                    tracing::info!("[DeployerBootstrap] provisioned key vault {}", vault);
                    ctx.record.keyvault = Some(vault);
                }
                None => tracing::warn!(
                    "[DeployerBootstrap] deployer did not export a key vault name"
                ),
            }
        }

        if let Some(spn) = &ctx.credentials {
            if ctx.record.client_id.is_none() {
                ctx.record.client_id = Some(spn.client_id.clone());
            }
            if ctx.record.tenant_id.is_none() {
                ctx.record.tenant_id = Some(spn.tenant_id.clone());
            }
        }

        // When the remote state storage already exists, the library side is
        // bootstrapped and only state migration remains.
        let next = if ctx.options.remote_state_reset {
            tracing::info!(
                "[DeployerBootstrap] remote state reset requested, skipping library bootstrap"
            );
            BootstrapStep::MigrateDeployerState
        } else {
            BootstrapStep::ValidateKeyvault
        };
        Ok(StageOutcome::Completed { next })
    }
}
