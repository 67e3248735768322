//! Stages 3 and 4: migrate local Terraform state into remote storage.
//!
//! One handler type covers both migrations; the target selects the
//! parameter file, the installer type flag, the trigger step and the exit
//! code.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::BootstrapContext;
use crate::error::{BootstrapError, EXIT_DEPLOYER_MIGRATION, EXIT_LIBRARY_MIGRATION};
use crate::secrets::{reconcile_secret, SecretVault};
use crate::sequencer::{BootstrapStep, Stage, StageOutcome};
use crate::stages::{parameter_file_name, run_stage_tool, stage_failure};
use crate::tools::{terraform_output, tool_command, ToolInvocation, ToolRunner};

/// Secret holding the remote state storage connection string.
pub const TFSTATE_CONNECTION_SECRET: &str = "tfstate-sa-connection-string";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationTarget {
    Deployer,
    Library,
}

impl MigrationTarget {
    fn stage_name(self) -> &'static str {
        match self {
            MigrationTarget::Deployer => "migrate-deployer-state",
            MigrationTarget::Library => "migrate-library-state",
        }
    }

    fn installer_type(self) -> &'static str {
        match self {
            MigrationTarget::Deployer => "deployer",
            MigrationTarget::Library => "library",
        }
    }

    fn exit_code(self) -> i32 {
        match self {
            MigrationTarget::Deployer => EXIT_DEPLOYER_MIGRATION,
            MigrationTarget::Library => EXIT_LIBRARY_MIGRATION,
        }
    }
}

pub struct StateMigration {
    target: MigrationTarget,
    runner: Arc<dyn ToolRunner>,
    vault: Arc<dyn SecretVault>,
}

impl StateMigration {
    pub fn deployer(runner: Arc<dyn ToolRunner>, vault: Arc<dyn SecretVault>) -> Self {
        Self {
            target: MigrationTarget::Deployer,
            runner,
            vault,
        }
    }

    pub fn library(runner: Arc<dyn ToolRunner>, vault: Arc<dyn SecretVault>) -> Self {
        Self {
            target: MigrationTarget::Library,
            runner,
            vault,
        }
    }

    fn workspace(&self, ctx: &BootstrapContext) -> PathBuf {
        match self.target {
            MigrationTarget::Deployer => ctx.deployer_workspace(),
            MigrationTarget::Library => ctx.library_workspace(),
        }
    }

    fn parameter_file(&self, ctx: &BootstrapContext) -> PathBuf {
        match self.target {
            MigrationTarget::Deployer => ctx.deployer_parameter_file.clone(),
            MigrationTarget::Library => ctx.library_parameter_file.clone(),
        }
    }
}

#[async_trait]
impl Stage for StateMigration {
    fn name(&self) -> &'static str {
        self.target.stage_name()
    }

    fn trigger(&self) -> BootstrapStep {
        match self.target {
            MigrationTarget::Deployer => BootstrapStep::MigrateDeployerState,
            MigrationTarget::Library => BootstrapStep::MigrateLibraryState,
        }
    }

    async fn run(&self, ctx: &mut BootstrapContext) -> Result<StageOutcome, BootstrapError> {
        let stage = self.target.stage_name();
        let code = self.target.exit_code();

        if ctx.record.step != self.trigger() {
            tracing::info!("[StateMigration] {} step mismatch, already complete", stage);
            return Ok(StageOutcome::Skipped);
        }

        let workspace = self.workspace(ctx);
        let mut invocation = ToolInvocation::new(tool_command("installer"))
            .arg("--parameterfile")
            .arg(parameter_file_name(&self.parameter_file(ctx)))
            .arg("--type")
            .arg(self.target.installer_type())
            .current_dir(&workspace);
        if let Some(account) = &ctx.record.remote_state_sa {
            invocation = invocation.arg("--storageaccountname").arg(account.clone());
        }
        if ctx.options.auto_approve {
            invocation = invocation.arg("--auto-approve");
        }
        if ctx.options.ado {
            invocation = invocation.arg("--ado");
        }

        run_stage_tool(self.runner.as_ref(), &invocation, stage, code).await?;

        if ctx.record.remote_state_sa.is_none() {
            ctx.record.remote_state_sa = terraform_output(
                self.runner.as_ref(),
                &workspace,
                "remote_state_storage_account_name",
            )
            .await
            .map_err(|err| stage_failure(stage, code, err))?;
        }
        if ctx.record.state_subscription.is_none() {
            ctx.record.state_subscription = terraform_output(
                self.runner.as_ref(),
                &workspace,
                "created_resource_group_subscription_id",
            )
            .await
            .map_err(|err| stage_failure(stage, code, err))?;
        }

        if let Some(vault_name) = ctx.record.keyvault.clone() {
            if let Some(connection) =
                terraform_output(self.runner.as_ref(), &workspace, "sa_connection_string")
                    .await
                    .map_err(|err| stage_failure(stage, code, err))?
            {
                reconcile_secret(
                    self.vault.as_ref(),
                    &vault_name,
                    TFSTATE_CONNECTION_SECRET,
                    &connection,
                )
                .await
                .map_err(|err| stage_failure(stage, code, err))?;
            }
        }

        let next = match self.target {
            MigrationTarget::Deployer => BootstrapStep::MigrateLibraryState,
            MigrationTarget::Library => BootstrapStep::Complete,
        };
        Ok(StageOutcome::Completed { next })
    }
}
