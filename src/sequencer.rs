//! The deployment state machine.
//!
//! A persisted step counter selects the next stage; the sequencer dispatches
//! through an explicit transition table, so the only handler that can run is
//! the one whose trigger equals the current step. After a stage completes
//! the record is saved before the next stage starts, which is what makes an
//! interrupted run resumable: completed stages are never re-executed.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::BootstrapContext;
use crate::error::BootstrapError;
use crate::secrets::SecretVault;
use crate::stages::{
    DeployerBootstrap, KeyvaultValidation, LibraryBootstrap, StateMigration,
};
use crate::store::ConfigStore;
use crate::tools::ToolRunner;

/// Sequencer states. The persisted record stores the numeric value, which
/// keeps the state file diffable by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum BootstrapStep {
    BootstrapDeployer = 0,
    ValidateKeyvault = 1,
    BootstrapLibrary = 2,
    MigrateDeployerState = 3,
    MigrateLibraryState = 4,
    Complete = 5,
}

impl BootstrapStep {
    /// Human-readable stage name for this step.
    pub fn describe(self) -> &'static str {
        match self {
            BootstrapStep::BootstrapDeployer => "bootstrap-deployer",
            BootstrapStep::ValidateKeyvault => "validate-keyvault-access",
            BootstrapStep::BootstrapLibrary => "bootstrap-library",
            BootstrapStep::MigrateDeployerState => "migrate-deployer-state",
            BootstrapStep::MigrateLibraryState => "migrate-library-state",
            BootstrapStep::Complete => "complete",
        }
    }

    /// Default next step in the linear sequence.
    pub fn successor(self) -> BootstrapStep {
        match self {
            BootstrapStep::BootstrapDeployer => BootstrapStep::ValidateKeyvault,
            BootstrapStep::ValidateKeyvault => BootstrapStep::BootstrapLibrary,
            BootstrapStep::BootstrapLibrary => BootstrapStep::MigrateDeployerState,
            BootstrapStep::MigrateDeployerState => BootstrapStep::MigrateLibraryState,
            BootstrapStep::MigrateLibraryState | BootstrapStep::Complete => BootstrapStep::Complete,
        }
    }
}

impl From<BootstrapStep> for u8 {
    fn from(step: BootstrapStep) -> Self {
        step as u8
    }
}

impl TryFrom<u8> for BootstrapStep {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(BootstrapStep::BootstrapDeployer),
            1 => Ok(BootstrapStep::ValidateKeyvault),
            2 => Ok(BootstrapStep::BootstrapLibrary),
            3 => Ok(BootstrapStep::MigrateDeployerState),
            4 => Ok(BootstrapStep::MigrateLibraryState),
            5 => Ok(BootstrapStep::Complete),
            other => Err(format!("invalid bootstrap step {other}, expected 0..=5")),
        }
    }
}

impl fmt::Display for BootstrapStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", *self as u8, self.describe())
    }
}

/// Result of a stage handler run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// The stage did its work; the sequencer persists `next` as the new step.
    Completed { next: BootstrapStep },
    /// The stage was invoked with a step that does not match its trigger and
    /// performed no work. Treated as success.
    Skipped,
}

/// A single stage of the bootstrap sequence.
///
/// Handlers must verify `ctx.record.step == self.trigger()` before doing any
/// work and report [`StageOutcome::Skipped`] on mismatch, so a handler
/// invoked out of order makes zero external calls.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    fn trigger(&self) -> BootstrapStep;

    async fn run(&self, ctx: &mut BootstrapContext) -> Result<StageOutcome, BootstrapError>;
}

/// Drives the transition table until the record reaches `Complete`.
pub struct Sequencer {
    store: ConfigStore,
    deployer: DeployerBootstrap,
    keyvault: KeyvaultValidation,
    library: LibraryBootstrap,
    migrate_deployer: StateMigration,
    migrate_library: StateMigration,
}

impl Sequencer {
    pub fn new(
        store: ConfigStore,
        runner: Arc<dyn ToolRunner>,
        vault: Arc<dyn SecretVault>,
    ) -> Self {
        Self {
            store,
            deployer: DeployerBootstrap::new(runner.clone()),
            keyvault: KeyvaultValidation::new(vault.clone()),
            library: LibraryBootstrap::new(runner.clone(), vault.clone()),
            migrate_deployer: StateMigration::deployer(runner.clone(), vault.clone()),
            migrate_library: StateMigration::library(runner, vault),
        }
    }

    /// Run stages from the record's current step to completion.
    ///
    /// On stage failure the step is left unadvanced, a `.err` marker is
    /// written next to the record, and the stage's error is returned without
    /// invoking any later stage.
    pub async fn run(&self, ctx: &mut BootstrapContext) -> Result<(), BootstrapError> {
        loop {
            let step = ctx.record.step;
            let stage: &dyn Stage = match step {
                BootstrapStep::Complete => break,
                BootstrapStep::BootstrapDeployer => &self.deployer,
                BootstrapStep::ValidateKeyvault => &self.keyvault,
                BootstrapStep::BootstrapLibrary => &self.library,
                BootstrapStep::MigrateDeployerState => &self.migrate_deployer,
                BootstrapStep::MigrateLibraryState => &self.migrate_library,
            };

            tracing::info!(
                "[Sequencer] {}: entering step {}",
                ctx.identity.key(),
                step
            );

            match stage.run(ctx).await {
                Ok(StageOutcome::Completed { next }) => {
                    // The table only ever moves forward; force resets go
                    // through record deletion, not a backwards transition.
                    debug_assert!(next > step);
                    ctx.record.step = next;
                    self.store.save(&ctx.identity, &ctx.record)?;
                    self.store.clear_error_marker(&ctx.identity);
                    tracing::info!(
                        "[Sequencer] {}: step advanced to {}",
                        ctx.identity.key(),
                        next
                    );
                }
                Ok(StageOutcome::Skipped) => {
                    // Unreachable through table dispatch; kept from the
                    // handler guard contract. Record and move on.
                    tracing::warn!(
                        "[Sequencer] {} reported already-complete at step {}",
                        stage.name(),
                        step
                    );
                    ctx.record.step = step.successor();
                    self.store.save(&ctx.identity, &ctx.record)?;
                }
                Err(err) => {
                    if let BootstrapError::Stage { stage: name, .. } = &err {
                        if let Err(marker_err) =
                            self.store.write_error_marker(&ctx.identity, name)
                        {
                            tracing::warn!(
                                "[Sequencer] could not write error marker: {}",
                                marker_err
                            );
                        }
                    }
                    return Err(err);
                }
            }
        }

        tracing::info!("[Sequencer] {}: bootstrap complete", ctx.identity.key());
        Ok(())
    }
}
