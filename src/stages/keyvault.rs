//! Stage 1: validate key vault access.
//!
//! Best-effort stage: problems are logged, never fatal, and the sequence
//! always moves on to the library bootstrap.

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::BootstrapContext;
use crate::error::BootstrapError;
use crate::secrets::{reconcile_secret, SecretVault};
use crate::sequencer::{BootstrapStep, Stage, StageOutcome};

pub struct KeyvaultValidation {
    vault: Arc<dyn SecretVault>,
}

impl KeyvaultValidation {
    pub fn new(vault: Arc<dyn SecretVault>) -> Self {
        Self { vault }
    }
}

#[async_trait]
impl Stage for KeyvaultValidation {
    fn name(&self) -> &'static str {
        "validate-keyvault-access"
    }

    fn trigger(&self) -> BootstrapStep {
        BootstrapStep::ValidateKeyvault
    }

    async fn run(&self, ctx: &mut BootstrapContext) -> Result<StageOutcome, BootstrapError> {
        if ctx.record.step != self.trigger() {
            tracing::info!("[KeyvaultValidation] step mismatch, already complete");
            return Ok(StageOutcome::Skipped);
        }

        let next = StageOutcome::Completed {
            next: BootstrapStep::BootstrapLibrary,
        };

        let Some(vault_name) = ctx.record.keyvault.clone() else {
            tracing::warn!("[KeyvaultValidation] no key vault recorded, skipping validation");
            return Ok(next);
        };

        match self.vault.verify_access(&vault_name).await {
            Ok(()) => tracing::info!("[KeyvaultValidation] key vault {} reachable", vault_name),
            Err(err) => {
                tracing::warn!(
                    "[KeyvaultValidation] cannot list secrets in {}: {}",
                    vault_name,
                    err
                );
                return Ok(next);
            }
        }

        // Seed the vault with the credentials later automation reads back.
        let environment = ctx.identity.environment.clone();
        let mut entries: Vec<(String, String)> = Vec::new();
        if let Some(subscription) = &ctx.record.state_subscription {
            entries.push((format!("{environment}-subscription-id"), subscription.clone()));
        }
        if let Some(spn) = &ctx.credentials {
            entries.push((format!("{environment}-client-id"), spn.client_id.clone()));
            entries.push((format!("{environment}-client-secret"), spn.client_secret.clone()));
            entries.push((format!("{environment}-tenant-id"), spn.tenant_id.clone()));
        }

        for (name, value) in entries {
            if let Err(err) = reconcile_secret(self.vault.as_ref(), &vault_name, &name, &value).await
            {
                tracing::warn!("[KeyvaultValidation] could not store {}: {}", name, err);
            }
        }

        Ok(next)
    }
}
