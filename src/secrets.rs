//! Key vault access and secret lifecycle reconciliation.
//!
//! The vault is only ever touched through the [`SecretVault`] trait; the
//! production implementation shells out to the cloud CLI. Reconciliation
//! handles the three secret states: soft-deleted (recover, then wait until
//! the store actually serves it again), present with a different value
//! (update with a one-year expiry), and absent (create).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};

use crate::tools::{ToolError, ToolInvocation, ToolRunner};

/// Validity window applied when a secret is created or updated.
pub const SECRET_EXPIRY_DAYS: i64 = 365;

const RECOVERY_POLL_INITIAL: Duration = Duration::from_secs(2);
const RECOVERY_POLL_MAX: Duration = Duration::from_secs(16);
const RECOVERY_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("vault operation {operation} failed (exit {code}): {detail}")]
    Cli {
        operation: &'static str,
        code: i32,
        detail: String,
    },

    #[error("vault operation {operation} returned unparseable output: {source}")]
    Parse {
        operation: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("secret {name} did not become readable within {timeout:?} after recovery")]
    RecoveryTimeout { name: String, timeout: Duration },

    #[error(transparent)]
    Tool(#[from] ToolError),
}

/// Secret store operations used by the stages.
#[async_trait]
pub trait SecretVault: Send + Sync {
    /// Current value of a secret, `None` when it does not exist.
    async fn get_secret(&self, vault: &str, name: &str) -> Result<Option<String>, VaultError>;

    /// Create or update a secret with an expiry timestamp.
    async fn set_secret(
        &self,
        vault: &str,
        name: &str,
        value: &str,
        expires: DateTime<Utc>,
    ) -> Result<(), VaultError>;

    /// Whether the secret exists in deleted-but-recoverable state.
    async fn is_deleted(&self, vault: &str, name: &str) -> Result<bool, VaultError>;

    /// Recover a soft-deleted secret.
    async fn recover_secret(&self, vault: &str, name: &str) -> Result<(), VaultError>;

    /// Cheap access probe against the vault.
    async fn verify_access(&self, vault: &str) -> Result<(), VaultError>;
}

/// What reconciliation did to the secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretChange {
    Created,
    Updated,
    Unchanged,
}

/// Bring a secret to the desired value.
///
/// A soft-deleted secret is recovered first and polled with backoff until
/// the store serves it again; the wait is bounded and a timeout surfaces as
/// an error instead of silently continuing.
pub async fn reconcile_secret(
    vault_api: &dyn SecretVault,
    vault: &str,
    name: &str,
    value: &str,
) -> Result<SecretChange, VaultError> {
    if vault_api.is_deleted(vault, name).await? {
        tracing::info!("[Secrets] recovering deleted secret {} in {}", name, vault);
        vault_api.recover_secret(vault, name).await?;
        wait_until_readable(vault_api, vault, name).await?;
    }

    let expires = Utc::now() + chrono::Duration::days(SECRET_EXPIRY_DAYS);
    match vault_api.get_secret(vault, name).await? {
        Some(existing) if existing == value => {
            tracing::debug!("[Secrets] secret {} already up to date", name);
            Ok(SecretChange::Unchanged)
        }
        Some(_) => {
            tracing::info!("[Secrets] updating secret {} in {}", name, vault);
            vault_api.set_secret(vault, name, value, expires).await?;
            Ok(SecretChange::Updated)
        }
        None => {
            tracing::info!("[Secrets] creating secret {} in {}", name, vault);
            vault_api.set_secret(vault, name, value, expires).await?;
            Ok(SecretChange::Created)
        }
    }
}

/// Bounded poll with backoff until a recovered secret is readable.
async fn wait_until_readable(
    vault_api: &dyn SecretVault,
    vault: &str,
    name: &str,
) -> Result<(), VaultError> {
    let deadline = tokio::time::Instant::now() + RECOVERY_TIMEOUT;
    let mut delay = RECOVERY_POLL_INITIAL;

    loop {
        if vault_api.get_secret(vault, name).await?.is_some() {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(VaultError::RecoveryTimeout {
                name: name.to_string(),
                timeout: RECOVERY_TIMEOUT,
            });
        }
        tracing::debug!(
            "[Secrets] secret {} not readable yet, retrying in {:?}",
            name,
            delay
        );
        tokio::time::sleep(delay).await;
        delay = (delay * 2).min(RECOVERY_POLL_MAX);
    }
}

/// Cloud CLI backed vault.
pub struct AzCliVault {
    runner: Arc<dyn ToolRunner>,
}

impl AzCliVault {
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self { runner }
    }

    fn last_line(output: &str) -> String {
        output.lines().last().unwrap_or("no output").to_string()
    }
}

#[async_trait]
impl SecretVault for AzCliVault {
    async fn get_secret(&self, vault: &str, name: &str) -> Result<Option<String>, VaultError> {
        let invocation = ToolInvocation::new("az").args([
            "keyvault",
            "secret",
            "show",
            "--vault-name",
            vault,
            "--name",
            name,
            "--output",
            "json",
        ]);
        let result = self.runner.run(&invocation).await?;
        if !result.success() {
            if result.stderr.contains("SecretNotFound") || result.stderr.contains("NotFound") {
                return Ok(None);
            }
            return Err(VaultError::Cli {
                operation: "secret show",
                code: result.exit_code,
                detail: Self::last_line(&result.stderr),
            });
        }

        let payload: serde_json::Value =
            serde_json::from_str(&result.stdout).map_err(|source| VaultError::Parse {
                operation: "secret show",
                source,
            })?;
        Ok(payload
            .get("value")
            .and_then(|v| v.as_str())
            .map(String::from))
    }

    async fn set_secret(
        &self,
        vault: &str,
        name: &str,
        value: &str,
        expires: DateTime<Utc>,
    ) -> Result<(), VaultError> {
        let expires = expires.to_rfc3339_opts(SecondsFormat::Secs, true);
        let invocation = ToolInvocation::new("az").args([
            "keyvault",
            "secret",
            "set",
            "--vault-name",
            vault,
            "--name",
            name,
            "--value",
            value,
            "--expires",
            expires.as_str(),
        ]);
        let result = self.runner.run(&invocation).await?;
        if !result.success() {
            return Err(VaultError::Cli {
                operation: "secret set",
                code: result.exit_code,
                detail: Self::last_line(&result.stderr),
            });
        }
        Ok(())
    }

    async fn is_deleted(&self, vault: &str, name: &str) -> Result<bool, VaultError> {
        let invocation = ToolInvocation::new("az").args([
            "keyvault",
            "secret",
            "show-deleted",
            "--vault-name",
            vault,
            "--name",
            name,
        ]);
        let result = self.runner.run(&invocation).await?;
        // A missing deleted entry is the common case; real API errors will
        // resurface on the subsequent get/set.
        Ok(result.success())
    }

    async fn recover_secret(&self, vault: &str, name: &str) -> Result<(), VaultError> {
        let invocation = ToolInvocation::new("az").args([
            "keyvault",
            "secret",
            "recover",
            "--vault-name",
            vault,
            "--name",
            name,
        ]);
        let result = self.runner.run(&invocation).await?;
        if !result.success() {
            return Err(VaultError::Cli {
                operation: "secret recover",
                code: result.exit_code,
                detail: Self::last_line(&result.stderr),
            });
        }
        Ok(())
    }

    async fn verify_access(&self, vault: &str) -> Result<(), VaultError> {
        let invocation = ToolInvocation::new("az").args([
            "keyvault",
            "secret",
            "list",
            "--vault-name",
            vault,
            "--output",
            "json",
        ]);
        let result = self.runner.run(&invocation).await?;
        if !result.success() {
            return Err(VaultError::Cli {
                operation: "secret list",
                code: result.exit_code,
                detail: Self::last_line(&result.stderr),
            });
        }
        Ok(())
    }
}
