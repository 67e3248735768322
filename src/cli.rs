//! Command line surface and binding of arguments into the bootstrap context.

use std::path::PathBuf;

use clap::Parser;

use crate::context::{
    tfstate_key, BootstrapContext, BootstrapOptions, EnvironmentIdentity, ServicePrincipal,
};
use crate::error::BootstrapError;
use crate::store::ConfigStore;

/// When set (non-empty), stage 0 completes directly to deployer state
/// migration: the library is treated as already bootstrapped.
pub const REMOTE_STATE_RESET_ENV: &str = "REMOTE_STATE_RESET";

/// Overrides the default store directory.
pub const CONFIG_DIR_ENV: &str = "REGION_BOOTSTRAP_CONFIG_DIR";

const STORE_DIR_NAME: &str = ".region_bootstrap";

#[derive(Parser, Debug)]
#[command(
    name = "region-bootstrap",
    version,
    about = "Bootstrap deployer and library control-plane infrastructure and migrate their state to remote storage"
)]
pub struct Args {
    /// Deployer parameter file, names the environment and region
    #[arg(short = 'd', long = "deployer_parameter_file")]
    pub deployer_parameter_file: PathBuf,

    /// Library parameter file
    #[arg(short = 'l', long = "library_parameter_file")]
    pub library_parameter_file: PathBuf,

    /// Subscription holding the remote state resources
    #[arg(short = 's', long = "subscription")]
    pub subscription: Option<String>,

    /// Service principal application id
    #[arg(short = 'c', long = "spn_id")]
    pub spn_id: Option<String>,

    /// Service principal secret
    #[arg(short = 'p', long = "spn_secret")]
    pub spn_secret: Option<String>,

    /// Tenant id for the service principal
    #[arg(short = 't', long = "tenant_id")]
    pub tenant_id: Option<String>,

    /// Existing remote state storage account name
    #[arg(short = 'a', long = "storageaccountname")]
    pub storageaccountname: Option<String>,

    /// Existing key vault name
    #[arg(short = 'k', long = "vault")]
    pub vault: Option<String>,

    /// Delete the deployment record and local state, restarting at step 0
    #[arg(short = 'f', long = "force")]
    pub force: bool,

    /// Pass --auto-approve to the installers
    #[arg(short = 'i', long = "auto-approve")]
    pub auto_approve: bool,

    /// Use managed identity instead of a service principal
    #[arg(short = 'm', long = "msi")]
    pub msi: bool,

    /// Re-adopt an existing key vault into the record
    #[arg(short = 'r', long = "recover")]
    pub recover: bool,

    /// Running inside a deployment pipeline
    #[arg(short = 'v', long = "ado")]
    pub ado: bool,
}

/// Default store directory: `$REGION_BOOTSTRAP_CONFIG_DIR`, else
/// `~/.region_bootstrap`.
pub fn default_store_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(STORE_DIR_NAME)
}

fn env_flag(name: &str) -> bool {
    std::env::var(name).map(|v| !v.is_empty()).unwrap_or(false)
}

/// Resolve arguments into a [`BootstrapContext`], creating or resetting the
/// deployment record as requested.
pub fn bind(args: Args, store: &ConfigStore) -> Result<BootstrapContext, BootstrapError> {
    for file in [&args.deployer_parameter_file, &args.library_parameter_file] {
        if !file.exists() {
            return Err(BootstrapError::ParameterFile(file.clone()));
        }
    }

    let identity = EnvironmentIdentity::from_parameter_file(&args.deployer_parameter_file)?;
    let library_identity = EnvironmentIdentity::from_parameter_file(&args.library_parameter_file)?;
    if identity != library_identity {
        return Err(BootstrapError::Args(format!(
            "parameter files disagree on environment/region: {} vs {}",
            identity.key(),
            library_identity.key()
        )));
    }

    if args.msi && (args.spn_id.is_some() || args.spn_secret.is_some()) {
        return Err(BootstrapError::Args(
            "--msi and service principal credentials are mutually exclusive".to_string(),
        ));
    }

    let credentials = match (&args.spn_id, &args.spn_secret, &args.tenant_id) {
        (Some(client_id), Some(client_secret), Some(tenant_id)) => Some(ServicePrincipal {
            client_id: client_id.clone(),
            client_secret: client_secret.clone(),
            tenant_id: tenant_id.clone(),
        }),
        (None, None, _) => None,
        _ => {
            return Err(BootstrapError::Args(
                "service principal requires --spn_id, --spn_secret and --tenant_id together"
                    .to_string(),
            ));
        }
    };

    if args.force {
        tracing::info!("[Binding] force requested, deleting record for {}", identity.key());
        store.delete(&identity)?;
    }

    let deployer_key = tfstate_key(&args.deployer_parameter_file);
    let library_key = tfstate_key(&args.library_parameter_file);
    let mut record = store.init(&identity, &deployer_key, &library_key)?;

    // tfstate keys are written once; a renamed parameter file does not
    // rewrite them.
    if record.deployer_tfstate_key != deployer_key || record.library_tfstate_key != library_key {
        tracing::warn!(
            "[Binding] record keeps tfstate keys {} / {}, parameter files would derive {} / {}",
            record.deployer_tfstate_key,
            record.library_tfstate_key,
            deployer_key,
            library_key
        );
    }

    if let Some(vault) = &args.vault {
        if record.keyvault.is_none() || args.recover {
            record.keyvault = Some(vault.clone());
        }
    }
    if let Some(account) = &args.storageaccountname {
        if record.remote_state_sa.is_none() {
            record.remote_state_sa = Some(account.clone());
        }
    }
    if let Some(subscription) = &args.subscription {
        if record.state_subscription.is_none() {
            record.state_subscription = Some(subscription.clone());
        }
    }
    if let Some(spn) = &credentials {
        if record.client_id.is_none() {
            record.client_id = Some(spn.client_id.clone());
        }
    }
    if let Some(tenant) = &args.tenant_id {
        if record.tenant_id.is_none() {
            record.tenant_id = Some(tenant.clone());
        }
    }
    store.save(&identity, &record)?;

    let options = BootstrapOptions {
        force: args.force,
        auto_approve: args.auto_approve,
        msi: args.msi,
        recover: args.recover,
        ado: args.ado,
        remote_state_reset: env_flag(REMOTE_STATE_RESET_ENV) || args.storageaccountname.is_some(),
    };

    let mut ctx = BootstrapContext::new(
        identity,
        args.deployer_parameter_file,
        args.library_parameter_file,
        record,
    );
    ctx.options = options;
    ctx.credentials = credentials;
    Ok(ctx)
}
