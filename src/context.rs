//! The mutable bootstrap context threaded through the sequencer and stages.
//!
//! Everything a stage needs lives here: the environment+region identity, the
//! parameter file paths, the persisted record, and the run options. Stages
//! mutate the record through the context; the sequencer persists it.

use std::path::{Path, PathBuf};

use crate::error::BootstrapError;
use crate::store::DeploymentRecord;

/// The identity a deployment record is keyed by, derived from the first two
/// `-`-separated tokens of the deployer parameter file name
/// (`DEV-WEEU-SAP01-X00.json` -> `DEV` + `WEEU`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentIdentity {
    pub environment: String,
    pub region_code: String,
}

impl EnvironmentIdentity {
    pub fn from_parameter_file(path: &Path) -> Result<Self, BootstrapError> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| {
                BootstrapError::Args(format!(
                    "parameter file name is not valid UTF-8: {}",
                    path.display()
                ))
            })?;

        let mut parts = stem.split('-');
        let environment = parts.next().filter(|p| !p.is_empty());
        let region_code = parts.next().filter(|p| !p.is_empty());
        match (environment, region_code) {
            (Some(environment), Some(region_code)) => Ok(Self {
                environment: environment.to_string(),
                region_code: region_code.to_string(),
            }),
            _ => Err(BootstrapError::Args(format!(
                "parameter file {} must be named <ENVIRONMENT>-<REGION>-...",
                path.display()
            ))),
        }
    }

    /// Store key for this identity, e.g. `DEV-WEEU`.
    pub fn key(&self) -> String {
        format!("{}-{}", self.environment, self.region_code)
    }
}

/// Remote state filename for a parameter file:
/// `DEV-WEEU-SAP01-X00.json` -> `DEV-WEEU-SAP01-X00.terraform.tfstate`.
pub fn tfstate_key(parameter_file: &Path) -> String {
    let stem = parameter_file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state".to_string());
    format!("{stem}.terraform.tfstate")
}

/// Service principal credentials bound from the command line.
#[derive(Debug, Clone)]
pub struct ServicePrincipal {
    pub client_id: String,
    pub client_secret: String,
    pub tenant_id: String,
}

/// Run options bound from flags and environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct BootstrapOptions {
    pub force: bool,
    pub auto_approve: bool,
    pub msi: bool,
    pub recover: bool,
    pub ado: bool,
    /// The remote-state-reset condition: the library is already
    /// bootstrapped, so stage 0 completes directly to state migration.
    pub remote_state_reset: bool,
}

/// Mutable state for one invocation.
#[derive(Debug)]
pub struct BootstrapContext {
    pub identity: EnvironmentIdentity,
    pub deployer_parameter_file: PathBuf,
    pub library_parameter_file: PathBuf,
    pub record: DeploymentRecord,
    pub options: BootstrapOptions,
    pub credentials: Option<ServicePrincipal>,
}

impl BootstrapContext {
    pub fn new(
        identity: EnvironmentIdentity,
        deployer_parameter_file: impl Into<PathBuf>,
        library_parameter_file: impl Into<PathBuf>,
        record: DeploymentRecord,
    ) -> Self {
        Self {
            identity,
            deployer_parameter_file: deployer_parameter_file.into(),
            library_parameter_file: library_parameter_file.into(),
            record,
            options: BootstrapOptions::default(),
            credentials: None,
        }
    }

    /// Workspace the deployer installer runs in.
    pub fn deployer_workspace(&self) -> PathBuf {
        workspace_of(&self.deployer_parameter_file)
    }

    /// Workspace the library installer runs in.
    pub fn library_workspace(&self) -> PathBuf {
        workspace_of(&self.library_parameter_file)
    }
}

fn workspace_of(parameter_file: &Path) -> PathBuf {
    match parameter_file.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
