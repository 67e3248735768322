//! Persistence for deployment records.
//!
//! One TOML file per environment+region identity under a single store
//! directory, plus an environment-independent `defaults.toml` merged
//! underneath records at init. The files stay flat key/value text so an
//! operator can read and diff them.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::context::EnvironmentIdentity;
use crate::sequencer::BootstrapStep;

/// Name of the environment-independent defaults file.
pub const DEFAULTS_FILE: &str = "defaults.toml";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to create store directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read record {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("record {path} is not valid TOML: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The per-identity deployment record.
///
/// `step` drives the sequencer; the tfstate keys are derived once from the
/// parameter file names and never rewritten; the remaining fields are
/// populated incrementally as stages discover the provisioned resources.
/// Absent fields mean "not yet known", never an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub step: BootstrapStep,
    pub deployer_tfstate_key: String,
    pub library_tfstate_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyvault: Option<String>,
    #[serde(rename = "REMOTE_STATE_SA", default, skip_serializing_if = "Option::is_none")]
    pub remote_state_sa: Option<String>,
    #[serde(
        rename = "STATE_SUBSCRIPTION",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub state_subscription: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

impl DeploymentRecord {
    /// Fresh record at step 0 with derived tfstate keys.
    pub fn new(deployer_tfstate_key: impl Into<String>, library_tfstate_key: impl Into<String>) -> Self {
        Self {
            step: BootstrapStep::BootstrapDeployer,
            deployer_tfstate_key: deployer_tfstate_key.into(),
            library_tfstate_key: library_tfstate_key.into(),
            keyvault: None,
            remote_state_sa: None,
            state_subscription: None,
            client_id: None,
            tenant_id: None,
        }
    }
}

/// Environment-independent defaults, merged under records at init with
/// lower precedence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenericDefaults {
    #[serde(
        rename = "STATE_SUBSCRIPTION",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub state_subscription: Option<String>,
}

/// Typed store over the state directory.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    dir: PathBuf,
}

impl ConfigStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }

    pub fn record_path(&self, identity: &EnvironmentIdentity) -> PathBuf {
        self.dir.join(format!("{}.toml", identity.key()))
    }

    pub fn error_marker_path(&self, identity: &EnvironmentIdentity) -> PathBuf {
        self.dir.join(format!("{}.err", identity.key()))
    }

    fn defaults_path(&self) -> PathBuf {
        self.dir.join(DEFAULTS_FILE)
    }

    /// Load the generic defaults. A missing or unparseable defaults file is
    /// not an error; defaults simply stay empty.
    pub fn load_defaults(&self) -> GenericDefaults {
        let path = self.defaults_path();
        match std::fs::read_to_string(&path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(defaults) => defaults,
                Err(err) => {
                    tracing::warn!(
                        "[ConfigStore] ignoring unparseable {}: {}",
                        path.display(),
                        err
                    );
                    GenericDefaults::default()
                }
            },
            Err(_) => GenericDefaults::default(),
        }
    }

    /// Load the record for an identity. A missing record is `Ok(None)`.
    pub fn load(
        &self,
        identity: &EnvironmentIdentity,
    ) -> Result<Option<DeploymentRecord>, StoreError> {
        let path = self.record_path(identity);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Read { path, source }),
        };
        let record = toml::from_str(&content).map_err(|source| StoreError::Parse {
            path,
            source,
        })?;
        Ok(Some(record))
    }

    /// Persist the record, overwriting any prior contents. The write is
    /// synced so a completed step survives an immediate crash.
    pub fn save(
        &self,
        identity: &EnvironmentIdentity,
        record: &DeploymentRecord,
    ) -> Result<(), StoreError> {
        self.ensure_dir()?;
        let path = self.record_path(identity);
        let serialized = toml::to_string_pretty(record)
            .expect("deployment record serializes to TOML");
        let mut file = std::fs::File::create(&path).map_err(|source| StoreError::Write {
            path: path.clone(),
            source,
        })?;
        file.write_all(serialized.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|source| StoreError::Write { path, source })?;
        Ok(())
    }

    /// Remove the record and any error marker (the `--force` reset).
    pub fn delete(&self, identity: &EnvironmentIdentity) -> Result<(), StoreError> {
        for path in [self.record_path(identity), self.error_marker_path(identity)] {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => return Err(StoreError::Write { path, source }),
            }
        }
        Ok(())
    }

    /// Ensure the store exists and return the record for the identity,
    /// seeding a fresh one at step 0 when absent and merging generic
    /// defaults under unset fields. Idempotent on an existing record.
    pub fn init(
        &self,
        identity: &EnvironmentIdentity,
        deployer_tfstate_key: &str,
        library_tfstate_key: &str,
    ) -> Result<DeploymentRecord, StoreError> {
        self.ensure_dir()?;

        let existing = self.load(identity)?;
        let created = existing.is_none();
        let mut record = existing
            .unwrap_or_else(|| DeploymentRecord::new(deployer_tfstate_key, library_tfstate_key));

        let defaults = self.load_defaults();
        if record.state_subscription.is_none() {
            record.state_subscription = defaults.state_subscription;
        }

        if created {
            self.save(identity, &record)?;
            tracing::info!(
                "[ConfigStore] created record {} at step 0",
                self.record_path(identity).display()
            );
        }
        Ok(record)
    }

    /// Write the one-line failure marker next to the record.
    pub fn write_error_marker(
        &self,
        identity: &EnvironmentIdentity,
        stage: &str,
    ) -> Result<(), StoreError> {
        self.ensure_dir()?;
        let path = self.error_marker_path(identity);
        let line = format!(
            "{} failed for {} at {}\n",
            stage,
            identity.key(),
            chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
        );
        std::fs::write(&path, line).map_err(|source| StoreError::Write { path, source })
    }

    /// Remove a stale failure marker after a successful stage. Best effort.
    pub fn clear_error_marker(&self, identity: &EnvironmentIdentity) {
        let _ = std::fs::remove_file(self.error_marker_path(identity));
    }

    fn ensure_dir(&self) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| StoreError::CreateDir {
            path: self.dir.clone(),
            source,
        })
    }
}
