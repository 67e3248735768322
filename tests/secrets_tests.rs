//! Secret reconciliation: create/update/no-op, recovery of soft-deleted
//! secrets, and the bounded recovery wait.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use region_bootstrap::secrets::{reconcile_secret, SecretChange, SecretVault, VaultError};

#[derive(Default)]
struct RecordingVault {
    secrets: Mutex<HashMap<String, String>>,
    deleted: Mutex<HashMap<String, String>>,
    sets: Mutex<Vec<(String, String, DateTime<Utc>)>>,
    recovers: Mutex<Vec<String>>,
    /// Number of reads after recovery that still see nothing, simulating the
    /// store's eventual consistency.
    stale_reads_after_recover: AtomicUsize,
}

#[async_trait]
impl SecretVault for RecordingVault {
    async fn get_secret(&self, _vault: &str, name: &str) -> Result<Option<String>, VaultError> {
        if self.stale_reads_after_recover.load(Ordering::SeqCst) > 0 {
            self.stale_reads_after_recover.fetch_sub(1, Ordering::SeqCst);
            return Ok(None);
        }
        Ok(self.secrets.lock().unwrap().get(name).cloned())
    }

    async fn set_secret(
        &self,
        _vault: &str,
        name: &str,
        value: &str,
        expires: DateTime<Utc>,
    ) -> Result<(), VaultError> {
        self.secrets
            .lock()
            .unwrap()
            .insert(name.to_string(), value.to_string());
        self.sets
            .lock()
            .unwrap()
            .push((name.to_string(), value.to_string(), expires));
        Ok(())
    }

    async fn is_deleted(&self, _vault: &str, name: &str) -> Result<bool, VaultError> {
        Ok(self.deleted.lock().unwrap().contains_key(name))
    }

    async fn recover_secret(&self, _vault: &str, name: &str) -> Result<(), VaultError> {
        self.recovers.lock().unwrap().push(name.to_string());
        if let Some(value) = self.deleted.lock().unwrap().remove(name) {
            self.secrets.lock().unwrap().insert(name.to_string(), value);
        }
        Ok(())
    }

    async fn verify_access(&self, _vault: &str) -> Result<(), VaultError> {
        Ok(())
    }
}

#[tokio::test]
async fn creates_missing_secret_with_one_year_expiry() {
    let vault = RecordingVault::default();
    let before = Utc::now();

    let change = reconcile_secret(&vault, "v", "tfstate-sa-connection-string", "conn")
        .await
        .unwrap();

    assert_eq!(change, SecretChange::Created);
    let sets = vault.sets.lock().unwrap();
    assert_eq!(sets.len(), 1);
    let (_, value, expires) = &sets[0];
    assert_eq!(value, "conn");
    assert!(*expires >= before + Duration::days(364));
    assert!(*expires <= Utc::now() + Duration::days(366));
}

#[tokio::test]
async fn updates_differing_secret() {
    let vault = RecordingVault::default();
    vault
        .secrets
        .lock()
        .unwrap()
        .insert("token".to_string(), "old".to_string());

    let change = reconcile_secret(&vault, "v", "token", "new").await.unwrap();

    assert_eq!(change, SecretChange::Updated);
    assert_eq!(
        vault.secrets.lock().unwrap().get("token").map(String::as_str),
        Some("new")
    );
}

#[tokio::test]
async fn leaves_matching_secret_untouched() {
    let vault = RecordingVault::default();
    vault
        .secrets
        .lock()
        .unwrap()
        .insert("token".to_string(), "same".to_string());

    let change = reconcile_secret(&vault, "v", "token", "same").await.unwrap();

    assert_eq!(change, SecretChange::Unchanged);
    assert!(vault.sets.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn recovers_deleted_secret_before_comparing() {
    let vault = RecordingVault::default();
    vault
        .deleted
        .lock()
        .unwrap()
        .insert("token".to_string(), "same".to_string());
    // The recovered secret takes a few reads to become visible.
    vault.stale_reads_after_recover.store(2, Ordering::SeqCst);

    let change = reconcile_secret(&vault, "v", "token", "same").await.unwrap();

    assert_eq!(vault.recovers.lock().unwrap().as_slice(), ["token"]);
    assert_eq!(change, SecretChange::Unchanged);
    assert!(vault.sets.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn recovery_that_never_settles_times_out() {
    let vault = RecordingVault::default();
    vault
        .deleted
        .lock()
        .unwrap()
        .insert("token".to_string(), "value".to_string());
    // Reads never see the recovered secret.
    vault
        .stale_reads_after_recover
        .store(usize::MAX, Ordering::SeqCst);

    let err = reconcile_secret(&vault, "v", "token", "value")
        .await
        .unwrap_err();

    assert!(matches!(err, VaultError::RecoveryTimeout { .. }));
}
