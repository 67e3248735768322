//! Config store behavior: seeding, idempotent init, defaults merging and
//! the failure marker lifecycle.

use tempfile::TempDir;

use region_bootstrap::context::EnvironmentIdentity;
use region_bootstrap::sequencer::BootstrapStep;
use region_bootstrap::store::ConfigStore;

fn identity() -> EnvironmentIdentity {
    EnvironmentIdentity {
        environment: "DEV".to_string(),
        region_code: "WEEU".to_string(),
    }
}

const DEPLOYER_KEY: &str = "DEV-WEEU-SAP01-X00.terraform.tfstate";
const LIBRARY_KEY: &str = "DEV-WEEU-SAP01-LIB.terraform.tfstate";

#[test]
fn init_seeds_record_at_step_zero() {
    let temp = TempDir::new().unwrap();
    let store = ConfigStore::new(temp.path().join("state"));

    let record = store.init(&identity(), DEPLOYER_KEY, LIBRARY_KEY).unwrap();
    assert_eq!(record.step, BootstrapStep::BootstrapDeployer);
    assert_eq!(record.deployer_tfstate_key, DEPLOYER_KEY);
    assert_eq!(record.library_tfstate_key, LIBRARY_KEY);
    assert!(record.keyvault.is_none());
    assert!(store.record_path(&identity()).exists());
}

#[test]
fn init_is_idempotent_on_existing_record() {
    let temp = TempDir::new().unwrap();
    let store = ConfigStore::new(temp.path().join("state"));
    let id = identity();

    let mut record = store.init(&id, DEPLOYER_KEY, LIBRARY_KEY).unwrap();
    record.step = BootstrapStep::MigrateDeployerState;
    record.keyvault = Some("DEVWEEU-vault".to_string());
    store.save(&id, &record).unwrap();

    let reloaded = store.init(&id, DEPLOYER_KEY, LIBRARY_KEY).unwrap();
    assert_eq!(reloaded.step, BootstrapStep::MigrateDeployerState);
    assert_eq!(reloaded.keyvault.as_deref(), Some("DEVWEEU-vault"));
}

#[test]
fn load_missing_record_is_none() {
    let temp = TempDir::new().unwrap();
    let store = ConfigStore::new(temp.path().join("state"));
    assert!(store.load(&identity()).unwrap().is_none());
}

#[test]
fn save_overwrites_previous_contents() {
    let temp = TempDir::new().unwrap();
    let store = ConfigStore::new(temp.path().join("state"));
    let id = identity();

    let mut record = store.init(&id, DEPLOYER_KEY, LIBRARY_KEY).unwrap();
    record.remote_state_sa = Some("devweeutfstate01".to_string());
    store.save(&id, &record).unwrap();

    record.remote_state_sa = Some("devweeutfstate02".to_string());
    store.save(&id, &record).unwrap();

    let reloaded = store.load(&id).unwrap().unwrap();
    assert_eq!(reloaded.remote_state_sa.as_deref(), Some("devweeutfstate02"));
}

#[test]
fn defaults_merge_under_unset_fields_only() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("state");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("defaults.toml"),
        "STATE_SUBSCRIPTION = \"shared-subscription\"\n",
    )
    .unwrap();
    let store = ConfigStore::new(&dir);
    let id = identity();

    let record = store.init(&id, DEPLOYER_KEY, LIBRARY_KEY).unwrap();
    assert_eq!(
        record.state_subscription.as_deref(),
        Some("shared-subscription")
    );

    // A value already in the record wins over the defaults file.
    let mut record = record;
    record.state_subscription = Some("explicit-subscription".to_string());
    store.save(&id, &record).unwrap();
    let reloaded = store.init(&id, DEPLOYER_KEY, LIBRARY_KEY).unwrap();
    assert_eq!(
        reloaded.state_subscription.as_deref(),
        Some("explicit-subscription")
    );
}

#[test]
fn record_file_is_flat_diffable_toml() {
    let temp = TempDir::new().unwrap();
    let store = ConfigStore::new(temp.path().join("state"));
    let id = identity();

    store.init(&id, DEPLOYER_KEY, LIBRARY_KEY).unwrap();
    let content = std::fs::read_to_string(store.record_path(&id)).unwrap();
    assert!(content.contains("step = 0"));
    assert!(content.contains("deployer_tfstate_key = \"DEV-WEEU-SAP01-X00.terraform.tfstate\""));
}

#[test]
fn error_marker_is_written_and_cleared() {
    let temp = TempDir::new().unwrap();
    let store = ConfigStore::new(temp.path().join("state"));
    let id = identity();

    store.write_error_marker(&id, "bootstrap-library").unwrap();
    let marker = store.error_marker_path(&id);
    let content = std::fs::read_to_string(&marker).unwrap();
    assert!(content.contains("bootstrap-library"));
    assert!(content.contains("DEV-WEEU"));
    assert_eq!(content.lines().count(), 1);

    store.clear_error_marker(&id);
    assert!(!marker.exists());
}

#[test]
fn delete_removes_record_and_marker() {
    let temp = TempDir::new().unwrap();
    let store = ConfigStore::new(temp.path().join("state"));
    let id = identity();

    store.init(&id, DEPLOYER_KEY, LIBRARY_KEY).unwrap();
    store.write_error_marker(&id, "bootstrap-deployer").unwrap();
    store.delete(&id).unwrap();

    assert!(!store.record_path(&id).exists());
    assert!(!store.error_marker_path(&id).exists());
    // Deleting an already-absent record is fine.
    store.delete(&id).unwrap();
}
