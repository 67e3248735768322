//! Argument binding: parameter file validation, record creation, force
//! resets and flag precedence.

use std::path::{Path, PathBuf};

use clap::Parser;
use tempfile::TempDir;

use region_bootstrap::cli::{bind, Args};
use region_bootstrap::error::BootstrapError;
use region_bootstrap::sequencer::BootstrapStep;
use region_bootstrap::store::ConfigStore;

fn write_parameter_files(dir: &Path) -> (PathBuf, PathBuf) {
    let deployer = dir.join("DEV-WEEU-SAP01-X00.json");
    let library = dir.join("DEV-WEEU-SAP01-LIB.json");
    std::fs::write(&deployer, "{}").unwrap();
    std::fs::write(&library, "{}").unwrap();
    (deployer, library)
}

fn args_for(deployer: &Path, library: &Path) -> Args {
    Args {
        deployer_parameter_file: deployer.to_path_buf(),
        library_parameter_file: library.to_path_buf(),
        subscription: None,
        spn_id: None,
        spn_secret: None,
        tenant_id: None,
        storageaccountname: None,
        vault: None,
        force: false,
        auto_approve: false,
        msi: false,
        recover: false,
        ado: false,
    }
}

#[test]
fn short_flags_parse() {
    let args = Args::try_parse_from([
        "region-bootstrap",
        "-d",
        "DEV-WEEU-SAP01-X00.json",
        "-l",
        "DEV-WEEU-SAP01-LIB.json",
        "-f",
        "-i",
        "-k",
        "DEVWEEU-vault",
    ])
    .unwrap();
    assert!(args.force);
    assert!(args.auto_approve);
    assert_eq!(args.vault.as_deref(), Some("DEVWEEU-vault"));
}

#[test]
fn missing_parameter_file_maps_to_exit_two() {
    let temp = TempDir::new().unwrap();
    let (deployer, _) = write_parameter_files(temp.path());
    let store = ConfigStore::new(temp.path().join("state"));

    let args = args_for(&deployer, &temp.path().join("PRD-NOEU-SAP02-LIB.json"));
    let err = bind(args, &store).unwrap_err();
    assert!(matches!(err, BootstrapError::ParameterFile(_)));
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn bind_creates_record_with_derived_keys() {
    let temp = TempDir::new().unwrap();
    let (deployer, library) = write_parameter_files(temp.path());
    let store = ConfigStore::new(temp.path().join("state"));

    let ctx = bind(args_for(&deployer, &library), &store).unwrap();
    assert_eq!(ctx.identity.key(), "DEV-WEEU");
    assert_eq!(ctx.record.step, BootstrapStep::BootstrapDeployer);
    assert_eq!(
        ctx.record.deployer_tfstate_key,
        "DEV-WEEU-SAP01-X00.terraform.tfstate"
    );
    assert_eq!(
        ctx.record.library_tfstate_key,
        "DEV-WEEU-SAP01-LIB.terraform.tfstate"
    );
    assert!(store.record_path(&ctx.identity).exists());
}

#[test]
fn force_resets_an_advanced_record() {
    let temp = TempDir::new().unwrap();
    let (deployer, library) = write_parameter_files(temp.path());
    let store = ConfigStore::new(temp.path().join("state"));

    let mut ctx = bind(args_for(&deployer, &library), &store).unwrap();
    ctx.record.step = BootstrapStep::MigrateLibraryState;
    ctx.record.keyvault = Some("DEVWEEU-vault".to_string());
    store.save(&ctx.identity, &ctx.record).unwrap();

    let mut args = args_for(&deployer, &library);
    args.force = true;
    let ctx = bind(args, &store).unwrap();
    assert_eq!(ctx.record.step, BootstrapStep::BootstrapDeployer);
    assert!(ctx.record.keyvault.is_none());
}

#[test]
fn mismatched_parameter_file_identities_are_rejected() {
    let temp = TempDir::new().unwrap();
    let (deployer, _) = write_parameter_files(temp.path());
    let other = temp.path().join("PRD-NOEU-SAP02-LIB.json");
    std::fs::write(&other, "{}").unwrap();
    let store = ConfigStore::new(temp.path().join("state"));

    let err = bind(args_for(&deployer, &other), &store).unwrap_err();
    assert!(matches!(err, BootstrapError::Args(_)));
    assert_eq!(err.exit_code(), 1);
}

#[test]
fn vault_flag_fills_unset_field_and_recover_overrides() {
    let temp = TempDir::new().unwrap();
    let (deployer, library) = write_parameter_files(temp.path());
    let store = ConfigStore::new(temp.path().join("state"));

    let mut args = args_for(&deployer, &library);
    args.vault = Some("first-vault".to_string());
    let ctx = bind(args, &store).unwrap();
    assert_eq!(ctx.record.keyvault.as_deref(), Some("first-vault"));

    // Without --recover an existing vault is kept.
    let mut args = args_for(&deployer, &library);
    args.vault = Some("second-vault".to_string());
    let ctx = bind(args, &store).unwrap();
    assert_eq!(ctx.record.keyvault.as_deref(), Some("first-vault"));

    // With --recover the supplied vault is re-adopted.
    let mut args = args_for(&deployer, &library);
    args.vault = Some("second-vault".to_string());
    args.recover = true;
    let ctx = bind(args, &store).unwrap();
    assert_eq!(ctx.record.keyvault.as_deref(), Some("second-vault"));
}

#[test]
fn existing_storage_account_triggers_remote_state_reset() {
    let temp = TempDir::new().unwrap();
    let (deployer, library) = write_parameter_files(temp.path());
    let store = ConfigStore::new(temp.path().join("state"));

    let mut args = args_for(&deployer, &library);
    args.storageaccountname = Some("devweeutfstate01".to_string());
    let ctx = bind(args, &store).unwrap();
    assert!(ctx.options.remote_state_reset);
    assert_eq!(
        ctx.record.remote_state_sa.as_deref(),
        Some("devweeutfstate01")
    );
}

#[test]
fn partial_service_principal_is_rejected() {
    let temp = TempDir::new().unwrap();
    let (deployer, library) = write_parameter_files(temp.path());
    let store = ConfigStore::new(temp.path().join("state"));

    let mut args = args_for(&deployer, &library);
    args.spn_id = Some("client".to_string());
    let err = bind(args, &store).unwrap_err();
    assert!(matches!(err, BootstrapError::Args(_)));

    let mut args = args_for(&deployer, &library);
    args.msi = true;
    args.spn_id = Some("client".to_string());
    args.spn_secret = Some("secret".to_string());
    args.tenant_id = Some("tenant".to_string());
    let err = bind(args, &store).unwrap_err();
    assert!(matches!(err, BootstrapError::Args(_)));
}
