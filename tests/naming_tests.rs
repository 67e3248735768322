//! Identity and tfstate key derivation from parameter file names.

use std::path::Path;

use region_bootstrap::context::{tfstate_key, EnvironmentIdentity};
use region_bootstrap::error::BootstrapError;

#[test]
fn tfstate_keys_derive_from_parameter_file_basenames() {
    assert_eq!(
        tfstate_key(Path::new("/some/where/DEV-WEEU-SAP01-X00.json")),
        "DEV-WEEU-SAP01-X00.terraform.tfstate"
    );
    assert_eq!(
        tfstate_key(Path::new("DEV-WEEU-SAP01-LIB.json")),
        "DEV-WEEU-SAP01-LIB.terraform.tfstate"
    );
}

#[test]
fn identity_uses_first_two_tokens() {
    let identity =
        EnvironmentIdentity::from_parameter_file(Path::new("/cfg/DEV-WEEU-SAP01-X00.json"))
            .unwrap();
    assert_eq!(identity.environment, "DEV");
    assert_eq!(identity.region_code, "WEEU");
    assert_eq!(identity.key(), "DEV-WEEU");
}

#[test]
fn identity_requires_environment_and_region() {
    let err = EnvironmentIdentity::from_parameter_file(Path::new("DEV.json")).unwrap_err();
    assert!(matches!(err, BootstrapError::Args(_)));

    let err = EnvironmentIdentity::from_parameter_file(Path::new("-WEEU.json")).unwrap_err();
    assert!(matches!(err, BootstrapError::Args(_)));
}
