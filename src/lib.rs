//! Resumable, step-sequenced bootstrap of control-plane infrastructure.
//!
//! A persisted step counter, keyed by environment+region, drives five
//! stages: bootstrap the deployer, validate key vault access, bootstrap the
//! library, then migrate deployer and library Terraform state into remote
//! storage. A failed or interrupted run is re-invoked and resumes exactly
//! where it left off; completed stages are never repeated.
//!
//! External tooling (the installers, Terraform, the cloud CLI) sits behind
//! the [`tools::ToolRunner`] and [`secrets::SecretVault`] traits.

pub mod banner;
pub mod cli;
pub mod context;
pub mod error;
pub mod secrets;
pub mod sequencer;
pub mod stages;
pub mod store;
pub mod tools;

pub use context::{
    tfstate_key, BootstrapContext, BootstrapOptions, EnvironmentIdentity, ServicePrincipal,
};
pub use error::BootstrapError;
pub use secrets::{reconcile_secret, AzCliVault, SecretChange, SecretVault};
pub use sequencer::{BootstrapStep, Sequencer, Stage, StageOutcome};
pub use store::{ConfigStore, DeploymentRecord, GenericDefaults};
pub use tools::{ProcessToolRunner, ToolInvocation, ToolResult, ToolRunner};
