//! region-bootstrap binary: bootstrap deployer and library control-plane
//! infrastructure and migrate their Terraform state to remote storage.

use std::sync::Arc;

use clap::error::ErrorKind;
use clap::Parser;

use region_bootstrap::banner::{banner, Level};
use region_bootstrap::cli::{self, Args};
use region_bootstrap::error::{BootstrapError, EXIT_BAD_ARGUMENTS};
use region_bootstrap::secrets::{AzCliVault, SecretVault};
use region_bootstrap::sequencer::Sequencer;
use region_bootstrap::store::ConfigStore;
use region_bootstrap::tools::{self, ProcessToolRunner, ToolRunner};

fn main() {
    // Default to info level if RUST_LOG not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let is_help = matches!(
                err.kind(),
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion
            );
            let _ = err.print();
            std::process::exit(if is_help { 0 } else { EXIT_BAD_ARGUMENTS });
        }
    };

    let rt = tokio::runtime::Runtime::new().expect("tokio runtime");
    match rt.block_on(run(args)) {
        Ok(()) => banner(Level::Ok, "control plane bootstrap complete"),
        Err(err) => {
            banner(Level::Error, &err.to_string());
            std::process::exit(err.exit_code());
        }
    }
}

async fn run(args: Args) -> Result<(), BootstrapError> {
    let runner: Arc<dyn ToolRunner> = Arc::new(ProcessToolRunner::new());
    tools::validate_dependencies(runner.as_ref()).await?;

    let store = ConfigStore::new(cli::default_store_dir());
    let mut ctx = cli::bind(args, &store)?;

    banner(
        Level::Info,
        &format!(
            "bootstrapping {} from step {}",
            ctx.identity.key(),
            ctx.record.step
        ),
    );
    eprintln!("  Deployer parameters: {}", ctx.deployer_parameter_file.display());
    eprintln!("  Library parameters:  {}", ctx.library_parameter_file.display());
    eprintln!("  State directory:     {}", store.directory().display());

    let vault: Arc<dyn SecretVault> = Arc::new(AzCliVault::new(runner.clone()));
    let sequencer = Sequencer::new(store, runner, vault);
    sequencer.run(&mut ctx).await
}
