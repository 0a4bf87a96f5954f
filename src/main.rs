use anyhow::Result;
use clap::Parser;
use iwe_provision::cli::{Cli, Commands};
use iwe_provision::provision::Provisioner;
use iwe_provision::state::StateStore;
use iwe_provision::types::ProvisioningConfig;
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli)?;

    let storage_root = match &cli.storage_root {
        Some(root) => root.clone(),
        None => default_storage_root()?,
    };

    match cli.command {
        Commands::Provision {
            no_auto_update,
            check_interval_hours,
        } => {
            let config = ProvisioningConfig {
                auto_update: !no_auto_update,
                update_check_interval_hours: check_interval_hours,
            };
            let provisioner = Provisioner::new(&storage_root, config);
            provisioner.note_host_version(env!("CARGO_PKG_VERSION"))?;
            let path = provisioner.provision().await?;
            println!("{}", path.display());
        }

        Commands::Update => {
            let provisioner = Provisioner::new(&storage_root, ProvisioningConfig::default());
            let path = provisioner.force_update().await?;
            println!("{}", path.display());
        }

        Commands::Status => {
            let state = StateStore::new(&storage_root).load()?;
            println!("--- IWE Provisioning State ---");
            match state.installed_binary() {
                Some(binary) => {
                    let present = if binary.path.is_file() { "" } else { " (missing on disk)" };
                    println!("  Binary:  {}{}", binary.path.display(), present);
                    println!(
                        "  Version: {}",
                        binary.version.as_deref().unwrap_or("unknown (from PATH)")
                    );
                    if !binary.installed_at.is_empty() {
                        println!("  Installed at: {}", binary.installed_at);
                    }
                }
                None => println!("  No binary provisioned yet."),
            }
            if state.last_update_check > 0 {
                println!("  Last update check: {} (epoch ms)", state.last_update_check);
            } else {
                println!("  Last update check: never");
            }
            println!("------------------------------");
        }

        Commands::Version => {
            println!("iwe-provision v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

fn setup_logging(cli: &Cli) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if cli.quiet {
        "error"
    } else if cli.verbose == 0 {
        "warn"
    } else if cli.verbose == 1 {
        "info"
    } else {
        "debug"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .init();

    Ok(())
}

fn default_storage_root() -> Result<PathBuf> {
    Ok(dirs::data_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?
        .join("iwe-provision"))
}
