use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "iwe-provision")]
#[command(about = "Provisions and keeps current the IWE language server binary")]
#[command(version, propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (use multiple times for more detail)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Reduce output to errors only
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Directory holding managed installs and provisioning state
    #[arg(long, global = true)]
    pub storage_root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ensure a usable server binary and print its path
    Provision {
        /// Skip the upstream update check even when one is due
        #[arg(long)]
        no_auto_update: bool,

        /// Hours between upstream update checks
        #[arg(long, default_value_t = 24)]
        check_interval_hours: u64,
    },

    /// Force a fresh update check and reinstall, ignoring the check interval
    Update,

    /// Show the persisted provisioning state
    Status,

    /// Show the current version
    Version,
}
