use clap::{Parser, Subcommand};

pub mod device;
pub mod inspect;
pub mod sign;

#[derive(Debug, Parser)]
#[command(
    name = "skiffsign",
    author,
    version,
    about = "iOS app re-signing and device install tool",
    disable_help_subcommand = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Re-sign an app bundle or .ipa with a certificate and provisioning profiles
    Sign(sign::SignArgs),
    /// List the entitlement-bearing bundles inside an app or .ipa
    Inspect(inspect::InspectArgs),
    /// Device listing and install commands
    Device(device::DeviceArgs),
}
