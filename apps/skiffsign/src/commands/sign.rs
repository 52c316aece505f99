use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use skiff_core::{build_signing_identity, Certificate, CodesignEngine, MobileProvision, TrustStore};
use skiff_utils::{Installer, Signer, UsbInstaller};

use crate::commands::device::select_device;

#[derive(Debug, Args)]
#[command(arg_required_else_help = true)]
pub struct SignArgs {
    /// Path to the app bundle or package to sign (.app or .ipa)
    #[arg(long, short, value_name = "PACKAGE")]
    pub package: PathBuf,
    /// PKCS#12 container holding the certificate and private key
    #[arg(long, value_name = "P12")]
    pub p12: PathBuf,
    /// PEM file with the trusted root certificate chain
    #[arg(long, value_name = "ANCHOR")]
    pub anchor: PathBuf,
    /// Provisioning profile files to embed, one per bundle identifier
    #[arg(long = "provision", value_name = "PROVISION", num_args = 1..)]
    pub provisioning_files: Vec<PathBuf>,
    /// Install to this device after signing (will prompt if the flag is
    /// given without a value)
    #[arg(long, value_name = "UDID", num_args = 0..=1, default_missing_value = "")]
    pub udid: Option<String>,
}

pub async fn execute(args: SignArgs) -> Result<()> {
    let trust = TrustStore::load(&args.anchor)?;
    let p12_data = fs::read(&args.p12)
        .with_context(|| format!("reading {}", args.p12.display()))?;
    let identity = build_signing_identity(&Certificate::with_p12(p12_data), &trust)?;

    let mut profiles = Vec::with_capacity(args.provisioning_files.len());
    for path in &args.provisioning_files {
        let profile = MobileProvision::load_with_path(path)
            .with_context(|| format!("loading {}", path.display()))?;
        profiles.push(profile);
    }

    if args.package.is_dir() {
        log::warn!("signing bundle in place: {}", args.package.display());
    }

    let signer = Signer::new(CodesignEngine::default(), identity);
    let outcome = signer.sign(&args.package, &profiles).await?;
    log::info!("signed {}", outcome.artifact.display());

    if let Some(udid) = args.udid {
        let device = select_device(if udid.is_empty() { None } else { Some(udid) }).await?;
        UsbInstaller.install(&outcome.artifact, &device).await?;
        log::info!("installation complete");
    }

    Ok(())
}
