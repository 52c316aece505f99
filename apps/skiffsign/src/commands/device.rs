use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use dialoguer::Select;

use skiff_core::Device;
use skiff_utils::{list_connected_devices, Installer, UsbInstaller};

#[derive(Debug, Args)]
pub struct DeviceArgs {
    /// Device UDID to target (optional, will prompt if not provided)
    #[arg(short = 'u', long = "udid", value_name = "UDID")]
    pub udid: Option<String>,
    /// Install the app at this path to the device (.ipa or .app)
    #[arg(short = 'i', long = "install", value_name = "PATH")]
    pub install: Option<PathBuf>,
}

pub async fn execute(args: DeviceArgs) -> Result<()> {
    if let Some(app_path) = args.install {
        let device = select_device(args.udid).await?;
        log::info!("installing {} to {}", app_path.display(), device);
        UsbInstaller.install(&app_path, &device).await?;
        log::info!("installation complete");
        return Ok(());
    }

    let devices = list_connected_devices().await?;
    if devices.is_empty() {
        log::warn!("no connected devices");
        return Ok(());
    }

    for device in devices {
        println!("{device} ({})", device.udid);
    }

    Ok(())
}

/// Resolves a device by UDID, or prompts when none was given.
pub async fn select_device(udid: Option<String>) -> Result<Device> {
    let devices = list_connected_devices().await?;

    if let Some(udid) = udid {
        return devices
            .iter()
            .find(|d| d.udid == udid)
            .map(Device::from)
            .ok_or_else(|| anyhow::anyhow!("device {udid} is not connected"));
    }

    if devices.is_empty() {
        return Err(anyhow::anyhow!("no connected devices"));
    }
    if devices.len() == 1 {
        return Ok(Device::from(&devices[0]));
    }

    let names: Vec<String> = devices.iter().map(|d| d.to_string()).collect();
    let selection = Select::new()
        .items(&names)
        .default(0)
        .with_prompt("Select a connected device")
        .interact()?;

    Ok(Device::from(&devices[selection]))
}
