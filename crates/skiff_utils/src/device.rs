use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use idevice::lockdown::LockdownClient;
use idevice::usbmuxd::{Connection, UsbmuxdAddr, UsbmuxdConnection, UsbmuxdDevice};
use idevice::utils::installation;
use idevice::IdeviceService;

use skiff_core::Device;

use crate::Error;

pub const CONNECTION_LABEL: &str = "skiff_info";
pub const INSTALLATION_LABEL: &str = "skiff_install";

macro_rules! get_dict_string {
    ($dict:expr, $key:expr) => {
        $dict
            .as_dictionary()
            .and_then(|dict| dict.get($key))
            .and_then(|v| v.as_string())
            .map(|s| s.to_string())
            .unwrap_or_else(|| "".to_string())
    };
}

/// A device reachable over usbmuxd.
#[derive(Debug, Clone)]
pub struct ConnectedDevice {
    pub name: String,
    pub udid: String,
    pub class: String,
    usbmuxd_device: UsbmuxdDevice,
}

impl ConnectedDevice {
    pub async fn new(usbmuxd_device: UsbmuxdDevice) -> Self {
        let (name, class) = Self::read_lockdown_info(&usbmuxd_device)
            .await
            .unwrap_or_default();

        ConnectedDevice {
            name,
            class,
            udid: usbmuxd_device.udid.clone(),
            usbmuxd_device,
        }
    }

    async fn read_lockdown_info(device: &UsbmuxdDevice) -> Result<(String, String), Error> {
        let mut lockdown =
            LockdownClient::connect(&device.to_provider(UsbmuxdAddr::default(), CONNECTION_LABEL))
                .await?;
        let values = lockdown.get_value(None, None).await?;

        Ok((
            get_dict_string!(values, "DeviceName"),
            get_dict_string!(values, "DeviceClass"),
        ))
    }

    pub async fn install_app(&self, app_path: &Path) -> Result<(), Error> {
        let provider = self.usbmuxd_device.to_provider(
            UsbmuxdAddr::from_env_var().unwrap_or_default(),
            INSTALLATION_LABEL,
        );

        let callback = |(progress, _): (u64, ())| async move {
            log::info!("installation progress: {progress}%");
        };

        installation::install_package_with_callback(&provider, app_path, None, callback, ())
            .await?;

        Ok(())
    }
}

impl fmt::Display for ConnectedDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}",
            match &self.usbmuxd_device.connection_type {
                Connection::Usb => "USB",
                Connection::Network(_) => "WiFi",
                Connection::Unknown(_) => "Unknown",
            },
            self.name
        )
    }
}

impl From<&ConnectedDevice> for Device {
    fn from(device: &ConnectedDevice) -> Self {
        Device {
            name: device.name.clone(),
            udid: device.udid.clone(),
            class: device.class.clone(),
        }
    }
}

pub async fn list_connected_devices() -> Result<Vec<ConnectedDevice>, Error> {
    let mut usbmuxd = UsbmuxdConnection::default().await?;

    let pending: Vec<_> = usbmuxd
        .get_devices()
        .await?
        .into_iter()
        .map(ConnectedDevice::new)
        .collect();

    Ok(futures::future::join_all(pending).await)
}

/// Hands a signed artifact to a device. The pipeline makes at most one
/// install attempt per run through this trait.
#[async_trait]
pub trait Installer: Send + Sync {
    async fn install(&self, app_path: &Path, device: &Device) -> Result<(), Error>;
}

/// Installer backed by usbmuxd + installation proxy.
#[derive(Clone, Copy, Debug, Default)]
pub struct UsbInstaller;

#[async_trait]
impl Installer for UsbInstaller {
    async fn install(&self, app_path: &Path, device: &Device) -> Result<(), Error> {
        let connected = list_connected_devices()
            .await?
            .into_iter()
            .find(|d| d.udid == device.udid)
            .ok_or_else(|| Error::Other(format!("device {} is not connected", device.udid)))?;

        log::info!("installing {} to {}", app_path.display(), connected);
        connected.install_app(app_path).await
    }
}
