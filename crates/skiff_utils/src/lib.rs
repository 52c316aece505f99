mod bundle;
mod device;
mod package;
mod pipeline;
mod signer;

pub use bundle::{inspect_app, Bundle, BundleInfo, BundleType}; // Bundle helpers
pub use device::{list_connected_devices, ConnectedDevice, Installer, UsbInstaller};
pub use package::Package; // Archive staging
pub use pipeline::{PipelineError, ProvisioningPipeline, Stage};
pub use signer::{SignOutcome, Signer}; // AppBundleSigner

use std::path::PathBuf;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("Info.plist not found in bundle")]
    BundleInfoPlistMissing,
    #[error("Info.plist not found in package")]
    PackageInfoPlistMissing,
    #[error("No provisioning profile matches bundle identifier {0}")]
    MissingProvisioningProfile(String),
    // Signing succeeded but the original archive could not be swapped for
    // the re-signed one; the signed payload is still intact on disk.
    #[error(
        "Signed payload at {signed_payload} could not replace archive {archive}: {source}"
    )]
    RepackageFailed {
        archive: PathBuf,
        signed_payload: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Plist error: {0}")]
    Plist(#[from] plist::Error),
    #[error("Core error: {0}")]
    Core(#[from] skiff_core::Error),
    #[error("Idevice error: {0}")]
    Idevice(#[from] idevice::IdeviceError),
    #[error("Other error: {0}")]
    Other(String),
}

pub trait PlistInfoTrait {
    fn get_name(&self) -> Option<String>;
    fn get_executable(&self) -> Option<String>;
    fn get_bundle_identifier(&self) -> Option<String>;
    fn get_bundle_name(&self) -> Option<String>;
    fn get_version(&self) -> Option<String>;
    fn get_build_version(&self) -> Option<String>;
}
