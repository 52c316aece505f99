use std::fs;
use std::path::Path;

use plist::{Dictionary, Value};

use crate::Error;

// application-identifier values are prefixed with the ten character team id
const TEAM_ID_REGEX: &str = r"^[A-Z0-9]{10}\.";

/// A fetched provisioning profile: the raw signed bytes (embedded verbatim
/// into bundles) plus the payload fields the signer needs. Immutable once
/// loaded; a fresh one is fetched per run.
#[derive(Clone)]
pub struct MobileProvision {
    pub data: Vec<u8>,
    entitlements: Dictionary,
    provisioned_devices: Vec<String>,
}

impl std::fmt::Debug for MobileProvision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // the raw CMS blob is noise; show what the signer actually reads
        f.debug_struct("MobileProvision")
            .field("data", &format_args!("{} bytes", self.data.len()))
            .field("entitlements", &self.entitlements)
            .field("provisioned_devices", &self.provisioned_devices)
            .finish()
    }
}

impl MobileProvision {
    pub fn load_with_path<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let data = fs::read(path.as_ref())?;
        Self::load_with_bytes(data)
    }

    pub fn load_with_bytes(data: Vec<u8>) -> Result<Self, Error> {
        let payload = Self::extract_payload(&data)?;

        let entitlements = payload
            .get("Entitlements")
            .and_then(|v| v.as_dictionary())
            .cloned()
            .ok_or(Error::ProvisioningEntitlementsUnknown)?;

        let provisioned_devices = payload
            .get("ProvisionedDevices")
            .and_then(|v| v.as_array())
            .map(|udids| {
                udids
                    .iter()
                    .filter_map(|v| v.as_string())
                    .map(|s| s.to_string())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            data,
            entitlements,
            provisioned_devices,
        })
    }

    pub fn entitlements(&self) -> &Dictionary {
        &self.entitlements
    }

    pub fn entitlements_as_xml(&self) -> Result<String, Error> {
        let mut buf = Vec::new();
        Value::Dictionary(self.entitlements.clone()).to_writer_xml(&mut buf)?;
        String::from_utf8(buf).map_err(|e| Error::Other(e.to_string()))
    }

    pub fn provisioned_devices(&self) -> &[String] {
        &self.provisioned_devices
    }

    pub fn provisions_device(&self, udid: &str) -> bool {
        self.provisioned_devices.iter().any(|d| d == udid)
    }

    /// Bundle identifier this profile authorizes, with the team prefix
    /// stripped from the application-identifier entitlement.
    pub fn bundle_id(&self) -> Option<String> {
        let app_id = self
            .entitlements
            .get("application-identifier")?
            .as_string()?;

        let re = regex::Regex::new(TEAM_ID_REGEX).ok()?;
        Some(re.replace(app_id, "").to_string())
    }

    // The profile is a CMS blob with an XML plist payload in the middle;
    // slice out the outermost <plist>..</plist> span instead of parsing
    // the signature wrapper.
    fn extract_payload(data: &[u8]) -> Result<Dictionary, Error> {
        let start = data
            .windows(6)
            .position(|w| w == b"<plist")
            .ok_or(Error::ProvisioningEntitlementsUnknown)?;
        let end = data
            .windows(8)
            .rposition(|w| w == b"</plist>")
            .ok_or(Error::ProvisioningEntitlementsUnknown)?
            + 8;

        let plist = Value::from_reader_xml(&data[start..end])?;
        plist
            .as_dictionary()
            .cloned()
            .ok_or(Error::ProvisioningEntitlementsUnknown)
    }
}
