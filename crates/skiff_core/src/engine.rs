use std::collections::BTreeMap;
use std::path::Path;

use apple_codesign::cryptography::{parse_pfx_data, PrivateKey};
use apple_codesign::{SettingsScope, SigningSettings, UnifiedSigner};

use crate::{Error, SigningIdentity};

/// Entitlements keyed by bundle-relative path; the empty string is the
/// root bundle. Built once per signing call and only read afterwards.
#[derive(Clone, Debug, Default)]
pub struct EntitlementsMap {
    entries: BTreeMap<String, String>,
}

impl EntitlementsMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, bundle_relative_path: impl Into<String>, xml: impl Into<String>) {
        self.entries.insert(bundle_relative_path.into(), xml.into());
    }

    /// Pure lookup. A miss is the engine's concern, not re-validated here.
    pub fn resolve(&self, bundle_relative_path: &str) -> Option<&str> {
        self.entries.get(bundle_relative_path).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The binary-level signing primitive. Invoked exactly once per signing
/// call, across the whole bundle tree.
pub trait SigningEngine: Send + Sync {
    fn sign_bundle(
        &self,
        bundle_dir: &Path,
        identity: &SigningIdentity,
        entitlements: &EntitlementsMap,
    ) -> Result<(), Error>;
}

impl<T: SigningEngine + ?Sized> SigningEngine for &T {
    fn sign_bundle(
        &self,
        bundle_dir: &Path,
        identity: &SigningIdentity,
        entitlements: &EntitlementsMap,
    ) -> Result<(), Error> {
        (**self).sign_bundle(bundle_dir, identity, entitlements)
    }
}

/// Default engine backed by apple-codesign's `UnifiedSigner`.
#[derive(Clone, Copy, Debug, Default)]
pub struct CodesignEngine;

impl SigningEngine for CodesignEngine {
    fn sign_bundle(
        &self,
        bundle_dir: &Path,
        identity: &SigningIdentity,
        entitlements: &EntitlementsMap,
    ) -> Result<(), Error> {
        let (cert, key) = parse_pfx_data(identity.as_der(), "")?;

        let mut settings = SigningSettings::default();
        settings.set_signing_key(key.as_key_info_signer(), cert);
        settings.chain_apple_certificates();
        settings.set_for_notarization(false);

        for (rel_path, xml) in entitlements.iter() {
            let scope = if rel_path.is_empty() {
                SettingsScope::Main
            } else {
                SettingsScope::Path(rel_path.to_string())
            };
            settings.set_entitlements_xml(scope, xml)?;
        }

        log::info!("signing bundle tree at {}", bundle_dir.display());
        UnifiedSigner::new(settings).sign_path_in_place(bundle_dir)?;

        Ok(())
    }
}
