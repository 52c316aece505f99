use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use skiff_core::{EntitlementsMap, MobileProvision, SigningEngine, SigningIdentity};

use crate::{Bundle, Error, Package, PlistInfoTrait};

// The engine gives no completion signal beyond returning; give it time
// to finish flushing signature data before the tree is repackaged.
const DEFAULT_SETTLE: Duration = Duration::from_millis(500);

/// Where the signed app ended up: the original archive path for `.ipa`
/// inputs, the bundle directory itself for in-place signing.
#[derive(Debug, Clone)]
pub struct SignOutcome {
    pub artifact: PathBuf,
    pub was_archive: bool,
}

/// Signs an app bundle tree with one identity and a set of provisioning
/// profiles. Scratch state is exclusively owned by one `sign` call.
pub struct Signer<E: SigningEngine> {
    engine: E,
    identity: SigningIdentity,
    settle: Duration,
}

impl<E: SigningEngine> Signer<E> {
    pub fn new(engine: E, identity: SigningIdentity) -> Self {
        Self {
            engine,
            identity,
            settle: DEFAULT_SETTLE,
        }
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Signs `app_path`, an unpacked `.app` directory or an `.ipa`.
    ///
    /// Archive inputs are staged, signed, re-archived and atomically
    /// swapped back; any failure after staging removes the scratch tree
    /// and leaves the original archive byte-identical. Directory inputs
    /// are signed in place and owned by the caller.
    pub async fn sign(
        &self,
        app_path: &Path,
        profiles: &[MobileProvision],
    ) -> Result<SignOutcome, Error> {
        if app_path.is_dir() {
            let bundle = Bundle::new(app_path)?;
            self.sign_bundle_tree(&bundle, profiles).await?;

            return Ok(SignOutcome {
                artifact: app_path.to_path_buf(),
                was_archive: false,
            });
        }

        let package = Package::new(app_path)?;
        let result = self.sign_staged(&package, profiles).await;

        match result {
            Ok(()) => {
                package.remove_stage();
                Ok(SignOutcome {
                    artifact: app_path.to_path_buf(),
                    was_archive: true,
                })
            }
            Err(err) => {
                // RepackageFailed points the caller at the signed payload,
                // which lives in the stage; removing it would invalidate
                // the error it travels with
                if !matches!(err, Error::RepackageFailed { .. }) {
                    package.remove_stage();
                }
                Err(err)
            }
        }
    }

    async fn sign_staged(
        &self,
        package: &Package,
        profiles: &[MobileProvision],
    ) -> Result<(), Error> {
        let bundle = package.extract()?;
        self.sign_bundle_tree(&bundle, profiles).await?;
        package.replace_original()
    }

    async fn sign_bundle_tree(
        &self,
        root: &Bundle,
        profiles: &[MobileProvision],
    ) -> Result<(), Error> {
        // Resolve the full profile-to-bundle mapping first; nothing is
        // embedded until every bundle has a match.
        let mut matched = Vec::new();
        for bundle in root.collect_bundles_sorted()? {
            // the root always needs a profile, whatever its directory is
            // named; only nested non-app bundles are exempt
            let is_root = bundle.bundle_dir() == root.bundle_dir();
            if !is_root && !bundle.bundle_type().should_have_entitlements() {
                continue;
            }

            let identifier = bundle
                .get_bundle_identifier()
                .ok_or(Error::BundleInfoPlistMissing)?;
            let profile = profiles
                .iter()
                .find(|p| p.bundle_id().as_deref() == Some(identifier.as_str()))
                .ok_or_else(|| Error::MissingProvisioningProfile(identifier.clone()))?;

            matched.push((bundle, profile));
        }

        let mut entitlements = EntitlementsMap::new();
        for (bundle, profile) in &matched {
            log::info!(
                "embedding profile for {} at {}",
                bundle.get_bundle_identifier().unwrap_or_default(),
                bundle.bundle_dir().display()
            );
            fs::write(
                bundle.bundle_dir().join("embedded.mobileprovision"),
                &profile.data,
            )?;
            entitlements.insert(bundle.relative_to(root), profile.entitlements_as_xml()?);
        }

        self.engine
            .sign_bundle(root.bundle_dir(), &self.identity, &entitlements)?;

        tokio::time::sleep(self.settle).await;

        Ok(())
    }
}
