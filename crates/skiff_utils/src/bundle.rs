use std::path::{Path, PathBuf};

use plist::Dictionary;
use walkdir::WalkDir;

use skiff_core::MobileProvision;

use crate::{Error, Package, PlistInfoTrait};

// entitlements every development profile carries; not capability classes
const BASELINE_ENTITLEMENTS: &[&str] = &[
    "application-identifier",
    "com.apple.developer.team-identifier",
    "get-task-allow",
    "keychain-access-groups",
];

pub(crate) fn capabilities_from_entitlements(entitlements: &Dictionary) -> Vec<String> {
    entitlements
        .keys()
        .filter(|key| !BASELINE_ENTITLEMENTS.contains(&key.as_str()))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleType {
    App,
    AppExtension,
    Framework,
    Unknown,
}

impl BundleType {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("app") => BundleType::App,
            Some("appex") => BundleType::AppExtension,
            Some("framework") => BundleType::Framework,
            _ => BundleType::Unknown,
        }
    }

    // Only apps and app extensions get provisioning profiles and
    // entitlements; frameworks are signed bare.
    pub fn should_have_entitlements(&self) -> bool {
        matches!(self, BundleType::App | BundleType::AppExtension)
    }
}

/// An unpacked bundle directory with its parsed Info.plist.
#[derive(Debug, Clone)]
pub struct Bundle {
    dir: PathBuf,
    bundle_type: BundleType,
    info: Dictionary,
}

impl Bundle {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self, Error> {
        let dir = dir.as_ref().to_path_buf();
        let info_path = dir.join("Info.plist");
        if !info_path.exists() {
            return Err(Error::BundleInfoPlistMissing);
        }

        let info: Dictionary = plist::from_file(&info_path)?;

        Ok(Self {
            bundle_type: BundleType::from_path(&dir),
            dir,
            info,
        })
    }

    pub fn bundle_dir(&self) -> &PathBuf {
        &self.dir
    }

    pub fn bundle_type(&self) -> &BundleType {
        &self.bundle_type
    }

    /// This bundle plus every nested bundle beneath it, deepest first so
    /// children are processed before their containers.
    pub fn collect_bundles_sorted(&self) -> Result<Vec<Bundle>, Error> {
        let mut bundles = Vec::new();

        for entry in WalkDir::new(&self.dir)
            .min_depth(1)
            .into_iter()
            .filter_map(Result::ok)
        {
            if !entry.file_type().is_dir() {
                continue;
            }
            if BundleType::from_path(entry.path()) == BundleType::Unknown {
                continue;
            }
            if let Ok(bundle) = Bundle::new(entry.path()) {
                bundles.push(bundle);
            }
        }

        bundles.sort_by_key(|b| std::cmp::Reverse(b.dir.components().count()));
        bundles.push(self.clone());

        Ok(bundles)
    }

    /// Path of this bundle relative to `root`; empty string for the root
    /// bundle itself. Used as the entitlements-map key.
    pub fn relative_to(&self, root: &Bundle) -> String {
        self.dir
            .strip_prefix(&root.dir)
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Capability classes the bundle declares, read from an already
    /// embedded profile when one exists. Baseline entitlements are not
    /// capabilities and are filtered out.
    pub fn declared_capabilities(&self) -> Vec<String> {
        let embedded = self.dir.join("embedded.mobileprovision");
        let Ok(profile) = MobileProvision::load_with_path(&embedded) else {
            return Vec::new();
        };

        capabilities_from_entitlements(profile.entitlements())
    }
}

macro_rules! get_plist_dict_value {
    ($self:ident, $key:expr) => {{
        $self
            .info
            .get($key)
            .and_then(|v| v.as_string())
            .map(|s| s.to_string())
    }};
}

impl PlistInfoTrait for Bundle {
    fn get_name(&self) -> Option<String> {
        get_plist_dict_value!(self, "CFBundleDisplayName")
            .or_else(|| get_plist_dict_value!(self, "CFBundleName"))
            .or_else(|| self.get_executable())
    }

    fn get_executable(&self) -> Option<String> {
        get_plist_dict_value!(self, "CFBundleExecutable")
    }

    fn get_bundle_identifier(&self) -> Option<String> {
        get_plist_dict_value!(self, "CFBundleIdentifier")
    }

    fn get_bundle_name(&self) -> Option<String> {
        get_plist_dict_value!(self, "CFBundleName")
    }

    fn get_version(&self) -> Option<String> {
        get_plist_dict_value!(self, "CFBundleShortVersionString")
    }

    fn get_build_version(&self) -> Option<String> {
        get_plist_dict_value!(self, "CFBundleVersion")
    }
}

/// What the pipeline needs to know about one bundle before signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleInfo {
    pub name: String,
    pub identifier: String,
    pub capabilities: Vec<String>,
}

/// Enumerates the entitlement-bearing bundles of an app, without staging
/// an extraction for archive inputs.
pub fn inspect_app<P: AsRef<Path>>(app_path: P) -> Result<Vec<BundleInfo>, Error> {
    let app_path = app_path.as_ref();

    if app_path.is_dir() {
        let root = Bundle::new(app_path)?;
        let mut infos = Vec::new();

        for bundle in root.collect_bundles_sorted()? {
            // the root is always provisioned, whatever its directory name
            let is_root = bundle.bundle_dir() == root.bundle_dir();
            if !is_root && !bundle.bundle_type().should_have_entitlements() {
                continue;
            }
            let identifier = bundle
                .get_bundle_identifier()
                .ok_or(Error::BundleInfoPlistMissing)?;
            let name = bundle.get_bundle_name().unwrap_or_else(|| identifier.clone());
            let info = BundleInfo {
                name,
                identifier,
                capabilities: bundle.declared_capabilities(),
            };
            if !infos.contains(&info) {
                infos.push(info);
            }
        }

        Ok(infos)
    } else {
        Package::peek_bundle_infos(app_path)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::fake_app;
    use super::*;

    #[test]
    fn collects_nested_bundles_deepest_first() {
        let dir = tempfile::tempdir().unwrap();
        let app_dir = fake_app(dir.path(), "com.example.app", Some("com.example.app.widget"));

        let root = Bundle::new(&app_dir).unwrap();
        let bundles = root.collect_bundles_sorted().unwrap();

        assert_eq!(bundles.len(), 2);
        assert_eq!(
            bundles[0].get_bundle_identifier().as_deref(),
            Some("com.example.app.widget")
        );
        assert_eq!(
            bundles[1].get_bundle_identifier().as_deref(),
            Some("com.example.app")
        );
        assert_eq!(bundles[0].relative_to(&root), "PlugIns/Widget.appex");
        assert_eq!(bundles[1].relative_to(&root), "");
    }

    #[test]
    fn missing_info_plist_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let bare = dir.path().join("Bare.app");
        std::fs::create_dir_all(&bare).unwrap();

        assert!(matches!(
            Bundle::new(&bare),
            Err(Error::BundleInfoPlistMissing)
        ));
    }

    #[test]
    fn inspect_app_reports_root_and_extension() {
        let dir = tempfile::tempdir().unwrap();
        let app_dir = fake_app(dir.path(), "com.example.app", Some("com.example.app.widget"));

        let infos = inspect_app(&app_dir).unwrap();
        let identifiers: Vec<_> = infos.iter().map(|i| i.identifier.as_str()).collect();

        assert!(identifiers.contains(&"com.example.app"));
        assert!(identifiers.contains(&"com.example.app.widget"));
        assert_eq!(infos.len(), 2);
    }

    #[test]
    fn frameworks_do_not_carry_entitlements() {
        assert!(BundleType::App.should_have_entitlements());
        assert!(BundleType::AppExtension.should_have_entitlements());
        assert!(!BundleType::Framework.should_have_entitlements());
        assert!(!BundleType::Unknown.should_have_entitlements());
    }
}
