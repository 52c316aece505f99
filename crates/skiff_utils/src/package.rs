use std::io::Read;
use std::path::{Path, PathBuf};
use std::{env, fs};

use plist::Dictionary;
use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::ZipArchive;

use skiff_core::MobileProvision;

use crate::bundle::capabilities_from_entitlements;
use crate::{Bundle, BundleInfo, Error};

/// A staged `.ipa`: the original archive is copied into a uniquely named
/// scratch directory and every operation works on that copy, so the
/// original is never touched until the final atomic replacement.
#[derive(Debug, Clone)]
pub struct Package {
    original_file: PathBuf,
    stage_dir: PathBuf,
    stage_payload_dir: PathBuf,
    staged_file: PathBuf,
}

impl Package {
    pub fn new<P: AsRef<Path>>(package_file: P) -> Result<Self, Error> {
        let original_file = package_file.as_ref().to_path_buf();
        let stage_dir = env::temp_dir().join(format!(
            "skiff_stage_{}",
            Uuid::new_v4().to_string().to_uppercase()
        ));
        let staged_file = stage_dir.join("stage.ipa");

        fs::create_dir_all(&stage_dir)?;
        if let Err(err) = fs::copy(&original_file, &staged_file) {
            fs::remove_dir_all(&stage_dir).ok();
            return Err(err.into());
        }

        Ok(Self {
            original_file,
            stage_payload_dir: stage_dir.join("Payload"),
            stage_dir,
            staged_file,
        })
    }

    pub fn stage_dir(&self) -> &PathBuf {
        &self.stage_dir
    }

    pub fn payload_dir(&self) -> &PathBuf {
        &self.stage_payload_dir
    }

    /// Unpacks the staged copy and returns the root app bundle.
    pub fn extract(&self) -> Result<Bundle, Error> {
        let file = fs::File::open(&self.staged_file)?;
        let mut archive = ZipArchive::new(file)?;
        archive.extract(&self.stage_dir)?;

        let app_dir = fs::read_dir(&self.stage_payload_dir)?
            .filter_map(Result::ok)
            .map(|e| e.path())
            .find(|p| p.is_dir() && p.extension().and_then(|e| e.to_str()) == Some("app"))
            .ok_or(Error::PackageInfoPlistMissing)?;

        Bundle::new(app_dir)
    }

    /// Zips the signed payload back up inside the stage directory.
    pub fn repackage(&self) -> Result<PathBuf, Error> {
        let zip_file_path = self.stage_dir.join("resigned.ipa");
        let file = fs::File::create(&zip_file_path)?;
        let mut zip = zip::ZipWriter::new(file);
        let options = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);

        fn add_dir_to_zip(
            zip: &mut zip::ZipWriter<fs::File>,
            path: &Path,
            prefix: &Path,
            options: SimpleFileOptions,
        ) -> Result<(), Error> {
            for entry in fs::read_dir(path)? {
                let entry = entry?;
                let entry_path = entry.path();
                let name = entry_path
                    .strip_prefix(prefix)
                    .map_err(|_| Error::PackageInfoPlistMissing)?
                    .to_string_lossy()
                    .to_string();

                if entry_path.is_file() {
                    zip.start_file(&name, options)?;
                    let mut f = fs::File::open(&entry_path)?;
                    std::io::copy(&mut f, zip)?;
                } else if entry_path.is_dir() {
                    zip.add_directory(&name, options)?;
                    add_dir_to_zip(zip, &entry_path, prefix, options)?;
                }
            }
            Ok(())
        }

        add_dir_to_zip(&mut zip, &self.stage_payload_dir, &self.stage_dir, options)?;
        zip.finish()?;

        Ok(zip_file_path)
    }

    /// Repackages and swaps the result in for the original archive.
    ///
    /// The new archive is written next to the original and moved into
    /// place with a same-directory rename, so the original path holds
    /// either the old bytes or the new ones, never neither. A failure
    /// here is the distinct `RepackageFailed` outcome: signing already
    /// succeeded and the payload stays on disk.
    pub fn replace_original(&self) -> Result<(), Error> {
        // past this point signing has succeeded, so every failure is the
        // degraded RepackageFailed outcome, re-zipping included
        let resigned = self.repackage().map_err(|err| Error::RepackageFailed {
            archive: self.original_file.clone(),
            signed_payload: self.stage_payload_dir.clone(),
            source: std::io::Error::other(err),
        })?;

        let swap_name = format!(
            ".{}.{}.swap",
            self.original_file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "package.ipa".to_string()),
            Uuid::new_v4()
        );
        let swap_path = self
            .original_file
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(swap_name);

        let swap = (|| -> std::io::Result<()> {
            fs::copy(&resigned, &swap_path)?;
            fs::rename(&swap_path, &self.original_file)
        })();

        swap.map_err(|source| {
            fs::remove_file(&swap_path).ok();
            Error::RepackageFailed {
                archive: self.original_file.clone(),
                signed_payload: self.stage_payload_dir.clone(),
                source,
            }
        })
    }

    /// Drops every scratch artifact. Failure paths call this so no
    /// partial extraction outlives the signing attempt.
    pub fn remove_stage(&self) {
        fs::remove_dir_all(&self.stage_dir).ok();
    }

    /// Reads the entitlement-bearing bundles straight out of the archive
    /// entries, without extracting.
    pub fn peek_bundle_infos(package_file: &Path) -> Result<Vec<BundleInfo>, Error> {
        let file = fs::File::open(package_file)?;
        let mut archive = ZipArchive::new(file)?;

        let entries: Vec<String> = (0..archive.len())
            .filter_map(|i| archive.by_index(i).ok().map(|f| f.name().to_string()))
            .collect();

        let mut bundle_roots: Vec<String> = entries
            .iter()
            .filter_map(|entry| entry.strip_suffix("/Info.plist"))
            .filter(|root| {
                root.starts_with("Payload/") && (root.ends_with(".app") || root.ends_with(".appex"))
            })
            .map(|root| root.to_string())
            .collect();

        if bundle_roots.is_empty() {
            return Err(Error::PackageInfoPlistMissing);
        }

        // deepest first, matching the directory walk order
        bundle_roots.sort_by_key(|root| std::cmp::Reverse(root.matches('/').count()));

        let mut infos = Vec::new();
        for root in bundle_roots {
            let info: Dictionary = {
                let mut entry = archive.by_name(&format!("{root}/Info.plist"))?;
                let mut data = Vec::new();
                entry.read_to_end(&mut data)?;
                plist::from_bytes(&data)?
            };

            let identifier = info
                .get("CFBundleIdentifier")
                .and_then(|v| v.as_string())
                .ok_or(Error::PackageInfoPlistMissing)?
                .to_string();
            let name = info
                .get("CFBundleName")
                .and_then(|v| v.as_string())
                .unwrap_or(&identifier)
                .to_string();

            let capabilities = Self::peek_capabilities(&mut archive, &root, &entries);

            let info = BundleInfo {
                name,
                identifier,
                capabilities,
            };
            if !infos.contains(&info) {
                infos.push(info);
            }
        }

        Ok(infos)
    }

    fn peek_capabilities(
        archive: &mut ZipArchive<fs::File>,
        bundle_root: &str,
        entries: &[String],
    ) -> Vec<String> {
        let profile_entry = format!("{bundle_root}/embedded.mobileprovision");
        if !entries.contains(&profile_entry) {
            return Vec::new();
        }

        let mut data = Vec::new();
        let Ok(mut entry) = archive.by_name(&profile_entry) else {
            return Vec::new();
        };
        if entry.read_to_end(&mut data).is_err() {
            return Vec::new();
        }

        MobileProvision::load_with_bytes(data)
            .map(|profile| capabilities_from_entitlements(profile.entitlements()))
            .unwrap_or_default()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::fake_ipa;
    use super::*;
    use crate::PlistInfoTrait;

    #[test]
    fn peek_lists_bundles_without_extracting() {
        let dir = tempfile::tempdir().unwrap();
        let ipa = dir.path().join("test.ipa");
        fake_ipa(&ipa, "com.example.app", Some("com.example.app.widget"));

        let infos = Package::peek_bundle_infos(&ipa).unwrap();
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].identifier, "com.example.app.widget");
        assert_eq!(infos[1].identifier, "com.example.app");
    }

    #[test]
    fn extract_finds_the_root_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let ipa = dir.path().join("test.ipa");
        fake_ipa(&ipa, "com.example.app", None);

        let package = Package::new(&ipa).unwrap();
        let bundle = package.extract().unwrap();
        assert_eq!(
            bundle.get_bundle_identifier().as_deref(),
            Some("com.example.app")
        );

        package.remove_stage();
        assert!(!package.stage_dir().exists());
    }

    #[test]
    fn replace_original_round_trips_the_archive() {
        let dir = tempfile::tempdir().unwrap();
        let ipa = dir.path().join("test.ipa");
        fake_ipa(&ipa, "com.example.app", None);

        let package = Package::new(&ipa).unwrap();
        let bundle = package.extract().unwrap();

        // simulate the signer touching the payload
        fs::write(bundle.bundle_dir().join("embedded.mobileprovision"), b"profile").unwrap();

        package.replace_original().unwrap();
        package.remove_stage();

        let reread = Package::new(&ipa).unwrap();
        let resigned = reread.extract().unwrap();
        assert!(resigned.bundle_dir().join("embedded.mobileprovision").exists());
        assert_eq!(
            resigned.get_bundle_identifier().as_deref(),
            Some("com.example.app")
        );
        reread.remove_stage();
    }

    #[test]
    fn repackage_failure_is_the_degraded_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let ipa = dir.path().join("test.ipa");
        fake_ipa(&ipa, "com.example.app", None);
        let before = fs::read(&ipa).unwrap();

        let package = Package::new(&ipa).unwrap();
        package.extract().unwrap();

        // losing the payload after signing must not read as total failure
        fs::remove_dir_all(package.payload_dir()).unwrap();

        let err = package.replace_original().unwrap_err();
        assert!(matches!(err, Error::RepackageFailed { .. }));
        assert_eq!(fs::read(&ipa).unwrap(), before);

        package.remove_stage();
    }

    #[test]
    fn missing_archive_fails_without_leaving_a_stage() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Package::new(dir.path().join("absent.ipa")).is_err());
    }

    #[test]
    fn staging_leaves_the_original_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let ipa = dir.path().join("test.ipa");
        fake_ipa(&ipa, "com.example.app", None);
        let before = fs::read(&ipa).unwrap();

        let package = Package::new(&ipa).unwrap();
        package.extract().unwrap();
        package.remove_stage();

        assert_eq!(fs::read(&ipa).unwrap(), before);
    }
}
