use std::fs;
use std::path::{Path, PathBuf};

use x509_certificate::CapturedX509Certificate;

use crate::Error;

/// The pinned root certificate chain signing identities are extended with.
///
/// Loaded once from a PEM file and immutable afterwards, so it can be
/// shared across concurrent pipeline runs without synchronization.
#[derive(Clone, Debug)]
pub struct TrustStore {
    roots: Vec<Vec<u8>>,
}

impl TrustStore {
    /// Loads the anchor chain from a PEM file. A missing or empty file is a
    /// configuration error, reported as `MissingTrustAnchor`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::MissingTrustAnchor(path.to_path_buf()));
        }

        let contents = fs::read(path)?;
        Self::from_pem(&contents).map_err(|err| match err {
            Error::MissingTrustAnchor(_) => Error::MissingTrustAnchor(path.to_path_buf()),
            other => other,
        })
    }

    /// Parses every CERTIFICATE block in `contents`, preserving order.
    pub fn from_pem(contents: &[u8]) -> Result<Self, Error> {
        let mut roots = Vec::new();

        for block in pem::parse_many(contents).map_err(Error::Pem)? {
            if block.tag() != "CERTIFICATE" {
                log::debug!("ignoring PEM block with tag {}", block.tag());
                continue;
            }

            // reject anything that does not decode as an X.509 certificate
            CapturedX509Certificate::from_der(block.contents())?;
            roots.push(block.contents().to_vec());
        }

        if roots.is_empty() {
            return Err(Error::MissingTrustAnchor(PathBuf::new()));
        }

        Ok(Self { roots })
    }

    /// DER-encoded anchor certificates, in the order they appeared.
    pub fn roots(&self) -> &[Vec<u8>] {
        &self.roots
    }

    /// The primary anchor embedded into built signing identities.
    pub fn primary_root(&self) -> &[u8] {
        &self.roots[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn self_signed_pem(common_name: &str) -> String {
        let mut params = rcgen::CertificateParams::new(vec![]);
        params
            .distinguished_name
            .push(rcgen::DnType::CommonName, common_name);
        rcgen::Certificate::from_params(params)
            .unwrap()
            .serialize_pem()
            .unwrap()
    }

    #[test]
    fn missing_file_is_a_missing_trust_anchor() {
        let dir = tempfile::tempdir().unwrap();
        let err = TrustStore::load(dir.path().join("absent.pem")).unwrap_err();
        assert!(matches!(err, Error::MissingTrustAnchor(_)));
    }

    #[test]
    fn file_without_certificates_is_a_missing_trust_anchor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.pem");
        fs::write(&path, "no certificates here").unwrap();

        let err = TrustStore::load(&path).unwrap_err();
        assert!(matches!(err, Error::MissingTrustAnchor(p) if p == path));
    }

    #[test]
    fn parses_every_certificate_block_in_order() {
        let pem = format!("{}{}", self_signed_pem("Root A"), self_signed_pem("Root B"));
        let store = TrustStore::from_pem(pem.as_bytes()).unwrap();

        assert_eq!(store.roots().len(), 2);
        assert_eq!(store.primary_root(), store.roots()[0].as_slice());

        let primary = CapturedX509Certificate::from_der(store.primary_root()).unwrap();
        assert_eq!(
            primary.subject_common_name().as_deref(),
            Some("Root A")
        );
    }
}
