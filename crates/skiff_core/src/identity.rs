use crate::{Certificate, Error, TrustStore};

/// A ready-to-use signing identity: private key, leaf certificate and the
/// pinned anchor repackaged into a single PKCS#12 container with an empty
/// passphrase, which is what the signing engine expects.
///
/// The bytes are opaque to everything but the engine.
#[derive(Clone)]
pub struct SigningIdentity {
    der: Vec<u8>,
}

impl SigningIdentity {
    pub fn as_der(&self) -> &[u8] {
        &self.der
    }
}

impl std::fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningIdentity({} bytes)", self.der.len())
    }
}

/// Merges a developer certificate's key + leaf with the trust store's
/// anchor into one importable container.
///
/// Pure transform: no filesystem access, no passphrase on the output.
pub fn build_signing_identity(
    certificate: &Certificate,
    trust_store: &TrustStore,
) -> Result<SigningIdentity, Error> {
    let p12_data = certificate
        .p12_data
        .as_ref()
        .filter(|data| !data.is_empty())
        .ok_or_else(|| {
            Error::InvalidCertificate("certificate carries no private-key container".into())
        })?;

    let pfx = p12::PFX::parse(p12_data)
        .map_err(|err| Error::InvalidCertificate(format!("unreadable PKCS#12: {err:?}")))?;

    let keys = pfx
        .key_bags("")
        .map_err(|err| Error::InvalidCertificate(format!("PKCS#12 key bags: {err:?}")))?;
    let certs = pfx
        .cert_x509_bags("")
        .map_err(|err| Error::InvalidCertificate(format!("PKCS#12 cert bags: {err:?}")))?;

    let key_der = keys
        .first()
        .ok_or_else(|| Error::InvalidCertificate("no private key in PKCS#12".into()))?;
    let leaf_der = certs
        .first()
        .ok_or_else(|| Error::InvalidCertificate("no certificate in PKCS#12".into()))?;

    let merged = p12::PFX::new(
        leaf_der,
        key_der,
        Some(trust_store.primary_root()),
        "",
        "signing identity",
    )
    .ok_or_else(|| Error::InvalidCertificate("failed to assemble identity container".into()))?;

    Ok(SigningIdentity {
        der: merged.to_der(),
    })
}
