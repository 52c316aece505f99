mod developer;
mod engine;
mod identity;
mod models;
mod provision;
mod trust;

pub use developer::DeveloperServices;
pub use engine::{CodesignEngine, EntitlementsMap, SigningEngine};
pub use identity::{build_signing_identity, SigningIdentity};
pub use models::{
    Account, AnisetteData, AppId, Certificate, Credentials, Device, Session, Team, TeamKind,
};
pub use provision::MobileProvision;
pub use trust::TrustStore;

pub use apple_codesign::AppleCodesignError;

use std::path::PathBuf;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum Error {
    // Identity construction
    #[error("Trust anchor not available: {0}")]
    MissingTrustAnchor(PathBuf),
    #[error("Invalid certificate: {0}")]
    InvalidCertificate(String),

    // Credentials / authorization
    #[error("Invalid Apple ID credentials")]
    InvalidCredentials,
    #[error("Two-factor verification code required")]
    TwoFactorRequired,
    #[error("Certificate limit reached and no certificate could be reused")]
    CertificateLimitReached,
    #[error("Account has no development team")]
    NoTeamFound,

    // Provisioning profiles
    #[error("Provisioning profile has no readable entitlements payload")]
    ProvisioningEntitlementsUnknown,

    #[error("Developer services error: {0}")]
    DeveloperServices(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Plist error: {0}")]
    Plist(#[from] plist::Error),
    #[error("Pem error: {0}")]
    Pem(#[from] pem::PemError),
    #[error("X509 error: {0}")]
    X509(#[from] x509_certificate::X509CertificateError),
    #[error("Codesign error: {0}")]
    Codesign(#[from] apple_codesign::AppleCodesignError),
    #[error("Other error: {0}")]
    Other(String),
}
