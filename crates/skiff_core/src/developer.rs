use async_trait::async_trait;

use crate::{
    Account, AnisetteData, AppId, Certificate, Device, Error, MobileProvision, Session, Team,
};

/// Call contract for the remote developer portal. The wire protocol lives
/// behind this trait; the pipeline only depends on these shapes.
///
/// Expected failures map onto the shared error taxonomy:
/// `InvalidCredentials` / `TwoFactorRequired` from `authenticate`,
/// `CertificateLimitReached` from `request_certificate`. Anything else is
/// a collaborator failure and is propagated unchanged.
#[async_trait]
pub trait DeveloperServices: Send + Sync {
    async fn authenticate(
        &self,
        apple_id: &str,
        password: &str,
        anisette: &AnisetteData,
    ) -> Result<(Account, Session), Error>;

    async fn list_teams(&self, account: &Account, session: &Session) -> Result<Vec<Team>, Error>;

    async fn list_certificates(
        &self,
        team: &Team,
        session: &Session,
    ) -> Result<Vec<Certificate>, Error>;

    async fn request_certificate(
        &self,
        team: &Team,
        machine_name: &str,
        session: &Session,
    ) -> Result<Certificate, Error>;

    async fn list_app_ids(&self, team: &Team, session: &Session) -> Result<Vec<AppId>, Error>;

    async fn register_app_id(
        &self,
        team: &Team,
        name: &str,
        identifier: &str,
        capabilities: &[String],
        session: &Session,
    ) -> Result<AppId, Error>;

    async fn list_devices(&self, team: &Team, session: &Session) -> Result<Vec<Device>, Error>;

    async fn register_device(
        &self,
        team: &Team,
        name: &str,
        udid: &str,
        session: &Session,
    ) -> Result<Device, Error>;

    /// Always issues a fresh profile; device allow-lists change between
    /// runs, so profiles are never cached.
    async fn fetch_provisioning_profile(
        &self,
        team: &Team,
        app_id: &AppId,
        session: &Session,
    ) -> Result<MobileProvision, Error>;
}
