use std::fmt;
use std::path::Path;

use skiff_core::{
    build_signing_identity, AnisetteData, AppId, Certificate, Credentials, Device,
    DeveloperServices, Session, SigningEngine, Team, TrustStore,
};
use thiserror::Error as ThisError;

use crate::{inspect_app, BundleInfo, Error, Installer, SignOutcome, Signer};

const DEFAULT_MACHINE_NAME: &str = "Skiff";

/// The pipeline's stages, in the only order they ever run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Authenticate,
    FetchTeam,
    FetchCertificate,
    RegisterAppId,
    RegisterDevice,
    FetchProfile,
    Sign,
    Install,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Authenticate => "authenticate",
            Stage::FetchTeam => "fetch-team",
            Stage::FetchCertificate => "fetch-certificate",
            Stage::RegisterAppId => "register-app-id",
            Stage::RegisterDevice => "register-device",
            Stage::FetchProfile => "fetch-profile",
            Stage::Sign => "sign",
            Stage::Install => "install",
        };
        write!(f, "{name}")
    }
}

/// A stage failure; terminal for the whole run. Carries the stage so the
/// caller can tell what to correct.
#[derive(Debug, ThisError)]
#[error("{stage} stage failed: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: Error,
}

fn at<T, E: Into<Error>>(stage: Stage, result: Result<T, E>) -> Result<T, PipelineError> {
    result.map_err(|err| PipelineError {
        stage,
        source: err.into(),
    })
}

/// The ordered remote-provisioning workflow:
///
/// authenticate → fetch team → fetch-or-create certificate → register
/// app ids → register device → fetch profiles → sign → install.
///
/// Every collaborator is injected; each stage's output is re-derived from
/// the previous stage's fresh result, stages never run concurrently
/// within one invocation, and no stage is retried internally. Concurrent
/// runs share only the read-only trust store.
pub struct ProvisioningPipeline<A, E, I>
where
    A: DeveloperServices,
    E: SigningEngine,
    I: Installer,
{
    api: A,
    engine: E,
    installer: I,
    trust: TrustStore,
    machine_name: String,
}

impl<A, E, I> ProvisioningPipeline<A, E, I>
where
    A: DeveloperServices,
    E: SigningEngine,
    I: Installer,
{
    pub fn new(api: A, engine: E, installer: I, trust: TrustStore) -> Self {
        Self {
            api,
            engine,
            installer,
            trust,
            machine_name: DEFAULT_MACHINE_NAME.to_string(),
        }
    }

    /// Machine name recorded against requested certificates.
    pub fn with_machine_name(mut self, machine_name: impl Into<String>) -> Self {
        self.machine_name = machine_name.into();
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn installer(&self) -> &I {
        &self.installer
    }

    /// Runs every stage for one (app, device) pair. At most one install
    /// attempt is made; any failure aborts the remaining stages.
    pub async fn run(
        &self,
        credentials: &Credentials,
        anisette: &AnisetteData,
        device: &Device,
        app_path: &Path,
    ) -> Result<SignOutcome, PipelineError> {
        let (account, session) = at(
            Stage::Authenticate,
            self.api
                .authenticate(&credentials.apple_id, &credentials.password, anisette)
                .await,
        )?;
        log::info!("authenticated as {}", account.apple_id);

        let team = at(Stage::FetchTeam, self.fetch_team(&account, &session).await)?;
        log::info!("using team {team}");

        let certificate = at(
            Stage::FetchCertificate,
            self.fetch_or_create_certificate(&team, &session).await,
        )?;

        let targets = at(Stage::RegisterAppId, inspect_app(app_path))?;
        let mut app_ids = Vec::with_capacity(targets.len());
        for target in &targets {
            let app_id = at(
                Stage::RegisterAppId,
                self.ensure_app_id(target, &team, &session).await,
            )?;
            app_ids.push(app_id);
        }

        at(
            Stage::RegisterDevice,
            self.ensure_device(device, &team, &session).await,
        )?;

        let mut profiles = Vec::with_capacity(app_ids.len());
        for app_id in &app_ids {
            log::info!("fetching fresh provisioning profile for {}", app_id.identifier);
            let profile = at(
                Stage::FetchProfile,
                self.api
                    .fetch_provisioning_profile(&team, app_id, &session)
                    .await,
            )?;
            profiles.push(profile);
        }

        let identity = at(
            Stage::Sign,
            build_signing_identity(&certificate, &self.trust),
        )?;
        let signer = Signer::new(&self.engine, identity);
        let outcome = at(Stage::Sign, signer.sign(app_path, &profiles).await)?;

        at(
            Stage::Install,
            self.installer.install(&outcome.artifact, device).await,
        )?;
        log::info!("installed {} to {device}", outcome.artifact.display());

        Ok(outcome)
    }

    async fn fetch_team(
        &self,
        account: &skiff_core::Account,
        session: &Session,
    ) -> Result<Team, skiff_core::Error> {
        self.api
            .list_teams(account, session)
            .await?
            .into_iter()
            .next()
            .ok_or(skiff_core::Error::NoTeamFound)
    }

    /// Reuses a valid certificate with local key material; otherwise asks
    /// for a new one. A limit error from the portal surfaces unchanged.
    async fn fetch_or_create_certificate(
        &self,
        team: &Team,
        session: &Session,
    ) -> Result<Certificate, skiff_core::Error> {
        let certificates = self.api.list_certificates(team, session).await?;

        if let Some(existing) = certificates
            .into_iter()
            .find(|c| c.has_private_key() && !c.is_expired())
        {
            log::info!("reusing certificate {}", existing.certificate_id);
            return Ok(existing);
        }

        log::info!("requesting new certificate for {}", self.machine_name);
        self.api
            .request_certificate(team, &self.machine_name, session)
            .await
    }

    async fn ensure_app_id(
        &self,
        target: &BundleInfo,
        team: &Team,
        session: &Session,
    ) -> Result<AppId, skiff_core::Error> {
        let existing = self.api.list_app_ids(team, session).await?;
        if let Some(found) = existing
            .into_iter()
            .find(|a| a.identifier == target.identifier)
        {
            log::info!("app id {} already registered", found.identifier);
            return Ok(found);
        }

        self.api
            .register_app_id(
                team,
                &target.name,
                &target.identifier,
                &target.capabilities,
                session,
            )
            .await
    }

    async fn ensure_device(
        &self,
        device: &Device,
        team: &Team,
        session: &Session,
    ) -> Result<Device, skiff_core::Error> {
        let existing = self.api.list_devices(team, session).await?;
        if let Some(found) = existing.into_iter().find(|d| d.udid == device.udid) {
            log::info!("device {} already registered", found.udid);
            return Ok(found);
        }

        self.api
            .register_device(team, &device.name, &device.udid, session)
            .await
    }
}
