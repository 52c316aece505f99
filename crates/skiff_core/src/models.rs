use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Apple ID credentials for one pipeline run. Never persisted by the core.
#[derive(Clone)]
pub struct Credentials {
    pub apple_id: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // never log the password
        f.debug_struct("Credentials")
            .field("apple_id", &self.apple_id)
            .finish_non_exhaustive()
    }
}

/// Client attestation data the portal expects alongside every
/// authentication attempt. Produced out-of-band; opaque to the core.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnisetteData {
    pub machine_id: String,
    pub one_time_password: String,
    pub local_user_id: String,
    pub routing_info: String,
    pub device_description: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub apple_id: String,
    pub dsid: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Authenticated portal session. Opaque tokens, discarded at end of run.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub dsid: String,
    pub auth_token: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TeamKind {
    Free,
    Individual,
    Organization,
}

impl TeamKind {
    pub fn is_free(&self) -> bool {
        matches!(self, TeamKind::Free)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub team_id: String,
    pub name: String,
    pub kind: TeamKind,
}

impl std::fmt::Display for Team {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.team_id)
    }
}

/// A development certificate as the portal reports it. `p12_data` is the
/// private-key + certificate container and is only present when the key
/// material is actually held locally.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    pub certificate_id: String,
    pub serial_number: String,
    pub machine_name: Option<String>,
    pub expiration_date: Option<DateTime<Utc>>,
    pub p12_data: Option<Vec<u8>>,
}

impl Certificate {
    pub fn with_p12(p12_data: Vec<u8>) -> Self {
        Self {
            certificate_id: String::new(),
            serial_number: String::new(),
            machine_name: None,
            expiration_date: None,
            p12_data: Some(p12_data),
        }
    }

    pub fn has_private_key(&self) -> bool {
        self.p12_data.as_ref().is_some_and(|data| !data.is_empty())
    }

    pub fn is_expired(&self) -> bool {
        self.expiration_date
            .is_some_and(|expires| expires <= Utc::now())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppId {
    pub app_id_id: String,
    pub identifier: String,
    pub name: String,
    pub features: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub name: String,
    pub udid: String,
    pub class: String,
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.udid)
    }
}
