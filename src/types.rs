use serde::{Deserialize, Serialize};

use futures_util::Stream;
use std::pin::Pin;

/// One manageable server in the fleet roster.
///
/// Management credentials deserialize from the roster file but are never
/// serialized, so no response body can carry them.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ServerRecord {
    pub name: String,
    pub ip: String,
    #[serde(default)]
    pub ssh_port: u16,
    #[serde(default)]
    pub ipmi_host: String,
    #[serde(default, skip_serializing)]
    pub ipmi_user: String,
    #[serde(default, skip_serializing)]
    pub ipmi_password: String,
}

impl ServerRecord {
    /// Port used for the TCP reachability probe, defaulting to ssh.
    pub fn probe_port(&self) -> u16 {
        if self.ssh_port == 0 {
            22
        } else {
            self.ssh_port
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct UserRecord {
    pub name: String,
    pub phone: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct VpnConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub ip: String,
}

/// Settings for the external SMS verification collaborator.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct SmsSettings {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub access_key_id: String,
    #[serde(default, skip_serializing)]
    pub access_key_secret: String,
    #[serde(default)]
    pub sign_name: String,
    #[serde(default)]
    pub template_code: String,
}

/// Top-level roster file layout: vpn target, SMS settings, operator
/// allowlist, and the servers themselves.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct FleetConfig {
    #[serde(default)]
    pub vpn: VpnConfig,
    #[serde(default)]
    pub sms: SmsSettings,
    #[serde(default)]
    pub users: Vec<UserRecord>,
    #[serde(default)]
    pub servers: Vec<ServerRecord>,
}

impl FleetConfig {
    pub fn user_by_phone(&self, phone: &str) -> Option<&UserRecord> {
        self.users.iter().find(|u| u.phone == phone)
    }
}

/// Normalized status vocabulary shared by every backend adapter.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Online,
    Offline,
    On,
    Off,
    Unknown,
}

/// Normalized adapter result; constructed fresh per request, never stored.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ProbeResult {
    pub status: ProbeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
}

impl ProbeResult {
    pub fn status(status: ProbeStatus) -> Self {
        Self {
            status,
            detail: None,
            raw: None,
        }
    }

    pub fn with_detail(status: ProbeStatus, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: Some(detail.into()),
            raw: None,
        }
    }
}

// Request payloads

#[derive(Deserialize, Debug)]
pub struct AuthRequest {
    pub phone: String,
    #[serde(default)]
    pub code: String,
}

#[derive(Deserialize, Debug)]
pub struct IpmiRequest {
    pub server_name: String,
    #[serde(default)]
    pub action: String,
}

#[derive(Deserialize, Debug)]
pub struct NetworkRequest {
    pub server_name: String,
}

pub type GenericBoxedStream<T> = Pin<Box<dyn Stream<Item = T> + Send>>;
