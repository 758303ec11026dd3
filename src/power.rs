use crate::error::GatewayError;
use crate::types::{ProbeResult, ProbeStatus, ServerRecord};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tokio::process::Command;
use tracing::warn;

const DEFAULT_IPMI_PORT: u16 = 623;

// An unbounded management call would stall a worker indefinitely
const IPMI_TIMEOUT: Duration = Duration::from_secs(10);

/// Closed set of chassis control actions. Unknown strings are rejected at the
/// boundary before any backend connection is attempted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PowerAction {
    On,
    Off,
    Cycle,
    Reset,
    Soft,
}

impl PowerAction {
    pub fn parse(action: &str) -> Result<Self, GatewayError> {
        match action {
            "on" => Ok(PowerAction::On),
            "off" => Ok(PowerAction::Off),
            "cycle" => Ok(PowerAction::Cycle),
            "reset" => Ok(PowerAction::Reset),
            "soft" => Ok(PowerAction::Soft),
            "" => Err(GatewayError::Validation(
                "action is required (on, off, cycle, reset, soft)".into(),
            )),
            other => Err(GatewayError::Unsupported(format!(
                "invalid action '{}'",
                other
            ))),
        }
    }

    /// The `ipmitool chassis power` subcommand for this action.
    fn command(&self) -> &'static str {
        match self {
            PowerAction::On => "on",
            PowerAction::Off => "off",
            PowerAction::Cycle => "cycle",
            PowerAction::Reset => "reset",
            PowerAction::Soft => "soft",
        }
    }
}

impl std::fmt::Display for PowerAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.command())
    }
}

/// Connection parameters for one server's management controller, present only
/// when the roster configures management for it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManagementEndpoint {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

impl ManagementEndpoint {
    /// `ipmi_host` may carry an explicit `host:port` or `[v6addr]:port`;
    /// otherwise port 623.
    pub fn from_record(record: &ServerRecord) -> Option<Self> {
        if record.ipmi_host.is_empty() {
            return None;
        }
        let (host, port) = split_host_port(&record.ipmi_host);
        Some(Self {
            host,
            port,
            user: record.ipmi_user.clone(),
            password: record.ipmi_password.clone(),
        })
    }
}

/// Split an optional trailing port off a management address. A suffix after
/// the last colon only counts as a port when the remainder holds no other
/// colon, so a bare IPv6 literal stays intact; bracketed `[addr]:port` is
/// honored.
fn split_host_port(raw: &str) -> (String, u16) {
    if let Some(rest) = raw.strip_prefix('[') {
        if let Some((host, port_part)) = rest.split_once(']') {
            let port = port_part
                .strip_prefix(':')
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_IPMI_PORT);
            return (host.to_string(), port);
        }
    }
    match raw.rsplit_once(':') {
        Some((host, port_str)) if !host.contains(':') => {
            let port = port_str.parse().unwrap_or(DEFAULT_IPMI_PORT);
            (host.to_string(), port)
        }
        _ => (raw.to_string(), DEFAULT_IPMI_PORT),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChassisPower {
    On,
    Off,
}

/// Narrow interface over the external management-protocol client. Each call
/// opens its own session and closes it before returning; nothing is pooled or
/// retried.
#[async_trait]
pub trait ChassisController: Send + Sync {
    async fn chassis_status(
        &self,
        endpoint: &ManagementEndpoint,
    ) -> Result<ChassisPower, GatewayError>;

    async fn chassis_control(
        &self,
        endpoint: &ManagementEndpoint,
        action: PowerAction,
    ) -> Result<(), GatewayError>;
}

/// Production controller delegating to the system `ipmitool` client, which
/// owns protocol framing and the authentication handshake.
pub struct IpmitoolController;

impl IpmitoolController {
    /// argv for one invocation. The password travels through the
    /// `IPMI_PASSWORD` environment variable (`-E`), never the process table.
    fn command_args(endpoint: &ManagementEndpoint, subcommand: &str) -> Vec<String> {
        vec![
            "-I".to_string(),
            "lanplus".to_string(),
            "-H".to_string(),
            endpoint.host.clone(),
            "-p".to_string(),
            endpoint.port.to_string(),
            "-U".to_string(),
            endpoint.user.clone(),
            "-E".to_string(),
            "chassis".to_string(),
            "power".to_string(),
            subcommand.to_string(),
        ]
    }

    async fn run(
        &self,
        endpoint: &ManagementEndpoint,
        subcommand: &str,
    ) -> Result<String, GatewayError> {
        let mut cmd = Command::new("ipmitool");
        cmd.args(Self::command_args(endpoint, subcommand))
            .env("IPMI_PASSWORD", &endpoint.password);

        let output = tokio::time::timeout(IPMI_TIMEOUT, cmd.output())
            .await
            .map_err(|_| {
                GatewayError::Backend(format!("IPMI call to {} timed out", endpoint.host))
            })?
            .map_err(|e| GatewayError::Backend(format!("failed to invoke ipmitool: {}", e)))?;

        if !output.status.success() {
            // stderr from ipmitool names the failure; credentials never
            // appear in it
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!("ipmitool failed against {}: {}", endpoint.host, stderr);
            return Err(GatewayError::Backend(format!(
                "IPMI command failed: {}",
                stderr
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl ChassisController for IpmitoolController {
    async fn chassis_status(
        &self,
        endpoint: &ManagementEndpoint,
    ) -> Result<ChassisPower, GatewayError> {
        let stdout = self.run(endpoint, "status").await?;
        // "Chassis Power is on" / "Chassis Power is off"
        if stdout.ends_with("on") {
            Ok(ChassisPower::On)
        } else if stdout.ends_with("off") {
            Ok(ChassisPower::Off)
        } else {
            Err(GatewayError::Backend(format!(
                "unrecognized chassis status: {}",
                stdout
            )))
        }
    }

    async fn chassis_control(
        &self,
        endpoint: &ManagementEndpoint,
        action: PowerAction,
    ) -> Result<(), GatewayError> {
        self.run(endpoint, action.command()).await.map(|_| ())
    }
}

/// Query a server's chassis power state. A record without management
/// credentials yields `unknown` without any backend call.
pub async fn power_status(
    controller: &dyn ChassisController,
    record: &ServerRecord,
) -> Result<ProbeResult, GatewayError> {
    let endpoint = match ManagementEndpoint::from_record(record) {
        Some(endpoint) => endpoint,
        None => {
            return Ok(ProbeResult::with_detail(
                ProbeStatus::Unknown,
                "IPMI not configured",
            ))
        }
    };

    let power = controller.chassis_status(&endpoint).await?;
    let status = match power {
        ChassisPower::On => ProbeStatus::On,
        ChassisPower::Off => ProbeStatus::Off,
    };
    Ok(ProbeResult {
        status,
        detail: None,
        raw: Some(json!({ "power_is_on": power == ChassisPower::On })),
    })
}

/// Apply a chassis control action. Unlike status, control on an unmanaged
/// server is an error rather than a degraded result.
pub async fn power_control(
    controller: &dyn ChassisController,
    record: &ServerRecord,
    action: PowerAction,
) -> Result<(), GatewayError> {
    let endpoint = ManagementEndpoint::from_record(record).ok_or_else(|| {
        GatewayError::Unsupported("IPMI not configured for this server".into())
    })?;
    controller.chassis_control(&endpoint, action).await
}
