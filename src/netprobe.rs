use crate::types::{ProbeResult, ProbeStatus, ServerRecord};
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::process::Command;
use tracing::warn;

/// Bounds worst-case request latency for one TCP probe.
const TCP_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Attempt a bounded TCP handshake against `ip:ssh_port`. Any failure mode,
/// refusal or timeout, reads as offline.
pub async fn tcp_probe(record: &ServerRecord) -> ProbeResult {
    let target = format!("{}:{}", record.ip, record.probe_port());
    match tokio::time::timeout(TCP_PROBE_TIMEOUT, TcpStream::connect(&target)).await {
        Ok(Ok(_stream)) => ProbeResult::status(ProbeStatus::Online),
        Ok(Err(e)) => ProbeResult::with_detail(ProbeStatus::Offline, e.to_string()),
        Err(_) => ProbeResult::with_detail(ProbeStatus::Offline, "TCP probe timed out"),
    }
}

/// Single-echo reachability check. The wire-level echo protocol is delegated
/// to the operating environment.
#[async_trait]
pub trait Pinger: Send + Sync {
    async fn ping(&self, host: &str) -> bool;
}

/// Delegates to the system ping utility: one packet, one second wait.
pub struct SystemPinger;

#[async_trait]
impl Pinger for SystemPinger {
    async fn ping(&self, host: &str) -> bool {
        let result = Command::new("ping")
            .args(["-c", "1", "-W", "1"])
            .arg(host)
            .output()
            .await;
        match result {
            Ok(output) => output.status.success(),
            Err(e) => {
                warn!("Failed to spawn ping for {}: {}", host, e);
                false
            }
        }
    }
}

pub async fn icmp_probe(pinger: &dyn Pinger, host: &str) -> ProbeResult {
    if pinger.ping(host).await {
        ProbeResult::status(ProbeStatus::Online)
    } else {
        ProbeResult::status(ProbeStatus::Offline)
    }
}
