use crate::config_store::ConfigStore;
use crate::error::GatewayError;
use crate::netprobe::{self, Pinger};
use crate::power::{self, ChassisController, PowerAction};
use crate::session_store::SessionStore;
use crate::sms::SmsGateway;
use crate::types::{AuthRequest, IpmiRequest, NetworkRequest, ProbeStatus};
use hyper::server::conn::Http;
use hyper::service::service_fn;
use hyper::{Body, Method, Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpStream;
use tracing::{debug, error, info, warn};

/// Everything a request needs, injected at construction. No ambient state.
#[derive(Clone)]
pub struct Gateway {
    pub config: ConfigStore,
    pub sessions: SessionStore,
    pub chassis: Arc<dyn ChassisController>,
    pub sms: Arc<dyn SmsGateway>,
    pub pinger: Arc<dyn Pinger>,
}

pub async fn handle_connection(stream: TcpStream, gateway: Gateway) {
    let service = service_fn(move |req| {
        let gateway = gateway.clone();
        async move { route_request(req, gateway).await }
    });

    if let Err(e) = Http::new().serve_connection(stream, service).await {
        error!("Connection error: {}", e);
    }
}

pub async fn route_request(
    req: Request<Body>,
    gateway: Gateway,
) -> Result<Response<Body>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let result = match (&method, path.as_str()) {
        (&Method::GET, "/health") => Ok(health()),
        (&Method::POST, "/api/auth/send-code") => send_code(req, &gateway).await,
        (&Method::POST, "/api/auth/login") => login(req, &gateway).await,
        _ => {
            // everything else sits behind the token gate
            match authenticate(&req, &gateway) {
                Err(e) => Err(e),
                Ok(subject) => {
                    debug!("Authenticated request from {} for {}", subject, path);
                    match (&method, path.as_str()) {
                        (&Method::GET, "/api/ping") => {
                            Ok(json_response(StatusCode::OK, &json!({"message": "pong"})))
                        }
                        (&Method::GET, "/api/servers") => list_servers(&gateway),
                        (&Method::POST, "/api/ipmi/status") => ipmi_status(req, &gateway).await,
                        (&Method::POST, "/api/ipmi/control") => ipmi_control(req, &gateway).await,
                        (&Method::POST, "/api/network/status") => {
                            network_status(req, &gateway).await
                        }
                        (&Method::GET, "/api/vpn/status") => Ok(vpn_status(&gateway).await),
                        _ => Err(GatewayError::NotFound("not found".into())),
                    }
                }
            }
        }
    };

    Ok(result.unwrap_or_else(|e| e.into_response()))
}

fn health() -> Response<Body> {
    let version = env!("CARGO_PKG_VERSION");
    let build = option_env!("GIT_COMMIT_HASH").unwrap_or("unknown");
    json_response(StatusCode::OK, &json!({ "version": version, "build": build }))
}

/// Bearer-token gate. Runs before any handler logic on the protected surface.
fn authenticate(req: &Request<Body>, gateway: &Gateway) -> Result<String, GatewayError> {
    let token = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| GatewayError::Auth("Authorization header required".into()))?;

    gateway
        .sessions
        .validate(token)
        .map_err(|e| GatewayError::Auth(e.to_string()))
}

async fn send_code(req: Request<Body>, gateway: &Gateway) -> Result<Response<Body>, GatewayError> {
    let payload: AuthRequest = read_json(req).await?;

    let user = gateway
        .config
        .get()
        .user_by_phone(&payload.phone)
        .cloned()
        .ok_or_else(|| GatewayError::Forbidden("phone number not allowed".into()))?;

    if let Err(e) = gateway.sms.send_code(&payload.phone).await {
        // Backend detail stays in the log; callers get an opaque failure
        error!("Failed to send SMS to {}: {}", payload.phone, e);
        return Err(GatewayError::Backend(
            "Failed to send verification code".into(),
        ));
    }

    info!("SMS code sent to {} ({})", user.name, payload.phone);
    json_ok(&json!({ "success": true, "message": "Verification code sent" }))
}

async fn login(req: Request<Body>, gateway: &Gateway) -> Result<Response<Body>, GatewayError> {
    let payload: AuthRequest = read_json(req).await?;

    let valid = match gateway.sms.check_code(&payload.phone, &payload.code).await {
        Ok(valid) => valid,
        Err(e) => {
            error!("Verification error for {}: {}", payload.phone, e);
            return Err(GatewayError::Backend("Verification failed".into()));
        }
    };

    if !valid {
        return Err(GatewayError::Auth("invalid verification code".into()));
    }

    let token = gateway.sessions.issue(&payload.phone);
    info!("Issued session token for {}", payload.phone);
    json_ok(&json!({ "success": true, "token": token }))
}

/// Roster listing; credential fields never serialize (see `ServerRecord`).
fn list_servers(gateway: &Gateway) -> Result<Response<Body>, GatewayError> {
    let snapshot = gateway.config.get();
    json_ok(&serde_json::to_value(&snapshot.servers).unwrap_or_default())
}

async fn ipmi_status(req: Request<Body>, gateway: &Gateway) -> Result<Response<Body>, GatewayError> {
    let payload: IpmiRequest = read_json(req).await?;
    let record = find_server(gateway, &payload.server_name)?;

    match power::power_status(gateway.chassis.as_ref(), &record).await {
        Ok(result) => json_ok(&serde_json::to_value(&result).unwrap_or_default()),
        Err(e) => {
            warn!("IPMI status failed for {}: {}", record.name, e);
            Ok(json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &json!({ "status": "unknown", "error": e.to_string() }),
            ))
        }
    }
}

async fn ipmi_control(
    req: Request<Body>,
    gateway: &Gateway,
) -> Result<Response<Body>, GatewayError> {
    let payload: IpmiRequest = read_json(req).await?;
    // Reject unknown actions at the boundary, before any lookup or connection
    let action = PowerAction::parse(&payload.action)?;
    let record = find_server(gateway, &payload.server_name)?;

    power::power_control(gateway.chassis.as_ref(), &record, action).await?;
    info!("Power command '{}' applied to {}", action, record.name);
    json_ok(&json!({
        "success": true,
        "message": format!("Power command '{}' sent successfully", action),
    }))
}

async fn network_status(
    req: Request<Body>,
    gateway: &Gateway,
) -> Result<Response<Body>, GatewayError> {
    let payload: NetworkRequest = read_json(req).await?;
    let record = find_server(gateway, &payload.server_name)?;

    let result = netprobe::tcp_probe(&record).await;
    json_ok(&serde_json::to_value(&result).unwrap_or_default())
}

async fn vpn_status(gateway: &Gateway) -> Response<Body> {
    let vpn = gateway.config.get().vpn.clone();
    if vpn.ip.is_empty() {
        return json_response(
            StatusCode::OK,
            &json!({ "status": "unknown", "detail": "VPN not configured" }),
        );
    }

    let result = netprobe::icmp_probe(gateway.pinger.as_ref(), &vpn.ip).await;
    let status = match result.status {
        ProbeStatus::Online => "online",
        _ => "offline",
    };
    json_response(
        StatusCode::OK,
        &json!({ "status": status, "ip": vpn.ip, "name": vpn.name }),
    )
}

fn find_server(gateway: &Gateway, name: &str) -> Result<crate::types::ServerRecord, GatewayError> {
    gateway
        .config
        .find_server(name)
        .ok_or_else(|| GatewayError::NotFound("server not found".into()))
}

async fn read_json<T: DeserializeOwned>(req: Request<Body>) -> Result<T, GatewayError> {
    let bytes = hyper::body::to_bytes(req.into_body())
        .await
        .map_err(|e| GatewayError::Validation(format!("failed to read request body: {}", e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| GatewayError::Validation(format!("invalid JSON: {}", e)))
}

fn json_ok(value: &serde_json::Value) -> Result<Response<Body>, GatewayError> {
    Ok(json_response(StatusCode::OK, value))
}

fn json_response(status: StatusCode, value: &serde_json::Value) -> Response<Body> {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Body::from(value.to_string()))
        .unwrap()
}
