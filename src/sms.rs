use crate::config_store::ConfigStore;
use crate::error::GatewayError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const SMS_TIMEOUT: Duration = Duration::from_secs(10);

/// Narrow interface over the cloud SMS verification service: issue a one-time
/// code to a phone number, then check a submitted code against it.
#[async_trait]
pub trait SmsGateway: Send + Sync {
    async fn send_code(&self, phone: &str) -> Result<(), GatewayError>;

    async fn check_code(&self, phone: &str, code: &str) -> Result<bool, GatewayError>;
}

#[derive(Deserialize, Debug)]
struct SmsApiResponse {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    verify_result: Option<String>,
}

/// HTTP client for the verification service. Settings come from the current
/// config snapshot on every call, so a roster reload takes effect without a
/// restart.
pub struct HttpSmsGateway {
    client: reqwest::Client,
    config: ConfigStore,
}

impl HttpSmsGateway {
    pub fn new(config: ConfigStore) -> Self {
        let client = reqwest::Client::builder()
            .timeout(SMS_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    async fn call(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<SmsApiResponse, GatewayError> {
        let settings = self.config.get().sms.clone();
        if settings.endpoint.is_empty()
            || settings.access_key_id.is_empty()
            || settings.access_key_secret.is_empty()
        {
            return Err(GatewayError::Backend("SMS credentials not configured".into()));
        }

        let url = format!("{}/{}", settings.endpoint.trim_end_matches('/'), path);
        let response = self
            .client
            .post(&url)
            .header("X-Access-Key-Id", &settings.access_key_id)
            .header("X-Access-Key-Secret", &settings.access_key_secret)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Backend(format!("SMS request failed: {}", e)))?;

        response
            .json::<SmsApiResponse>()
            .await
            .map_err(|e| GatewayError::Backend(format!("unexpected SMS response body: {}", e)))
    }
}

#[async_trait]
impl SmsGateway for HttpSmsGateway {
    async fn send_code(&self, phone: &str) -> Result<(), GatewayError> {
        let settings = self.config.get().sms.clone();
        if settings.sign_name.is_empty() || settings.template_code.is_empty() {
            return Err(GatewayError::Backend(
                "SMS configuration missing (sign_name or template_code)".into(),
            ));
        }

        let body = json!({
            "phone_number": phone,
            "sign_name": settings.sign_name,
            "template_code": settings.template_code,
            // 6-digit code, valid for 5 minutes
            "template_param": {"code": "##code##", "min": "5"},
            "code_length": 6,
        });

        let response = self.call("send-verify-code", body).await?;
        if response.code != "OK" {
            return Err(GatewayError::Backend(format!(
                "SMS API error: {} - {}",
                response.code, response.message
            )));
        }
        Ok(())
    }

    async fn check_code(&self, phone: &str, code: &str) -> Result<bool, GatewayError> {
        let body = json!({
            "phone_number": phone,
            "verify_code": code,
        });

        let response = self.call("check-verify-code", body).await?;
        if response.code != "OK" {
            return Err(GatewayError::Backend(format!(
                "verification failed: {}",
                response.message
            )));
        }
        // An explicit verify_result decides; a bare OK counts as a pass
        Ok(matches!(response.verify_result.as_deref(), Some("PASS") | None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FleetConfig, SmsSettings};

    #[tokio::test]
    async fn unconfigured_credentials_fail_without_a_request() {
        let gateway = HttpSmsGateway::new(ConfigStore::new());
        let err = gateway.send_code("+15551234567").await.unwrap_err();
        assert!(matches!(err, GatewayError::Backend(_)));
    }

    #[tokio::test]
    async fn missing_template_settings_fail_before_any_call() {
        let store = ConfigStore::with_config(FleetConfig {
            sms: SmsSettings {
                endpoint: "http://127.0.0.1:1/sms".into(),
                access_key_id: "id".into(),
                access_key_secret: "secret".into(),
                ..Default::default()
            },
            ..Default::default()
        });
        let gateway = HttpSmsGateway::new(store);
        let err = gateway.send_code("+15551234567").await.unwrap_err();
        assert!(err.to_string().contains("sign_name or template_code"));
    }

    #[test]
    fn response_parses_verify_result() {
        let parsed: SmsApiResponse =
            serde_json::from_str(r#"{"code": "OK", "verify_result": "PASS"}"#).unwrap();
        assert_eq!(parsed.code, "OK");
        assert_eq!(parsed.verify_result.as_deref(), Some("PASS"));
    }
}
