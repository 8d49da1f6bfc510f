use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_VERIFY_URL: &str = "https://www.google.com/recaptcha/api/siteverify";

#[derive(Debug, Error)]
pub enum CaptchaError {
    #[error("reCAPTCHA verification request failed: {0}")]
    Request(String),
    #[error("reCAPTCHA verification returned {status}")]
    Status { status: u16 },
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    #[serde(default)]
    success: bool,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

/// Bot check performed before a submission reaches the CRM.
#[derive(Debug, Clone)]
pub struct RecaptchaVerifier {
    secret: Option<String>,
    verify_url: String,
    http: Client,
}

impl RecaptchaVerifier {
    /// A blank secret disables verification.
    pub fn new(secret: &str, timeout: Duration) -> Self {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self::with_http_client(secret, DEFAULT_VERIFY_URL, http)
    }

    pub fn with_http_client(secret: &str, verify_url: &str, http: Client) -> Self {
        let secret = secret.trim();
        Self {
            secret: (!secret.is_empty()).then(|| secret.to_string()),
            verify_url: verify_url.to_string(),
            http,
        }
    }

    pub fn disabled() -> Self {
        Self::with_http_client("", DEFAULT_VERIFY_URL, Client::new())
    }

    pub fn is_enabled(&self) -> bool {
        self.secret.is_some()
    }

    /// `Ok(false)` means the challenge was missing or failed.
    pub async fn verify(&self, response: &str, remote_ip: Option<&str>) -> Result<bool, CaptchaError> {
        let Some(secret) = &self.secret else {
            return Ok(true);
        };
        if response.trim().is_empty() {
            return Ok(false);
        }

        let mut params = vec![("secret", secret.as_str()), ("response", response)];
        if let Some(ip) = remote_ip {
            params.push(("remoteip", ip));
        }

        let reply = self
            .http
            .post(&self.verify_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| CaptchaError::Request(e.to_string()))?;

        let status = reply.status();
        if !status.is_success() {
            return Err(CaptchaError::Status {
                status: status.as_u16(),
            });
        }

        let body: VerifyResponse = reply
            .json()
            .await
            .map_err(|e| CaptchaError::Request(format!("parse error: {}", e)))?;

        if !body.success {
            log::info!("reCAPTCHA rejected submission: {:?}", body.error_codes);
        }
        Ok(body.success)
    }
}
