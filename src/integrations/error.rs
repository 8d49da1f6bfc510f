//! Error types for CRM calls and lead reconciliation.

use thiserror::Error;

/// A single CRM call that did not produce a usable response.
#[derive(Debug, Error)]
pub enum CrmError {
    /// The request never completed: DNS, connect, TLS or timeout.
    #[error("CRM request failed: {0}")]
    Transport(String),

    #[error("CRM rejected the request ({status}): {body}")]
    UpstreamRejected { status: u16, body: String },

    #[error("failed to parse CRM response: {0}")]
    Decode(String),

    #[error("invalid CRM base URL: {0}")]
    InvalidBaseUrl(String),
}

impl CrmError {
    pub fn is_transport(&self) -> bool {
        matches!(self, CrmError::Transport(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            CrmError::UpstreamRejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for CrmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            CrmError::Decode(err.to_string())
        } else {
            CrmError::Transport(err.to_string())
        }
    }
}

/// Fatal outcome of `LeadReconciler::reconcile`.
#[derive(Debug, Error)]
pub enum ReconciliationError {
    #[error("invalid lead input: {0}")]
    InvalidInput(String),

    #[error("contact creation failed{}: {message}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    ContactCreationFailed { status: Option<u16>, message: String },

    #[error("could not reach the CRM: {0}")]
    TransportError(String),
}

impl ReconciliationError {
    /// Whether a caller-side retry could reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ReconciliationError::TransportError(_) => true,
            ReconciliationError::ContactCreationFailed {
                status: Some(status),
                ..
            } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}
