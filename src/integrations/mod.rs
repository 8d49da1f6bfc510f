pub mod crm;
pub mod error;
pub mod reconciler;
pub mod retry;

use serde::{Deserialize, Serialize};

pub use error::{CrmError, ReconciliationError};

/// Per-call CRM credentials. Never persisted by the reconciler.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub token: String,
    /// Tenant/company scope the token belongs to, used by listing snippets.
    pub scope_id: Option<String>,
}

impl Credentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            scope_id: None,
        }
    }

    pub fn with_scope(mut self, scope_id: impl Into<String>) -> Self {
        let scope_id = scope_id.into();
        self.scope_id = if scope_id.is_empty() {
            None
        } else {
            Some(scope_id)
        };
        self
    }
}

// Keep the bearer token out of logs.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"<redacted>")
            .field("scope_id", &self.scope_id)
            .finish()
    }
}

/// A sanitized, validated lead submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeadInput {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub company_name: Option<String>,
    pub address: Option<String>,
    pub comments: Option<String>,
}

impl LeadInput {
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: email.into(),
            ..Self::default()
        }
    }

    /// Company name, treating a blank value as absent.
    pub fn company(&self) -> Option<&str> {
        non_blank(self.company_name.as_deref())
    }

    pub fn phone_number(&self) -> Option<&str> {
        non_blank(self.phone.as_deref())
    }

    pub fn note_body(&self) -> &str {
        non_blank(self.comments.as_deref()).unwrap_or(FALLBACK_NOTE)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

pub const NOTE_SUBJECT: &str = "Weblead";
pub const FALLBACK_NOTE: &str = "Submitted via web form.";

/// Pipeline stage a warning was raised from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ContactSearch,
    CompanySearch,
    CompanyCreate,
    Association,
    History,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::ContactSearch => "contact_search",
            Stage::CompanySearch => "company_search",
            Stage::CompanyCreate => "company_create",
            Stage::Association => "association",
            Stage::History => "history",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationWarning {
    pub stage: Stage,
    pub message: String,
}

/// Whether the contact was linked to the company during this call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationOutcome {
    Linked,
    NotLinked,
    NotAttempted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationResult {
    pub contact_key: String,
    pub company_key: Option<String>,
    pub matched_existing_contact: bool,
    pub association: AssociationOutcome,
    pub warnings: Vec<ReconciliationWarning>,
}

impl ReconciliationResult {
    /// The contact exists in the CRM but an enrichment step failed.
    pub fn is_partial(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn warning_for(&self, stage: Stage) -> Option<&ReconciliationWarning> {
        self.warnings.iter().find(|w| w.stage == stage)
    }
}
