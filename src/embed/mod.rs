pub mod snippet;
pub mod storage;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use storage::SnippetStore;

#[derive(Debug, Error)]
pub enum SnippetError {
    #[error("a CRM token is required")]
    MissingToken,
    #[error("a company id is required for listing snippets")]
    MissingCompanyId,
    #[error("ttl_days must be between 0 and {max}")]
    TtlOutOfRange { max: u32 },
    #[error("unknown snippet type: {0}")]
    UnknownType(String),
    #[error("snippet storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

/// Upper bound on a requested embed lifetime.
pub const MAX_TTL_DAYS: u32 = 3650;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnippetType {
    /// Plain contact-us form.
    #[default]
    Contact,
    /// Contact form shown next to a company's listings; needs a company id.
    Listing,
}

impl SnippetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnippetType::Contact => "contact",
            SnippetType::Listing => "listing",
        }
    }
}

impl std::str::FromStr for SnippetType {
    type Err = SnippetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "contact" | "contact_us" | "" => Ok(SnippetType::Contact),
            "listing" | "listings" | "listings_contact_us" => Ok(SnippetType::Listing),
            other => Err(SnippetError::UnknownType(other.to_string())),
        }
    }
}

/// Stored configuration for an embedded form, addressed by `id`.
#[derive(Clone, Serialize, Deserialize)]
pub struct EmbedSnippet {
    pub id: String,
    #[serde(skip_serializing)]
    pub token: String,
    pub company_id: Option<String>,
    pub snippet_type: SnippetType,
    pub theme: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl EmbedSnippet {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |at| at <= now)
    }
}

impl std::fmt::Debug for EmbedSnippet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbedSnippet")
            .field("id", &self.id)
            .field("company_id", &self.company_id)
            .field("snippet_type", &self.snippet_type)
            .field("theme", &self.theme)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewSnippet {
    pub token: String,
    #[serde(default)]
    pub company_id: Option<String>,
    #[serde(default)]
    pub snippet_type: SnippetType,
    #[serde(default)]
    pub theme: Option<String>,
}

impl NewSnippet {
    pub fn validate(&self) -> Result<(), SnippetError> {
        if self.token.trim().is_empty() {
            return Err(SnippetError::MissingToken);
        }
        let has_company = self
            .company_id
            .as_deref()
            .map_or(false, |c| !c.trim().is_empty());
        if self.snippet_type == SnippetType::Listing && !has_company {
            return Err(SnippetError::MissingCompanyId);
        }
        Ok(())
    }
}
