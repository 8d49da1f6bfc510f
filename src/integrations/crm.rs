use reqwest::{Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use super::{CrmError, Credentials};

pub const DEFAULT_BASE_URL: &str = "https://sync.realnex.com/api/v1/Crm";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

// ─── Wire types ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
struct SearchResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactSummary {
    pub key: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CompanySummary {
    pub key: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhoneEntry {
    pub number: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateContactRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phones: Vec<PhoneEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateCompanyRequest {
    pub name: String,
    pub address1: String,
}

/// History record. `eventTypeKey` is the field name this client commits to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateHistoryRequest {
    pub subject: String,
    pub notes: String,
    pub event_type_key: String,
    pub linked_contact_keys: Vec<String>,
    pub linked_company_keys: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EntityKey {
    key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateContactResponse {
    contact: Option<EntityKey>,
}

#[derive(Debug, Deserialize)]
struct CreateCompanyResponse {
    company: Option<EntityKey>,
}

// ─── Client ──────────────────────────────────────────────────────────────────

/// HTTP client for the handful of CRM endpoints lead capture needs.
#[derive(Debug, Clone)]
pub struct CrmClient {
    base_url: Url,
    http: Client,
}

impl CrmClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CrmError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("weblead/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CrmError::Transport(format!("failed to build HTTP client: {}", e)))?;
        Self::with_http_client(base_url, http)
    }

    pub fn with_http_client(base_url: &str, http: Client) -> Result<Self, CrmError> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| CrmError::InvalidBaseUrl(format!("{}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(CrmError::InvalidBaseUrl(base_url.to_string()));
        }
        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    pub async fn search_contacts_by_email(
        &self,
        creds: &Credentials,
        email: &str,
    ) -> Result<Vec<ContactSummary>, CrmError> {
        let request = self
            .http
            .get(self.endpoint(&["contacts"]))
            .query(&[("email", email)]);
        let body: SearchResponse<ContactSummary> = self.send_json(creds, request).await?;
        Ok(body.items)
    }

    /// Returns the new contact's key.
    pub async fn create_contact(
        &self,
        creds: &Credentials,
        contact: &CreateContactRequest,
    ) -> Result<String, CrmError> {
        let request = self.http.post(self.endpoint(&["contact"])).json(contact);
        let body: CreateContactResponse = self.send_json(creds, request).await?;
        body.contact
            .and_then(|c| c.key)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| CrmError::Decode("response did not include a contact key".to_string()))
    }

    pub async fn search_companies_by_name(
        &self,
        creds: &Credentials,
        name: &str,
    ) -> Result<Vec<CompanySummary>, CrmError> {
        let request = self
            .http
            .get(self.endpoint(&["companies"]))
            .query(&[("name", name)]);
        let body: SearchResponse<CompanySummary> = self.send_json(creds, request).await?;
        Ok(body.items)
    }

    /// Returns the new company's key.
    pub async fn create_company(
        &self,
        creds: &Credentials,
        company: &CreateCompanyRequest,
    ) -> Result<String, CrmError> {
        let request = self.http.post(self.endpoint(&["company"])).json(company);
        let body: CreateCompanyResponse = self.send_json(creds, request).await?;
        body.company
            .and_then(|c| c.key)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| CrmError::Decode("response did not include a company key".to_string()))
    }

    pub async fn link_contact_to_company(
        &self,
        creds: &Credentials,
        contact_key: &str,
        company_key: &str,
    ) -> Result<(), CrmError> {
        let url = self.endpoint(&["contact", contact_key, "company", company_key]);
        self.send(creds, self.http.post(url)).await?;
        Ok(())
    }

    pub async fn create_history(
        &self,
        creds: &Credentials,
        note: &CreateHistoryRequest,
    ) -> Result<(), CrmError> {
        let request = self.http.post(self.endpoint(&["history"])).json(note);
        self.send(creds, request).await?;
        Ok(())
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // cannot_be_a_base was rejected in the constructor
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send(&self, creds: &Credentials, request: RequestBuilder) -> Result<Response, CrmError> {
        let response = request
            .bearer_auth(&creds.token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| CrmError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CrmError::UpstreamRejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        creds: &Credentials,
        request: RequestBuilder,
    ) -> Result<T, CrmError> {
        let response = self.send(creds, request).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| CrmError::Decode(e.to_string()))
    }
}
