//! HTTP surface: the hosted lead form, its submission handler and the embed
//! snippet endpoints.

pub mod views;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{delete, get, post},
    Form, Json, Router,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

use crate::captcha::RecaptchaVerifier;
use crate::config::AppConfig;
use crate::embed::{snippet, NewSnippet, SnippetError, SnippetStore, SnippetType, MAX_TTL_DAYS};
use crate::form::LeadForm;
use crate::integrations::retry::RetryingReconciler;
use crate::integrations::{Credentials, ReconciliationError};
use views::FormView;

pub type SnippetState = Arc<Mutex<SnippetStore>>;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub reconciler: RetryingReconciler,
    pub captcha: RecaptchaVerifier,
    pub snippets: SnippetState,
    pub public_url: Url,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/form", get(show_form).post(submit_form))
        .route("/success", get(success))
        .route("/snippet", get(show_snippet))
        .route("/embed/:id", get(show_embed))
        .route("/api/embeds", post(create_embed))
        .route("/api/embeds/:id", delete(delete_embed))
        .route("/api/snippets", post(create_snippet_link))
        .with_state(state)
}

// ─── Form ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FormQuery {
    pub token: String,
    pub company_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct Submission {
    #[serde(flatten)]
    pub lead: LeadForm,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub company_id: String,
    #[serde(default)]
    pub embed: String,
    #[serde(default, rename = "g-recaptcha-response")]
    pub recaptcha_response: String,
}

impl AppState {
    fn base_view(&self, heading: &str, theme: &str) -> FormView {
        let site_key = self.config.recaptcha_site_key.trim();
        FormView {
            heading: heading.to_string(),
            theme: theme.to_string(),
            recaptcha_site_key: (self.captcha.is_enabled() && !site_key.is_empty())
                .then(|| site_key.to_string()),
            ..FormView::default()
        }
    }

    fn token_or_default(&self, token: &str) -> String {
        let token = token.trim();
        if token.is_empty() {
            self.config.default_token.clone()
        } else {
            token.to_string()
        }
    }

    fn company_or_default(&self, company_id: &str) -> String {
        let company_id = company_id.trim();
        if company_id.is_empty() {
            self.config.default_company_id.clone()
        } else {
            company_id.to_string()
        }
    }

    /// Only a token the request carried goes back into the page. The
    /// configured default stays server side and is resolved on submit.
    fn token_form(&self, heading: &str, token: &str, company_id: &str) -> FormView {
        let mut view = self.base_view(heading, "light");
        let token = token.trim();
        if token.is_empty() && self.config.default_token.is_empty() {
            view.messages.push("API Token is required.".to_string());
            view.disabled = true;
            return view;
        }
        if !token.is_empty() {
            view.hidden.push(("token", token.to_string()));
        }
        let company_id = self.company_or_default(company_id);
        if !company_id.is_empty() {
            view.hidden.push(("company_id", company_id));
        }
        view
    }
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn show_form(State(state): State<AppState>, Query(query): Query<FormQuery>) -> Response {
    let view = state.token_form("Contact us", &query.token, &query.company_id);
    render_form(&view)
}

fn render_form(view: &FormView) -> Response {
    let status = if view.disabled {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::OK
    };
    (status, Html(views::form_page(view))).into_response()
}

async fn submit_form(State(state): State<AppState>, Form(submission): Form<Submission>) -> Response {
    let values = submission.lead.sanitized();

    // Rebuild the page the submission came from so errors re-render in place.
    let (mut view, creds) = match resolve_submission(&state, &submission) {
        Ok(resolved) => resolved,
        Err(view) => return render_form(&view),
    };
    view.values = values;

    let lead = match submission.lead.validate() {
        Ok(lead) => lead,
        Err(errors) => {
            view.messages = errors.iter().map(ToString::to_string).collect();
            return (StatusCode::UNPROCESSABLE_ENTITY, Html(views::form_page(&view))).into_response();
        }
    };

    if state.captcha.is_enabled() {
        let response = submission.recaptcha_response.trim();
        let verdict = if response.is_empty() {
            Err("Please complete the reCAPTCHA.")
        } else {
            match state.captcha.verify(response, None).await {
                Ok(true) => Ok(()),
                Ok(false) => Err("reCAPTCHA verification failed."),
                Err(e) => {
                    log::warn!("{}", e);
                    Err("reCAPTCHA verification failed.")
                }
            }
        };
        if let Err(message) = verdict {
            view.messages.push(message.to_string());
            return (StatusCode::BAD_REQUEST, Html(views::form_page(&view))).into_response();
        }
    }

    match state.reconciler.reconcile(&creds, &lead).await {
        Ok(result) => {
            for warning in &result.warnings {
                log::warn!("lead {} captured with warning at {}: {}", result.contact_key, warning.stage, warning.message);
            }
            // Only the first name travels in the URL; contact details stay out
            // of browser history and access logs.
            let query = url::form_urlencoded::Serializer::new(String::new())
                .append_pair("first_name", &lead.first_name)
                .finish();
            Redirect::to(&format!("/success?{}", query)).into_response()
        }
        Err(err) => {
            let status = match err {
                ReconciliationError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::BAD_GATEWAY,
            };
            view.messages.push(format!("Error submitting your details: {}", err));
            (status, Html(views::form_page(&view))).into_response()
        }
    }
}

/// Credentials and page context for a submission: stored embed, explicit
/// token, or the configured default.
fn resolve_submission(state: &AppState, submission: &Submission) -> Result<(FormView, Credentials), FormView> {
    let embed_id = submission.embed.trim();
    if !embed_id.is_empty() {
        let stored = state.snippets.lock().get(embed_id);
        return match stored {
            Ok(Some(snippet)) => {
                let mut view = state.base_view(heading_for(snippet.snippet_type), &snippet.theme);
                view.hidden.push(("embed", snippet.id.clone()));
                let mut creds = Credentials::new(snippet.token);
                if let Some(company_id) = snippet.company_id {
                    creds = creds.with_scope(company_id);
                }
                Ok((view, creds))
            }
            Ok(None) => Err(unavailable_view(state, "This form link has expired.")),
            Err(e) => {
                log::error!("embed lookup failed: {}", e);
                Err(unavailable_view(state, "This form is temporarily unavailable."))
            }
        };
    }

    let view = state.token_form("Contact us", &submission.token, &submission.company_id);
    if view.disabled {
        return Err(view);
    }
    let token = state.token_or_default(&submission.token);
    let creds = Credentials::new(token).with_scope(state.company_or_default(&submission.company_id));
    Ok((view, creds))
}

fn unavailable_view(state: &AppState, message: &str) -> FormView {
    let mut view = state.base_view("Contact us", "light");
    view.messages.push(message.to_string());
    view.disabled = true;
    view
}

fn heading_for(snippet_type: SnippetType) -> &'static str {
    match snippet_type {
        SnippetType::Contact => "Contact us",
        SnippetType::Listing => "Ask about our listings",
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SuccessQuery {
    pub first_name: String,
}

async fn success(Query(q): Query<SuccessQuery>) -> Html<String> {
    Html(views::success_page(&q.first_name))
}

// ─── Snippets ────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SnippetQuery {
    pub snippet_type: String,
    pub token: String,
    pub company_id: String,
}

async fn show_snippet(State(state): State<AppState>, Query(query): Query<SnippetQuery>) -> Response {
    let snippet_type: SnippetType = match query.snippet_type.parse() {
        Ok(t) => t,
        Err(e) => return message_response(StatusCode::BAD_REQUEST, "Invalid snippet", &e.to_string()),
    };
    let company_id = state.company_or_default(&query.company_id);
    if snippet_type == SnippetType::Listing && company_id.is_empty() {
        return message_response(
            StatusCode::BAD_REQUEST,
            "Invalid snippet",
            &SnippetError::MissingCompanyId.to_string(),
        );
    }

    let view = state.token_form(heading_for(snippet_type), &query.token, &company_id);
    render_form(&view)
}

async fn show_embed(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let stored = state.snippets.lock().get(&id);
    match stored {
        Ok(Some(snippet)) => {
            let mut view = state.base_view(heading_for(snippet.snippet_type), &snippet.theme);
            view.hidden.push(("embed", snippet.id));
            render_form(&view)
        }
        Ok(None) => message_response(
            StatusCode::NOT_FOUND,
            "Form not found",
            "This form link is unknown or has expired.",
        ),
        Err(e) => {
            log::error!("embed lookup failed: {}", e);
            message_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Form unavailable",
                "This form is temporarily unavailable.",
            )
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateEmbedRequest {
    #[serde(flatten)]
    pub snippet: NewSnippet,
    #[serde(default)]
    pub ttl_days: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct CreateEmbedResponse {
    pub id: String,
    pub url: String,
    pub iframe: String,
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn json_error(status: StatusCode, message: &str) -> ApiError {
    (status, Json(serde_json::json!({ "error": message })))
}

/// Embed management requires `Authorization: Bearer <admin_key>`. With no
/// admin key configured the management routes are closed.
fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let expected = state.config.admin_key.trim();
    if expected.is_empty() {
        return Err(json_error(
            StatusCode::FORBIDDEN,
            "embed management is disabled; set admin_key to enable it",
        ));
    }
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);
    match presented {
        Some(key) if key == expected => Ok(()),
        _ => Err(json_error(StatusCode::UNAUTHORIZED, "invalid admin key")),
    }
}

async fn create_embed(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateEmbedRequest>,
) -> Result<Json<CreateEmbedResponse>, ApiError> {
    require_admin(&state, &headers)?;

    let ttl = match request.ttl_days {
        Some(days) if days > MAX_TTL_DAYS => {
            return Err(json_error(
                StatusCode::BAD_REQUEST,
                &SnippetError::TtlOutOfRange { max: MAX_TTL_DAYS }.to_string(),
            ))
        }
        Some(0) => None,
        Some(days) => Some(chrono::Duration::days(i64::from(days))),
        None => state.config.embed_ttl(),
    };

    let created = state.snippets.lock().create(&request.snippet, ttl);
    match created {
        Ok(stored) => Ok(Json(CreateEmbedResponse {
            url: snippet::embed_url(&state.public_url, &stored.id).to_string(),
            iframe: snippet::render_iframe(&state.public_url, &stored),
            id: stored.id,
            expires_at: stored.expires_at,
        })),
        Err(SnippetError::Storage(e)) => {
            log::error!("failed to store embed snippet: {}", e);
            Err(json_error(StatusCode::INTERNAL_SERVER_ERROR, "storage failure"))
        }
        Err(e) => Err(json_error(StatusCode::BAD_REQUEST, &e.to_string())),
    }
}

async fn delete_embed(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    require_admin(&state, &headers)?;

    let deleted = state.snippets.lock().delete(&id);
    match deleted {
        Ok(true) => Ok(StatusCode::NO_CONTENT),
        Ok(false) => Err(json_error(StatusCode::NOT_FOUND, "unknown embed")),
        Err(e) => {
            log::error!("failed to delete embed snippet {}: {}", id, e);
            Err(json_error(StatusCode::INTERNAL_SERVER_ERROR, "storage failure"))
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SnippetLinkResponse {
    pub url: String,
    pub iframe: String,
}

/// Unstored snippet: the token travels in the iframe URL.
async fn create_snippet_link(
    State(state): State<AppState>,
    Json(request): Json<NewSnippet>,
) -> Result<Json<SnippetLinkResponse>, ApiError> {
    request
        .validate()
        .map_err(|e| json_error(StatusCode::BAD_REQUEST, &e.to_string()))?;
    let url = snippet::snippet_url(
        &state.public_url,
        request.snippet_type,
        request.token.trim(),
        request.company_id.as_deref().map(str::trim),
    );
    Ok(Json(SnippetLinkResponse {
        iframe: snippet::iframe_for_url(&url),
        url: url.to_string(),
    }))
}

fn message_response(status: StatusCode, title: &str, message: &str) -> Response {
    (status, Html(views::message_page(title, message))).into_response()
}
