pub mod captcha;
pub mod config;
pub mod embed;
pub mod form;
pub mod integrations;
pub mod web;

use anyhow::Context;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use captcha::RecaptchaVerifier;
use config::AppConfig;
use embed::SnippetStore;
use integrations::crm::CrmClient;
use integrations::reconciler::LeadReconciler;
use integrations::retry::RetryingReconciler;
use web::AppState;

const PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Wire the shared state from configuration.
pub fn build_state(config: AppConfig, store: SnippetStore) -> anyhow::Result<AppState> {
    let timeout = config.request_timeout();

    let crm = CrmClient::new(&config.crm_base_url, timeout).context("invalid CRM configuration")?;
    log::info!("CRM endpoint {} (timeout {:?})", crm.base_url(), timeout);
    let reconciler = RetryingReconciler::new(LeadReconciler::new(crm), config.retry.clone());
    let captcha = RecaptchaVerifier::new(&config.recaptcha_secret, timeout);
    let public_url = config.public_url()?;

    Ok(AppState {
        config: Arc::new(config),
        reconciler,
        captcha,
        snippets: Arc::new(Mutex::new(store)),
        public_url,
    })
}

pub async fn run() -> anyhow::Result<()> {
    env_logger::init();

    let config_path = config::default_config_path();
    let app_config = AppConfig::load(&config_path)?;
    log::info!("loaded config from {}: {:?}", config_path.display(), app_config);

    let store = SnippetStore::open(&app_config.database_path).with_context(|| {
        format!(
            "failed to open snippet database {}",
            app_config.database_path.display()
        )
    })?;
    let bind_address = app_config.bind_address.clone();
    let state = build_state(app_config, store)?;

    log::info!("reconciliation retry policy: {:?}", state.reconciler.policy());
    if !state.captcha.is_enabled() {
        log::warn!("RECAPTCHA_SECRET_KEY not set; reCAPTCHA verification is disabled");
    }
    if state.config.default_token.is_empty() {
        log::info!("no default CRM token configured; forms need a token or embed id");
    }

    let snippets = state.snippets.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(e) = snippets.lock().purge_expired() {
                log::warn!("embed snippet purge failed: {}", e);
            }
        }
    });

    let app = web::router(state);
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {}", bind_address))?;
    log::info!("weblead listening on http://{}", bind_address);
    axum::serve(listener, app).await?;
    Ok(())
}
