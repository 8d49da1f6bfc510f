//! Exponential backoff layered around `LeadReconciler::reconcile`.
//!
//! `reconcile` itself never retries. Every attempt starts with the contact and
//! company searches, so records created by an earlier attempt are matched
//! instead of duplicated. A retried attempt runs with `creation_uncertain`
//! set, so a contact matched after a failed creation is still linked to its
//! company. If the CRM commits the contact only after the re-run's search, a
//! duplicate contact is still possible; there is no idempotency key.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use super::reconciler::LeadReconciler;
use super::{Credentials, LeadInput, ReconciliationError, ReconciliationResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 disables retrying).
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            ..Self::default()
        }
    }

    pub fn should_retry(&self, attempt: u32, error: &ReconciliationError) -> bool {
        attempt < self.max_retries && error.is_retryable()
    }

    /// `min(base * 2^attempt, max)`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let ms = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt))
            .min(self.max_delay_ms);
        Duration::from_millis(ms)
    }

    pub async fn execute<F, Fut, T>(&self, mut f: F) -> Result<T, ReconciliationError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ReconciliationError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match f().await {
                Ok(value) => {
                    if attempt > 0 {
                        log::debug!("reconciliation succeeded after {} attempt(s)", attempt + 1);
                    }
                    return Ok(value);
                }
                Err(error) if self.should_retry(attempt, &error) => {
                    let delay = self.delay_for(attempt);
                    log::warn!(
                        "reconciliation attempt {} failed ({}), retrying in {:?}",
                        attempt + 1,
                        error,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

/// A reconciler that re-runs transient failures according to a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryingReconciler {
    inner: LeadReconciler,
    policy: RetryPolicy,
}

impl RetryingReconciler {
    pub fn new(inner: LeadReconciler, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn reconcile(
        &self,
        creds: &Credentials,
        lead: &LeadInput,
    ) -> Result<ReconciliationResult, ReconciliationError> {
        let mut attempt: u32 = 0;
        self.policy
            .execute(|| {
                let creation_uncertain = attempt > 0;
                attempt += 1;
                self.inner.reconcile_attempt(creds, lead, creation_uncertain)
            })
            .await
    }
}
