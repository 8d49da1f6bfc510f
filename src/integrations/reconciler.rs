//! Find-or-create reconciliation of a web lead into CRM contact, company and
//! history records.
//!
//! The pipeline runs five sequential stages. Only contact creation is fatal;
//! every other failure is downgraded to a [`ReconciliationWarning`] on the
//! result so a lead is never lost because an enrichment call failed.

use super::crm::{CreateCompanyRequest, CreateContactRequest, CreateHistoryRequest, CrmClient, PhoneEntry};
use super::{
    AssociationOutcome, CrmError, Credentials, LeadInput, ReconciliationError,
    ReconciliationResult, ReconciliationWarning, Stage, NOTE_SUBJECT,
};

pub const HISTORY_EVENT_TYPE: &str = "Note";

#[derive(Debug, Clone)]
pub struct LeadReconciler {
    crm: CrmClient,
}

/// Working state for a single `reconcile` call.
struct Run<'a> {
    creds: &'a Credentials,
    lead: &'a LeadInput,
    warnings: Vec<ReconciliationWarning>,
}

impl<'a> Run<'a> {
    fn warn(&mut self, stage: Stage, err: &CrmError) {
        log::warn!("lead reconciliation: {} failed: {}", stage, err);
        self.warnings.push(ReconciliationWarning {
            stage,
            message: err.to_string(),
        });
    }
}

impl LeadReconciler {
    pub fn new(crm: CrmClient) -> Self {
        Self { crm }
    }

    pub async fn reconcile(
        &self,
        creds: &Credentials,
        lead: &LeadInput,
    ) -> Result<ReconciliationResult, ReconciliationError> {
        self.reconcile_attempt(creds, lead, false).await
    }

    /// `creation_uncertain` marks a re-run after a contact creation whose
    /// outcome is unknown (timeout, 5xx). A contact matched on such a run may
    /// be the one that attempt created, so it still gets linked to the company.
    pub async fn reconcile_attempt(
        &self,
        creds: &Credentials,
        lead: &LeadInput,
        creation_uncertain: bool,
    ) -> Result<ReconciliationResult, ReconciliationError> {
        check_preconditions(creds, lead)?;
        log::debug!("reconciling lead (scope {:?})", creds.scope_id);

        let mut run = Run {
            creds,
            lead,
            warnings: Vec::new(),
        };

        let (contact_key, matched_existing_contact) = match self.find_contact(&mut run).await {
            Some(key) => (key, true),
            None => (self.create_contact(&run).await?, false),
        };

        let company_key = match lead.company() {
            Some(name) => self.resolve_company(&mut run, name).await,
            None => None,
        };

        let link_contact = !matched_existing_contact || creation_uncertain;
        let association = match &company_key {
            Some(company_key) if link_contact => {
                self.associate(&mut run, &contact_key, company_key).await
            }
            _ => AssociationOutcome::NotAttempted,
        };

        self.write_history(&mut run, &contact_key, company_key.as_deref())
            .await;

        log::info!(
            "lead reconciled: contact={} matched={} company={:?} warnings={}",
            contact_key,
            matched_existing_contact,
            company_key,
            run.warnings.len()
        );

        Ok(ReconciliationResult {
            contact_key,
            company_key,
            matched_existing_contact,
            association,
            warnings: run.warnings,
        })
    }

    /// Stage 1. A failed search is treated as "no match".
    async fn find_contact(&self, run: &mut Run<'_>) -> Option<String> {
        let (creds, lead) = (run.creds, run.lead);
        let candidates = match self.crm.search_contacts_by_email(creds, &lead.email).await {
            Ok(candidates) => candidates,
            Err(err) => {
                run.warn(Stage::ContactSearch, &err);
                return None;
            }
        };

        log::debug!("contact search returned {} candidate(s)", candidates.len());

        candidates
            .into_iter()
            .find(|c| {
                names_match(&c.first_name, &lead.first_name)
                    && names_match(&c.last_name, &lead.last_name)
            })
            .map(|c| c.key)
    }

    /// Stage 2. The only fatal stage.
    async fn create_contact(&self, run: &Run<'_>) -> Result<String, ReconciliationError> {
        let lead = run.lead;
        let request = CreateContactRequest {
            first_name: lead.first_name.clone(),
            last_name: lead.last_name.clone(),
            email: lead.email.clone(),
            phones: lead
                .phone_number()
                .map(|number| PhoneEntry {
                    number: number.to_string(),
                })
                .into_iter()
                .collect(),
        };

        match self.crm.create_contact(run.creds, &request).await {
            Ok(key) => {
                log::debug!("created contact {}", key);
                Ok(key)
            }
            Err(err) => {
                if err.is_transport() {
                    log::error!("contact creation did not complete, outcome unknown: {}", err);
                } else {
                    log::error!("contact creation failed: {}", err);
                }
                let status = err.status();
                Err(match err {
                    CrmError::Transport(message) => ReconciliationError::TransportError(message),
                    CrmError::UpstreamRejected { body, .. } => {
                        ReconciliationError::ContactCreationFailed {
                            status,
                            message: body,
                        }
                    }
                    other => ReconciliationError::ContactCreationFailed {
                        status,
                        message: other.to_string(),
                    },
                })
            }
        }
    }

    /// Stage 3. Exact, case-sensitive name match; otherwise create.
    async fn resolve_company(&self, run: &mut Run<'_>, name: &str) -> Option<String> {
        let creds = run.creds;
        match self.crm.search_companies_by_name(creds, name).await {
            Ok(found) => {
                if let Some(company) = found.into_iter().find(|c| c.name == name) {
                    log::debug!("matched company {}", company.key);
                    return Some(company.key);
                }
            }
            Err(err) => run.warn(Stage::CompanySearch, &err),
        }

        let request = CreateCompanyRequest {
            name: name.to_string(),
            address1: run.lead.address.clone().unwrap_or_default(),
        };
        match self.crm.create_company(creds, &request).await {
            Ok(key) => {
                log::debug!("created company {}", key);
                Some(key)
            }
            Err(err) => {
                run.warn(Stage::CompanyCreate, &err);
                None
            }
        }
    }

    /// Stage 4. Only for contacts created by this call or by an earlier
    /// attempt whose outcome was unknown.
    async fn associate(
        &self,
        run: &mut Run<'_>,
        contact_key: &str,
        company_key: &str,
    ) -> AssociationOutcome {
        match self
            .crm
            .link_contact_to_company(run.creds, contact_key, company_key)
            .await
        {
            Ok(()) => AssociationOutcome::Linked,
            Err(err) => {
                run.warn(Stage::Association, &err);
                AssociationOutcome::NotLinked
            }
        }
    }

    /// Stage 5.
    async fn write_history(&self, run: &mut Run<'_>, contact_key: &str, company_key: Option<&str>) {
        let note = CreateHistoryRequest {
            subject: NOTE_SUBJECT.to_string(),
            notes: run.lead.note_body().to_string(),
            event_type_key: HISTORY_EVENT_TYPE.to_string(),
            linked_contact_keys: vec![contact_key.to_string()],
            linked_company_keys: company_key.map(str::to_string).into_iter().collect(),
        };

        if let Err(err) = self.crm.create_history(run.creds, &note).await {
            run.warn(Stage::History, &err);
        }
    }
}

fn check_preconditions(creds: &Credentials, lead: &LeadInput) -> Result<(), ReconciliationError> {
    let missing: Vec<&str> = [
        ("token", creds.token.as_str()),
        ("first_name", lead.first_name.as_str()),
        ("last_name", lead.last_name.as_str()),
        ("email", lead.email.as_str()),
    ]
    .into_iter()
    .filter(|(_, value)| value.trim().is_empty())
    .map(|(name, _)| name)
    .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ReconciliationError::InvalidInput(format!(
            "missing required field(s): {}",
            missing.join(", ")
        )))
    }
}

fn names_match(candidate: &str, input: &str) -> bool {
    candidate.trim().to_lowercase() == input.trim().to_lowercase()
}
