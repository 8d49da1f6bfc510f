//! Lead form sanitization and validation.
//!
//! Produces the [`LeadInput`] the reconciler expects; the reconciler does not
//! re-check formats.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::integrations::LeadInput;

static DISALLOWED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[<>"'&;()]"#).expect("static regex"));
static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\w.-]+@[\w.-]+\.\w+$").expect("static regex"));

pub const PHONE_MIN_DIGITS: usize = 7;
pub const PHONE_MAX_DIGITS: usize = 15;

/// Raw lead fields as posted by the browser.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LeadForm {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub company: String,
    pub address: String,
    pub comments: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Strip characters that have no business in a lead field.
pub fn sanitize_input(s: &str) -> String {
    DISALLOWED.replace_all(s, "").trim().to_string()
}

pub fn validate_email(email: &str) -> bool {
    EMAIL.is_match(email)
}

/// Digits only. `Ok(None)` when no phone was given.
pub fn normalize_phone(raw: &str) -> Result<Option<String>, FieldError> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        if raw.trim().is_empty() {
            return Ok(None);
        }
        return Err(FieldError::new("phone", "Phone number must contain digits."));
    }
    if !(PHONE_MIN_DIGITS..=PHONE_MAX_DIGITS).contains(&digits.len()) {
        return Err(FieldError::new(
            "phone",
            format!(
                "Phone number must have between {} and {} digits.",
                PHONE_MIN_DIGITS, PHONE_MAX_DIGITS
            ),
        ));
    }
    Ok(Some(digits))
}

impl LeadForm {
    /// Copy of the form with every field sanitized, for re-rendering.
    pub fn sanitized(&self) -> Self {
        Self {
            first_name: sanitize_input(&self.first_name),
            last_name: sanitize_input(&self.last_name),
            email: sanitize_input(&self.email),
            phone: sanitize_input(&self.phone),
            company: sanitize_input(&self.company),
            address: sanitize_input(&self.address),
            comments: sanitize_input(&self.comments),
        }
    }

    /// Sanitize and validate, reporting every failing field at once.
    pub fn validate(&self) -> Result<LeadInput, Vec<FieldError>> {
        let clean = self.sanitized();
        let mut errors = Vec::new();

        if clean.first_name.is_empty() {
            errors.push(FieldError::new("first_name", "First name is required."));
        }
        if clean.last_name.is_empty() {
            errors.push(FieldError::new("last_name", "Last name is required."));
        }
        if clean.email.is_empty() {
            errors.push(FieldError::new("email", "Email is required."));
        } else if !validate_email(&clean.email) {
            errors.push(FieldError::new("email", "Invalid email address."));
        }

        let phone = match normalize_phone(&clean.phone) {
            Ok(phone) => phone,
            Err(err) => {
                errors.push(err);
                None
            }
        };

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(LeadInput {
            first_name: clean.first_name,
            last_name: clean.last_name,
            email: clean.email,
            phone,
            company_name: optional(clean.company),
            address: optional(clean.address),
            comments: optional(clean.comments),
        })
    }
}

fn optional(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}
