use maud::{html, Markup, DOCTYPE};

use crate::form::LeadForm;

const RECAPTCHA_SCRIPT: &str = "https://www.google.com/recaptcha/api.js";

/// Everything the lead form page needs.
#[derive(Debug, Clone, Default)]
pub struct FormView {
    pub heading: String,
    pub theme: String,
    pub values: LeadForm,
    pub messages: Vec<String>,
    /// Hidden inputs carried back on submit (token, company_id or embed).
    pub hidden: Vec<(&'static str, String)>,
    pub recaptcha_site_key: Option<String>,
    /// Rendered without the submit form, e.g. when no token is available.
    pub disabled: bool,
}

fn layout(title: &str, theme: &str, body: Markup) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                title { (title) }
            }
            body class=(format!("theme-{}", theme)) {
                main { (body) }
            }
        }
    }
}

fn text_field(name: &str, label: &str, value: &str, kind: &str, required: bool) -> Markup {
    html! {
        p {
            label for=(name) { (label) }
            input type=(kind) id=(name) name=(name) value=(value) required[required];
        }
    }
}

pub fn form_page(view: &FormView) -> String {
    let values = &view.values;
    let body = html! {
        h1 { (view.heading) }
        @if !view.messages.is_empty() {
            ul class="messages error" {
                @for message in &view.messages {
                    li { (message) }
                }
            }
        }
        @if !view.disabled {
            form method="post" action="/form" {
                @for (name, value) in &view.hidden {
                    input type="hidden" name=(name) value=(value);
                }
                (text_field("first_name", "First name", &values.first_name, "text", true))
                (text_field("last_name", "Last name", &values.last_name, "text", true))
                (text_field("email", "Email", &values.email, "email", true))
                (text_field("phone", "Phone", &values.phone, "tel", false))
                (text_field("company", "Company", &values.company, "text", false))
                (text_field("address", "Address", &values.address, "text", false))
                p {
                    label for="comments" { "Comments" }
                    textarea id="comments" name="comments" rows="4" { (values.comments) }
                }
                @if let Some(site_key) = &view.recaptcha_site_key {
                    div class="g-recaptcha" data-sitekey=(site_key) {}
                }
                button type="submit" { "Submit" }
            }
            @if view.recaptcha_site_key.is_some() {
                script src=(RECAPTCHA_SCRIPT) async defer {}
            }
        }
    };
    layout(&view.heading, &view.theme, body).into_string()
}

pub fn success_page(first_name: &str) -> String {
    let body = html! {
        h1 { "Thank you!" }
        p {
            "Thanks"
            @if !first_name.is_empty() { ", " (first_name) }
            ". We received your details and will be in touch."
        }
    };
    layout("Thank you", "light", body).into_string()
}

pub fn message_page(title: &str, message: &str) -> String {
    let body = html! {
        h1 { (title) }
        p { (message) }
    };
    layout(title, "light", body).into_string()
}
