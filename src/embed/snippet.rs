//! Embeddable iframe markup for hosted lead forms.

use maud::html;
use url::Url;

use super::{EmbedSnippet, SnippetType};

pub const IFRAME_HEIGHT: u32 = 600;

/// URL that serves a stored snippet; the token stays server side.
pub fn embed_url(public_url: &Url, snippet_id: &str) -> Url {
    let mut url = public_url.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(["embed", snippet_id]);
    }
    url
}

/// Direct URL carrying the token in the query string.
pub fn snippet_url(
    public_url: &Url,
    snippet_type: SnippetType,
    token: &str,
    company_id: Option<&str>,
) -> Url {
    let mut url = public_url.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().push("snippet");
    }
    {
        let mut query = url.query_pairs_mut();
        query.clear();
        query.append_pair("snippet_type", snippet_type.as_str());
        query.append_pair("token", token);
        if snippet_type == SnippetType::Listing {
            if let Some(company_id) = company_id.filter(|c| !c.is_empty()) {
                query.append_pair("company_id", company_id);
            }
        }
    }
    url
}

pub fn iframe_for_url(src: &Url) -> String {
    html! {
        iframe src=(src.as_str()) width="100%" height=(IFRAME_HEIGHT) frameborder="0" style="border:0;" {}
    }
    .into_string()
}

pub fn render_iframe(public_url: &Url, snippet: &EmbedSnippet) -> String {
    iframe_for_url(&embed_url(public_url, &snippet.id))
}
