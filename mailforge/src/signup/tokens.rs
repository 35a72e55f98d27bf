//! Session-token extraction from the verification redirect target.
//!
//! The provider delivers `access_token` / `refresh_token` in the URL fragment
//! of the redirect. Some deployments put them in the query string instead,
//! and older ones used `token` / `refresh` — both are tried as fallbacks.

use url::form_urlencoded;
use url::Url;

/// Extracted session token pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
}

/// Extract both tokens from a redirect target, or `None` when either is
/// missing after every fallback.
pub fn extract_tokens(location: &str) -> Option<SessionTokens> {
    let url = Url::parse(location).ok()?;

    // Fragment first: the canonical delivery channel.
    if let Some(fragment) = url.fragment() {
        if let Some(tokens) = pair_from(fragment, "access_token", "refresh_token") {
            return Some(tokens);
        }
    }

    // Query-string fallback.
    if let Some(query) = url.query() {
        if let Some(tokens) = pair_from(query, "access_token", "refresh_token") {
            return Some(tokens);
        }
    }

    // Alternate parameter names, fragment only.
    if let Some(fragment) = url.fragment() {
        if let Some(tokens) = pair_from(fragment, "token", "refresh") {
            return Some(tokens);
        }
    }

    None
}

/// Read a named pair out of urlencoded `key=value` data.
fn pair_from(raw: &str, access_key: &str, refresh_key: &str) -> Option<SessionTokens> {
    let mut access = None;
    let mut refresh = None;

    for (key, value) in form_urlencoded::parse(raw.as_bytes()) {
        if value.is_empty() {
            continue;
        }
        if key == access_key {
            access = Some(value.into_owned());
        } else if key == refresh_key {
            refresh = Some(value.into_owned());
        }
    }

    match (access, refresh) {
        (Some(access_token), Some(refresh_token)) => Some(SessionTokens {
            access_token,
            refresh_token,
        }),
        _ => None,
    }
}
