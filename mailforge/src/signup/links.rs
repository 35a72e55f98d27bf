//! Verification-link extraction from email bodies.
//!
//! Strategies run in decreasing specificity: the strict provider URL
//! pattern, a looser host-agnostic variant, then labeled-anchor extraction.
//! Candidates that are not already a direct verify URL are treated as
//! redirect wrappers and resolved with a redirect-disabled fetch. The first
//! qualifying link wins, by message order then pattern order.

use std::sync::LazyLock;

use regex::Regex;
use reqwest::header::{HeaderMap, LOCATION};
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::{debug, warn};
use url::Url;

use crate::mailbox::InboxMessage;

/// Ordered verify-URL patterns. Tune here, not in the worker.
static VERIFY_LINK_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        // Provider-hosted verify URL on a project subdomain.
        Regex::new(
            r#"https?://[A-Za-z0-9.-]+\.supabase\.co/auth/v1/verify\?token=[^&"'\s<>]+[^"'\s<>]*"#,
        )
        .expect("Invalid strict verify pattern"),
        // Looser: any host carrying the verify path and a token parameter.
        Regex::new(r#"https?://[^"'\s<>]+/auth/v1/verify\?token=[^&"'\s<>]+[^"'\s<>]*"#)
            .expect("Invalid loose verify pattern"),
    ]
});

/// Script-based redirect targets in a 200 body.
static SCRIPT_REDIRECT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r#"location(?:\.href)?\s*=\s*["']([^"']+)["']"#)
            .expect("Invalid script redirect pattern"),
        Regex::new(r#"location\.replace\(\s*["']([^"']+)["']\s*\)"#)
            .expect("Invalid script replace pattern"),
    ]
});

/// `url=` target inside a meta-refresh content attribute.
static META_URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)url\s*=\s*['"]?([^'"\s;]+)"#).expect("Invalid meta url pattern")
});

/// Words that mark a confirmation anchor, in text or href.
const CONFIRM_WORDS: &[&str] = &["confirm", "verify", "activate"];

/// Email bodies arrive HTML-escaped more often than not.
fn decode_entities(url: &str) -> String {
    url.replace("&amp;", "&")
}

/// Whether a URL already has the provider verify shape.
pub fn is_verify_url(candidate: &str) -> bool {
    let Ok(url) = Url::parse(candidate) else {
        return false;
    };
    url.path().ends_with("/auth/v1/verify")
        && url.query_pairs().any(|(k, v)| k == "token" && !v.is_empty())
}

/// First pattern match in a message body, strictest pattern first.
pub fn find_pattern_link(body: &str) -> Option<String> {
    for pattern in VERIFY_LINK_PATTERNS.iter() {
        if let Some(found) = pattern.find(body) {
            return Some(decode_entities(found.as_str()));
        }
    }
    None
}

/// Fallback: first confirmation-labeled hyperlink in the body.
pub fn find_confirmation_anchor(body: &str) -> Option<String> {
    let document = Html::parse_document(body);
    let selector = Selector::parse("a[href]").expect("Invalid selector");

    for anchor in document.select(&selector) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        if !(href.starts_with("http://") || href.starts_with("https://")) {
            continue;
        }

        let text = anchor.text().collect::<String>().to_lowercase();
        let href_lower = href.to_lowercase();
        if CONFIRM_WORDS
            .iter()
            .any(|word| text.contains(word) || href_lower.contains(word))
        {
            return Some(decode_entities(href));
        }
    }
    None
}

/// All candidate links in one body, deduplicated, strategy order preserved.
fn candidate_links(body: &str) -> Vec<String> {
    let mut candidates = Vec::new();
    if let Some(link) = find_pattern_link(body) {
        candidates.push(link);
    }
    if let Some(link) = find_confirmation_anchor(body) {
        if !candidates.contains(&link) {
            candidates.push(link);
        }
    }
    debug!(count = candidates.len(), "candidate_links_extracted");
    candidates
}

/// Resolve a redirect wrapper and return its target when that target has
/// the verify shape.
///
/// `client` must have redirects disabled, otherwise the hop we want to
/// inspect is consumed before we see it.
pub async fn resolve_wrapper(
    client: &Client,
    candidate: &str,
    headers: &HeaderMap,
) -> Option<String> {
    let response = match client.get(candidate).headers(headers.clone()).send().await {
        Ok(response) => response,
        Err(err) => {
            warn!(url = candidate, error = %err, "wrapper_resolve_error");
            return None;
        }
    };

    if !response.status().is_redirection() {
        debug!(
            url = candidate,
            status = response.status().as_u16(),
            "wrapper_not_a_redirect"
        );
        return None;
    }

    let location = response
        .headers()
        .get(LOCATION)?
        .to_str()
        .ok()?
        .to_string();

    if is_verify_url(&location) {
        Some(location)
    } else {
        debug!(url = candidate, location = %location, "wrapper_target_not_verify");
        None
    }
}

/// Scan messages in order for the first qualifying verification link.
pub async fn find_verification_link(
    client: &Client,
    messages: &[InboxMessage],
    headers: &HeaderMap,
) -> Option<String> {
    for message in messages {
        for candidate in candidate_links(&message.body) {
            if is_verify_url(&candidate) {
                return Some(candidate);
            }
            if let Some(resolved) = resolve_wrapper(client, &candidate, headers).await {
                return Some(resolved);
            }
        }
    }
    None
}

/// Pull a redirect target out of a 200 body: script-based first, then
/// meta refresh.
pub fn find_body_redirect(body: &str) -> Option<String> {
    for pattern in SCRIPT_REDIRECT_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(body) {
            return Some(decode_entities(&caps[1]));
        }
    }

    let document = Html::parse_document(body);
    let selector = Selector::parse("meta[http-equiv]").expect("Invalid selector");
    for meta in document.select(&selector) {
        let refresh = meta
            .value()
            .attr("http-equiv")
            .is_some_and(|equiv| equiv.eq_ignore_ascii_case("refresh"));
        if !refresh {
            continue;
        }
        if let Some(content) = meta.value().attr("content") {
            if let Some(caps) = META_URL_PATTERN.captures(content) {
                return Some(decode_entities(&caps[1]));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VERIFY: &str =
        "https://proj.supabase.co/auth/v1/verify?token=tok123&type=signup&redirect_to=https%3A%2F%2Fapp";

    #[test]
    fn test_is_verify_url() {
        assert!(is_verify_url(VERIFY));
        assert!(is_verify_url(
            "http://127.0.0.1:9999/auth/v1/verify?token=abc"
        ));
        assert!(!is_verify_url("https://proj.supabase.co/auth/v1/verify"));
        assert!(!is_verify_url("https://proj.supabase.co/other?token=abc"));
        assert!(!is_verify_url("not a url"));
    }

    #[test]
    fn test_strict_pattern_match() {
        let body = format!("Click here to confirm: {VERIFY} — thanks!");
        assert_eq!(find_pattern_link(&body).as_deref(), Some(VERIFY));
    }

    #[test]
    fn test_pattern_decodes_amp_entities() {
        let body =
            "https://proj.supabase.co/auth/v1/verify?token=tok123&amp;type=signup and more text";
        let link = find_pattern_link(body).unwrap();
        assert!(link.contains("token=tok123&type=signup"));
        assert!(!link.contains("&amp;"));
    }

    #[test]
    fn test_loose_pattern_matches_other_hosts() {
        let body = "visit http://127.0.0.1:9999/auth/v1/verify?token=abc now";
        assert_eq!(
            find_pattern_link(body).as_deref(),
            Some("http://127.0.0.1:9999/auth/v1/verify?token=abc")
        );
    }

    #[test]
    fn test_confirmation_anchor_fallback() {
        let body = r#"<html><body>
            <a href="https://example.com/unsubscribe">Unsubscribe</a>
            <a href="https://track.example.com/c/abc123">Confirm your email</a>
        </body></html>"#;
        assert_eq!(
            find_confirmation_anchor(body).as_deref(),
            Some("https://track.example.com/c/abc123")
        );
    }

    #[test]
    fn test_anchor_matched_by_href_when_text_is_generic() {
        let body = r#"<a href="https://mail.example.com/confirm/xyz">Click here</a>"#;
        assert_eq!(
            find_confirmation_anchor(body).as_deref(),
            Some("https://mail.example.com/confirm/xyz")
        );
    }

    #[test]
    fn test_no_candidates_in_plain_body() {
        assert!(find_pattern_link("nothing to see").is_none());
        assert!(find_confirmation_anchor("<p>just text</p>").is_none());
    }

    #[test]
    fn test_body_redirect_script_assignment() {
        let body = r#"<script>window.location.href = "https://x/y#access_token=A";</script>"#;
        assert_eq!(
            find_body_redirect(body).as_deref(),
            Some("https://x/y#access_token=A")
        );
    }

    #[test]
    fn test_body_redirect_location_replace() {
        let body = r#"<script>location.replace('https://x/next')</script>"#;
        assert_eq!(find_body_redirect(body).as_deref(), Some("https://x/next"));
    }

    #[test]
    fn test_body_redirect_meta_refresh() {
        let body = r#"<meta http-equiv="refresh" content="0; url=https://x/meta">"#;
        assert_eq!(find_body_redirect(body).as_deref(), Some("https://x/meta"));
    }

    #[test]
    fn test_body_redirect_absent() {
        assert!(find_body_redirect("<html><body>done</body></html>").is_none());
    }

    #[tokio::test]
    async fn test_wrapped_link_resolved_to_verify_target() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/c/abc123"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", VERIFY))
            .mount(&server)
            .await;

        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();
        let wrapped = format!("{}/c/abc123", server.uri());

        let resolved = resolve_wrapper(&client, &wrapped, &HeaderMap::new()).await;
        assert_eq!(resolved.as_deref(), Some(VERIFY));
    }

    #[tokio::test]
    async fn test_wrapper_with_non_verify_target_discarded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/c/other"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("Location", "https://example.com/home"),
            )
            .mount(&server)
            .await;

        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();
        let wrapped = format!("{}/c/other", server.uri());

        assert!(resolve_wrapper(&client, &wrapped, &HeaderMap::new())
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_find_verification_link_through_wrapper() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/c/abc123"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", VERIFY))
            .mount(&server)
            .await;

        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();

        // The body carries only a wrapped confirmation anchor, no direct link.
        let messages = vec![InboxMessage {
            subject: "Confirm your signup".to_string(),
            body: format!(
                r#"<a href="{}/c/abc123">Confirm your email</a>"#,
                server.uri()
            ),
        }];

        let link = find_verification_link(&client, &messages, &HeaderMap::new()).await;
        assert_eq!(link.as_deref(), Some(VERIFY));
    }

    #[tokio::test]
    async fn test_direct_link_wins_without_resolution() {
        // No mock server mounted: a direct verify URL must short-circuit
        // before any network call.
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();

        let messages = vec![InboxMessage {
            subject: "".to_string(),
            body: format!("verify at {VERIFY}"),
        }];

        let link = find_verification_link(&client, &messages, &HeaderMap::new()).await;
        assert_eq!(link.as_deref(), Some(VERIFY));
    }
}
