//! The signup worker state machine.
//!
//! One invocation owns one account lifecycle end to end:
//!
//! ```text
//! generate → register → poll mailbox → extract link → verify → persist
//! ```
//!
//! Every stage returns a typed error; the orchestrator catches them all,
//! marks the account `failed` with a diagnostic, and emits a terminal
//! progress event. Nothing propagates to the caller.

pub mod identity;
pub mod links;
pub mod tokens;

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, LOCATION};
use reqwest::{Client, StatusCode};
use serde_json::json;
use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::SignupError;
use crate::mailbox::MailboxClient;
use crate::progress::{ProgressEvent, ProgressSender};
use crate::store::{Account, AccountStatus, AccountStore};
use crate::util::headers::{browser_headers, pick_user_agent};

/// Everything one worker invocation needs. Cloned once per spawned task, so
/// workers share no mutable state.
#[derive(Clone)]
pub struct SignupContext {
    /// Shared HTTP client with redirects disabled — the verification flow
    /// inspects `Location` headers instead of following them.
    pub http: Client,
    pub mailbox: MailboxClient,
    pub store: AccountStore,
    pub progress: ProgressSender,
    pub config: Arc<Config>,
}

/// Run one complete signup-and-verify attempt.
///
/// Failures before an account record exists emit a `failed` event with the
/// sentinel id; afterwards the record is marked `failed` with the full
/// diagnostic and the event carries the concise message.
pub async fn run(ctx: &SignupContext) {
    info!("signup_task_started");

    let identity = identity::generate();
    let domain = identity::pick_domain(&ctx.config.mailbox_domains);

    let email = match ctx.mailbox.create_address(&identity.local_part, domain).await {
        Ok(email) => email,
        Err(err) => {
            let err = SignupError::from(err);
            error!(stage = err.stage(), error = %err, "signup_failed_before_account");
            ctx.progress.emit(ProgressEvent::orphan_failure(
                &format!("{}@{}", identity.local_part, domain),
                &identity.full_name,
                &err.to_string(),
            ));
            return;
        }
    };
    info!(email = %email, "disposable_address_provisioned");

    let account = match ctx.store.create(&email, &identity.full_name).await {
        Ok(account) => account,
        Err(err) => {
            let err = SignupError::from(err);
            error!(email = %email, stage = err.stage(), error = %err, "signup_failed_before_account");
            ctx.progress.emit(ProgressEvent::orphan_failure(
                &email,
                &identity.full_name,
                &err.to_string(),
            ));
            return;
        }
    };
    info!(account_id = account.id, email = %account.email, "account_record_created");

    if let Err(err) = run_stages(ctx, &account, &identity.password).await {
        error!(
            account_id = account.id,
            email = %account.email,
            stage = err.stage(),
            error = %err,
            "signup_failed"
        );

        // Full diagnostic goes to the store; the event stays concise.
        let detail = format!("stage: {}\n{err}\n\n{err:?}", err.stage());
        if let Err(store_err) = ctx.store.mark_failed(account.id, &detail).await {
            error!(account_id = account.id, error = %store_err, "failed_status_write_error");
        }
        ctx.progress.emit(ProgressEvent::for_account(
            &account,
            AccountStatus::Failed,
            &err.to_string(),
        ));
    }
}

/// The happy-path stages, registration through verification.
async fn run_stages(
    ctx: &SignupContext,
    account: &Account,
    password: &str,
) -> Result<(), SignupError> {
    ctx.progress.emit(ProgressEvent::for_account(
        account,
        AccountStatus::CredentialsGenerated,
        "Credentials generated, starting signup.",
    ));

    register(ctx, account, password).await?;
    info!(account_id = account.id, email = %account.email, "signup_registration_accepted");

    ctx.progress.emit(ProgressEvent::for_account(
        account,
        AccountStatus::VerificationLinkSent,
        "Signup request sent, waiting for email.",
    ));

    let user_agent = pick_user_agent(ctx.config.user_agent_pool.as_deref());
    let headers = browser_headers(&user_agent);

    let link = poll_for_link(ctx, &account.email, &headers).await?;

    ctx.progress.emit(ProgressEvent::for_account(
        account,
        AccountStatus::EmailReceived,
        "Verification email received, verifying account.",
    ));

    let location = fetch_redirect_location(ctx, &link, &headers).await?;
    let tokens = tokens::extract_tokens(&location)
        .ok_or_else(|| SignupError::MissingTokens(location.clone()))?;

    if !ctx
        .store
        .mark_verified(account.id, &tokens.access_token, &tokens.refresh_token)
        .await?
    {
        warn!(account_id = account.id, "verified_update_skipped_terminal_row");
    }
    info!(account_id = account.id, email = %account.email, "signup_verified");

    ctx.progress.emit(ProgressEvent::for_account(
        account,
        AccountStatus::Verified,
        "Account successfully verified!",
    ));
    Ok(())
}

/// Submit the registration POST. Non-2xx is terminal for this attempt.
async fn register(
    ctx: &SignupContext,
    account: &Account,
    password: &str,
) -> Result<(), SignupError> {
    let payload = json!({
        "email": account.email,
        "password": password,
        "data": { "full_name": account.full_name },
    });

    info!(email = %account.email, "signup_registration_posting");

    let response = ctx
        .http
        .post(&ctx.config.auth_signup_url)
        .query(&[("redirect_to", ctx.config.auth_redirect_to.as_str())])
        .header("apikey", &ctx.config.auth_api_key)
        .timeout(request_timeout(ctx))
        .json(&payload)
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(SignupError::Registration { status, body });
    }
    Ok(())
}

/// Poll the mailbox until a qualifying link appears or the window closes.
///
/// List failures are logged and retried on the next tick; only the window
/// elapsing is terminal.
async fn poll_for_link(
    ctx: &SignupContext,
    email: &str,
    headers: &HeaderMap,
) -> Result<String, SignupError> {
    let deadline = Instant::now() + ctx.config.poll_timeout;

    while Instant::now() < deadline {
        match ctx.mailbox.list_messages(email).await {
            Ok(messages) => {
                if let Some(link) =
                    links::find_verification_link(&ctx.http, &messages, headers).await
                {
                    info!(email = email, "verification_link_found");
                    return Ok(link);
                }
            }
            Err(err) => {
                warn!(email = email, error = %err, "mailbox_poll_error");
            }
        }
        sleep(ctx.config.poll_interval).await;
    }

    Err(SignupError::EmailTimeout(ctx.config.poll_timeout))
}

/// Fetch the verification link with redirects disabled and return the
/// redirect target, retrying transient failures with a fixed backoff.
async fn fetch_redirect_location(
    ctx: &SignupContext,
    link: &str,
    headers: &HeaderMap,
) -> Result<String, SignupError> {
    let attempts = ctx.config.verify_retries.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match try_fetch_redirect(ctx, link, headers).await {
            Ok(location) => {
                info!(url = link, attempt = attempt, "verification_fetch_redirected");
                return Ok(location);
            }
            Err(message) => {
                warn!(url = link, attempt = attempt, error = %message, "verification_fetch_retry");
                last_error = message;
            }
        }
        if attempt < attempts {
            sleep(ctx.config.verify_backoff).await;
        }
    }

    Err(SignupError::VerificationFetch {
        attempts,
        last_error,
    })
}

/// One verification-fetch attempt.
///
/// 3xx with a `Location` header is the expected shape; a 200 body is scanned
/// for a script or meta-refresh target as a fallback.
async fn try_fetch_redirect(
    ctx: &SignupContext,
    link: &str,
    headers: &HeaderMap,
) -> Result<String, String> {
    let response = ctx
        .http
        .get(link)
        .headers(headers.clone())
        .timeout(request_timeout(ctx))
        .send()
        .await
        .map_err(|err| format!("request error: {err}"))?;

    let status = response.status();

    if status.is_redirection() {
        return response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| format!("redirect {} without Location header", status.as_u16()));
    }

    if status == StatusCode::OK {
        let body = response
            .text()
            .await
            .map_err(|err| format!("body read error: {err}"))?;
        return links::find_body_redirect(&body)
            .ok_or_else(|| "200 response carried no redirect target".to_string());
    }

    Err(format!("unexpected status {}", status.as_u16()))
}

fn request_timeout(ctx: &SignupContext) -> Duration {
    Duration::from_millis(ctx.config.request_timeout_ms)
}
