//! Control-surface endpoint handlers.
//!
//! The handlers stay thin: validate, hand work to spawned signup tasks, and
//! read from the store. Workers run to their own terminal state regardless
//! of what happens to any request here.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures::stream::Stream;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{error, info};

use crate::config::Config;
use crate::mailbox::MailboxClient;
use crate::progress::{self, ProgressReceiver, ProgressSender};
use crate::signup::{self, SignupContext};
use crate::store::{AccountStatus, AccountStore};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub http: Client,
    pub mailbox: MailboxClient,
    pub store: AccountStore,
    pub progress_tx: ProgressSender,
    pub progress_rx: Arc<Mutex<ProgressReceiver>>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        http: Client,
        mailbox: MailboxClient,
        store: AccountStore,
    ) -> Self {
        let (progress_tx, progress_rx) = progress::channel();
        Self {
            config,
            http,
            mailbox,
            store,
            progress_tx,
            progress_rx: Arc::new(Mutex::new(progress_rx)),
        }
    }

    /// Context handed to each spawned worker task.
    fn signup_context(&self) -> SignupContext {
        SignupContext {
            http: self.http.clone(),
            mailbox: self.mailbox.clone(),
            store: self.store.clone(),
            progress: self.progress_tx.clone(),
            config: Arc::clone(&self.config),
        }
    }
}

/// Generic error body.
#[derive(Serialize)]
pub struct ErrorResponse {
    pub detail: &'static str,
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Start Signups
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct StartSignupsParams {
    pub count: u32,
}

#[derive(Serialize)]
pub struct StartSignupsResponse {
    pub message: String,
}

/// Kick off `count` signup attempts.
///
/// Responds immediately; a detached pacing task launches one worker per
/// account with a fixed inter-launch delay so the mailbox and auth provider
/// never see a burst.
pub async fn start_signups(
    State(state): State<AppState>,
    Query(params): Query<StartSignupsParams>,
) -> impl IntoResponse {
    let count = params.count;
    if count == 0 {
        return (
            StatusCode::BAD_REQUEST,
            Json(StartSignupsResponse {
                message: "count must be at least 1".to_string(),
            }),
        );
    }

    info!(count = count, "signup_batch_requested");

    let ctx = state.signup_context();
    let launch_delay = state.config.launch_delay;

    tokio::spawn(async move {
        for launched in 0..count {
            info!(task = launched + 1, total = count, "signup_task_launching");
            let worker_ctx = ctx.clone();
            tokio::spawn(async move {
                signup::run(&worker_ctx).await;
            });
            if launched + 1 < count {
                sleep(launch_delay).await;
            }
        }
    });

    (
        StatusCode::OK,
        Json(StartSignupsResponse {
            message: format!("Initiated signup process for {count} accounts."),
        }),
    )
}

// =============================================================================
// Progress Stream
// =============================================================================

/// Stream progress events as Server-Sent Events.
///
/// Consumption is destructive and there is no replay; a client that attaches
/// late only sees events emitted after it attached. Disconnecting drops this
/// stream, nothing else.
pub async fn stream_progress(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("progress_stream_attached");

    let rx = Arc::clone(&state.progress_rx);
    let stream = futures::stream::unfold(rx, |rx| async move {
        let next = { rx.lock().await.next().await };
        next.map(|event| {
            let sse = Event::default()
                .json_data(&event)
                .unwrap_or_else(|_| Event::default().data("{}"));
            (Ok::<_, Infallible>(sse), rx)
        })
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

// =============================================================================
// Accounts
// =============================================================================

/// Fetch all accounts.
pub async fn list_accounts(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.list().await {
        Ok(accounts) => {
            info!(count = accounts.len(), "accounts_listed");
            (StatusCode::OK, Json(accounts)).into_response()
        }
        Err(err) => {
            error!(error = %err, "accounts_list_failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    detail: "Database query for accounts failed.",
                }),
            )
                .into_response()
        }
    }
}

/// Session tokens of one verified account.
#[derive(Serialize)]
pub struct LoginDetails {
    pub access_token: String,
    pub refresh_token: String,
}

/// Fetch login tokens for a specific account.
pub async fn login_details(
    State(state): State<AppState>,
    Path(account_id): Path<i64>,
) -> impl IntoResponse {
    match state.store.get(account_id).await {
        Ok(None) => {
            info!(account_id = account_id, "login_details_not_found");
            (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    detail: "Account not found.",
                }),
            )
                .into_response()
        }
        Ok(Some(account)) => match (account.status, account.access_token, account.refresh_token) {
            (AccountStatus::Verified, Some(access_token), Some(refresh_token)) => (
                StatusCode::OK,
                Json(LoginDetails {
                    access_token,
                    refresh_token,
                }),
            )
                .into_response(),
            _ => {
                info!(account_id = account_id, "login_details_not_verified");
                (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorResponse {
                        detail: "Account not verified or tokens not available.",
                    }),
                )
                    .into_response()
            }
        },
        Err(err) => {
            error!(account_id = account_id, error = %err, "login_details_failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    detail: "Failed to fetch login details.",
                }),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn test_state() -> AppState {
        let config = Arc::new(Config {
            mailbox_base_url: "http://localhost:0".to_string(),
            mailbox_domains: vec!["tmailbox.net".to_string()],
            auth_signup_url: "http://localhost:0/auth/v1/signup".to_string(),
            auth_api_key: "anon".to_string(),
            auth_redirect_to: "http://localhost:0/activate".to_string(),
            database_url: "sqlite::memory:".to_string(),
            poll_timeout: Duration::from_millis(100),
            poll_interval: Duration::from_millis(20),
            verify_retries: 1,
            verify_backoff: Duration::from_millis(1),
            request_timeout_ms: 200,
            launch_delay: Duration::from_millis(0),
            user_agent_pool: None,
            port: 0,
        });
        let http = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();
        let mailbox =
            MailboxClient::new(config.mailbox_base_url.clone(), Duration::from_millis(200))
                .unwrap();
        let store = AccountStore::in_memory().await.unwrap();
        AppState::new(config, http, mailbox, store)
    }

    #[tokio::test]
    async fn test_health() {
        let response = health().await;
        assert_eq!(response.0.status, "ok");
    }

    #[tokio::test]
    async fn test_start_signups_rejects_zero_count() {
        let state = test_state().await;
        let response = start_signups(State(state), Query(StartSignupsParams { count: 0 }))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_start_signups_acknowledges_immediately() {
        let state = test_state().await;
        let response = start_signups(State(state), Query(StartSignupsParams { count: 3 }))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_login_details_unknown_account() {
        let state = test_state().await;
        let response = login_details(State(state), Path(42)).await.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_login_details_unverified_account() {
        let state = test_state().await;
        let account = state.store.create("p@tmailbox.net", "P").await.unwrap();
        let response = login_details(State(state), Path(account.id))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_login_details_verified_account() {
        let state = test_state().await;
        let account = state.store.create("v@tmailbox.net", "V").await.unwrap();
        state
            .store
            .mark_verified(account.id, "acc", "ref")
            .await
            .unwrap();

        let response = login_details(State(state), Path(account.id))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_list_accounts_empty() {
        let state = test_state().await;
        let response = list_accounts(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
