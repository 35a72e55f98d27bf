//! Worker error taxonomy.
//!
//! Every stage of the signup state machine returns a typed error; the
//! orchestrator aggregates them into the account's terminal state instead of
//! letting anything propagate to the control surface.

use std::time::Duration;

use thiserror::Error;

use crate::mailbox::MailboxError;
use crate::store::StoreError;

/// A stage-level failure of one signup attempt.
#[derive(Debug, Error)]
pub enum SignupError {
    /// The disposable-inbox service could not provision an address or
    /// answer a poll.
    #[error("disposable mailbox unavailable: {0}")]
    Mailbox(#[from] MailboxError),

    /// The account record store rejected a write.
    #[error("account store error: {0}")]
    Store(#[from] StoreError),

    /// The signup POST never reached the auth provider.
    #[error("auth provider unreachable: {0}")]
    AuthUnreachable(#[from] reqwest::Error),

    /// The auth provider answered the signup POST with a non-2xx status.
    #[error("signup rejected with status {status}: {body}")]
    Registration { status: u16, body: String },

    /// No qualifying verification link arrived within the polling window.
    #[error("timed out waiting for verification email after {0:?}")]
    EmailTimeout(Duration),

    /// The verification-link fetch kept failing until retries ran out.
    #[error("verification fetch failed after {attempts} attempts: {last_error}")]
    VerificationFetch { attempts: u32, last_error: String },

    /// The redirect target carried no extractable session tokens.
    #[error("no session tokens in redirect target: {0}")]
    MissingTokens(String),
}

impl SignupError {
    /// Stage label for structured logging and the persisted error log.
    pub fn stage(&self) -> &'static str {
        match self {
            SignupError::Mailbox(_) => "mailbox",
            SignupError::Store(_) => "store",
            SignupError::AuthUnreachable(_) | SignupError::Registration { .. } => "registration",
            SignupError::EmailTimeout(_) => "email_poll",
            SignupError::VerificationFetch { .. } => "verification_fetch",
            SignupError::MissingTokens(_) => "token_extraction",
        }
    }
}
