//! MailForge - automated account signup and email verification.
//!
//! This library backs the `mailforge-server` binary: a control API that
//! fans out independent signup worker tasks, each of which registers a
//! fresh identity with the auth provider, waits for the verification email
//! in a disposable inbox, follows the verification link and captures the
//! session tokens.
//!
//! ## Architecture
//!
//! ```text
//! Control API → paced fan-out → Signup Workers → Progress Channel → SSE stream
//!                                     ↓
//!                             Account Store (SQLite)
//! ```

pub mod config;
pub mod error;
pub mod mailbox;
pub mod progress;
pub mod signup;
pub mod store;
pub mod util;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use error::SignupError;
pub use mailbox::{InboxMessage, MailboxClient, MailboxError};
pub use progress::{ProgressEvent, ProgressReceiver, ProgressSender, SENTINEL_ACCOUNT_ID};
pub use signup::SignupContext;
pub use store::{Account, AccountStatus, AccountStore, StoreError};
pub use web::AppState;
