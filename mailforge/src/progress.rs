//! Progress channel between signup workers and the streaming forwarder.
//!
//! Unbounded, ordered, multi-producer, single logical consumer. Consumption
//! is destructive: each event is delivered once, and a consumer that attaches
//! late never sees earlier events. Events for one account arrive in the order
//! the worker reached each stage; events across accounts interleave in
//! insertion order.

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use crate::store::{Account, AccountStatus};

/// Account id carried by events for attempts that died before a record
/// existed.
pub const SENTINEL_ACCOUNT_ID: i64 = -1;

/// One status transition, as seen by stream consumers.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    #[serde(rename = "accountId")]
    pub account_id: i64,
    pub email: String,
    pub full_name: String,
    pub status: AccountStatus,
    pub message: String,
}

impl ProgressEvent {
    /// Event for an existing account record.
    pub fn for_account(account: &Account, status: AccountStatus, message: &str) -> Self {
        Self {
            account_id: account.id,
            email: account.email.clone(),
            full_name: account.full_name.clone(),
            status,
            message: message.to_string(),
        }
    }

    /// Terminal `failed` event for an attempt that never produced a record.
    pub fn orphan_failure(email: &str, full_name: &str, message: &str) -> Self {
        Self {
            account_id: SENTINEL_ACCOUNT_ID,
            email: email.to_string(),
            full_name: full_name.to_string(),
            status: AccountStatus::Failed,
            message: message.to_string(),
        }
    }
}

/// Create a connected sender/receiver pair.
pub fn channel() -> (ProgressSender, ProgressReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ProgressSender { tx }, ProgressReceiver { rx })
}

/// Worker-side handle. Cloned once per spawned signup task.
#[derive(Debug, Clone)]
pub struct ProgressSender {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ProgressSender {
    /// Push an event. Workers run to completion whether or not anything is
    /// draining the channel, so a closed receiver is not an error here.
    pub fn emit(&self, event: ProgressEvent) {
        debug!(
            account_id = event.account_id,
            status = %event.status,
            "progress_event_emitted"
        );
        if self.tx.send(event).is_err() {
            debug!("progress_receiver_gone");
        }
    }
}

/// Consumer-side handle for the streaming forwarder.
#[derive(Debug)]
pub struct ProgressReceiver {
    rx: mpsc::UnboundedReceiver<ProgressEvent>,
}

impl ProgressReceiver {
    /// Await the next event; `None` once every sender has dropped.
    pub async fn next(&mut self) -> Option<ProgressEvent> {
        self.rx.recv().await
    }
}
