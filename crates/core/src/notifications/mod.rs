//! Fire-and-forget notices emitted on request lifecycle events.
//!
//! Services publish a [`NotificationEvent`] to the [`NotificationDispatcher`] queue and move on.
//! A background worker resolves recipients, renders notices and hands each one to a
//! [`Notifier`]. Delivery failures end at the worker's log line.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

pub mod dispatcher;
pub mod templates;

pub use dispatcher::{
    DispatchSettings, DispatchWorker, NotificationDispatcher, NotificationEvent, QueueStatus,
};
pub use templates::NoticeRenderer;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("notification transport failed: {0}")]
    Transport(String),
    #[error("notification gateway rejected credentials: {0}")]
    Auth(String),
    #[error("notification gateway returned status {status}")]
    Rejected { status: u16 },
    #[error("notice rendering failed: {0}")]
    Render(String),
    #[error("recipient lookup failed: {0}")]
    Directory(String),
}

impl From<tera::Error> for DispatchError {
    fn from(value: tera::Error) -> Self {
        Self::Render(value.to_string())
    }
}

/// Delivery transport for a single notice.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notice: &Notice) -> Result<(), DispatchError>;
}

/// Writes notices to the log instead of delivering them.
#[derive(Clone, Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notice: &Notice) -> Result<(), DispatchError> {
        info!(
            event_name = "notification.logged",
            recipient = %notice.recipient,
            subject = %notice.subject,
            "notification transport not configured; notice logged only"
        );
        Ok(())
    }
}

/// Keeps every delivered notice in memory. Deliveries to `failing_recipient` are refused.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    notices: Arc<Mutex<Vec<Notice>>>,
    failing_recipient: Option<String>,
}

impl RecordingNotifier {
    pub fn failing_for(recipient: impl Into<String>) -> Self {
        Self { notices: Arc::default(), failing_recipient: Some(recipient.into()) }
    }

    pub fn notices(&self) -> Vec<Notice> {
        match self.notices.lock() {
            Ok(notices) => notices.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notice: &Notice) -> Result<(), DispatchError> {
        if self.failing_recipient.as_deref() == Some(notice.recipient.as_str()) {
            return Err(DispatchError::Transport(format!(
                "mailbox {} unavailable",
                notice.recipient
            )));
        }

        match self.notices.lock() {
            Ok(mut notices) => notices.push(notice.clone()),
            Err(poisoned) => poisoned.into_inner().push(notice.clone()),
        }
        Ok(())
    }
}
