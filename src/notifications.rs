use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Serialize;
use tokio::sync::mpsc::{channel, Sender};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config;

/// key: notifications -> operator channel for stuck/failed submissions
///
/// Delivery is fire-and-forget: a full queue or a webhook failure is logged
/// and never propagated to the orchestrator.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NotificationEvent {
    CalculationNeedsReview {
        submission_id: Uuid,
        user_id: Uuid,
        reason: String,
    },
    SubmissionFailed {
        submission_id: Uuid,
        user_id: Uuid,
        reason: String,
    },
}

impl NotificationEvent {
    fn summary(&self) -> String {
        match self {
            NotificationEvent::CalculationNeedsReview {
                submission_id,
                reason,
                ..
            } => format!("submission {submission_id} needs manual review: {reason}"),
            NotificationEvent::SubmissionFailed {
                submission_id,
                reason,
                ..
            } => format!("submission {submission_id} failed validation: {reason}"),
        }
    }
}

#[derive(Clone)]
pub struct NotifierHandle {
    sender: Option<Sender<NotificationEvent>>,
}

impl NotifierHandle {
    /// Handle that only logs. Used by tests and by deployments without any
    /// webhook configured.
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    pub fn notify(&self, event: NotificationEvent) {
        match &self.sender {
            Some(sender) => {
                if let Err(err) = sender.try_send(event) {
                    warn!(%err, "notification queue full; dropping operator event");
                }
            }
            None => info!(notification = %event.summary(), "operator notification (no channel configured)"),
        }
    }
}

pub fn start_notification_worker() -> NotifierHandle {
    if config::SLACK_WEBHOOK_URL.is_none() && config::EMAIL_WEBHOOK_URL.is_none() {
        return NotifierHandle::disabled();
    }

    let (tx, mut rx) = channel(*config::NOTIFY_QUEUE_DEPTH);
    tokio::spawn(async move {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("client build");
        while let Some(event) = rx.recv().await {
            if let Err(err) = deliver(&client, &event).await {
                error!(?err, "failed to deliver operator notification");
            }
        }
    });

    NotifierHandle { sender: Some(tx) }
}

async fn deliver(client: &Client, event: &NotificationEvent) -> Result<()> {
    if let Some(url) = config::SLACK_WEBHOOK_URL.as_deref() {
        let body = serde_json::json!({ "text": event.summary() });
        client
            .post(url)
            .json(&body)
            .send()
            .await
            .context("slack webhook")?
            .error_for_status()
            .context("slack webhook status")?;
    }
    if let Some(url) = config::EMAIL_WEBHOOK_URL.as_deref() {
        client
            .post(url)
            .json(event)
            .send()
            .await
            .context("email webhook")?
            .error_for_status()
            .context("email webhook status")?;
    }
    Ok(())
}
