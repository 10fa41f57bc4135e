//! Notification delivery.
//!
//! Producers enqueue events on a bounded channel; a background worker hands
//! them to the configured sink. Delivery is best-effort: a full queue or a
//! failing sink is logged and never surfaces to the operation that produced
//! the event.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use subsidy_core::ClaimStatus;

use crate::config::NotificationConfig;

/// What happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationKind {
    /// A farmer joined a program for the first time
    FarmerEnrolled {
        farmer_id: String,
        farmer_name: Option<String>,
        program_id: String,
        program_name: String,
    },
    /// A claim moved to a new status
    ClaimStatusChanged {
        claim_id: String,
        program_id: Option<String>,
        status: ClaimStatus,
    },
}

/// A notification addressed to one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub id: String,
    /// User the notification is for
    pub recipient_id: String,
    pub kind: NotificationKind,
    pub created_at: DateTime<Utc>,
}

impl NotificationEvent {
    pub fn new(recipient_id: impl Into<String>, kind: NotificationKind) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            recipient_id: recipient_id.into(),
            kind,
            created_at: Utc::now(),
        }
    }

    /// Short human-readable title.
    pub fn title(&self) -> String {
        match &self.kind {
            NotificationKind::FarmerEnrolled {
                farmer_id,
                farmer_name,
                program_name,
                ..
            } => format!(
                "{} enrolled in {}",
                farmer_name.as_deref().unwrap_or(farmer_id),
                program_name
            ),
            NotificationKind::ClaimStatusChanged { claim_id, status, .. } => {
                format!("Claim {claim_id} is now {status}")
            }
        }
    }
}

/// Delivery failure reported by a sink.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Notification delivery failed: {0}")]
pub struct DeliveryError(pub String);

/// Destination for notifications (push service, mailer, inbox table).
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, event: &NotificationEvent) -> Result<(), DeliveryError>;
}

/// Sink that only logs.
pub struct LoggingSink;

#[async_trait]
impl NotificationSink for LoggingSink {
    async fn deliver(&self, event: &NotificationEvent) -> Result<(), DeliveryError> {
        info!(
            recipient = %event.recipient_id,
            notification_id = %event.id,
            title = %event.title(),
            "Notification"
        );
        Ok(())
    }
}

/// Sink that keeps every event in memory.
#[derive(Default)]
pub struct RecordingSink {
    events: RwLock<Vec<NotificationEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<NotificationEvent> {
        self.events.read().await.clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, event: &NotificationEvent) -> Result<(), DeliveryError> {
        self.events.write().await.push(event.clone());
        Ok(())
    }
}

/// Handle for enqueueing notifications. Cheap to clone.
#[derive(Clone)]
pub struct NotificationDispatcher {
    sender: Option<mpsc::Sender<NotificationEvent>>,
}

impl NotificationDispatcher {
    /// Start the delivery worker. Must be called within a Tokio runtime.
    ///
    /// The worker exits once every dispatcher clone is dropped.
    pub fn spawn(sink: Arc<dyn NotificationSink>, config: &NotificationConfig) -> (Self, Option<JoinHandle<()>>) {
        if !config.enabled {
            return (Self::disabled(), None);
        }

        let (sender, mut receiver) = mpsc::channel::<NotificationEvent>(config.channel_capacity.max(1));
        let handle = tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                match sink.deliver(&event).await {
                    Ok(()) => debug!(notification_id = %event.id, "Notification delivered"),
                    Err(e) => warn!(
                        notification_id = %event.id,
                        recipient = %event.recipient_id,
                        error = %e,
                        "Notification delivery failed"
                    ),
                }
            }
            debug!("Notification worker stopped");
        });

        (Self { sender: Some(sender) }, Some(handle))
    }

    /// Dispatcher that drops every event.
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    /// Enqueue without waiting. Never fails the caller.
    pub fn emit(&self, event: NotificationEvent) {
        let Some(sender) = &self.sender else {
            return;
        };
        if let Err(e) = sender.try_send(event) {
            let (reason, event) = match e {
                mpsc::error::TrySendError::Full(event) => ("queue full", event),
                mpsc::error::TrySendError::Closed(event) => ("worker stopped", event),
            };
            warn!(
                notification_id = %event.id,
                recipient = %event.recipient_id,
                reason,
                "Dropping notification"
            );
        }
    }
}
