//! Event-to-email routing.
//!
//! [`NotificationRouter`] subscribes to the [`EventBus`](crate::EventBus)
//! and turns each enrollment event into zero or more emails: a welcome
//! message for the new member, and operator alerts for enrollments that
//! need manual follow-up.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::bus::{
    EnrollmentEvent, EVENT_ENROLLMENT_ABORTED, EVENT_ENROLLMENT_COMPLETED,
    EVENT_FALLBACK_RECORDED, EVENT_RECONCILIATION_REQUIRED,
};
use crate::delivery::{MailSender, OutgoingEmail};

pub struct NotificationRouter {
    sender: Arc<dyn MailSender>,
    /// Operator mailbox for alerts. Alerts are dropped when unset.
    alert_email: Option<String>,
}

impl NotificationRouter {
    pub fn new(sender: Arc<dyn MailSender>, alert_email: Option<String>) -> Self {
        Self {
            sender,
            alert_email,
        }
    }

    /// Run the routing loop until the event bus is dropped.
    pub async fn run(self, mut receiver: broadcast::Receiver<EnrollmentEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => self.route_event(&event).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Notification router lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, notification router shutting down");
                    break;
                }
            }
        }
    }

    async fn route_event(&self, event: &EnrollmentEvent) {
        for email in compose(event, self.alert_email.as_deref()) {
            if let Err(e) = self.sender.send(&email).await {
                tracing::error!(
                    error = %e,
                    event_type = %event.event_type,
                    to = %email.to,
                    "Failed to deliver notification"
                );
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Composition
// ---------------------------------------------------------------------------

/// Emails produced by `event`.
pub fn compose(event: &EnrollmentEvent, alert_email: Option<&str>) -> Vec<OutgoingEmail> {
    let code = event.customer_code.as_deref().unwrap_or("(unassigned)");
    let mut out = Vec::new();

    match event.event_type.as_str() {
        EVENT_ENROLLMENT_COMPLETED => {
            if let Some(to) = event.payload_str("email").filter(|e| !e.trim().is_empty()) {
                let name = event.payload_str("name").unwrap_or("Member");
                let amount = event.payload_str("amountBilled").unwrap_or("0.00");
                out.push(OutgoingEmail {
                    to: to.to_string(),
                    subject: "Welcome to the club".to_string(),
                    body: format!(
                        "Hello {name},\n\nYour membership is active.\n\
                         Member number: {code}\nAmount billed today: ${amount}\n"
                    ),
                });
            }
        }
        EVENT_RECONCILIATION_REQUIRED | EVENT_FALLBACK_RECORDED | EVENT_ENROLLMENT_ABORTED => {
            if let Some(to) = alert_email {
                out.push(OutgoingEmail {
                    to: to.to_string(),
                    subject: format!("[{}] {} {code}", event.tenant, event.event_type),
                    body: format!(
                        "Event: {}\nTenant: {}\nCustomer: {code}\nTime: {}\nDetails: {}",
                        event.event_type,
                        event.tenant,
                        event.timestamp,
                        serde_json::to_string_pretty(&event.payload).unwrap_or_default()
                    ),
                });
            }
        }
        other => {
            tracing::debug!(event_type = other, "No notification for event");
        }
    }

    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
