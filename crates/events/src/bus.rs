//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the publish/subscribe hub for [`EnrollmentEvent`]s.
//! It is designed to be shared via `Arc<EventBus>` across the application.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use clubjoin_core::types::{CustomerCode, TenantId};

/// An enrollment finished and the member should receive a confirmation.
pub const EVENT_ENROLLMENT_COMPLETED: &str = "enrollment.completed";
/// The production mirror did not confirm; an operator must reconcile.
pub const EVENT_RECONCILIATION_REQUIRED: &str = "enrollment.reconciliation_required";
/// The customer code came from the fallback path; downstream records
/// were not written.
pub const EVENT_FALLBACK_RECORDED: &str = "enrollment.fallback_recorded";
/// The workflow aborted after at least one write.
pub const EVENT_ENROLLMENT_ABORTED: &str = "enrollment.aborted";

// ---------------------------------------------------------------------------
// EnrollmentEvent
// ---------------------------------------------------------------------------

/// Something that happened to an enrollment.
///
/// Constructed via [`EnrollmentEvent::new`] and enriched with
/// [`with_customer`](EnrollmentEvent::with_customer) and
/// [`with_payload`](EnrollmentEvent::with_payload).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentEvent {
    /// Dot-separated event name, e.g. `"enrollment.completed"`.
    pub event_type: String,

    pub tenant: TenantId,

    /// Customer code, once one has been allocated.
    pub customer_code: Option<String>,

    /// Free-form JSON payload carrying event-specific data.
    pub payload: serde_json::Value,

    /// When the event was created (UTC).
    pub timestamp: DateTime<Utc>,
}

impl EnrollmentEvent {
    pub fn new(event_type: impl Into<String>, tenant: &TenantId) -> Self {
        Self {
            event_type: event_type.into(),
            tenant: tenant.clone(),
            customer_code: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    pub fn with_customer(mut self, code: &CustomerCode) -> Self {
        self.customer_code = Some(code.to_string());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// String field from the payload, if present.
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(serde_json::Value::as_str)
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// In-process fan-out event bus.
pub struct EventBus {
    sender: broadcast::Sender<EnrollmentEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped.
    pub fn publish(&self, event: EnrollmentEvent) {
        // A SendError only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EnrollmentEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
