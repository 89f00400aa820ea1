//! Enrollment event bus and notification delivery.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`EnrollmentEvent`]: the event envelope published by the pipeline.
//! - [`delivery`]: outbound mail (SMTP via `lettre`).
//! - [`NotificationRouter`]: background task turning events into emails.
//!
//! Publishing never blocks and never fails the caller; delivery problems
//! are logged by the router.

pub mod bus;
pub mod delivery;
pub mod router;

pub use bus::{EnrollmentEvent, EventBus};
pub use delivery::email::{EmailConfig, EmailDelivery};
pub use delivery::{MailSender, OutgoingEmail};
pub use router::NotificationRouter;
