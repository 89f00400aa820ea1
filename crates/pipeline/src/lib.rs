//! The enrollment submission saga.
//!
//! One validated, priced [`PricedEnrollment`] is turned into committed
//! membership, member, contract and receipt rows by a fixed sequence of
//! remote procedure calls, followed by a best-effort production mirror and
//! contract archive. There is no cross-call transaction; see
//! [`orchestrator`] for the failure rules.
//!
//! Modules, leaf to root:
//! - [`allocator`]: customer code allocation with an explicit fallback mode.
//! - [`membership`]: membership, member, guardian, message and contract rows.
//! - [`receipts`]: dues and add-on receipt lines.
//! - [`migration`]: the production finalize call and UPC item writes.
//! - [`archive`]: contract document storage.
//! - [`orchestrator`]: sequences everything and assembles the outcome.

pub mod allocator;
pub mod archive;
pub mod config;
pub mod error;
pub mod membership;
pub mod migration;
pub mod orchestrator;
pub mod receipts;

pub use config::EnrollmentConfig;
pub use error::{EnrollmentError, WriteStep};
pub use orchestrator::{EnrollmentOutcome, EnrollmentReceipt, EnrollmentWorkflow, PricedEnrollment};
