//! Domain model and pure logic for the online membership enrollment service.
//!
//! Nothing in this crate performs I/O. The database layer implements the
//! [`procedure::ProcedureInvoker`] and [`pricing::PricingCatalog`] traits,
//! and the enrollment pipeline drives them.

pub mod catalog;
pub mod enrollment;
pub mod error;
pub mod naming;
pub mod pricing;
pub mod procedure;
pub mod proration;
pub mod types;
