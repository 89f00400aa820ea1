//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async query methods
//! that accept `&PgPool` as the first argument.

pub mod pricing_repo;

pub use pricing_repo::PricingRepo;
