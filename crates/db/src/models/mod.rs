//! Row structs for the read-only pricing tables.
//!
//! Each submodule contains a `FromRow` struct matching the database row and
//! a conversion into the corresponding `clubjoin_core` type.

pub mod pricing;
