//! Bravo Common Types
//!
//! This crate contains the shared types of the bravo currency service,
//! including currency codes and kinds, cached rate tables, monetary
//! formatting helpers and the error taxonomy surfaced to callers.

pub mod currency;
pub mod monetary;
pub mod rates;
pub mod error;

pub use currency::*;
pub use monetary::*;
pub use rates::*;
pub use error::*;
