//! Bravo Currency Registry
//!
//! The registry keeps the set of known currencies and, together with the rate
//! cache, resolves their USD rates and converts amounts between them.

pub mod registry;
pub mod service;
pub mod config;

pub use registry::{CurrencyRegistry, SEED_CURRENCIES};
pub use service::CurrencyService;
pub use config::{ProviderConfig, ServiceConfig};
