//! Configuration loading and shared configuration types for the demand
//! synchronization middleware.
//!
//! Configuration is loaded hierarchically from a `configuration/` directory
//! (base file plus an environment-specific file) with `APP`-prefixed
//! environment variable overrides on top.

mod environment;
mod load;
mod secret;

pub mod shared;

pub use environment::Environment;
pub use load::{LoadConfigError, load_config};
pub use secret::SerializableSecretString;
