//! Settings schema for the callbridge service.
//!
//! The engine consumes these as a plain settings object; assembling one
//! (from files, a secret store, or elsewhere) is the embedding
//! application's concern. Nothing here reads environment variables.

pub mod schema;
pub mod validation;

pub use schema::{
    CallbridgeConfig, ElevenLabsConfig, EngineSettings, LoggingSettings, RetryConfig,
    TwilioConfig, UltravoxConfig,
};
pub use validation::{validate, ValidationReport};
