//! Concrete `ProviderAdapter` implementations.
//!
//! The engine depends only on the trait contract in `callbridge-core`;
//! everything here is the provider-specific HTTP plumbing behind it.

pub mod cache;
pub mod classify;
pub mod elevenlabs;
pub mod ultravox;

pub use cache::TtlCache;
pub use classify::{classify_http, classify_transport};
pub use elevenlabs::{ElevenLabsAdapter, VoiceInfo};
pub use ultravox::{AgentInfo, UltravoxAdapter};
