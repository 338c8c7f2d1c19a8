//! Telephony gateway implementation (Twilio).
//!
//! Places and cancels call legs and parses the provider's status
//! callbacks. The webhook HTTP endpoint (and its signature
//! verification) belongs to the embedding application.

pub mod status;
pub mod twilio;
pub mod twiml;

pub use status::parse_status_callback;
pub use twilio::TwilioGateway;
pub use twiml::bridge_twiml;
