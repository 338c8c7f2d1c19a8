//! Structured logging for callbridge.
//!
//! Console + rolling JSON file output, and redaction helpers so
//! destination numbers and credentials never land in logs verbatim.

pub mod logger;
pub mod redact;

pub use logger::init_logging;
pub use redact::{mask_destination, redact_text};
