//! Provider-agnostic completion types and the client port.

pub mod client;
pub mod types;
