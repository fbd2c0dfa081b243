//! Core domain + application logic for the Telegram image bot.
//!
//! This crate is intentionally framework-agnostic. Telegram and OpenAI live
//! behind ports (traits) implemented in adapter crates.

pub mod config;
pub mod dispatch;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod messaging;
pub mod model;
pub mod security;
pub mod store;

pub use errors::{Error, Result};
