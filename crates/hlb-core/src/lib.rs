//! Core domain + application logic for the Headless Lounge bot.
//!
//! This crate is framework-agnostic. The Telegram Bot API and the Patreon /
//! Twitch entitlement services live behind ports (traits) implemented in
//! adapter crates.

pub mod config;
pub mod cursor;
pub mod diagnostics;
pub mod directory;
pub mod domain;
pub mod entitlement;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod platform;
pub mod secrets;
pub mod update;
pub mod utils;

pub use errors::{Error, Result};
