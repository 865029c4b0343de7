//! Core domain + application logic for the category file-share bot.
//!
//! This crate is intentionally framework-agnostic. Telegram and sqlite live
//! behind ports (traits) implemented in adapter crates.

pub mod access;
pub mod actions;
pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod ports;
pub mod session;

pub use errors::{Error, Result};
