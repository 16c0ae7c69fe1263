//! Core of the Telegram backup tool.
//!
//! Everything that decides *what* gets sent lives here: archiving, splitting
//! oversized payloads, retrying uploads and sequencing the chat notifications.
//! The Bot API itself sits behind the ports in [`ports`], implemented by the
//! adapter crate.

pub mod archive;
pub mod config;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod fragment;
pub mod logging;
pub mod pipeline;
pub mod ports;
pub mod retry;

pub use errors::{Error, Result};
