#![forbid(unsafe_code)]

//! Non-fatal reporting channel.
//!
//! Everything detectable at runtime that is *wrong but survivable* — malformed
//! option shapes, instance-only options used during definition composition,
//! reserved component names, runaway update loops — flows through [`warn`].
//! Execution always continues with a documented fallback; nothing here panics
//! or returns errors.

use crate::config;

/// Report a survivable misuse.
///
/// Delivery order: a configured handler wins outright; otherwise the message
/// is emitted through `tracing` unless the configuration is silent.
pub fn warn(msg: &str) {
    if let Some(handler) = config::warn_handler() {
        handler(msg);
        return;
    }
    if !config::is_silent() {
        tracing::warn!(target: "reflow", "{msg}");
    }
}

/// Report a non-actionable hint. Never routed to the warning handler.
pub fn tip(msg: &str) {
    if !config::is_silent() {
        tracing::info!(target: "reflow", "{msg}");
    }
}
