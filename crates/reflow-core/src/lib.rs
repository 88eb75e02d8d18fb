#![forbid(unsafe_code)]

//! Substrate shared by every reflow crate: runtime configuration, the
//! non-fatal reporting channel, and small cached string utilities.
//!
//! Nothing in the reflow core fails fatally during normal operation. All
//! detectable misuse is routed through [`warn`], which prefers a pluggable
//! handler (see [`config::Config::warn_handler`]) and otherwise emits a
//! `tracing` event, so hosts decide what a warning means for them.

pub mod config;
pub mod report;
pub mod strutil;

pub use config::{Config, configure};
pub use report::{tip, warn};
pub use strutil::{camelize, capitalize, hyphenate, is_builtin_tag};
