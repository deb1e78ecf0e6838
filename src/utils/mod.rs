//! Shared utilities: command-line delay parsing.

pub mod duration;

pub use duration::parse_delay;
