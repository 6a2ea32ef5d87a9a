//! # Error Handling
//!
//! Error types shared by the relay, its plugins and the offline manifest tool.

pub mod types;

pub use types::{Error, Result};
