//! Core types for hookchain.
//!
//! This crate provides the vocabulary shared by the interception pipeline
//! (`hookchain-client`) and the transports plugged into it.
//!
//! ## Modules
//!
//! - [`error`]: Error classification codes and HTTP status mapping
//! - [`method`]: Idempotent and safe request method classification

mod error;
mod method;

pub use error::*;
pub use method::*;
