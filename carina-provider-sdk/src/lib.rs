//! Carina Provider SDK
//!
//! The contract between Carina and an infrastructure provider: attribute
//! values, declared schemas, the `Provider` trait, operation timeouts and the
//! state poller used for eventually consistent APIs.

pub mod provider;
pub mod resource;
pub mod schema;
pub mod timeouts;
pub mod wait;
