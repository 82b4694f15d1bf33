//! Core types and trait definitions for the Cadence campaign scheduler.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! All other crates depend on it: the storage backend implements its store
//! traits, the engine drives them, and network clients implement
//! [`network::SocialNetwork`].

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod campaign;
pub mod error;
pub mod network;
pub mod post;
pub mod schedule;
pub mod store;

pub use error::{Classify, Error, ErrorKind, Result};
