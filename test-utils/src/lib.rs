//! Shared test utilities for the RPC middleware crates.
//!
//! This crate provides:
//! - Proptest generators for calls, errors and trace headers
//! - A scripted mock transport and an in-memory span recorder
//! - Fixtures for the common call scenarios

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod mocks;

pub use generators::*;
pub use mocks::{InMemorySpanRecorder, MockTransport};
