//! Shared test utilities for iepscan integration tests.
//!
//! - `TestHarness`: a service wired to a temp-dir database and blob store
//! - Fake extractors that count calls and return scripted replies

pub mod fakes;
pub mod harness;

pub use fakes::*;
pub use harness::{TestHarness, SAMPLE_TEXT};
