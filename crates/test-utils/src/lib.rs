//! Shared test utilities for the flood domain generator workspace.
//!
//! This crate provides:
//! - HML product text builders (multi-document XML payloads)
//! - Forecasting API JSON builders (gauge detail, stage/flow, reach)
//! - Scratch directories for extraction artifacts
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Then import in your tests:
//!
//! ```ignore
//! use test_utils::fixtures::{hml_product, hml_site};
//! ```

pub mod fixtures;

pub use fixtures::*;

/// Create an empty scratch directory that is removed on drop.
pub fn artifact_dir() -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix("domains-")
        .tempdir()
        .expect("failed to create scratch directory")
}

/// Assert that an outcome matches a pattern, printing the value otherwise.
///
/// ```ignore
/// assert_matches!(lookup, ForecastLookup::Found(_));
/// ```
#[macro_export]
macro_rules! assert_matches {
    ($value:expr, $pattern:pat $(if $guard:expr)? $(,)?) => {{
        let value = &$value;
        match value {
            $pattern $(if $guard)? => {}
            other => panic!(
                "assertion failed: `{:?}` does not match `{}`",
                other,
                stringify!($pattern)
            ),
        }
    }};
}
