//! Integration test crate for the adaptive quiz.
//!
//! This crate has no library code. It only contains integration tests
//! that drive whole quiz flows across the workspace crates.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p quiz-integration-tests
//! ```
