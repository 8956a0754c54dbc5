//! # IoT Events Test Suite
//!
//! Cross-crate tests for the event bus and its producers.
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── benches/
//! │   └── bus_benchmarks.rs  # Publish, dispatch and codec throughput
//! └── src/integration/
//!     ├── scenarios.rs       # End-to-end scenarios S1-S6
//!     ├── properties.rs      # Bus invariants under generated input
//!     └── producers.rs       # Adapters publishing through filters and the codec
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p iot-tests
//!
//! # By category
//! cargo test -p iot-tests integration::scenarios::
//! cargo test -p iot-tests integration::properties::
//!
//! # Benchmarks
//! cargo bench -p iot-tests
//! ```

#![allow(dead_code)]

pub mod integration;
