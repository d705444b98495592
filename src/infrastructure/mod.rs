//! Infrastructure layer - external adapters and integrations.
//!
//! This layer provides adapters for:
//! - Clock abstraction (system time vs mock)
//! - Decision cache (sharded concurrent map)
//! - Property sources (maps, environment, layering)
//! - Stack trace rendering

pub mod cache;
pub mod clock;

/// Mock implementations for testing.
///
/// `MockClock` drives window rotation deterministically and
/// `MockCaptureLayer` records emitted diagnostics.
///
/// To use these mocks in integration tests, add to your `Cargo.toml`:
/// ```toml
/// [dev-dependencies]
/// stack-throttle = { version = "*", features = ["test-helpers"] }
/// ```
#[cfg(any(test, feature = "test-helpers"))]
pub mod mocks;

pub mod properties;
pub mod renderer;
