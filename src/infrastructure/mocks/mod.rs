//! Test doubles for infrastructure adapters.
//!
//! Public so integration tests and embedders can drive window rotation and
//! inspect diagnostics deterministically.

pub mod clock;
pub mod layer;

pub use clock::MockClock;
pub use layer::{CapturedEvent, MockCaptureLayer};
