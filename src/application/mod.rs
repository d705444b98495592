//! Application layer - orchestration of domain logic.
//!
//! This layer coordinates the domain primitives at runtime:
//! - Windowed filters (time-based rotation of probabilistic filters)
//! - Duplicate decision filter (per-occurrence throttling decisions)
//! - Predicate guard and factory (fail-safe construction and invocation)
//! - Configuration resolution
//!
//! ## Ports
//!
//! The application layer defines ports (traits) that infrastructure
//! adapters and the embedding application implement. This keeps the
//! application layer independent from infrastructure details.

pub mod config;
pub mod duplicate;
pub mod factory;
pub mod guard;
pub mod metrics;
pub mod ports;
pub mod window;
