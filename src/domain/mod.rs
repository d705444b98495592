//! Domain layer - pure logic with no shared runtime state.
//!
//! This layer contains the core concepts of stack-trace deduplication:
//! - Exception proxies and stack frames
//! - Stack signatures and the probabilistic filters that consume them
//! - Line skip predicates and the modes that select them
//! - Parsing of durations and line expressions from configuration
//!
//! All types in this layer are pure and easily testable.

pub mod duration;
pub mod event;
pub mod exception;
pub mod expression;
pub mod filter;
pub mod mode;
pub mod predicate;
pub mod signature;
