//! Probabilistic set and counting primitives.
//!
//! Both structures are lock-free: bits and counters live in atomics so one
//! instance can be shared by every thread that renders log events. They trade
//! exactness for bounded memory, so false positives (reporting a signature as
//! seen when it was not) are possible and accepted.
//!
//! These stand in for an external probabilistic-filter library. Only the
//! [`ProbabilisticFilter`] surface matters to the windows built on top; the
//! sizing and hashing here aim to match the configured false-positive rates,
//! not any particular library's bit layout.

use crate::domain::signature::StackSignature;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::Duration;

/// Expected insertions per hour of window.
pub const CAPACITY_PER_HOUR: usize = 3000;

/// Hard per-item ceiling of [`CountingFilter`].
pub const MAX_COUNT: u8 = 7;

const BLOOM_FALSE_POSITIVE_RATE: f64 = 0.03;
const COUNTING_FALSE_POSITIVE_RATE: f64 = 0.01;

/// Expected insertions for a filter covering `window`.
///
/// Scales with the window length in whole hours, clamped to `[1, 24]`.
pub fn capacity_for(window: Duration) -> usize {
    let hours = (window.as_secs() / 3600).clamp(1, 24) as usize;
    CAPACITY_PER_HOUR * hours
}

/// Approximate membership structure over stack signatures.
pub trait ProbabilisticFilter: Send + Sync + Debug {
    /// Record a signature.
    ///
    /// Returns `true` if the filter changed as a result, `false` when the
    /// insertion carried no new information (or could not be recorded).
    fn insert(&self, signature: &StackSignature) -> bool;

    /// `false` means definitely never inserted; `true` means probably inserted.
    fn might_contain(&self, signature: &StackSignature) -> bool;
}

fn optimal_slots(expected: usize, fpp: f64) -> usize {
    let n = expected.max(1) as f64;
    let slots = -n * fpp.ln() / (std::f64::consts::LN_2 * std::f64::consts::LN_2);
    (slots.ceil() as usize).max(64)
}

fn optimal_hashes(expected: usize, slots: usize) -> u32 {
    let k = (slots as f64 / expected.max(1) as f64) * std::f64::consts::LN_2;
    (k.round() as u32).clamp(1, 16)
}

fn slot_indexes(signature: &StackSignature, hashes: u32, slots: usize) -> impl Iterator<Item = usize> {
    let (h1, h2) = signature.hashes();
    (0..hashes as u64).map(move |i| (h1.wrapping_add(i.wrapping_mul(h2)) % slots as u64) as usize)
}

/// Bloom filter over atomic 64-bit words.
#[derive(Debug)]
pub struct BloomFilter {
    words: Vec<AtomicU64>,
    bits: usize,
    hashes: u32,
}

impl BloomFilter {
    /// Size the filter for `expected` insertions at a 3% false-positive rate.
    pub fn with_capacity(expected: usize) -> Self {
        let bits = optimal_slots(expected, BLOOM_FALSE_POSITIVE_RATE);
        let word_count = bits.div_ceil(64);
        Self {
            words: (0..word_count).map(|_| AtomicU64::new(0)).collect(),
            bits: word_count * 64,
            hashes: optimal_hashes(expected, bits),
        }
    }

    pub fn bit_size(&self) -> usize {
        self.bits
    }

    pub fn hash_count(&self) -> u32 {
        self.hashes
    }
}

impl ProbabilisticFilter for BloomFilter {
    fn insert(&self, signature: &StackSignature) -> bool {
        let mut changed = false;
        for index in slot_indexes(signature, self.hashes, self.bits) {
            let mask = 1u64 << (index % 64);
            let previous = self.words[index / 64].fetch_or(mask, Ordering::AcqRel);
            changed |= previous & mask == 0;
        }
        changed
    }

    fn might_contain(&self, signature: &StackSignature) -> bool {
        slot_indexes(signature, self.hashes, self.bits).all(|index| {
            let mask = 1u64 << (index % 64);
            self.words[index / 64].load(Ordering::Acquire) & mask != 0
        })
    }
}

/// Counting filter with saturating per-slot counters.
///
/// The approximate count of a signature is the minimum over its slots, capped
/// at [`MAX_COUNT`]. Once a signature reaches the ceiling further insertions
/// are rejected.
#[derive(Debug)]
pub struct CountingFilter {
    counters: Vec<AtomicU8>,
    hashes: u32,
}

impl CountingFilter {
    /// Size the filter for `expected` insertions at a 1% false-positive rate.
    pub fn with_capacity(expected: usize) -> Self {
        let slots = optimal_slots(expected, COUNTING_FALSE_POSITIVE_RATE);
        Self {
            counters: (0..slots).map(|_| AtomicU8::new(0)).collect(),
            hashes: optimal_hashes(expected, slots),
        }
    }

    /// Approximate number of times `signature` was inserted, at most [`MAX_COUNT`].
    pub fn approximate_count(&self, signature: &StackSignature) -> u8 {
        slot_indexes(signature, self.hashes, self.counters.len())
            .map(|index| self.counters[index].load(Ordering::Acquire))
            .min()
            .unwrap_or(0)
    }
}

impl ProbabilisticFilter for CountingFilter {
    fn insert(&self, signature: &StackSignature) -> bool {
        if self.approximate_count(signature) >= MAX_COUNT {
            return false;
        }
        for index in slot_indexes(signature, self.hashes, self.counters.len()) {
            // Saturating increment; a failed update means the slot is already at the ceiling.
            let _ = self.counters[index].fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| {
                (c < MAX_COUNT).then_some(c + 1)
            });
        }
        true
    }

    fn might_contain(&self, signature: &StackSignature) -> bool {
        self.approximate_count(signature) > 0
    }
}
