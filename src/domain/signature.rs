//! Stack signatures used as probabilistic filter input.
//!
//! A signature is the concatenation of frame representations, either of the
//! whole frame array or of the first [`HEAD_FRAMES`] frames (the throw site and
//! its immediate callers). Head signatures carry a leading tag byte so a short
//! stack's head never aliases its full signature in a shared filter.
//! Signatures are derived on demand and dropped after the filter call.

use crate::domain::exception::StackFrame;
use ahash::{AHasher, RandomState};
use std::fmt;
use std::hash::{BuildHasher, Hasher};

/// Number of leading frames in a head signature.
pub const HEAD_FRAMES: usize = 3;

// Frame text never contains control bytes.
const HEAD_TAG: u8 = 0x01;

// Second hash family for double hashing. Fixed so that signatures hash the
// same way for the lifetime of the process.
const SECONDARY_SEEDS: [u64; 4] = [
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
];

/// Byte signature of a stack trace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StackSignature {
    bytes: Vec<u8>,
}

impl StackSignature {
    /// Signature over every frame.
    pub fn full(frames: &[StackFrame]) -> Self {
        Self::from_frames(None, frames)
    }

    /// Signature over the first [`HEAD_FRAMES`] frames (fewer if the stack is shorter).
    pub fn head(frames: &[StackFrame]) -> Self {
        Self::from_frames(Some(HEAD_TAG), &frames[..frames.len().min(HEAD_FRAMES)])
    }

    fn from_frames(tag: Option<u8>, frames: &[StackFrame]) -> Self {
        let capacity = frames.iter().map(|f| f.repr().len()).sum::<usize>() + 1;
        let mut bytes = Vec::with_capacity(capacity);
        bytes.extend(tag);
        for frame in frames {
            bytes.extend_from_slice(frame.repr().as_bytes());
        }
        Self { bytes }
    }

    /// Build a signature from raw bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Two independent 64-bit hashes, used for double hashing by the filters.
    pub fn hashes(&self) -> (u64, u64) {
        let mut primary = AHasher::default();
        primary.write(&self.bytes);

        let mut secondary = RandomState::with_seeds(
            SECONDARY_SEEDS[0],
            SECONDARY_SEEDS[1],
            SECONDARY_SEEDS[2],
            SECONDARY_SEEDS[3],
        )
        .build_hasher();
        secondary.write(&self.bytes);

        // An even step would only ever reach half of a power-of-two table.
        (primary.finish(), secondary.finish() | 1)
    }
}

impl fmt::Display for StackSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.hashes().0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(reprs: &[&str]) -> Vec<StackFrame> {
        reprs.iter().map(|r| StackFrame::new(*r)).collect()
    }

    #[test]
    fn test_identical_stacks_same_signature() {
        let a = frames(&["a.A.x(A.java:1)", "b.B.y(B.java:2)"]);
        let b = frames(&["a.A.x(A.java:1)", "b.B.y(B.java:2)"]);

        assert_eq!(StackSignature::full(&a), StackSignature::full(&b));
        assert_eq!(
            StackSignature::full(&a).hashes(),
            StackSignature::full(&b).hashes()
        );
    }

    #[test]
    fn test_different_stacks_different_signature() {
        let a = frames(&["a.A.x(A.java:1)"]);
        let b = frames(&["a.A.x(A.java:2)"]);

        assert_ne!(StackSignature::full(&a), StackSignature::full(&b));
        assert_ne!(
            StackSignature::full(&a).hashes(),
            StackSignature::full(&b).hashes()
        );
    }

    #[test]
    fn test_head_uses_first_three_frames() {
        let long = frames(&["1", "2", "3", "4", "5"]);
        let other_tail = frames(&["1", "2", "3", "9"]);

        assert_eq!(StackSignature::head(&long), StackSignature::head(&other_tail));
        assert_eq!(StackSignature::head(&long).as_bytes(), b"\x01123");
        assert_ne!(StackSignature::full(&long), StackSignature::full(&other_tail));
    }

    #[test]
    fn test_head_of_short_stack_differs_from_full() {
        let short = frames(&["only"]);
        assert_ne!(StackSignature::head(&short), StackSignature::full(&short));
        assert_ne!(
            StackSignature::head(&short).hashes(),
            StackSignature::full(&short).hashes()
        );

        let three = frames(&["1", "2", "3"]);
        assert_ne!(StackSignature::head(&three), StackSignature::full(&three));
    }

    #[test]
    fn test_empty_stack() {
        let sig = StackSignature::full(&[]);
        assert!(sig.is_empty());
        assert_eq!(sig.hashes(), StackSignature::from_bytes(Vec::new()).hashes());
    }

    #[test]
    fn test_secondary_hash_is_odd() {
        let sig = StackSignature::from_bytes("anything");
        assert_eq!(sig.hashes().1 % 2, 1);
    }

    #[test]
    fn test_display_format() {
        let sig = StackSignature::from_bytes("x");
        assert_eq!(format!("{}", sig).len(), 16);
    }
}
