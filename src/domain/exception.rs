//! Read-only view of a logged exception.
//!
//! The host logging pipeline builds one `ExceptionProxy` tree per logged event.
//! Causes form a chain, suppressed exceptions fan out, and every node carries the
//! frames it was thrown through.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_OCCURRENCE: AtomicU64 = AtomicU64::new(1);

/// Stable identifier for one logical exception occurrence.
///
/// Assigned once when an [`ExceptionProxy`] is built. Clones of the proxy share
/// the identifier, so every sink rendering the same event sees the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OccurrenceId(u64);

impl OccurrenceId {
    fn next() -> Self {
        Self(NEXT_OCCURRENCE.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for OccurrenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where the code of a frame came from (jar, crate, module...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagingData {
    pub code_location: String,
    pub version: String,
    /// `false` when the location was guessed rather than resolved.
    pub exact: bool,
}

impl PackagingData {
    pub fn new(code_location: impl Into<String>, version: impl Into<String>, exact: bool) -> Self {
        Self {
            code_location: code_location.into(),
            version: version.into(),
            exact,
        }
    }
}

/// One frame of a stack trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    repr: String,
    packaging: Option<PackagingData>,
}

impl StackFrame {
    /// Create a frame from its display form, e.g. `com.foo.Bar.baz(Bar.java:10)`.
    pub fn new(repr: impl Into<String>) -> Self {
        Self {
            repr: repr.into(),
            packaging: None,
        }
    }

    /// Attach packaging metadata.
    pub fn with_packaging(mut self, packaging: PackagingData) -> Self {
        self.packaging = Some(packaging);
        self
    }

    /// The bare frame text, without the `at ` prefix.
    pub fn repr(&self) -> &str {
        &self.repr
    }

    pub fn packaging(&self) -> Option<&PackagingData> {
        self.packaging.as_ref()
    }

    /// The rendered line handed to line predicates: `at <frame>`.
    pub fn line(&self) -> String {
        format!("at {}", self.repr)
    }
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at {}", self.repr)
    }
}

/// Immutable view of a thrown exception.
///
/// Cheap to clone: the node is shared behind an `Arc`, and clones keep the
/// same [`OccurrenceId`].
#[derive(Debug, Clone)]
pub struct ExceptionProxy {
    inner: Arc<ExceptionNode>,
}

#[derive(Debug)]
struct ExceptionNode {
    id: OccurrenceId,
    class_name: String,
    message: Option<String>,
    frames: Vec<StackFrame>,
    common_frames: usize,
    suppressed: Vec<ExceptionProxy>,
    cause: Option<ExceptionProxy>,
}

impl ExceptionProxy {
    /// Start building a proxy for an exception of the given class.
    pub fn builder(class_name: impl Into<String>) -> ExceptionProxyBuilder {
        ExceptionProxyBuilder {
            class_name: class_name.into(),
            message: None,
            frames: Vec::new(),
            common_frames: 0,
            suppressed: Vec::new(),
            cause: None,
        }
    }

    pub fn id(&self) -> OccurrenceId {
        self.inner.id
    }

    pub fn class_name(&self) -> &str {
        &self.inner.class_name
    }

    pub fn message(&self) -> Option<&str> {
        self.inner.message.as_deref()
    }

    pub fn frames(&self) -> &[StackFrame] {
        &self.inner.frames
    }

    /// Number of trailing frames shared with the enclosing exception.
    pub fn common_frames(&self) -> usize {
        self.inner.common_frames
    }

    pub fn suppressed(&self) -> &[ExceptionProxy] {
        &self.inner.suppressed
    }

    pub fn cause(&self) -> Option<&ExceptionProxy> {
        self.inner.cause.as_ref()
    }

    /// True when both handles refer to the same occurrence.
    pub fn same_occurrence(&self, other: &ExceptionProxy) -> bool {
        self.inner.id == other.inner.id
    }
}

/// Builder for [`ExceptionProxy`].
#[derive(Debug)]
pub struct ExceptionProxyBuilder {
    class_name: String,
    message: Option<String>,
    frames: Vec<StackFrame>,
    common_frames: usize,
    suppressed: Vec<ExceptionProxy>,
    cause: Option<ExceptionProxy>,
}

impl ExceptionProxyBuilder {
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn frame(mut self, frame: StackFrame) -> Self {
        self.frames.push(frame);
        self
    }

    /// Append frames given by their display form.
    pub fn frames<I, S>(mut self, frames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.frames.extend(frames.into_iter().map(StackFrame::new));
        self
    }

    pub fn common_frames(mut self, common_frames: usize) -> Self {
        self.common_frames = common_frames;
        self
    }

    pub fn suppressed(mut self, suppressed: ExceptionProxy) -> Self {
        self.suppressed.push(suppressed);
        self
    }

    pub fn cause(mut self, cause: ExceptionProxy) -> Self {
        self.cause = Some(cause);
        self
    }

    /// Finish the proxy, assigning it a fresh occurrence id.
    ///
    /// `common_frames` is clamped to the number of frames.
    pub fn build(self) -> ExceptionProxy {
        let common_frames = self.common_frames.min(self.frames.len());
        ExceptionProxy {
            inner: Arc::new(ExceptionNode {
                id: OccurrenceId::next(),
                class_name: self.class_name,
                message: self.message,
                frames: self.frames,
                common_frames,
                suppressed: self.suppressed,
                cause: self.cause,
            }),
        }
    }
}
