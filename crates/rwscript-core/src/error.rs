//! Error types for scripted duplex streams.
//!
//! Two families of failure exist:
//! - [`ProtocolViolation`]: the code under test deviated from the script. These
//!   are latched by the duplex and repeated on every later call.
//! - Injected I/O errors: a step deliberately simulates a transport failure
//!   (end of stream, reset, ...). These pass through untouched and never latch.

use std::fmt;
use std::io;
use thiserror::Error;

/// Cursor position of a duplex: 1-based step number plus the reads and writes
/// already performed within that step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StepPosition {
    /// 1-based step number
    pub step: usize,
    /// Reads attempted in the current step
    pub reads: usize,
    /// Writes attempted in the current step
    pub writes: usize,
}

impl fmt::Display for StepPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:r{}/w{}", self.step, self.reads, self.writes)
    }
}

/// Category of a protocol violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    /// A read arrived where the script has no read
    UnexpectedRead,
    /// A write arrived where the script has no write
    UnexpectedWrite,
    /// Active side read before performing the step's write
    ReadBeforeWrite,
    /// Passive side wrote before performing the step's read
    WriteBeforeRead,
    /// The step's read matcher rejected the call
    ReadMismatch,
    /// The step's write matcher rejected the call
    WriteMismatch,
    /// Script steps were left unconsumed at the end of a test
    Incomplete,
}

/// A deviation from the script, carrying positional context.
///
/// `Display` yields the full message, e.g.
/// `write [03] error @ 1:r0/w1 (invalid write data while expected [01 02 03])`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ProtocolViolation {
    kind: ViolationKind,
    position: StepPosition,
    message: String,
}

impl ProtocolViolation {
    pub(crate) fn new(kind: ViolationKind, position: StepPosition, message: String) -> Self {
        Self {
            kind,
            position,
            message,
        }
    }

    /// Violation category
    #[must_use]
    pub fn kind(&self) -> ViolationKind {
        self.kind
    }

    /// Position of the duplex when the violation was detected
    #[must_use]
    pub fn position(&self) -> StepPosition {
        self.position
    }

    /// Full human-readable message
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Recover a violation from an `io::Error` produced by the `std::io`
    /// implementations of the duplex.
    #[must_use]
    pub fn from_io(err: &io::Error) -> Option<&Self> {
        err.get_ref()?.downcast_ref::<Self>()
    }
}

impl From<ProtocolViolation> for io::Error {
    fn from(violation: ProtocolViolation) -> Self {
        io::Error::other(violation)
    }
}

/// Error returned by [`SequencedDuplex::try_read`](crate::SequencedDuplex::try_read)
/// and [`SequencedDuplex::try_write`](crate::SequencedDuplex::try_write).
#[derive(Debug, Error)]
pub enum DuplexError {
    /// Latched protocol violation
    #[error(transparent)]
    Protocol(#[from] ProtocolViolation),

    /// Scripted I/O failure, passed through unchanged
    #[error("{source}")]
    Injected {
        /// Byte count the step reported alongside the failure
        n: usize,
        /// The injected error
        #[source]
        source: io::Error,
    },
}

impl DuplexError {
    /// Whether this error poisoned the duplex
    #[must_use]
    pub fn is_latched(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }

    /// Byte count reported with the error (always zero for violations)
    #[must_use]
    pub fn count(&self) -> usize {
        match self {
            Self::Protocol(_) => 0,
            Self::Injected { n, .. } => *n,
        }
    }

    /// The protocol violation, if this is one
    #[must_use]
    pub fn violation(&self) -> Option<&ProtocolViolation> {
        match self {
            Self::Protocol(violation) => Some(violation),
            Self::Injected { .. } => None,
        }
    }
}

impl From<DuplexError> for io::Error {
    fn from(err: DuplexError) -> Self {
        match err {
            DuplexError::Protocol(violation) => violation.into(),
            DuplexError::Injected { source, .. } => source,
        }
    }
}

/// Outcome reported by a step matcher
#[derive(Debug, Error)]
pub enum StepError {
    /// The call did not match the script; the duplex wraps and latches it
    #[error("{0}")]
    Mismatch(String),

    /// The logical operation is incomplete: report the count, keep the step
    #[error("wait next I/O")]
    Repeat(usize),

    /// Simulated transport failure, surfaced to the caller as-is
    #[error("{source}")]
    Io {
        /// Byte count to report with the failure
        n: usize,
        /// The simulated error
        #[source]
        source: io::Error,
    },
}

impl StepError {
    /// Replace the reported byte count of `Repeat` and `Io` outcomes
    #[must_use]
    pub fn with_count(self, n: usize) -> Self {
        match self {
            Self::Mismatch(message) => Self::Mismatch(message),
            Self::Repeat(_) => Self::Repeat(n),
            Self::Io { source, .. } => Self::Io { n, source },
        }
    }
}

impl From<io::Error> for StepError {
    fn from(source: io::Error) -> Self {
        Self::Io { n: 0, source }
    }
}

/// Result type of step matchers
pub type StepResult = Result<usize, StepError>;

/// Formats bytes as `[01 02 FF]`
pub(crate) struct HexList<'a>(pub(crate) &'a [u8]);

impl fmt::Display for HexList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{byte:02X}")?;
        }
        f.write_str("]")
    }
}
