//! Script steps and the read/write capabilities they hold.
//!
//! A [`Step`] is one scripted exchange: at most one expected read and at most
//! one expected write. The expectations are single-method capabilities,
//! [`ByteSource`] and [`ByteSink`], implemented for plain closures so matchers
//! can be written inline.

use crate::error::StepResult;
use std::fmt;

/// Produces the bytes a scripted read hands back to the caller
pub trait ByteSource: Send {
    /// Fill `buf` and report how many bytes were produced
    ///
    /// # Errors
    ///
    /// Returns a [`StepError`](crate::StepError) describing a mismatch, a
    /// retry, or an injected I/O failure.
    fn read(&mut self, buf: &mut [u8]) -> StepResult;
}

/// Validates the bytes the caller writes during a scripted write
pub trait ByteSink: Send {
    /// Check `buf` and report how many bytes were consumed
    ///
    /// # Errors
    ///
    /// Returns a [`StepError`](crate::StepError) describing a mismatch, a
    /// retry, or an injected I/O failure.
    fn write(&mut self, buf: &[u8]) -> StepResult;
}

impl<F> ByteSource for F
where
    F: FnMut(&mut [u8]) -> StepResult + Send,
{
    fn read(&mut self, buf: &mut [u8]) -> StepResult {
        self(buf)
    }
}

impl<F> ByteSink for F
where
    F: FnMut(&[u8]) -> StepResult + Send,
{
    fn write(&mut self, buf: &[u8]) -> StepResult {
        self(buf)
    }
}

/// One scripted unit of I/O: an optional read and an optional write.
///
/// ```
/// use rwscript_core::{Step, matchers};
///
/// let step = Step::writing(matchers::should_write(&[0x01]))
///     .with_read(matchers::returns(&[0x02]));
/// assert!(step.has_read() && step.has_write());
/// ```
#[derive(Default)]
pub struct Step {
    pub(crate) read: Option<Box<dyn ByteSource>>,
    pub(crate) write: Option<Box<dyn ByteSink>>,
}

impl Step {
    /// Empty step; useful only as a builder seed
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only step
    #[must_use]
    pub fn reading<S: ByteSource + 'static>(source: S) -> Self {
        Self::new().with_read(source)
    }

    /// Write-only step
    #[must_use]
    pub fn writing<W: ByteSink + 'static>(sink: W) -> Self {
        Self::new().with_write(sink)
    }

    /// Set the expected read
    #[must_use]
    pub fn with_read<S: ByteSource + 'static>(mut self, source: S) -> Self {
        self.read = Some(Box::new(source));
        self
    }

    /// Set the expected write
    #[must_use]
    pub fn with_write<W: ByteSink + 'static>(mut self, sink: W) -> Self {
        self.write = Some(Box::new(sink));
        self
    }

    /// Whether the step expects a read
    #[must_use]
    pub fn has_read(&self) -> bool {
        self.read.is_some()
    }

    /// Whether the step expects a write
    #[must_use]
    pub fn has_write(&self) -> bool {
        self.write.is_some()
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("read", &self.has_read())
            .field("write", &self.has_write())
            .finish()
    }
}
