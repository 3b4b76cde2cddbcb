//! Sequenced duplex state machine.
//!
//! A [`SequencedDuplex`] walks an ordered list of [`Step`]s. Each `read` and
//! `write` is checked against the current step and, on success, may complete
//! it:
//!
//! ```text
//!   active (initiator)            passive (responder)
//!   ──────────────────            ───────────────────
//!   write  ─┐                     read   ─┐
//!   read   ─┴─► next step         write  ─┴─► next step
//! ```
//!
//! A step with only a read (or only a write) completes on that single call,
//! whichever side the duplex plays. Any violation is latched: the duplex
//! answers every later call with the same error.

use crate::error::{
    DuplexError, HexList, ProtocolViolation, StepError, StepPosition, ViolationKind,
};
use crate::step::Step;
use std::io::{self, Read, Write};

/// Scripted read/write stream that enforces an exact I/O sequence
pub struct SequencedDuplex {
    /// Write-first when `true`, read-first when `false`
    active: bool,
    steps: Vec<Step>,
    /// 1-based index of the current step
    cursor: usize,
    reads: usize,
    writes: usize,
    latched: Option<ProtocolViolation>,
}

impl SequencedDuplex {
    /// Create a duplex over `steps`.
    ///
    /// `active = true` scripts the initiator: within a two-sided step it must
    /// write before it may read. `active = false` scripts the responder.
    #[must_use]
    pub fn new(active: bool, steps: Vec<Step>) -> Self {
        Self {
            active,
            steps,
            cursor: 1,
            reads: 0,
            writes: 0,
            latched: None,
        }
    }

    /// Initiator duplex (writes first in each step)
    #[must_use]
    pub fn active(steps: Vec<Step>) -> Self {
        Self::new(true, steps)
    }

    /// Responder duplex (reads first in each step)
    #[must_use]
    pub fn passive(steps: Vec<Step>) -> Self {
        Self::new(false, steps)
    }

    /// Whether this duplex plays the initiator
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Current step and per-step counters
    #[must_use]
    pub fn position(&self) -> StepPosition {
        StepPosition {
            step: self.cursor,
            reads: self.reads,
            writes: self.writes,
        }
    }

    /// The latched violation, if any
    #[must_use]
    pub fn last_error(&self) -> Option<&ProtocolViolation> {
        self.latched.as_ref()
    }

    /// Number of steps not yet completed
    #[must_use]
    pub fn remaining_steps(&self) -> usize {
        (self.steps.len() + 1).saturating_sub(self.cursor)
    }

    /// True when every step completed and nothing was latched
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.latched.is_none() && self.remaining_steps() == 0
    }

    /// End-of-test check: the script must be fully consumed without errors.
    ///
    /// # Errors
    ///
    /// Returns the latched violation, or an [`ViolationKind::Incomplete`]
    /// violation when steps remain.
    pub fn assert_finished(&self) -> Result<(), ProtocolViolation> {
        if let Some(violation) = &self.latched {
            return Err(violation.clone());
        }
        let remaining = self.remaining_steps();
        if remaining > 0 {
            return Err(ProtocolViolation::new(
                ViolationKind::Incomplete,
                self.position(),
                format!(
                    "script incomplete: {remaining} of {} steps remaining @ {}",
                    self.steps.len(),
                    self.position()
                ),
            ));
        }
        Ok(())
    }

    /// Perform a scripted read into `buf`.
    ///
    /// # Errors
    ///
    /// Returns [`DuplexError::Protocol`] when the read deviates from the
    /// script (latched), or [`DuplexError::Injected`] when the step simulates
    /// an I/O failure.
    pub fn try_read(&mut self, buf: &mut [u8]) -> Result<usize, DuplexError> {
        if let Some(violation) = &self.latched {
            return Err(violation.clone().into());
        }

        let len = buf.len();
        if self.cursor > self.steps.len() {
            let message = format!("unexpected read {len} bytes @ {}", self.position());
            return Err(self.latch(ViolationKind::UnexpectedRead, message));
        }

        self.reads += 1;
        let position = self.position();
        let idx = self.cursor - 1;
        let has_write = self.steps[idx].has_write();
        let read_before_write = self.active && self.writes == 0 && has_write;

        let source = match self.steps[idx].read.as_deref_mut() {
            None => {
                let message = format!("unexpected read {len} bytes @ {position}");
                return Err(self.latch(ViolationKind::UnexpectedRead, message));
            }
            Some(_) if read_before_write => {
                let message = format!("unexpected read {len} bytes before write @ {position}");
                return Err(self.latch(ViolationKind::ReadBeforeWrite, message));
            }
            Some(source) => source,
        };

        match source.read(buf) {
            Ok(n) => {
                if self.active || !has_write {
                    self.advance();
                }
                Ok(n)
            }
            Err(StepError::Repeat(n)) => {
                tracing::trace!(%position, n, "read incomplete, holding step");
                Ok(n)
            }
            Err(StepError::Io { n, source }) => {
                tracing::debug!(%position, n, error = %source, "injected read error");
                Err(DuplexError::Injected { n, source })
            }
            Err(StepError::Mismatch(detail)) => {
                let message = format!("read {len} bytes error @ {position} ({detail})");
                Err(self.latch(ViolationKind::ReadMismatch, message))
            }
        }
    }

    /// Perform a scripted write of `buf`.
    ///
    /// # Errors
    ///
    /// Returns [`DuplexError::Protocol`] when the write deviates from the
    /// script (latched), or [`DuplexError::Injected`] when the step simulates
    /// an I/O failure.
    pub fn try_write(&mut self, buf: &[u8]) -> Result<usize, DuplexError> {
        if let Some(violation) = &self.latched {
            return Err(violation.clone().into());
        }

        if self.cursor > self.steps.len() {
            let message = format!("unexpected write {} @ {}", HexList(buf), self.position());
            return Err(self.latch(ViolationKind::UnexpectedWrite, message));
        }

        self.writes += 1;
        let position = self.position();
        let idx = self.cursor - 1;
        let has_read = self.steps[idx].has_read();
        let write_before_read = !self.active && self.reads == 0 && has_read;

        let sink = match self.steps[idx].write.as_deref_mut() {
            None => {
                let message = format!("unexpected write {} @ {position}", HexList(buf));
                return Err(self.latch(ViolationKind::UnexpectedWrite, message));
            }
            Some(_) if write_before_read => {
                let message = format!(
                    "unexpected write {} before read @ {position}",
                    HexList(buf)
                );
                return Err(self.latch(ViolationKind::WriteBeforeRead, message));
            }
            Some(sink) => sink,
        };

        match sink.write(buf) {
            Ok(n) => {
                if !self.active || !has_read {
                    self.advance();
                }
                Ok(n)
            }
            Err(StepError::Repeat(n)) => {
                tracing::trace!(%position, n, "write incomplete, holding step");
                Ok(n)
            }
            Err(StepError::Io { n, source }) => {
                tracing::debug!(%position, n, error = %source, "injected write error");
                Err(DuplexError::Injected { n, source })
            }
            Err(StepError::Mismatch(detail)) => {
                let message = format!("write {} error @ {position} ({detail})", HexList(buf));
                Err(self.latch(ViolationKind::WriteMismatch, message))
            }
        }
    }

    fn advance(&mut self) {
        tracing::debug!(
            step = self.cursor,
            reads = self.reads,
            writes = self.writes,
            "step complete"
        );
        self.cursor += 1;
        self.reads = 0;
        self.writes = 0;
    }

    fn latch(&mut self, kind: ViolationKind, message: String) -> DuplexError {
        let violation = ProtocolViolation::new(kind, self.position(), message);
        tracing::warn!(?kind, "{}", violation);
        self.latched = Some(violation.clone());
        DuplexError::Protocol(violation)
    }
}

impl std::fmt::Debug for SequencedDuplex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequencedDuplex")
            .field("active", &self.active)
            .field("steps", &self.steps.len())
            .field("position", &self.position())
            .field("latched", &self.latched)
            .finish()
    }
}

impl Read for SequencedDuplex {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.try_read(buf).map_err(io::Error::from)
    }
}

impl Write for SequencedDuplex {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.try_write(buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
