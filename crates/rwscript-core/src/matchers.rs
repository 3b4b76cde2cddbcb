//! Ready-made step matchers.
//!
//! Sources (`returns`, `buffer_size_limits`, ...) script what a read hands
//! back; sinks (`should_write`, `truncate_write`, ...) script what a write must
//! look like. Wrappers take another matcher and decorate it, so they compose:
//!
//! ```
//! use rwscript_core::{SequencedDuplex, Step, matchers::*};
//! use std::time::Duration;
//!
//! let step = Step::writing(should_write_in(Duration::from_secs(1), should_write(b"HELO")))
//!     .with_read(buffer_size_limits(4, 64, returns(b"OK\r\n")));
//! let rw = SequencedDuplex::active(vec![step]);
//! assert_eq!(rw.remaining_steps(), 1);
//! ```

use crate::error::{HexList, StepError, StepResult};
use crate::step::{ByteSink, ByteSource};
use std::io;
use std::time::{Duration, Instant};

/// Read hands back exactly `data`; a buffer shorter than `data` is a mismatch.
pub fn returns(data: &[u8]) -> impl ByteSource + use<> {
    let data = data.to_vec();
    move |buf: &mut [u8]| -> StepResult {
        if buf.len() < data.len() {
            return Err(StepError::Mismatch(format!(
                "buffer too small for data {}",
                HexList(&data)
            )));
        }
        buf[..data.len()].copy_from_slice(&data);
        Ok(data.len())
    }
}

/// Read hands back `data` in pieces of at most `chunk` bytes, one piece per
/// call. Every piece but the last keeps the step open; a read after the last
/// piece starts over from the first, like [`returns`] repeating its data.
pub fn returns_chunked(data: &[u8], chunk: usize) -> impl ByteSource + use<> {
    let data = data.to_vec();
    let chunk = chunk.max(1);
    let mut offset = 0;
    move |buf: &mut [u8]| -> StepResult {
        let end = (offset + chunk).min(data.len());
        let piece = &data[offset..end];
        if buf.len() < piece.len() {
            return Err(StepError::Mismatch(format!(
                "buffer too small for data {}",
                HexList(piece)
            )));
        }
        buf[..piece.len()].copy_from_slice(piece);
        if end < data.len() {
            offset = end;
            Err(StepError::Repeat(piece.len()))
        } else {
            offset = 0;
            Ok(piece.len())
        }
    }
}

/// Rejects reads whose buffer length falls outside `[min, max]`.
pub fn buffer_size_limits<S: ByteSource>(min: usize, max: usize, mut source: S) -> impl ByteSource {
    move |buf: &mut [u8]| -> StepResult {
        let len = buf.len();
        if len < min || len > max {
            return Err(StepError::Mismatch(format!(
                "invalid read buffer length {len} while expected between [{min}, {max}]"
            )));
        }
        source.read(buf)
    }
}

/// Sleeps for `delay` before delegating the read.
pub fn delay_read<S: ByteSource>(delay: Duration, mut source: S) -> impl ByteSource {
    move |buf: &mut [u8]| -> StepResult {
        std::thread::sleep(delay);
        source.read(buf)
    }
}

/// Read fails with a fresh `io::Error` of `kind`, reporting `n` bytes.
pub fn read_error(kind: io::ErrorKind, n: usize) -> impl ByteSource {
    move |_: &mut [u8]| -> StepResult {
        Err(StepError::Io {
            n,
            source: io::Error::from(kind),
        })
    }
}

/// Write must equal `data` exactly.
pub fn should_write(data: &[u8]) -> impl ByteSink + use<> {
    let data = data.to_vec();
    move |buf: &[u8]| -> StepResult {
        if buf != data.as_slice() {
            return Err(StepError::Mismatch(format!(
                "invalid write data while expected {}",
                HexList(&data)
            )));
        }
        Ok(buf.len())
    }
}

/// Write may arrive over several calls; their concatenation must equal
/// `data`. Every call before the last keeps the step open.
pub fn should_write_chunked(data: &[u8]) -> impl ByteSink + use<> {
    let data = data.to_vec();
    let mut seen = 0;
    move |buf: &[u8]| -> StepResult {
        let rest = &data[seen..];
        if buf.len() > rest.len() || buf != &rest[..buf.len()] {
            return Err(StepError::Mismatch(format!(
                "invalid write data at offset {seen} while expected {}",
                HexList(rest)
            )));
        }
        seen += buf.len();
        if seen < data.len() {
            Err(StepError::Repeat(buf.len()))
        } else {
            Ok(buf.len())
        }
    }
}

/// Fails when the delegated write takes longer than `bound`.
pub fn should_write_in<W: ByteSink>(bound: Duration, mut sink: W) -> impl ByteSink {
    move |buf: &[u8]| -> StepResult {
        let start = Instant::now();
        let result = sink.write(buf);
        let elapsed = start.elapsed();
        if elapsed > bound {
            return Err(StepError::Mismatch(format!(
                "write done in {elapsed:?} while expected in {bound:?}"
            )));
        }
        result
    }
}

/// Sleeps for `delay` before delegating the write.
pub fn delay_write<W: ByteSink>(delay: Duration, mut sink: W) -> impl ByteSink {
    move |buf: &[u8]| -> StepResult {
        std::thread::sleep(delay);
        sink.write(buf)
    }
}

/// Delegates the write but reports `n` bytes instead of the real count.
///
/// The reported count never exceeds the length of the written buffer.
pub fn truncate_write<W: ByteSink>(n: usize, mut sink: W) -> impl ByteSink {
    move |buf: &[u8]| -> StepResult {
        let n = n.min(buf.len());
        sink.write(buf).map(|_| n).map_err(|err| err.with_count(n))
    }
}

/// Write fails with a fresh `io::Error` of `kind`, reporting `n` bytes.
pub fn write_error(kind: io::ErrorKind, n: usize) -> impl ByteSink {
    move |_: &[u8]| -> StepResult {
        Err(StepError::Io {
            n,
            source: io::Error::from(kind),
        })
    }
}
