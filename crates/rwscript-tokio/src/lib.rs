//! # rwscript Tokio
//!
//! Async adapter for [`SequencedDuplex`]: implements `tokio::io::AsyncRead`
//! and `tokio::io::AsyncWrite` so code written against async streams can be
//! driven by the same scripts as blocking code.
//!
//! Every poll completes immediately. Matchers that sleep (`delay_read`,
//! `delay_write`) block the executor thread for their duration.
//!
//! ```
//! use rwscript_core::{SequencedDuplex, Step, matchers::{returns, should_write}};
//! use rwscript_tokio::AsyncSequencedDuplex;
//! use tokio::io::{AsyncReadExt, AsyncWriteExt};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> std::io::Result<()> {
//! let mut rw = AsyncSequencedDuplex::new(SequencedDuplex::passive(vec![
//!     Step::reading(returns(b"HELLO")).with_write(should_write(b"WORLD")),
//! ]));
//!
//! let mut buf = [0u8; 5];
//! rw.read_exact(&mut buf).await?;
//! rw.write_all(b"WORLD").await?;
//! assert!(rw.get_ref().is_finished());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use rwscript_core::SequencedDuplex;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// [`SequencedDuplex`] exposed as a tokio stream
#[derive(Debug)]
pub struct AsyncSequencedDuplex {
    inner: SequencedDuplex,
}

impl AsyncSequencedDuplex {
    /// Wrap a duplex
    #[must_use]
    pub fn new(inner: SequencedDuplex) -> Self {
        Self { inner }
    }

    /// Borrow the underlying duplex (for `last_error`, `assert_finished`, ...)
    #[must_use]
    pub fn get_ref(&self) -> &SequencedDuplex {
        &self.inner
    }

    /// Mutably borrow the underlying duplex
    #[must_use]
    pub fn get_mut(&mut self) -> &mut SequencedDuplex {
        &mut self.inner
    }

    /// Unwrap the underlying duplex
    #[must_use]
    pub fn into_inner(self) -> SequencedDuplex {
        self.inner
    }
}

impl From<SequencedDuplex> for AsyncSequencedDuplex {
    fn from(inner: SequencedDuplex) -> Self {
        Self::new(inner)
    }
}

impl AsyncRead for AsyncSequencedDuplex {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let dst = buf.initialize_unfilled();
        let capacity = dst.len();
        match this.inner.try_read(dst) {
            Ok(n) => {
                buf.advance(n.min(capacity));
                Poll::Ready(Ok(()))
            }
            Err(err) => Poll::Ready(Err(err.into())),
        }
    }
}

impl AsyncWrite for AsyncSequencedDuplex {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(self.get_mut().inner.try_write(buf).map_err(io::Error::from))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let inner = &self.get_mut().inner;
        tracing::debug!(
            remaining = inner.remaining_steps(),
            latched = inner.last_error().is_some(),
            "scripted duplex shut down"
        );
        Poll::Ready(Ok(()))
    }
}
