//! # rwscript Core
//!
//! Scripted duplex streams for testing protocol code byte-for-byte.
//!
//! This crate provides:
//! - [`SequencedDuplex`], a `Read + Write` test double that enforces an exact
//!   sequence of reads and writes
//! - Step matchers for expected bytes, buffer sizes, delays, truncation and
//!   injected I/O failures
//! - TOML session scripts
//! - Error types and handling
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       SequencedDuplex                            │
//! │   (cursor over steps, per-step read/write counters, latching)   │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                           Steps                                  │
//! │   (optional expected read + optional expected write)            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                          Matchers                                │
//! │   (ByteSource / ByteSink closures, composable wrappers)         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use rwscript_core::{SequencedDuplex, Step, matchers::{returns, should_write}};
//! use std::io::{Read, Write};
//!
//! let mut rw = SequencedDuplex::active(vec![
//!     Step::writing(should_write(b"PING")).with_read(returns(b"PONG")),
//! ]);
//!
//! rw.write_all(b"PING").unwrap();
//! let mut reply = [0u8; 4];
//! rw.read_exact(&mut reply).unwrap();
//! assert_eq!(&reply, b"PONG");
//! rw.assert_finished().unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod duplex;
pub mod error;
pub mod matchers;
pub mod script;
pub mod step;

pub use duplex::SequencedDuplex;
pub use error::{
    DuplexError, ProtocolViolation, StepError, StepPosition, StepResult, ViolationKind,
};
pub use script::{Script, ScriptError, ScriptResult};
pub use step::{ByteSink, ByteSource, Step};
