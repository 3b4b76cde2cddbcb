//! Declarative session scripts in TOML.
//!
//! A script describes a whole duplex session so protocol fixtures can live
//! next to the tests that replay them:
//!
//! ```toml
//! active = true
//!
//! [[step]]
//! write = { data = "01" }
//! read = { data = "02" }
//!
//! [[step]]
//! write = { data = "03 04", within_ms = 50, truncate = 1 }
//! read = { data = "05 06", min_buffer = 2, max_buffer = 16, delay_ms = 5 }
//!
//! [[step]]
//! read = { fail = "unexpected_eof", n = 0 }
//! ```

use crate::duplex::SequencedDuplex;
use crate::error::StepResult;
use crate::matchers;
use crate::step::{ByteSink, ByteSource, Step};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Script loading and validation errors
#[derive(Debug, Error)]
pub enum ScriptError {
    /// Script file could not be read or written
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Script is not valid TOML for this schema
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Script could not be serialized
    #[error("serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A `data` field is not valid hex
    #[error("step {index}: invalid hex data: {source}")]
    Hex {
        /// 1-based step number
        index: usize,
        /// Decoder error
        #[source]
        source: hex::FromHexError,
    },

    /// A step is malformed
    #[error("step {index}: {reason}")]
    InvalidStep {
        /// 1-based step number
        index: usize,
        /// What is wrong with it
        reason: String,
    },
}

/// Result type for script operations
pub type ScriptResult<T> = Result<T, ScriptError>;

/// A complete scripted session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Script {
    /// Whether the scripted side writes first in each step
    #[serde(default)]
    pub active: bool,
    /// Ordered steps
    #[serde(default, rename = "step")]
    pub steps: Vec<StepSpec>,
}

/// One step of a script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StepSpec {
    /// Expected read
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read: Option<ReadSpec>,
    /// Expected write
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write: Option<WriteSpec>,
}

/// Expected read: hand back `data`, or fail with `fail`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ReadSpec {
    /// Hex bytes to return (whitespace between pairs allowed)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// Deliver `data` over several reads of at most this many bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk: Option<usize>,
    /// Minimum accepted buffer length
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_buffer: Option<usize>,
    /// Maximum accepted buffer length
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_buffer: Option<usize>,
    /// Sleep before answering
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
    /// Injected failure kind (see [`parse_error_kind`])
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail: Option<String>,
    /// Byte count reported with `fail`
    #[serde(default)]
    pub n: usize,
}

/// Expected write: must equal `data`, or fail with `fail`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct WriteSpec {
    /// Hex bytes the write must match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// Accept `data` split over several writes
    #[serde(default)]
    pub chunked: bool,
    /// Report this many bytes instead of the real count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncate: Option<usize>,
    /// Sleep before accepting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
    /// Upper bound on how long the write may take
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub within_ms: Option<u64>,
    /// Injected failure kind (see [`parse_error_kind`])
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail: Option<String>,
    /// Byte count reported with `fail`
    #[serde(default)]
    pub n: usize,
}

/// Map a script failure name to an `io::ErrorKind`
#[must_use]
pub fn parse_error_kind(name: &str) -> Option<io::ErrorKind> {
    let kind = match name {
        "unexpected_eof" => io::ErrorKind::UnexpectedEof,
        "broken_pipe" => io::ErrorKind::BrokenPipe,
        "connection_reset" => io::ErrorKind::ConnectionReset,
        "connection_aborted" => io::ErrorKind::ConnectionAborted,
        "timed_out" => io::ErrorKind::TimedOut,
        "write_zero" => io::ErrorKind::WriteZero,
        "interrupted" => io::ErrorKind::Interrupted,
        "other" => io::ErrorKind::Other,
        _ => return None,
    };
    Some(kind)
}

fn decode_hex(index: usize, data: &str) -> ScriptResult<Vec<u8>> {
    let compact: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(compact).map_err(|source| ScriptError::Hex { index, source })
}

fn forward_read(mut source: Box<dyn ByteSource>) -> impl ByteSource {
    move |buf: &mut [u8]| -> StepResult { source.read(buf) }
}

fn forward_write(mut sink: Box<dyn ByteSink>) -> impl ByteSink {
    move |buf: &[u8]| -> StepResult { sink.write(buf) }
}

fn invalid(index: usize, reason: impl Into<String>) -> ScriptError {
    ScriptError::InvalidStep {
        index,
        reason: reason.into(),
    }
}

fn failure_kind(index: usize, fail: &str, conflicts: &[(&str, bool)]) -> ScriptResult<io::ErrorKind> {
    if let Some((field, _)) = conflicts.iter().find(|(_, present)| *present) {
        return Err(invalid(
            index,
            format!("`fail` cannot be combined with `{field}`"),
        ));
    }
    parse_error_kind(fail).ok_or_else(|| invalid(index, format!("unknown failure kind `{fail}`")))
}

fn count_without_failure(index: usize, n: usize) -> ScriptResult<()> {
    if n != 0 {
        return Err(invalid(index, "`n` only applies together with `fail`"));
    }
    Ok(())
}

impl ReadSpec {
    fn build(&self, index: usize) -> ScriptResult<Box<dyn ByteSource>> {
        let mut source: Box<dyn ByteSource> = match (&self.fail, &self.data) {
            (Some(fail), data) => {
                let conflicts = [("data", data.is_some()), ("chunk", self.chunk.is_some())];
                let kind = failure_kind(index, fail, &conflicts)?;
                Box::new(matchers::read_error(kind, self.n))
            }
            (None, Some(data)) => {
                count_without_failure(index, self.n)?;
                let bytes = decode_hex(index, data)?;
                match self.chunk {
                    Some(0) => return Err(invalid(index, "`chunk` must be positive")),
                    Some(chunk) => Box::new(matchers::returns_chunked(&bytes, chunk)),
                    None => Box::new(matchers::returns(&bytes)),
                }
            }
            (None, None) => return Err(invalid(index, "read needs `data` or `fail`")),
        };

        if self.min_buffer.is_some() || self.max_buffer.is_some() {
            let min = self.min_buffer.unwrap_or(0);
            let max = self.max_buffer.unwrap_or(usize::MAX);
            if min > max {
                return Err(invalid(
                    index,
                    format!("empty buffer range [{min}, {max}]"),
                ));
            }
            source = Box::new(matchers::buffer_size_limits(min, max, forward_read(source)));
        }
        if let Some(ms) = self.delay_ms {
            source = Box::new(matchers::delay_read(
                Duration::from_millis(ms),
                forward_read(source),
            ));
        }
        Ok(source)
    }
}

impl WriteSpec {
    fn build(&self, index: usize) -> ScriptResult<Box<dyn ByteSink>> {
        let mut sink: Box<dyn ByteSink> = match (&self.fail, &self.data) {
            (Some(fail), data) => {
                let conflicts = [("data", data.is_some()), ("chunked", self.chunked)];
                let kind = failure_kind(index, fail, &conflicts)?;
                Box::new(matchers::write_error(kind, self.n))
            }
            (None, Some(data)) => {
                count_without_failure(index, self.n)?;
                let bytes = decode_hex(index, data)?;
                if self.chunked {
                    Box::new(matchers::should_write_chunked(&bytes))
                } else {
                    Box::new(matchers::should_write(&bytes))
                }
            }
            (None, None) => return Err(invalid(index, "write needs `data` or `fail`")),
        };

        if let Some(n) = self.truncate {
            sink = Box::new(matchers::truncate_write(n, forward_write(sink)));
        }
        if let Some(ms) = self.delay_ms {
            sink = Box::new(matchers::delay_write(
                Duration::from_millis(ms),
                forward_write(sink),
            ));
        }
        if let Some(ms) = self.within_ms {
            sink = Box::new(matchers::should_write_in(
                Duration::from_millis(ms),
                forward_write(sink),
            ));
        }
        Ok(sink)
    }
}

impl StepSpec {
    fn build(&self, index: usize) -> ScriptResult<Step> {
        if self.read.is_none() && self.write.is_none() {
            return Err(invalid(index, "step needs a `read` or a `write`"));
        }
        let mut step = Step::new();
        if let Some(read) = &self.read {
            step.read = Some(read.build(index)?);
        }
        if let Some(write) = &self.write {
            step.write = Some(write.build(index)?);
        }
        Ok(step)
    }
}

impl Script {
    /// Parse a script from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid script.
    pub fn from_toml_str(contents: &str) -> ScriptResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Load a script from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> ScriptResult<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Save the script to file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> ScriptResult<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, contents)?;
        Ok(())
    }

    /// Check every step without building a duplex
    ///
    /// # Errors
    ///
    /// Returns the first malformed step.
    pub fn validate(&self) -> ScriptResult<()> {
        self.build_steps().map(|_| ())
    }

    /// Build the step list
    ///
    /// # Errors
    ///
    /// Returns the first malformed step.
    pub fn build_steps(&self) -> ScriptResult<Vec<Step>> {
        self.steps
            .iter()
            .enumerate()
            .map(|(i, spec)| spec.build(i + 1))
            .collect()
    }

    /// Build a ready-to-use duplex
    ///
    /// # Errors
    ///
    /// Returns the first malformed step.
    pub fn build_duplex(&self) -> ScriptResult<SequencedDuplex> {
        let steps = self.build_steps()?;
        tracing::debug!(active = self.active, steps = steps.len(), "script loaded");
        Ok(SequencedDuplex::new(self.active, steps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DuplexError, ViolationKind};

    const PING_PONG: &str = r#"
active = true

[[step]]
write = { data = "01" }
read = { data = "02" }

[[step]]
write = { data = "03 04" }
read = { data = "05 06", min_buffer = 2, max_buffer = 2 }
"#;

    #[test]
    fn test_parse_and_replay() {
        let script = Script::from_toml_str(PING_PONG).unwrap();
        assert!(script.active);
        assert_eq!(script.steps.len(), 2);

        let mut rw = script.build_duplex().unwrap();
        let mut buf = [0u8; 2];
        assert_eq!(rw.try_write(&[0x01]).unwrap(), 1);
        assert_eq!(rw.try_read(&mut buf).unwrap(), 1);
        assert_eq!(buf, [0x02, 0x00]);
        assert_eq!(rw.try_write(&[0x03, 0x04]).unwrap(), 2);
        assert_eq!(rw.try_read(&mut buf).unwrap(), 2);
        assert_eq!(buf, [0x05, 0x06]);
        assert!(rw.is_finished());
    }

    #[test]
    fn test_buffer_limits_from_script() {
        let script = Script::from_toml_str(PING_PONG).unwrap();
        let mut rw = script.build_duplex().unwrap();
        let mut one = [0u8; 1];
        rw.try_write(&[0x01]).unwrap();
        rw.try_read(&mut one).unwrap();
        rw.try_write(&[0x03, 0x04]).unwrap();

        let mut big = [0u8; 8];
        let err = rw.try_read(&mut big).unwrap_err();
        assert_eq!(
            err.to_string(),
            "read 8 bytes error @ 2:r1/w1 (invalid read buffer length 8 while expected between [2, 2])"
        );
    }

    #[test]
    fn test_injected_failure() {
        let script = Script::from_toml_str(
            r#"
[[step]]
read = { fail = "unexpected_eof", n = 3 }
"#,
        )
        .unwrap();
        assert!(!script.active);

        let mut rw = script.build_duplex().unwrap();
        let mut buf = [0u8; 4];
        match rw.try_read(&mut buf) {
            Err(DuplexError::Injected { n, source }) => {
                assert_eq!(n, 3);
                assert_eq!(source.kind(), io::ErrorKind::UnexpectedEof);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_truncated_chunked_write() {
        let script = Script::from_toml_str(
            r#"
active = true

[[step]]
write = { data = "AA BB CC", chunked = true, truncate = 1 }
"#,
        )
        .unwrap();
        let mut rw = script.build_duplex().unwrap();
        assert_eq!(rw.try_write(&[0xAA]).unwrap(), 1);
        assert_eq!(rw.try_write(&[0xBB, 0xCC]).unwrap(), 1);
        assert!(rw.is_finished());
    }

    #[test]
    fn test_invalid_steps_rejected() {
        let cases = [
            ("[[step]]\n", "step 1: step needs a `read` or a `write`"),
            (
                "[[step]]\nread = {}\n",
                "step 1: read needs `data` or `fail`",
            ),
            (
                "[[step]]\nread = { fail = \"meteor\" }\n",
                "step 1: unknown failure kind `meteor`",
            ),
            (
                "[[step]]\nwrite = { data = \"01\", fail = \"broken_pipe\" }\n",
                "step 1: `fail` cannot be combined with `data`",
            ),
            (
                "[[step]]\nread = { fail = \"unexpected_eof\", chunk = 2 }\n",
                "step 1: `fail` cannot be combined with `chunk`",
            ),
            (
                "[[step]]\nwrite = { fail = \"broken_pipe\", chunked = true }\n",
                "step 1: `fail` cannot be combined with `chunked`",
            ),
            (
                "[[step]]\nread = { data = \"01\", n = 3 }\n",
                "step 1: `n` only applies together with `fail`",
            ),
            (
                "[[step]]\nwrite = { data = \"01\", n = 1 }\n",
                "step 1: `n` only applies together with `fail`",
            ),
            (
                "[[step]]\nread = { data = \"01\", min_buffer = 4, max_buffer = 2 }\n",
                "step 1: empty buffer range [4, 2]",
            ),
            (
                "[[step]]\nread = { data = \"01\", chunk = 0 }\n",
                "step 1: `chunk` must be positive",
            ),
        ];
        for (text, expected) in cases {
            let script = Script::from_toml_str(text).unwrap();
            let err = script.validate().unwrap_err();
            assert_eq!(err.to_string(), expected, "script: {text}");
        }
    }

    #[test]
    fn test_invalid_hex() {
        let script = Script::from_toml_str("[[step]]\nwrite = { data = \"0G\" }\n").unwrap();
        assert!(matches!(
            script.validate(),
            Err(ScriptError::Hex { index: 1, .. })
        ));
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            Script::from_toml_str("active = \"yes\""),
            Err(ScriptError::Parse(_))
        ));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixtures/ping.toml");

        let script = Script::from_toml_str(PING_PONG).unwrap();
        script.save(&path).unwrap();
        let loaded = Script::load(&path).unwrap();
        assert_eq!(loaded, script);
    }

    #[test]
    fn test_within_ms_violation() {
        let script = Script::from_toml_str(
            r#"
active = true

[[step]]
write = { data = "01", delay_ms = 20, within_ms = 1 }
"#,
        )
        .unwrap();
        let mut rw = script.build_duplex().unwrap();
        let err = rw.try_write(&[0x01]).unwrap_err();
        assert_eq!(
            err.violation().map(|v| v.kind()),
            Some(ViolationKind::WriteMismatch)
        );
    }

    #[test]
    fn test_error_kind_names() {
        assert_eq!(
            parse_error_kind("connection_reset"),
            Some(io::ErrorKind::ConnectionReset)
        );
        assert_eq!(parse_error_kind("eof"), None);
    }
}
