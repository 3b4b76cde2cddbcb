//! Test helpers for rwscript integration tests
//!
//! Provides a small framed protocol client to act as "code under test",
//! tracing setup, fixture lookup, and tolerant timing checks for the delay
//! matchers.

use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::time::Duration;

/// Install a test-friendly tracing subscriber once.
///
/// Honors `RUST_LOG`; defaults to `warn` so latched violations show up in
/// failing test output.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Path of a file under `tests/fixtures`
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("fixtures")
        .join(name)
}

/// Length-prefixed message client over any byte stream.
///
/// Wire format: 2-byte big-endian length, then the payload. Header and body
/// go out as two separate writes, the way many real clients behave.
pub struct FramedClient<S> {
    stream: S,
}

impl<S: Read + Write> FramedClient<S> {
    /// Wrap a stream
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Send one framed message
    pub fn send(&mut self, payload: &[u8]) -> io::Result<()> {
        let len = u16::try_from(payload.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "payload too large"))?;
        self.stream.write_all(&len.to_be_bytes())?;
        self.stream.write_all(payload)?;
        self.stream.flush()
    }

    /// Receive one framed message
    pub fn recv(&mut self) -> io::Result<Vec<u8>> {
        let mut header = [0u8; 2];
        self.stream.read_exact(&mut header)?;
        let mut body = vec![0u8; usize::from(u16::from_be_bytes(header))];
        self.stream.read_exact(&mut body)?;
        Ok(body)
    }

    /// Send a request and wait for the reply
    pub fn request(&mut self, payload: &[u8]) -> io::Result<Vec<u8>> {
        self.send(payload)?;
        self.recv()
    }

    /// Borrow the underlying stream
    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Unwrap the underlying stream
    pub fn into_inner(self) -> S {
        self.stream
    }
}

/// Median-based timing check for delay matchers
///
/// Single measurements of sleeps are noisy on loaded CI machines; the median
/// of several samples with a CI-widened upper bound is not.
pub struct TimingValidator {
    samples: Vec<Duration>,
    ci_tolerance_multiplier: f64,
}

impl TimingValidator {
    /// Create a validator expecting `sample_count` samples
    pub fn new(sample_count: usize) -> Self {
        let ci_tolerance_multiplier = if is_ci_environment() { 3.0 } else { 1.5 };
        Self {
            samples: Vec::with_capacity(sample_count),
            ci_tolerance_multiplier,
        }
    }

    /// Add a timing sample
    pub fn add_sample(&mut self, duration: Duration) {
        self.samples.push(duration);
    }

    /// Median of all samples
    pub fn median(&self) -> Option<Duration> {
        if self.samples.is_empty() {
            return None;
        }
        let mut sorted = self.samples.clone();
        sorted.sort();
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            Some((sorted[mid - 1] + sorted[mid]) / 2)
        } else {
            Some(sorted[mid])
        }
    }

    /// Assert every sample waited at least `delay` and the median stays under
    /// `delay + slack` (slack widened in CI).
    ///
    /// # Panics
    ///
    /// Panics if no samples were added or a bound is violated.
    pub fn assert_delay(&self, delay: Duration, slack: Duration) {
        let median = self.median().expect("no samples collected");
        for sample in &self.samples {
            assert!(*sample >= delay, "sample {sample:?} shorter than delay {delay:?}");
        }
        let ceiling = delay + slack.mul_f64(self.ci_tolerance_multiplier);
        assert!(
            median <= ceiling,
            "median {median:?} above ceiling {ceiling:?} (delay {delay:?})"
        );
    }
}

/// Check if running in a CI environment
pub fn is_ci_environment() -> bool {
    std::env::var("CI").is_ok()
        || std::env::var("GITHUB_ACTIONS").is_ok()
        || std::env::var("GITLAB_CI").is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rwscript_core::matchers::{returns, should_write};
    use rwscript_core::{SequencedDuplex, Step};

    #[test]
    fn test_framed_client_request() {
        let rw = SequencedDuplex::active(vec![
            Step::writing(should_write(&[0x00, 0x02])),
            Step::writing(should_write(b"hi")).with_read(returns(&[0x00, 0x03])),
            Step::reading(returns(b"yes")),
        ]);
        let mut client = FramedClient::new(rw);
        assert_eq!(client.request(b"hi").unwrap(), b"yes");
        assert!(client.into_inner().is_finished());
    }

    #[test]
    fn test_timing_validator_median() {
        let mut validator = TimingValidator::new(3);
        validator.add_sample(Duration::from_millis(30));
        validator.add_sample(Duration::from_millis(10));
        validator.add_sample(Duration::from_millis(20));
        assert_eq!(validator.median(), Some(Duration::from_millis(20)));
        validator.assert_delay(Duration::from_millis(10), Duration::from_millis(10));
    }

    #[test]
    fn test_fixture_path() {
        assert!(fixture_path("handshake.toml").ends_with("fixtures/handshake.toml"));
    }
}
