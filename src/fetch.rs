use std::fmt::{Display, Formatter};
use std::process::Command;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use crate::config::Settings;
use crate::feed::MacSofaFeed;

/// Where a run gets its feed from.
pub trait FeedSource {
    /// URL or other label used in logs and error messages.
    fn location(&self) -> &str;

    fn fetch(&self) -> Result<MacSofaFeed, FeedFailure>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFailureKind {
    /// Timeout or connection-level failure. The only retried kind.
    Network,
    /// Server answered with a non-success status.
    Http,
    /// Body did not decode into a valid feed.
    Validation,
    /// Anything else the transport reported.
    Transport,
}

impl FeedFailureKind {
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Network)
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Http => "http",
            Self::Validation => "validation",
            Self::Transport => "transport",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FeedFailure {
    pub kind: FeedFailureKind,
    pub url: String,
    pub attempts: u32,
    pub latency_ms: u64,
    pub message: String,
}

impl Display for FeedFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} error retrieving SOFA feed from {}: {} (attempts={}, latency_ms={})",
            self.kind.as_str(),
            self.url,
            self.message,
            self.attempts,
            self.latency_ms
        )
    }
}

impl std::error::Error for FeedFailure {}

/// Fetches the feed with `curl`, retrying transient failures with
/// exponential backoff.
#[derive(Debug, Clone)]
pub struct CurlFeedSource {
    pub url: String,
    pub request_timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
    pub retry_max_backoff_ms: u64,
}

impl FeedSource for CurlFeedSource {
    fn location(&self) -> &str {
        &self.url
    }

    #[instrument(name = "feed.fetch", skip(self), fields(url = %self.url))]
    fn fetch(&self) -> Result<MacSofaFeed, FeedFailure> {
        let feed = self.with_retry(|| fetch_once(&self.url, self.request_timeout_secs))?;
        debug!(update_hash = %feed.update_hash, "feed retrieved");
        Ok(feed)
    }
}

impl CurlFeedSource {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            url: settings.feed_url.clone(),
            request_timeout_secs: settings.request_timeout_secs,
            max_attempts: settings.feed_max_attempts,
            retry_backoff_ms: settings.retry_backoff_ms,
            retry_max_backoff_ms: settings.retry_max_backoff_ms,
        }
    }

    fn with_retry<T>(
        &self,
        mut call: impl FnMut() -> Result<T, CallError>,
    ) -> Result<T, FeedFailure> {
        let started = Instant::now();
        let total_attempts = self.max_attempts.max(1);
        let mut last_error: Option<CallError> = None;

        for attempt in 0..total_attempts {
            let attempt_no = attempt + 1;
            info!(attempt = attempt_no, total_attempts, "retrieving SOFA feed");

            match call() {
                Ok(value) => {
                    debug!(
                        attempt = attempt_no,
                        latency_ms = elapsed_ms(started),
                        "feed call succeeded"
                    );
                    return Ok(value);
                }
                Err(err) => {
                    let is_last_attempt = attempt_no >= total_attempts;
                    if err.kind.is_transient() && !is_last_attempt {
                        let delay_ms = compute_retry_delay_ms(
                            self.retry_backoff_ms,
                            self.retry_max_backoff_ms,
                            attempt,
                        );
                        warn!(
                            attempt = attempt_no,
                            total_attempts,
                            delay_ms,
                            error = %err,
                            "feed retrieval failed, retrying"
                        );
                        last_error = Some(err);
                        thread::sleep(Duration::from_millis(delay_ms));
                        continue;
                    }

                    return Err(FeedFailure {
                        kind: err.kind,
                        url: self.url.clone(),
                        attempts: attempt_no,
                        latency_ms: elapsed_ms(started),
                        message: err.message,
                    });
                }
            }
        }

        let (kind, message) = last_error
            .map(|err| (err.kind, err.message))
            .unwrap_or((FeedFailureKind::Network, "retries exhausted".to_string()));
        Err(FeedFailure {
            kind,
            url: self.url.clone(),
            attempts: total_attempts,
            latency_ms: elapsed_ms(started),
            message,
        })
    }
}

#[derive(Debug, Clone)]
struct CallError {
    kind: FeedFailureKind,
    message: String,
}

impl CallError {
    fn new(kind: FeedFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl Display for CallError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} error: {}", self.kind.as_str(), self.message)
    }
}

fn fetch_once(url: &str, timeout_secs: u64) -> Result<MacSofaFeed, CallError> {
    let output = Command::new("curl")
        .arg("-sS")
        .arg("--fail")
        .arg("-L")
        .arg("-m")
        .arg(timeout_secs.max(1).to_string())
        .arg("-H")
        .arg("Accept: application/json")
        .arg(url)
        .output()
        .map_err(|err| {
            CallError::new(
                FeedFailureKind::Transport,
                format!("failed to execute curl: {}", err),
            )
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        return Err(classify_transport_failure(output.status.code(), &stderr));
    }

    let raw = String::from_utf8(output.stdout).map_err(|_| {
        CallError::new(FeedFailureKind::Validation, "feed returned non-utf8 body")
    })?;
    MacSofaFeed::parse(&raw)
        .map_err(|err| CallError::new(FeedFailureKind::Validation, format!("{:#}", err)))
}

fn classify_transport_failure(curl_code: Option<i32>, stderr: &str) -> CallError {
    let kind = match curl_code {
        Some(22) => FeedFailureKind::Http,
        Some(code) if is_transient_curl_code(code) => FeedFailureKind::Network,
        Some(_) => FeedFailureKind::Transport,
        None => FeedFailureKind::Network,
    };

    let mut details = Vec::new();
    if let Some(code) = curl_code {
        details.push(format!("curl_code={}", code));
    }
    if let Some(status) = parse_http_status(stderr) {
        details.push(format!("http_status={}", status));
    }
    if !stderr.trim().is_empty() {
        details.push(format!("stderr={}", stderr.trim()));
    }
    if details.is_empty() {
        details.push("unknown transport failure".to_string());
    }

    CallError::new(kind, details.join("; "))
}

fn parse_http_status(text: &str) -> Option<u16> {
    let marker = "returned error:";
    let idx = text.find(marker)?;
    text[idx + marker.len()..]
        .split(|c: char| !c.is_ascii_digit())
        .find(|part| !part.is_empty())?
        .parse::<u16>()
        .ok()
}

/// Resolve, connect, TLS handshake, timeout, and dropped-connection codes.
fn is_transient_curl_code(code: i32) -> bool {
    matches!(code, 5 | 6 | 7 | 18 | 28 | 35 | 52 | 55 | 56)
}

fn compute_retry_delay_ms(base_ms: u64, max_ms: u64, attempt: u32) -> u64 {
    let safe_base = base_ms.max(1);
    let shift = attempt.min(12);
    let factor = 1u64 << shift;
    let candidate = safe_base.saturating_mul(factor);
    candidate.min(max_ms.max(safe_base))
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::{
        classify_transport_failure, compute_retry_delay_ms, parse_http_status, CallError,
        CurlFeedSource, FeedFailureKind, FeedSource,
    };
    use crate::feed::tests::sample_feed;
    use std::fs;

    fn source(url: String) -> CurlFeedSource {
        CurlFeedSource {
            url,
            request_timeout_secs: 5,
            max_attempts: 3,
            retry_backoff_ms: 1,
            retry_max_backoff_ms: 2,
        }
    }

    #[test]
    fn classify_marks_dns_and_timeouts_as_network() {
        let err = classify_transport_failure(Some(6), "curl: (6) Could not resolve host");
        assert_eq!(err.kind, FeedFailureKind::Network);
        let err = classify_transport_failure(Some(28), "curl: (28) Operation timed out");
        assert_eq!(err.kind, FeedFailureKind::Network);
        let err = classify_transport_failure(Some(7), "curl: (7) Failed to connect");
        assert_eq!(err.kind, FeedFailureKind::Network);
    }

    #[test]
    fn classify_marks_http_errors_as_not_retried() {
        let err = classify_transport_failure(
            Some(22),
            "curl: (22) The requested URL returned error: 503",
        );
        assert_eq!(err.kind, FeedFailureKind::Http);
        assert!(!err.kind.is_transient());
        assert!(err.message.contains("http_status=503"));
    }

    #[test]
    fn classify_marks_other_curl_codes_as_transport() {
        let err = classify_transport_failure(Some(3), "curl: (3) URL using bad/illegal format");
        assert_eq!(err.kind, FeedFailureKind::Transport);
    }

    #[test]
    fn parse_http_status_reads_curl_marker() {
        assert_eq!(
            parse_http_status("curl: (22) The requested URL returned error: 404 Not Found"),
            Some(404)
        );
        assert_eq!(parse_http_status("curl: (6) Could not resolve host"), None);
    }

    #[test]
    fn compute_retry_delay_doubles_and_caps() {
        assert_eq!(compute_retry_delay_ms(1000, 8000, 0), 1000);
        assert_eq!(compute_retry_delay_ms(1000, 8000, 1), 2000);
        assert_eq!(compute_retry_delay_ms(1000, 8000, 2), 4000);
        assert_eq!(compute_retry_delay_ms(1000, 8000, 5), 8000);
        assert_eq!(compute_retry_delay_ms(0, 0, 0), 1);
    }

    #[test]
    fn fetch_reads_file_url() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("feed.json");
        fs::write(&path, sample_feed("hash-1", "15.3.1", &[]).to_string()).expect("write");

        let feed = source(format!("file://{}", path.display()))
            .fetch()
            .expect("fetch");
        assert_eq!(feed.update_hash, "hash-1");
    }

    #[test]
    fn fetch_does_not_retry_invalid_feed() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("feed.json");
        fs::write(&path, r#"{"UpdateHash":"x"}"#).expect("write");

        let err = source(format!("file://{}", path.display()))
            .fetch()
            .expect_err("invalid feed");
        assert_eq!(err.kind, FeedFailureKind::Validation);
        assert_eq!(err.attempts, 1);
    }

    #[test]
    fn retry_gives_up_after_max_attempts_on_network_errors() {
        let src = source("https://sofa.example/feed.json".to_string());
        let mut calls = 0;
        let err = src
            .with_retry(|| -> Result<(), CallError> {
                calls += 1;
                Err(CallError::new(FeedFailureKind::Network, "connection refused"))
            })
            .expect_err("exhausted");
        assert_eq!(calls, 3);
        assert_eq!(err.kind, FeedFailureKind::Network);
        assert_eq!(err.attempts, 3);
        assert!(err.to_string().contains("https://sofa.example/feed.json"));
    }

    #[test]
    fn retry_recovers_after_transient_failure() {
        let src = source("https://sofa.example/feed.json".to_string());
        let mut calls = 0;
        let value = src
            .with_retry(|| {
                calls += 1;
                if calls < 3 {
                    Err(CallError::new(FeedFailureKind::Network, "timed out"))
                } else {
                    Ok(calls)
                }
            })
            .expect("third attempt succeeds");
        assert_eq!(value, 3);
    }

    #[test]
    fn retry_stops_on_permanent_failure() {
        let src = source("https://sofa.example/feed.json".to_string());
        let mut calls = 0;
        let err = src
            .with_retry(|| -> Result<(), CallError> {
                calls += 1;
                Err(CallError::new(FeedFailureKind::Http, "http_status=404"))
            })
            .expect_err("permanent");
        assert_eq!(calls, 1);
        assert_eq!(err.kind, FeedFailureKind::Http);
        assert_eq!(err.attempts, 1);
    }
}
