use std::error::Error as _;
use std::io;
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

/// Identity sent with every catalog, metadata and transcoder request.
pub(crate) const USER_AGENT: &str = "Mozilla/5.0";

const RETRY_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

#[derive(Debug, Error)]
pub(crate) enum TransportError {
    #[error("HTTP status {status} from {url} after {attempts} attempt(s)")]
    Status {
        url: String,
        status: u16,
        attempts: usize,
    },
    #[error("request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },
    #[error("connection to {url} failed after {attempts} attempt(s): {message}")]
    Connection {
        url: String,
        attempts: usize,
        message: String,
    },
    #[error("failed reading response body from {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: io::Error,
    },
}

impl TransportError {
    pub(crate) fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub(crate) fn should_retry_http_status(status: u16) -> bool {
    RETRY_STATUSES.contains(&status)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RetryPolicy {
    pub(crate) retries: usize,
    pub(crate) backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based): `backoff * 2^(retry - 1)`.
    pub(crate) fn delay_for(&self, retry: usize) -> Duration {
        let exponent = retry.saturating_sub(1).min(16) as u32;
        self.backoff.saturating_mul(1_u32 << exponent)
    }
}

enum Attempt {
    Done(String),
    Retry(TransportError),
    Fail(TransportError),
}

/// Blocking HTTP session shared by every request of a run.
pub(crate) struct HttpClient {
    agent: ureq::Agent,
    policy: RetryPolicy,
}

impl HttpClient {
    pub(crate) fn new(policy: RetryPolicy) -> Self {
        let agent = ureq::AgentBuilder::new().user_agent(USER_AGENT).build();
        Self { agent, policy }
    }

    /// GETs `url` and returns the body of a 2xx response.
    ///
    /// Retryable statuses and connection failures are retried with exponential
    /// backoff. A timeout is returned immediately.
    pub(crate) fn get_text(&self, url: &str, timeout: Duration) -> Result<String, TransportError> {
        let attempts = self.policy.retries + 1;

        let mut attempt = 1;
        loop {
            let last = attempt == attempts;
            match self.attempt(url, timeout, attempt) {
                Attempt::Done(body) => return Ok(body),
                Attempt::Retry(err) if !last => {
                    let delay = self.policy.delay_for(attempt);
                    warn!(url, attempt, ?delay, error = %err, "transient failure, retrying");
                    thread::sleep(delay);
                    attempt += 1;
                }
                Attempt::Retry(err) | Attempt::Fail(err) => return Err(err),
            }
        }
    }

    fn attempt(&self, url: &str, timeout: Duration, attempt: usize) -> Attempt {
        debug!(url, attempt, "GET");
        match self.agent.get(url).timeout(timeout).call() {
            Ok(response) => match response.into_string() {
                Ok(body) => Attempt::Done(body),
                Err(source) if is_timeout(&source) => Attempt::Fail(TransportError::Timeout {
                    url: url.to_string(),
                    timeout,
                }),
                Err(source) => Attempt::Fail(TransportError::Body {
                    url: url.to_string(),
                    source,
                }),
            },
            Err(ureq::Error::Status(status, _)) => {
                let err = TransportError::Status {
                    url: url.to_string(),
                    status,
                    attempts: attempt,
                };
                if should_retry_http_status(status) {
                    Attempt::Retry(err)
                } else {
                    Attempt::Fail(err)
                }
            }
            Err(ureq::Error::Transport(transport)) => {
                let timed_out = transport
                    .source()
                    .and_then(|source| source.downcast_ref::<io::Error>())
                    .is_some_and(is_timeout);
                if timed_out {
                    return Attempt::Fail(TransportError::Timeout {
                        url: url.to_string(),
                        timeout,
                    });
                }

                let err = TransportError::Connection {
                    url: url.to_string(),
                    attempts: attempt,
                    message: transport.to_string(),
                };
                match transport.kind() {
                    ureq::ErrorKind::Dns
                    | ureq::ErrorKind::ConnectionFailed
                    | ureq::ErrorKind::Io
                    | ureq::ErrorKind::ProxyConnect => Attempt::Retry(err),
                    _ => Attempt::Fail(err),
                }
            }
        }
    }
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Behavior, TestServer};

    fn fast_client(retries: usize) -> HttpClient {
        HttpClient::new(RetryPolicy {
            retries,
            backoff: Duration::from_millis(1),
        })
    }

    #[test]
    fn retries_retryable_statuses_until_success() {
        let server = TestServer::spawn(vec![
            Behavior::Respond(500, "server-error".to_string()),
            Behavior::Respond(429, "throttled".to_string()),
            Behavior::Respond(200, "ok".to_string()),
        ]);

        let body = fast_client(3)
            .get_text(&server.url("/list"), Duration::from_millis(500))
            .expect("should eventually succeed");

        assert_eq!(body, "ok");
        assert_eq!(server.request_count(), 3);
    }

    #[test]
    fn does_not_retry_hard_client_errors() {
        let server = TestServer::spawn(vec![Behavior::Respond(404, "not-found".to_string())]);

        let err = fast_client(3)
            .get_text(&server.url("/tv/1"), Duration::from_millis(500))
            .expect_err("404 should not be retried");

        assert_eq!(err.status(), Some(404));
        assert_eq!(server.request_count(), 1);
    }

    #[test]
    fn does_not_retry_unlisted_server_errors() {
        let server = TestServer::spawn(vec![Behavior::Respond(501, "nope".to_string())]);

        let err = fast_client(3)
            .get_text(&server.url("/"), Duration::from_millis(500))
            .expect_err("501 is outside the retry set");

        assert_eq!(err.status(), Some(501));
        assert_eq!(server.request_count(), 1);
    }

    #[test]
    fn gives_up_after_three_retries() {
        let server = TestServer::spawn(vec![
            Behavior::Respond(503, "down".to_string()),
            Behavior::Respond(503, "down".to_string()),
            Behavior::Respond(502, "down".to_string()),
            Behavior::Respond(504, "still-down".to_string()),
            Behavior::Respond(200, "too-late".to_string()),
        ]);

        let err = fast_client(3)
            .get_text(&server.url("/"), Duration::from_millis(500))
            .expect_err("retryable failures should eventually error");

        match err {
            TransportError::Status {
                status, attempts, ..
            } => {
                assert_eq!(status, 504);
                assert_eq!(attempts, 4);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(server.request_count(), 4);
    }

    #[test]
    fn timeout_is_not_retried() {
        let server = TestServer::spawn(vec![
            Behavior::DelayRespond(Duration::from_millis(300), 200, "slow".to_string()),
            Behavior::Respond(200, "ok".to_string()),
        ]);

        let err = fast_client(3)
            .get_text(&server.url("/"), Duration::from_millis(50))
            .expect_err("timeout should surface");

        assert!(
            matches!(err, TransportError::Timeout { .. }),
            "unexpected error: {err}"
        );
        assert_eq!(server.request_count(), 1);
    }

    #[test]
    fn refused_connections_are_retried_then_reported() {
        let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).expect("bind");
        let addr = listener.local_addr().expect("local addr");
        drop(listener);

        let err = fast_client(2)
            .get_text(&format!("http://{addr}/"), Duration::from_millis(500))
            .expect_err("nothing is listening");

        match err {
            TransportError::Connection { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn sends_browser_user_agent() {
        let server = TestServer::spawn(vec![Behavior::Respond(200, "ok".to_string())]);

        fast_client(0)
            .get_text(&server.url("/ua"), Duration::from_millis(500))
            .expect("request should succeed");

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert!(
            requests[0]
                .headers
                .to_ascii_lowercase()
                .contains("user-agent: mozilla/5.0"),
            "headers: {}",
            requests[0].headers
        );
    }

    #[test]
    fn backoff_doubles_from_base() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(2000));
    }
}
