//! Various small helper functions

use hyper::body;
use hyper::{http::uri::InvalidUri, http::Uri, Body, Client, Request};
use std::io::{Error as IoError, ErrorKind as IoErrorKind};
use std::num::ParseIntError;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, trace};

/// Splits the input string into two parts at the first occurence of the separator
pub fn split_into_two(input: &str, separator: &'static str) -> Option<(String, String)> {
    let parts: Vec<&str> = input.splitn(2, separator).collect();

    if parts.len() != 2 {
        return None;
    }

    Some((parts[0].to_string(), parts[1].to_string()))
}

/// Parses a Duration from a string containing seconds.
/// Useful for command line parsing
pub fn parse_seconds(src: &str) -> Result<Duration, ParseIntError> {
    let seconds = src.parse::<u64>()?;
    Ok(Duration::from_secs(seconds))
}

/// Failure while waiting for an HTTP endpoint
#[derive(Debug, Error)]
pub enum WaitError {
    /// The provided URL could not be parsed
    #[error("invalid url")]
    InvalidUrl(#[from] InvalidUri),
    /// No 200 OK response was received in time
    #[error("timed out after {0:?} while waiting for a 200 OK response")]
    Timeout(Duration),
}

/// Sends HTTP requests to the specified URL until either a 200 OK response is received or the timeout is reached
pub async fn wait_for(url: &str, timeout_duration: Duration) -> Result<String, WaitError> {
    let client = Client::new();
    let url = url.parse::<Uri>()?;

    let check_interval = Duration::from_millis(250);
    let request_timeout = Duration::from_millis(1000);
    let deadline = Instant::now() + timeout_duration;

    debug!(%url, "Awaiting 200 OK response");

    loop {
        let mut req = Request::new(Body::empty());
        *req.uri_mut() = url.clone();

        trace!("Sending health-check request");
        match timeout(request_timeout, client.request(req)).await {
            Ok(Ok(res)) if res.status() == 200 => {
                return match body::to_bytes(res.into_body()).await {
                    Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
                    Err(_) => Ok(String::new()),
                };
            }
            Ok(Ok(res)) => trace!(status = %res.status(), "Received response with status != 200"),
            Ok(Err(e)) => trace!(error = %e, "Unable to send health-check request"),
            Err(_) => trace!("Health-check request timed out"),
        }

        if Instant::now() >= deadline {
            debug!(%url, "Timeout while waiting for endpoint");
            return Err(WaitError::Timeout(timeout_duration));
        }

        sleep(check_interval).await;
    }
}

/// Attempts a single bare TCP connection, giving up after `attempt_timeout`
///
/// The connection is closed immediately after it has been established.
pub async fn probe_port(host: &str, port: u16, attempt_timeout: Duration) -> Result<(), IoError> {
    match timeout(attempt_timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(_stream)) => Ok(()),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(IoError::new(
            IoErrorKind::TimedOut,
            format!("connection attempt to {}:{} timed out", host, port),
        )),
    }
}

#[cfg(test)]
mod does {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn split_at_first_separator() {
        assert_eq!(
            split_into_two("goog:chromeOptions", ":"),
            Some(("goog".to_string(), "chromeOptions".to_string()))
        );
        assert_eq!(
            split_into_two("a:b:c", ":"),
            Some(("a".to_string(), "b:c".to_string()))
        );
        assert_eq!(split_into_two("browserName", ":"), None);
    }

    #[test]
    fn parse_durations() {
        assert_eq!(parse_seconds("20").unwrap(), Duration::from_secs(20));
        assert!(parse_seconds("twenty").is_err());
    }

    #[tokio::test]
    async fn probe_open_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        probe_port("127.0.0.1", port, Duration::from_millis(500))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn probe_closed_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        assert!(probe_port("127.0.0.1", port, Duration::from_millis(500))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn give_up_waiting_for_unreachable_url() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let url = format!("http://127.0.0.1:{}/status", port);
        let started = Instant::now();
        let result = wait_for(&url, Duration::from_millis(300)).await;

        assert!(matches!(result, Err(WaitError::Timeout(_))));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
