//! Local clock abstraction and clock-skew probe
//!
//! Signed token assertions are only accepted within a narrow window around
//! the server's time, so the local clock is compared against the `Date`
//! header of a well-known host before signing.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{header::DATE, Client};

/// Source of "now"
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The host system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Estimates how far the local clock is off from a trusted remote host
#[derive(Clone)]
pub struct ClockSkewProbe {
    client: Client,
    url: String,
    timeout: Duration,
}

impl ClockSkewProbe {
    pub fn new(client: Client, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            url: url.into(),
            timeout,
        }
    }

    /// Skew in seconds (local minus remote).
    ///
    /// Never fails: timeouts, network errors and missing or unparsable `Date`
    /// headers all yield 0.
    pub async fn measure(&self, clock: &dyn Clock) -> i64 {
        let response = match self
            .client
            .head(&self.url)
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Clock skew probe failed, assuming zero skew: {}", e);
                return 0;
            }
        };

        let local = clock.now();
        let remote = response
            .headers()
            .get(DATE)
            .and_then(|h| h.to_str().ok())
            .and_then(parse_http_date);

        match remote {
            Some(remote) => {
                let skew = local.timestamp() - remote.timestamp();
                if skew != 0 {
                    tracing::debug!(skew_secs = skew, "Measured local clock skew");
                }
                skew
            }
            None => {
                tracing::warn!("Clock skew probe returned no usable Date header, assuming zero skew");
                0
            }
        }
    }
}

/// Parse an HTTP `Date` header (IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`)
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Format a timestamp as an HTTP `Date` header value
pub fn format_http_date(dt: DateTime<Utc>) -> String {
    dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
