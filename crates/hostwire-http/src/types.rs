//! Request metadata: method, scheme, and per-request options.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;

/// HTTP request method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Connect,
    Options,
    Trace,
    Patch,
    Other(String),
}

impl Method {
    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Connect => "CONNECT",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
            Method::Patch => "PATCH",
            Method::Other(other) => other,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = ErrorCode;

    /// Methods are case-sensitive: `get` parses as `Other("get")`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "GET" => Method::Get,
            "HEAD" => Method::Head,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            "CONNECT" => Method::Connect,
            "OPTIONS" => Method::Options,
            "TRACE" => Method::Trace,
            "PATCH" => Method::Patch,
            other if !other.is_empty() && other.bytes().all(|b| b.is_ascii_graphic()) => {
                Method::Other(other.to_string())
            }
            other => {
                return Err(ErrorCode::ProtocolError(format!("invalid method {other:?}")));
            }
        })
    }
}

/// URI scheme of a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
    Other(String),
}

impl Scheme {
    pub fn as_str(&self) -> &str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
            Scheme::Other(other) => other,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheme {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(if s.eq_ignore_ascii_case("http") {
            Scheme::Http
        } else if s.eq_ignore_ascii_case("https") {
            Scheme::Https
        } else {
            Scheme::Other(s.to_string())
        })
    }
}

/// Per-request timeouts for an outgoing request.
///
/// `None` means "use the transport default". Values are milliseconds so the
/// struct maps one-to-one onto the `[request]` table of a host config file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestOptions {
    /// Time allowed to establish the exchange with the peer.
    pub connect_timeout_ms: Option<u64>,
    /// Time allowed between sending the request and receiving the response head.
    pub first_byte_timeout_ms: Option<u64>,
    /// Time allowed between consecutive chunks of the response body.
    pub between_bytes_timeout_ms: Option<u64>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = Some(duration_ms(timeout));
        self
    }

    pub fn with_first_byte_timeout(mut self, timeout: Duration) -> Self {
        self.first_byte_timeout_ms = Some(duration_ms(timeout));
        self
    }

    pub fn with_between_bytes_timeout(mut self, timeout: Duration) -> Self {
        self.between_bytes_timeout_ms = Some(duration_ms(timeout));
        self
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    pub fn first_byte_timeout(&self) -> Option<Duration> {
        self.first_byte_timeout_ms.map(Duration::from_millis)
    }

    pub fn between_bytes_timeout(&self) -> Option<Duration> {
        self.between_bytes_timeout_ms.map(Duration::from_millis)
    }

    /// Fill every unset field from `defaults`.
    pub fn or(self, defaults: &RequestOptions) -> Self {
        Self {
            connect_timeout_ms: self.connect_timeout_ms.or(defaults.connect_timeout_ms),
            first_byte_timeout_ms: self.first_byte_timeout_ms.or(defaults.first_byte_timeout_ms),
            between_bytes_timeout_ms: self
                .between_bytes_timeout_ms
                .or(defaults.between_bytes_timeout_ms),
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
