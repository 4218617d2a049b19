use reqwest::StatusCode;
use std::fmt;
use std::time::Duration;

const MAX_BODY_EXCERPT_CHARS: usize = 300;

/// Hard failure of a single provider call. The caller is expected to retry on its next cycle.
#[derive(Debug)]
pub enum FetchError {
    Connect {
        endpoint: String,
        detail: String,
    },
    Timeout {
        endpoint: String,
        timeout: Duration,
    },
    HttpStatus {
        endpoint: String,
        status: StatusCode,
        body: String,
    },
    Decode {
        endpoint: String,
        detail: String,
    },
    Request {
        endpoint: String,
        detail: String,
    },
}

impl FetchError {
    pub fn from_reqwest(endpoint: &str, timeout: Duration, err: reqwest::Error) -> Self {
        let endpoint = endpoint.to_string();
        if err.is_timeout() {
            FetchError::Timeout { endpoint, timeout }
        } else if err.is_connect() {
            FetchError::Connect {
                endpoint,
                detail: err.to_string(),
            }
        } else if err.is_decode() || err.is_body() {
            FetchError::Decode {
                endpoint,
                detail: err.to_string(),
            }
        } else {
            FetchError::Request {
                endpoint,
                detail: err.to_string(),
            }
        }
    }

    pub fn http_status(endpoint: &str, status: StatusCode, body: &str) -> Self {
        FetchError::HttpStatus {
            endpoint: endpoint.to_string(),
            status,
            body: excerpt(body),
        }
    }

    pub fn endpoint(&self) -> &str {
        match self {
            FetchError::Connect { endpoint, .. }
            | FetchError::Timeout { endpoint, .. }
            | FetchError::HttpStatus { endpoint, .. }
            | FetchError::Decode { endpoint, .. }
            | FetchError::Request { endpoint, .. } => endpoint,
        }
    }

    /// Short machine-readable label, used in logs and API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Connect { .. } => "connect",
            FetchError::Timeout { .. } => "timeout",
            FetchError::HttpStatus { .. } => "http_status",
            FetchError::Decode { .. } => "decode",
            FetchError::Request { .. } => "request",
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Connect { endpoint, detail } => {
                write!(f, "could not connect to {endpoint}: {detail}")
            }
            FetchError::Timeout { endpoint, timeout } => {
                write!(f, "request to {endpoint} timed out after {}s", timeout.as_secs_f64())
            }
            FetchError::HttpStatus {
                endpoint,
                status,
                body,
            } => write!(f, "{endpoint} answered HTTP {status}: {body}"),
            FetchError::Decode { endpoint, detail } => {
                write!(f, "response from {endpoint} is not valid JSON: {detail}")
            }
            FetchError::Request { endpoint, detail } => {
                write!(f, "request to {endpoint} failed: {detail}")
            }
        }
    }
}

impl std::error::Error for FetchError {}

fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= MAX_BODY_EXCERPT_CHARS {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(MAX_BODY_EXCERPT_CHARS).collect();
    out.push('…');
    out
}
