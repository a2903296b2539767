use std::time::Duration;

use thiserror::Error;

/// HTTP statuses the hub's gateway/tunnel returns while the desktop app
/// behind it is unreachable.
const UNAVAILABLE_STATUSES: &[u16] = &[502, 503, 504, 521, 522, 523, 524, 530];

/// Body or error-message fragments emitted by the tunnel in front of the hub.
const UNAVAILABLE_SIGNATURES: &[&str] = &[
    "tunnel",
    "bad gateway",
    "econnrefused",
    "connection refused",
    "ngrok",
    "cloudflared",
    "origin is unreachable",
];

#[derive(Debug, Error)]
pub enum RemoteError {
    /// Missing or invalid client configuration (token, base URL).
    #[error("Hub client misconfigured: {0}")]
    Config(String),

    /// Expired or invalid access token.
    #[error("Hub rejected credentials (HTTP {status})")]
    Auth { status: u16 },

    #[error("Hub rate limit hit")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Hub server error (HTTP {status}): {body}")]
    Server { status: u16, body: String },

    /// The hub backend is unreachable through its gateway. Expected from
    /// time to time; the next scheduled run retries.
    #[error("Hub unavailable: {0}")]
    Unavailable(String),

    #[error("Unexpected hub response (HTTP {status}): {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("Hub transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Malformed hub response: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Classify a non-success HTTP response.
    pub fn from_status(status: u16, body: String, retry_after: Option<Duration>) -> Self {
        match status {
            401 | 403 => Self::Auth { status },
            429 => Self::RateLimited { retry_after },
            s if UNAVAILABLE_STATUSES.contains(&s) || (s >= 500 && looks_like_unavailable(&body)) => {
                Self::Unavailable(format!("HTTP {s}: {}", truncate(&body, 200)))
            }
            s if s >= 500 => Self::Server { status: s, body },
            s => Self::UnexpectedStatus { status: s, body },
        }
    }

    /// Classify a reqwest failure that produced no response.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_connect() || looks_like_unavailable(&err.to_string()) {
            Self::Unavailable(err.to_string())
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err)
        }
    }

    /// Whether the built-in retry policy should try again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Server { .. } | Self::Unavailable(_) | Self::Transport(_)
        )
    }

    /// Whether this is the expected "hub backend unreachable" condition.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    /// Configuration and credential failures cannot succeed without
    /// outside intervention.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Auth { .. })
    }
}

/// `true` when an error message carries a known gateway/tunnel signature.
pub fn looks_like_unavailable(message: &str) -> bool {
    let lower = message.to_lowercase();
    UNAVAILABLE_SIGNATURES.iter().any(|sig| lower.contains(sig))
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
