//! Fetch request and outcome types.

use super::challenge::Challenge;
use std::fmt;
use std::time::Duration;

/// Reference to the session state of one source key.
///
/// Cookies behind a handle are only applied to requests for the same key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    source_key: String,
}

impl SessionHandle {
    pub fn new(source_key: impl Into<String>) -> Self {
        Self {
            source_key: source_key.into(),
        }
    }

    pub fn source_key(&self) -> &str {
        &self.source_key
    }
}

/// A single page to fetch. Immutable once built.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    url: String,
    source_key: String,
    session: Option<SessionHandle>,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>, source_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            source_key: source_key.into(),
            session: None,
        }
    }

    /// Same request, carrying a session handle.
    pub fn with_session(self, handle: SessionHandle) -> Self {
        Self {
            session: Some(handle),
            ..self
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn source_key(&self) -> &str {
        &self.source_key
    }

    pub fn session(&self) -> Option<&SessionHandle> {
        self.session.as_ref()
    }

    /// Host part of the URL, used for per-host admission.
    pub fn host(&self) -> String {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| self.source_key.clone())
    }
}

/// Where a rate limit came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitOrigin {
    /// The governor denied the request; no network call was made.
    Local,
    /// The remote answered 429.
    Remote,
}

/// Why a fetch failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchCause {
    Timeout,
    Connection(String),
    Dns(String),
    /// Non-success status other than 401/403/429.
    Status(u16),
    /// 401 or 403: the session is no longer accepted.
    AuthRejected(u16),
    /// Session handle points at another source key.
    SessionMismatch { handle: String, request: String },
    InvalidUrl(String),
    Body(String),
    /// A 2xx page that is really an anti-bot interstitial.
    Challenge(Challenge),
    Cancelled,
}

impl fmt::Display for FetchCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchCause::Timeout => write!(f, "timeout"),
            FetchCause::Connection(e) => write!(f, "connection: {e}"),
            FetchCause::Dns(e) => write!(f, "dns: {e}"),
            FetchCause::Status(s) => write!(f, "http status {s}"),
            FetchCause::AuthRejected(s) => write!(f, "auth rejected ({s})"),
            FetchCause::SessionMismatch { handle, request } => {
                write!(f, "session for {handle} used on {request}")
            }
            FetchCause::InvalidUrl(u) => write!(f, "invalid url: {u}"),
            FetchCause::Body(e) => write!(f, "body: {e}"),
            FetchCause::Challenge(c) => write!(f, "{c} challenge"),
            FetchCause::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FetchCause {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchCause::Timeout
            | FetchCause::Connection(_)
            | FetchCause::Body(_)
            | FetchCause::Challenge(_) => true,
            FetchCause::Status(s) => *s >= 500,
            _ => false,
        }
    }
}

/// Result of one fetch. Owned by the call that produced it.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Success {
        body: String,
        status: u16,
        elapsed: Duration,
    },
    RateLimited {
        retry_after: Duration,
        origin: LimitOrigin,
    },
    TransientError {
        cause: FetchCause,
    },
    FatalError {
        cause: FetchCause,
    },
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success { .. })
    }

    /// True for outcomes the governor counts against the source.
    pub fn is_failure(&self) -> bool {
        match self {
            FetchOutcome::Success { .. } => false,
            FetchOutcome::RateLimited { origin, .. } => *origin == LimitOrigin::Remote,
            FetchOutcome::TransientError { .. } | FetchOutcome::FatalError { .. } => true,
        }
    }

    pub fn local_limit(retry_after: Duration) -> Self {
        FetchOutcome::RateLimited {
            retry_after,
            origin: LimitOrigin::Local,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_falls_back_to_source_key() {
        let req = FetchRequest::new("not a url", "forum");
        assert_eq!(req.host(), "forum");

        let req = FetchRequest::new("https://www.reddit.com/r/toulouse", "reddit");
        assert_eq!(req.host(), "www.reddit.com");
    }

    #[test]
    fn test_transient_classification() {
        assert!(FetchCause::Timeout.is_transient());
        assert!(FetchCause::Status(503).is_transient());
        assert!(!FetchCause::Status(404).is_transient());
        assert!(!FetchCause::AuthRejected(401).is_transient());
        assert!(!FetchCause::Dns("no such host".into()).is_transient());
    }

    #[test]
    fn test_local_limit_is_not_a_failure() {
        assert!(!FetchOutcome::local_limit(Duration::from_secs(1)).is_failure());
        let remote = FetchOutcome::RateLimited {
            retry_after: Duration::from_secs(1),
            origin: LimitOrigin::Remote,
        };
        assert!(remote.is_failure());
    }
}
