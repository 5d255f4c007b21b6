//! HTTP transport: one pooled client shared by every fetch.
//!
//! Maps reqwest errors and statuses into `FetchCause` so the fetcher can
//! decide between retrying and giving up.

use super::outcome::FetchCause;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header;
use std::time::Duration;
use tracing::{debug, warn};

/// Everything the transport needs for one GET.
#[derive(Debug, Clone, Default)]
pub struct TransportRequest {
    pub url: String,
    pub user_agent: String,
    pub accept_language: String,
    /// Pre-rendered `Cookie` header, if a session applies.
    pub cookie: Option<String>,
    pub headers: Vec<(String, String)>,
}

/// A response that reached us, whatever its status.
#[derive(Debug, Clone, Default)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
    /// `(name, value)` pairs from `Set-Cookie`.
    pub set_cookies: Vec<(String, String)>,
    pub retry_after: Option<Duration>,
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Perform a GET. Errors are only for responses that never arrived.
    async fn get(&self, request: &TransportRequest) -> Result<RawResponse, FetchCause>;
}

/// Reqwest-backed transport with a shared connection pool.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration, pool_idle: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .pool_idle_timeout(pool_idle)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    fn classify_error(e: &reqwest::Error) -> FetchCause {
        if e.is_timeout() {
            return FetchCause::Timeout;
        }
        if e.is_builder() {
            return FetchCause::InvalidUrl(e.to_string());
        }
        if e.is_connect() {
            if error_chain_mentions_dns(e) {
                return FetchCause::Dns(e.to_string());
            }
            return FetchCause::Connection(e.to_string());
        }
        if e.is_body() || e.is_decode() {
            return FetchCause::Body(e.to_string());
        }
        FetchCause::Connection(e.to_string())
    }
}

fn error_chain_mentions_dns(e: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(e);
    while let Some(err) = current {
        let msg = err.to_string().to_lowercase();
        if msg.contains("dns") || msg.contains("failed to lookup address") {
            return true;
        }
        current = err.source();
    }
    false
}

/// Split `Set-Cookie` values into `(name, value)` pairs, dropping attributes.
pub fn parse_set_cookies(headers: &header::HeaderMap) -> Vec<(String, String)> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|raw| {
            let pair = raw.split(';').next()?;
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// `Retry-After` as delta-seconds or an HTTP date.
pub fn parse_retry_after(headers: &header::HeaderMap) -> Option<Duration> {
    let v = headers.get(header::RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(secs) = v.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(v).ok()?.with_timezone(&Utc);
    (at - Utc::now()).to_std().ok()
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, request: &TransportRequest) -> Result<RawResponse, FetchCause> {
        debug!(url = %request.url, "HTTP GET start");
        let mut builder = self
            .client
            .get(&request.url)
            .header(header::USER_AGENT, &request.user_agent)
            .header(header::ACCEPT_LANGUAGE, &request.accept_language);
        if let Some(cookie) = &request.cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let resp = builder.send().await.map_err(|e| {
            warn!(url = %request.url, error = %e, "HTTP GET failed");
            Self::classify_error(&e)
        })?;

        let status = resp.status().as_u16();
        let set_cookies = parse_set_cookies(resp.headers());
        let retry_after = parse_retry_after(resp.headers());
        let body = resp.text().await.map_err(|e| {
            warn!(url = %request.url, error = %e, "failed reading body");
            Self::classify_error(&e)
        })?;

        Ok(RawResponse {
            status,
            body,
            set_cookies,
            retry_after,
        })
    }
}
