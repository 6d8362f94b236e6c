//! One logical HTTP GET with retry, backoff, and user-agent rotation.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use pronos_core::{FailureKind, ScrapingConfig};
use reqwest::{Client, StatusCode, Url};

use crate::error::ScraperError;
use crate::rate_limit::RateLimiter;
use crate::retry::RetryPolicy;

const FALLBACK_UA: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// A fetched page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub url: String,
    pub body: String,
}

impl Document {
    #[must_use]
    pub fn new(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            body: body.into(),
        }
    }

    /// Parses the body. The returned tree is not `Send`; parse, read, and drop
    /// it without holding it across an `.await`.
    #[must_use]
    pub fn html(&self) -> scraper::Html {
        scraper::Html::parse_document(&self.body)
    }
}

/// Outcome of one logical fetch. Not persisted.
#[derive(Debug, Clone)]
pub enum FetchResult {
    Success {
        document: Document,
        http_status: u16,
        fetched_at: DateTime<Utc>,
        attempt_count: u32,
    },
    Failure {
        kind: FailureKind,
        message: String,
        attempt_count: u32,
    },
}

impl FetchResult {
    #[must_use]
    pub fn attempt_count(&self) -> u32 {
        match self {
            FetchResult::Success { attempt_count, .. }
            | FetchResult::Failure { attempt_count, .. } => *attempt_count,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, FetchResult::Success { .. })
    }
}

/// The fetch capability the registry and orchestrator depend on.
pub trait Fetch {
    fn fetch(&self, url: &str) -> impl Future<Output = FetchResult> + Send;
}

/// Waits for the limiter, then fetches.
pub async fn paced_fetch<F: Fetch>(fetcher: &F, limiter: &mut RateLimiter, url: &str) -> FetchResult {
    limiter.await_turn().await;
    fetcher.fetch(url).await
}

enum AttemptError {
    /// Worth retrying after backoff.
    Transient(String),
    Permanent(FailureKind, String),
}

/// HTTP fetcher for HTML pages.
///
/// Timeouts, connection failures, 408 and 5xx responses are retried with
/// exponential backoff up to the policy's `max_retries`. 404/410, other 4xx
/// and malformed URLs fail immediately as `not_found`; 401/403/429 and
/// challenge pages fail immediately as `blocked`.
pub struct Fetcher {
    client: Client,
    user_agents: Vec<String>,
    next_agent: AtomicUsize,
    policy: RetryPolicy,
}

impl Fetcher {
    /// # Errors
    ///
    /// Returns [`ScraperError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed (e.g., invalid TLS config).
    pub fn new(
        timeout: Duration,
        user_agents: Vec<String>,
        policy: RetryPolicy,
    ) -> Result<Self, ScraperError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        let user_agents = if user_agents.is_empty() {
            vec![FALLBACK_UA.to_string()]
        } else {
            user_agents
        };
        Ok(Self {
            client,
            user_agents,
            next_agent: AtomicUsize::new(0),
            policy,
        })
    }

    /// # Errors
    ///
    /// Returns [`ScraperError::Http`] if the HTTP client cannot be built.
    pub fn from_config(config: &ScrapingConfig) -> Result<Self, ScraperError> {
        Self::new(
            Duration::from_secs(config.request_timeout_secs),
            config.user_agents.clone(),
            RetryPolicy::for_requests(config),
        )
    }

    /// Round-robin over the configured pool, one step per attempt.
    fn next_user_agent(&self) -> &str {
        let index = self.next_agent.fetch_add(1, Ordering::Relaxed) % self.user_agents.len();
        &self.user_agents[index]
    }

    async fn attempt(&self, url: &Url, user_agent: &str) -> Result<(Document, u16), AttemptError> {
        let response = self
            .client
            .get(url.clone())
            .header(reqwest::header::USER_AGENT, user_agent)
            .header(
                reqwest::header::ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(classify_send_error)?;

        let status = response.status();
        if let Some(failure) = classify_status(status) {
            return Err(failure);
        }

        let body = response
            .text()
            .await
            .map_err(|e| AttemptError::Transient(format!("failed to read body: {e}")))?;

        if body.trim().is_empty() {
            return Err(AttemptError::Permanent(
                FailureKind::ParseError,
                format!("empty response body (HTTP {})", status.as_u16()),
            ));
        }
        if looks_like_bot_challenge(&body) {
            return Err(AttemptError::Permanent(
                FailureKind::Blocked,
                "response is an anti-bot challenge page".to_string(),
            ));
        }

        Ok((Document::new(url.as_str(), body), status.as_u16()))
    }
}

impl Fetch for Fetcher {
    async fn fetch(&self, url: &str) -> FetchResult {
        let parsed = match parse_url(url) {
            Ok(parsed) => parsed,
            Err(e) => {
                return FetchResult::Failure {
                    kind: FailureKind::NotFound,
                    message: e.to_string(),
                    attempt_count: 1,
                }
            }
        };

        let mut state = self.policy.start();
        loop {
            let attempt = state.begin_attempt();
            let user_agent = self.next_user_agent().to_string();
            match self.attempt(&parsed, &user_agent).await {
                Ok((document, http_status)) => {
                    tracing::debug!(url, attempt, http_status, "fetched");
                    return FetchResult::Success {
                        document,
                        http_status,
                        fetched_at: Utc::now(),
                        attempt_count: attempt,
                    };
                }
                Err(AttemptError::Permanent(kind, message)) => {
                    tracing::warn!(url, attempt, %kind, error = %message, "fetch failed");
                    return FetchResult::Failure {
                        kind,
                        message,
                        attempt_count: attempt,
                    };
                }
                Err(AttemptError::Transient(message)) => {
                    let Some(delay) = state.next_backoff() else {
                        tracing::warn!(url, attempt, error = %message, "retries exhausted");
                        return FetchResult::Failure {
                            kind: FailureKind::TransientExhausted,
                            message,
                            attempt_count: attempt,
                        };
                    };
                    tracing::warn!(
                        url,
                        attempt,
                        max_retries = self.policy.max_retries,
                        delay = ?delay,
                        error = %message,
                        "transient fetch error, retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

fn parse_url(url: &str) -> Result<Url, ScraperError> {
    let parsed = Url::parse(url).map_err(|e| ScraperError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ScraperError::InvalidUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme {}", parsed.scheme()),
        });
    }
    Ok(parsed)
}

fn classify_send_error(err: reqwest::Error) -> AttemptError {
    if err.is_builder() {
        return AttemptError::Permanent(FailureKind::NotFound, err.to_string());
    }
    AttemptError::Transient(err.to_string())
}

fn classify_status(status: StatusCode) -> Option<AttemptError> {
    if status.is_success() {
        return None;
    }
    let message = format!("HTTP {status}");
    let failure = match status {
        StatusCode::NOT_FOUND | StatusCode::GONE => {
            AttemptError::Permanent(FailureKind::NotFound, message)
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
            AttemptError::Permanent(FailureKind::Blocked, message)
        }
        StatusCode::REQUEST_TIMEOUT => AttemptError::Transient(message),
        s if s.is_server_error() => AttemptError::Transient(message),
        _ => AttemptError::Permanent(FailureKind::NotFound, message),
    };
    Some(failure)
}

/// Cloudflare-style interstitials served with a 200.
pub(crate) fn looks_like_bot_challenge(body: &str) -> bool {
    let lowered = body.to_ascii_lowercase();
    let has_cloudflare_banner = lowered.contains("attention required! | cloudflare");
    let has_challenge_platform = lowered.contains("/cdn-cgi/challenge-platform/");
    let has_just_a_moment = lowered.contains("just a moment...");
    let has_cookie_gate = lowered.contains("please enable cookies");
    let has_cf_chl = lowered.contains("cf-chl-");

    has_cloudflare_banner
        || has_challenge_platform
        || (has_just_a_moment && has_cookie_gate)
        || (has_just_a_moment && has_cf_chl)
}
