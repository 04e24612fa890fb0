use std::env;
use std::str::FromStr;
use std::thread::sleep;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use reqwest::blocking::Client;
use reqwest::{StatusCode, Url};
use tracing::{debug, warn};

use crate::config::StatsConfig;

/// Read-only access to raw page bodies.
pub trait PageSource {
    /// Returns the raw API response body for `title`. The body is the query
    /// envelope around the latest revision text and is not parsed further.
    fn fetch_page(&mut self, title: &str) -> Result<String>;
    fn request_count(&self) -> usize;
}

#[derive(Debug, Clone)]
pub struct MediaWikiClientConfig {
    pub api_url: String,
    pub user_agent: String,
    pub timeout_ms: u64,
    pub rate_limit_read_ms: u64,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl MediaWikiClientConfig {
    pub fn from_config(config: &StatsConfig) -> Self {
        Self::from_config_with_env(config, |key| env::var(key).ok())
    }

    fn from_config_with_env<F>(config: &StatsConfig, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            api_url: config.api_url(),
            user_agent: config.user_agent(),
            timeout_ms: parsed_or(&lookup, "WIKI_HTTP_TIMEOUT_MS", 30_000),
            rate_limit_read_ms: parsed_or(&lookup, "WIKI_RATE_LIMIT_READ", 300),
            max_retries: parsed_or(&lookup, "WIKI_HTTP_RETRIES", 0),
            retry_delay_ms: parsed_or(&lookup, "WIKI_HTTP_RETRY_DELAY_MS", 500),
        }
    }
}

pub struct MediaWikiClient {
    client: Client,
    api_url: Url,
    config: MediaWikiClientConfig,
    last_request_at: Option<Instant>,
    request_count: usize,
}

impl MediaWikiClient {
    pub fn new(config: MediaWikiClientConfig) -> Result<Self> {
        let api_url = Url::parse(&config.api_url)
            .with_context(|| format!("invalid wiki API URL: {}", config.api_url))?;
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("failed to build MediaWiki HTTP client")?;

        Ok(Self {
            client,
            api_url,
            config,
            last_request_at: None,
            request_count: 0,
        })
    }

    fn apply_rate_limit(&mut self) {
        if let Some(last) = self.last_request_at {
            let min_delay = Duration::from_millis(self.config.rate_limit_read_ms);
            let elapsed = last.elapsed();
            if elapsed < min_delay {
                sleep(min_delay - elapsed);
            }
        }
        self.last_request_at = Some(Instant::now());
        self.request_count += 1;
    }

    fn wait_before_retry(&self, attempt: usize) {
        let delay = self
            .config
            .retry_delay_ms
            .saturating_mul(attempt as u64 + 1);
        sleep(Duration::from_millis(delay));
    }
}

impl PageSource for MediaWikiClient {
    fn fetch_page(&mut self, title: &str) -> Result<String> {
        let pairs = revision_query(title);

        for attempt in 0..=self.config.max_retries {
            self.apply_rate_limit();
            debug!(title, attempt, "fetching page");
            let response = self
                .client
                .get(self.api_url.clone())
                .header("User-Agent", self.config.user_agent.clone())
                .query(&pairs)
                .send();

            match response {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        if attempt < self.config.max_retries && is_retryable_status(status) {
                            warn!(title, %status, "retrying page fetch");
                            self.wait_before_retry(attempt);
                            continue;
                        }
                        bail!("fetching {title} failed with HTTP {status}");
                    }
                    return response
                        .text()
                        .with_context(|| format!("failed to read response body for {title}"));
                }
                Err(error) => {
                    if attempt < self.config.max_retries && is_retryable_error(&error) {
                        warn!(title, %error, "retrying page fetch");
                        self.wait_before_retry(attempt);
                        continue;
                    }
                    return Err(error).with_context(|| format!("failed to fetch {title}"));
                }
            }
        }

        bail!("fetching {title} exhausted retry budget")
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

fn revision_query(title: &str) -> Vec<(&'static str, String)> {
    vec![
        ("format", "xml".to_string()),
        ("action", "query".to_string()),
        ("titles", title.to_string()),
        ("prop", "revisions".to_string()),
        ("rvprop", "content".to_string()),
    ]
}

fn parsed_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key)
        .and_then(|value| value.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect()
}
