//! Shared HTTP session used by the site adapters.

use reqwest::{Client, Response};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_retry::strategy::{jitter, FibonacciBackoff};
use tokio_retry::RetryIf;
use tracing::{debug, warn};

use crate::config::HttpConfig;
use crate::utils::error::{AppError, Result};

/// Token bucket that makes callers wait for a free slot instead of failing.
#[derive(Debug)]
pub struct RateLimiter {
    state: Mutex<RateState>,
    capacity: f64,
    refill_per_sec: f64,
}

#[derive(Debug)]
struct RateState {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// `None` when either limit is zero, meaning "unlimited".
    pub fn new(max_per_minute: u32, burst: u32) -> Option<Self> {
        if max_per_minute == 0 || burst == 0 {
            return None;
        }
        let capacity = burst as f64;
        Some(Self {
            state: Mutex::new(RateState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            capacity,
            refill_per_sec: max_per_minute as f64 / 60.0,
        })
    }

    /// Take one token, sleeping until one is available. Callers are served
    /// in the order they lock the bucket.
    pub async fn acquire(&self) {
        let mut guard = self.state.lock().await;
        loop {
            let now = Instant::now();
            let elapsed = now.duration_since(guard.last_refill).as_secs_f64();
            guard.last_refill = now;
            guard.tokens = (guard.tokens + elapsed * self.refill_per_sec).min(self.capacity);

            if guard.tokens >= 1.0 {
                guard.tokens -= 1.0;
                return;
            }

            let wait = Duration::from_secs_f64((1.0 - guard.tokens) / self.refill_per_sec);
            debug!(wait_ms = wait.as_millis() as u64, "Rate limit reached, waiting");
            tokio::time::sleep(wait).await;
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpSession {
    client: Client,
    limiter: Option<Arc<RateLimiter>>,
    retry_attempts: usize,
    retry_delay_ms: u64,
}

impl HttpSession {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            limiter: RateLimiter::new(config.max_requests_per_minute, config.burst).map(Arc::new),
            retry_attempts: config.retry_attempts,
            retry_delay_ms: config.retry_delay_ms,
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// GET a page body as text.
    pub async fn get_text(&self, url: &str) -> Result<String> {
        let response = self.get(url).await?;
        Ok(response.text().await?)
    }

    /// GET and decode a JSON document.
    pub async fn get_json(&self, url: &str) -> Result<Value> {
        let response = self.get(url).await?;
        Ok(response.json().await?)
    }

    /// GET with retries on connection errors, 429 and 5xx responses. Any
    /// other non-success status fails immediately.
    pub async fn get(&self, url: &str) -> Result<Response> {
        let strategy = FibonacciBackoff::from_millis(self.retry_delay_ms.max(1))
            .max_delay(Duration::from_secs(30))
            .map(jitter)
            .take(self.retry_attempts);

        RetryIf::spawn(strategy, || self.attempt(url), |err: &AppError| {
            let retry = err.is_transient();
            if retry {
                warn!(url = %url, error = %err, "Request failed, retrying");
            }
            retry
        })
        .await
    }

    async fn attempt(&self, url: &str) -> Result<Response> {
        if let Some(limiter) = &self.limiter {
            limiter.acquire().await;
        }

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }
}
