//! Block data providers and fetch resilience

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

pub const MAINNET_API_URL: &str = "https://blockstream.info/api";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("rate limited (HTTP 429)")]
    RateLimited,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl FetchError {
    /// Rate limiting and flaky transport recover on retry; a missing
    /// resource does not.
    fn is_transient(&self) -> bool {
        !matches!(self, FetchError::NotFound(_))
    }
}

/// One transaction input as reported by the explorer. `txid` is the
/// previous-output transaction this input spends; `scriptsig` is the
/// hex-encoded unlocking script, empty for segwit-only inputs.
#[derive(Debug, Clone, Deserialize)]
pub struct TxInput {
    #[serde(default)]
    pub txid: String,
    #[serde(default)]
    pub scriptsig: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Transaction {
    pub txid: String,
    #[serde(default)]
    pub vin: Vec<TxInput>,
}

/// Abstract block data source: height to block id, block id to ordered
/// txids, txid to full transaction detail.
pub trait BlockSource {
    fn block_hash(&self, height: u64) -> Result<String, FetchError>;
    fn block_txids(&self, block_hash: &str) -> Result<Vec<String>, FetchError>;
    fn transaction(&self, txid: &str) -> Result<Transaction, FetchError>;
}

/// Exponential backoff schedule for transient fetch failures: starts at
/// `base_delay`, doubles per retry, caps at `max_delay`, gives up after
/// `max_attempts` and surfaces the last error.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
    pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

    pub fn new(base_delay: Duration) -> Self {
        RetryPolicy {
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            base_delay,
            max_delay: Self::DEFAULT_MAX_DELAY,
        }
    }

    /// Runs `op` under this policy. The sleep function is injected so the
    /// schedule is observable in tests without real waits.
    pub fn run<T>(
        &self,
        sleep: &mut dyn FnMut(Duration),
        mut op: impl FnMut() -> Result<T, FetchError>,
    ) -> Result<T, FetchError> {
        let mut delay = self.base_delay;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) if attempt >= self.max_attempts => return Err(e),
                Err(e) => {
                    eprintln!("{e}, retrying in {:.1}s...", delay.as_secs_f64());
                    sleep(delay);
                    delay = (delay * 2).min(self.max_delay);
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::new(Duration::from_secs(1))
    }
}

/// Esplora-compatible block explorer client over blocking HTTP. Every
/// request runs under the retry policy.
pub struct EsploraClient {
    base_url: String,
    agent: ureq::Agent,
    retry: RetryPolicy,
}

impl EsploraClient {
    pub fn new(base_url: impl Into<String>, retry: RetryPolicy) -> Self {
        EsploraClient {
            base_url: base_url.into(),
            agent: ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build(),
            retry,
        }
    }

    pub fn mainnet(retry: RetryPolicy) -> Self {
        Self::new(MAINNET_API_URL, retry)
    }

    fn request(&self, url: &str) -> Result<ureq::Response, FetchError> {
        match self.agent.get(url).call() {
            Ok(response) => Ok(response),
            Err(ureq::Error::Status(404, _)) => Err(FetchError::NotFound(url.to_string())),
            Err(ureq::Error::Status(429, _)) => Err(FetchError::RateLimited),
            Err(ureq::Error::Status(code, _)) => {
                Err(FetchError::Transport(format!("{url}: HTTP {code}")))
            }
            Err(e) => Err(FetchError::Transport(e.to_string())),
        }
    }

    fn get_text(&self, endpoint: &str) -> Result<String, FetchError> {
        let url = format!("{}{}", self.base_url, endpoint);
        self.retry.run(&mut std::thread::sleep, || {
            self.request(&url)?
                .into_string()
                .map_err(|e| FetchError::Transport(e.to_string()))
        })
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, endpoint: &str) -> Result<T, FetchError> {
        let url = format!("{}{}", self.base_url, endpoint);
        self.retry.run(&mut std::thread::sleep, || {
            self.request(&url)?
                .into_json::<T>()
                .map_err(|e| FetchError::Malformed(e.to_string()))
        })
    }
}

impl BlockSource for EsploraClient {
    fn block_hash(&self, height: u64) -> Result<String, FetchError> {
        let hash = self.get_text(&format!("/block-height/{height}"))?;
        Ok(hash.trim().to_string())
    }

    fn block_txids(&self, block_hash: &str) -> Result<Vec<String>, FetchError> {
        self.get_json(&format!("/block/{block_hash}/txids"))
    }

    fn transaction(&self, txid: &str) -> Result<Transaction, FetchError> {
        self.get_json(&format!("/tx/{txid}"))
    }
}
