//! CoinGecko price fetcher with synthetic fallback.
//!
//! A fetch never fails from the caller's point of view. When the API is unreachable,
//! rate limited, or returns something unusable, the error is logged and recorded, and a
//! synthetic quote built from the asset's base price is returned instead so offline and
//! demo use keep working.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rand::Rng;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use super::quote::{PriceQuote, round_to};
use crate::config::{AppConfig, Asset};

/// Failure while retrieving a quote from the price API.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Transport failure (DNS, connect, timeout, body read).
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("price API returned HTTP {0}")]
    Status(StatusCode),

    /// The body was not the expected JSON shape.
    #[error("could not decode price response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The response did not contain the requested asset.
    #[error("no price data for '{0}'")]
    MissingAsset(String),
}

/// Anything that can produce a quote for an asset.
///
/// Implementations must not fail: recoverable problems are reported through
/// [`QuoteSource::last_error`] while a usable quote is still returned.
pub trait QuoteSource: Send + Sync + 'static {
    /// Fetch the latest quote for `asset`.
    fn fetch_price(&self, asset: Asset) -> impl Future<Output = PriceQuote> + Send;

    /// Description of the most recent failure, cleared by the next success.
    fn last_error(&self) -> Option<String>;
}

/// Per-asset entry of a `simple/price` response.
#[derive(Debug, Deserialize)]
struct CoinPrice {
    usd: Option<f64>,
    usd_1h_change: Option<f64>,
    usd_24h_change: Option<f64>,
    usd_7d_change: Option<f64>,
}

/// HTTP client for the CoinGecko `simple/price` endpoint.
pub struct PriceFetcher {
    client: Client,                    // Shared connection pool
    endpoint: Url,                     // Full `.../simple/price` URL
    last_error: Mutex<Option<String>>, // Most recent failure, if any
}

impl PriceFetcher {
    /// Create a fetcher from the application configuration.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &AppConfig) -> Result<Self> {
        Self::with_endpoint(&config.api_url, Duration::from_secs(config.request_timeout_secs))
    }

    /// Create a fetcher for an explicit API base URL.
    ///
    /// # Arguments
    /// * `api_url` - Base URL of the API (e.g. `https://api.coingecko.com/api/v3`)
    /// * `timeout` - Upper bound for a single request
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be built.
    pub fn with_endpoint(api_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        let endpoint = format!("{}/simple/price", api_url.trim_end_matches('/'));
        let endpoint = Url::parse(&endpoint).with_context(|| format!("Invalid price API URL: {}", api_url))?;

        Ok(Self { client, endpoint, last_error: Mutex::new(None) })
    }

    /// Build the request URL for a set of asset ids.
    fn request_url(&self, ids: &[&str]) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("ids", &ids.join(","))
            .append_pair("vs_currencies", "usd")
            .append_pair("include_1hr_change", "true")
            .append_pair("include_24hr_change", "true")
            .append_pair("include_7d_change", "true");
        url
    }

    /// Query the API once, without fallback.
    async fn request_quote(&self, asset: Asset) -> Result<PriceQuote, FetchError> {
        let url = self.request_url(&[asset.id()]);
        debug!("GET {}", url);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let body = response.text().await?;
        parse_response(&body, asset)
    }
}

impl QuoteSource for PriceFetcher {
    async fn fetch_price(&self, asset: Asset) -> PriceQuote {
        match self.request_quote(asset).await {
            Ok(quote) => {
                *self.last_error.lock() = None;
                quote
            }
            Err(e) => {
                warn!("⚠️  {} price unavailable ({}), using synthetic quote", asset.ticker(), e);
                *self.last_error.lock() = Some(e.to_string());
                synthetic_quote(asset)
            }
        }
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }
}

/// Decode a `simple/price` response body for one asset.
///
/// # Errors
/// Returns `Decode` for malformed JSON and `MissingAsset` when the asset or its
/// USD price is absent.
pub fn parse_response(body: &str, asset: Asset) -> Result<PriceQuote, FetchError> {
    let mut prices: HashMap<String, CoinPrice> = serde_json::from_str(body)?;
    let entry = prices.remove(asset.id()).ok_or_else(|| FetchError::MissingAsset(asset.id().to_string()))?;
    let price = entry.usd.ok_or_else(|| FetchError::MissingAsset(asset.id().to_string()))?;

    Ok(PriceQuote { price, change_1h: entry.usd_1h_change, change_24h: entry.usd_24h_change, change_7d: entry.usd_7d_change })
}

/// Decimal places kept on synthetic values.
pub const SYNTHETIC_DECIMALS: i32 = 2;

/// Build a plausible quote around the asset's base price.
///
/// Jitter bounds: ±1% on price, ±0.25pp on the 1h change, ±1pp on the 24h change,
/// ±2pp on the 7d change. Every value is rounded to [`SYNTHETIC_DECIMALS`] and all
/// fields are set. For sub-dollar assets the rounding step dominates the jitter, so
/// DOGE (0.085) lands on 0.08 or 0.09.
pub fn synthetic_quote(asset: Asset) -> PriceQuote {
    let mut rng = rand::rng();
    let price = asset.base_price() * (1.0 + rng.random_range(-0.01..=0.01));

    PriceQuote {
        price: round_to(price, SYNTHETIC_DECIMALS),
        change_1h: Some(round_to(rng.random_range(-0.25..=0.25), SYNTHETIC_DECIMALS)),
        change_24h: Some(round_to(rng.random_range(-1.0..=1.0), SYNTHETIC_DECIMALS)),
        change_7d: Some(round_to(rng.random_range(-2.0..=2.0), SYNTHETIC_DECIMALS)),
    }
}
