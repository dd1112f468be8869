//! price oracle boundary
//!
//! the oracle hands out signed update payloads that must ride in the
//! same bundle as any price-dependent call, plus the latest off-chain
//! prices used for client-side projections.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::{ClientError, Result};
use crate::model::{FeedId, PriceSet};

#[async_trait]
pub trait OracleApi: Send + Sync {
    /// signed update payload for the given feeds, one blob per feed
    /// batch as the service returns them
    async fn price_update_data(&self, feeds: &[FeedId]) -> Result<Vec<Vec<u8>>>;

    /// latest off-chain prices for the given feeds
    async fn latest_prices(&self, feeds: &[FeedId]) -> Result<PriceSet>;
}

/// hermes-style HTTP price service client
#[derive(Clone)]
pub struct HermesOracle {
    http: reqwest::Client,
    endpoint: String,
}

#[derive(Deserialize)]
struct LatestUpdateResponse {
    binary: BinaryUpdate,
    parsed: Vec<ParsedUpdate>,
}

#[derive(Deserialize)]
struct BinaryUpdate {
    data: Vec<String>,
}

#[derive(Deserialize)]
struct ParsedUpdate {
    id: String,
    price: ParsedPrice,
}

#[derive(Deserialize)]
struct ParsedPrice {
    price: String,
    expo: i32,
}

impl HermesOracle {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    fn latest_url(&self, feeds: &[FeedId]) -> String {
        let ids: Vec<String> = feeds
            .iter()
            .map(|f| format!("ids[]=0x{}", hex::encode(f.0)))
            .collect();
        format!(
            "{}/v2/updates/price/latest?{}&encoding=hex",
            self.endpoint.trim_end_matches('/'),
            ids.join("&")
        )
    }

    async fn fetch_latest(&self, feeds: &[FeedId]) -> Result<LatestUpdateResponse> {
        let url = self.latest_url(feeds);
        tracing::debug!("fetching oracle update for {} feeds", feeds.len());
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ClientError::Oracle(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ClientError::Oracle(format!("status {}", resp.status())));
        }
        resp.json()
            .await
            .map_err(|e| ClientError::Oracle(e.to_string()))
    }
}

/// parse a fixed-exponent integer price into the decimal domain
fn scale_price(mantissa: &str, expo: i32) -> Option<Decimal> {
    let mantissa: i64 = mantissa.parse().ok()?;
    if expo <= 0 {
        let scale = (-expo) as u32;
        if scale > 28 {
            return None;
        }
        Some(Decimal::new(mantissa, scale))
    } else {
        let factor = 10i64.checked_pow(expo as u32)?;
        Some(Decimal::from(mantissa.checked_mul(factor)?))
    }
}

#[async_trait]
impl OracleApi for HermesOracle {
    async fn price_update_data(&self, feeds: &[FeedId]) -> Result<Vec<Vec<u8>>> {
        if feeds.is_empty() {
            return Ok(Vec::new());
        }
        let latest = self.fetch_latest(feeds).await?;
        let mut blobs = Vec::with_capacity(latest.binary.data.len());
        for blob in &latest.binary.data {
            let stripped = blob.strip_prefix("0x").unwrap_or(blob);
            let bytes =
                hex::decode(stripped).map_err(|e| ClientError::InvalidHex(e.to_string()))?;
            blobs.push(bytes);
        }
        if blobs.is_empty() || blobs.iter().all(|b| b.is_empty()) {
            return Err(ClientError::EmptyUpdateData);
        }
        Ok(blobs)
    }

    async fn latest_prices(&self, feeds: &[FeedId]) -> Result<PriceSet> {
        if feeds.is_empty() {
            return Ok(PriceSet::default());
        }
        let latest = self.fetch_latest(feeds).await?;
        let mut prices = PriceSet::default();
        for update in &latest.parsed {
            let feed: FeedId = match update.id.parse() {
                Ok(f) => f,
                Err(_) => {
                    tracing::warn!("oracle returned unparseable feed id {}", update.id);
                    continue;
                }
            };
            match scale_price(&update.price.price, update.price.expo) {
                Some(price) => prices.insert(feed, price),
                None => tracing::warn!("oracle price for {feed} out of range"),
            }
        }
        Ok(prices)
    }
}
