use super::{parse_count, parse_rating, Connector, RawFields, Retailer};
use crate::error::ScrapeError;
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;

/// Connector for ozon.ru product pages. Reads the JSON-LD block the
/// server renders into the page.
pub struct OzonConnector {
    client: Client,
    pattern: Regex,
}

impl OzonConnector {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            pattern: Regex::new(r"ozon\.ru/product/[^/]*?-?(\d+)/?").expect("Ozon URL pattern"),
        }
    }
}

#[async_trait]
impl Connector for OzonConnector {
    fn retailer(&self) -> Retailer {
        Retailer::Ozon
    }

    fn matches(&self, url: &str) -> bool {
        self.pattern.is_match(url)
    }

    fn product_id(&self, url: &str) -> Option<String> {
        self.pattern
            .captures(url)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    }

    async fn fetch(&self, url: &str) -> Result<RawFields, ScrapeError> {
        let res = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ScrapeError::from_http(url, &e))?;
        let status = res.status();
        if !status.is_success() {
            return Err(ScrapeError::from_status(url, status));
        }
        let html = res.text().await.map_err(|e| ScrapeError::from_http(url, &e))?;

        let product = super::json_ld_product(&html)
            .ok_or_else(|| ScrapeError::Parse(format!("no product data block on {}", url)))?;

        let offers = product.get("offers");
        let price = offers
            .and_then(|o| o.get("price"))
            .and_then(value_as_kopecks);
        let in_stock = offers
            .and_then(|o| o.get("availability"))
            .and_then(|a| a.as_str())
            .map(|a| a.contains("InStock"))
            .unwrap_or(true);

        let rating = product
            .pointer("/aggregateRating/ratingValue")
            .and_then(value_as_rating);
        let reviews_count = product
            .pointer("/aggregateRating/reviewCount")
            .and_then(value_as_count);

        if price.is_none() && in_stock {
            return Err(ScrapeError::Parse(format!("no price found on {}", url)));
        }

        Ok(RawFields {
            title: product
                .get("name")
                .and_then(|n| n.as_str())
                .unwrap_or_default()
                .to_string(),
            price_current: price,
            in_stock,
            rating,
            reviews_count,
            ..Default::default()
        })
    }
}

/// JSON-LD carries prices as either numbers or strings.
pub(crate) fn value_as_kopecks(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i * 100)
            } else {
                n.as_f64().map(|f| (f * 100.0).round() as i64)
            }
        }
        serde_json::Value::String(s) => super::parse_price(s),
        _ => None,
    }
}

pub(crate) fn value_as_rating(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64().filter(|r| (0.0..=5.0).contains(r)),
        serde_json::Value::String(s) => parse_rating(s),
        _ => None,
    }
}

pub(crate) fn value_as_count(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => parse_count(s),
        _ => None,
    }
}
