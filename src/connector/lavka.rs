use super::ozon::{value_as_kopecks, value_as_rating};
use super::{Connector, RawFields, Retailer};
use crate::error::ScrapeError;
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;

/// Connector for Yandex Lavka, both lavka.yandex.ru and the
/// eda.yandex.ru/lavka mirror. Good pages embed a JSON-LD block; Lavka
/// products have no review feed, only an optional rating.
pub struct LavkaConnector {
    client: Client,
    pattern: Regex,
}

impl LavkaConnector {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            pattern: Regex::new(
                r"(?:lavka\.yandex\.ru/\d+|eda\.yandex\.ru/lavka/\d+)/good/([a-zA-Z0-9_-]+)",
            )
            .expect("Lavka URL pattern"),
        }
    }
}

#[async_trait]
impl Connector for LavkaConnector {
    fn retailer(&self) -> Retailer {
        Retailer::YandexLavka
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
        // Lavka hides out-of-area and delisted goods behind OutOfStock.
        let in_stock = offers
            .and_then(|o| o.get("availability"))
            .and_then(|a| a.as_str())
            .map(|a| a.contains("InStock"))
            .unwrap_or(true);

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
            rating: product
                .pointer("/aggregateRating/ratingValue")
                .and_then(value_as_rating),
            ..Default::default()
        })
    }
}
