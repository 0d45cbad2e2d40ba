use super::ozon::{value_as_count, value_as_kopecks, value_as_rating};
use super::{Connector, RawFields, Retailer};
use crate::error::ScrapeError;
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;

/// Connector for perekrestok.ru category product pages. Like Ozon, the
/// pages embed a JSON-LD product block; Perekrestok additionally lists
/// the pre-discount price as an AggregateOffer highPrice.
pub struct PerekrestokConnector {
    client: Client,
    pattern: Regex,
}

impl PerekrestokConnector {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            pattern: Regex::new(r"perekrestok\.ru/cat/\d+/p/[^/]+-(\d+)")
                .expect("Perekrestok URL pattern"),
        }
    }
}

#[async_trait]
impl Connector for PerekrestokConnector {
    fn retailer(&self) -> Retailer {
        Retailer::Perekrestok
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
        let current = offers
            .and_then(|o| o.get("price").or_else(|| o.get("lowPrice")))
            .and_then(value_as_kopecks);
        let regular = offers.and_then(|o| o.get("highPrice")).and_then(value_as_kopecks);
        let in_stock = offers
            .and_then(|o| o.get("availability"))
            .and_then(|a| a.as_str())
            .map(|a| a.contains("InStock"))
            .unwrap_or(true);

        if current.is_none() && regular.is_none() && in_stock {
            return Err(ScrapeError::Parse(format!("no price found on {}", url)));
        }

        Ok(RawFields {
            title: product
                .get("name")
                .and_then(|n| n.as_str())
                .unwrap_or_default()
                .to_string(),
            price_regular: regular,
            price_promo: regular.and(current).filter(|c| Some(*c) < regular),
            price_current: current,
            in_stock,
            rating: product
                .pointer("/aggregateRating/ratingValue")
                .and_then(value_as_rating),
            reviews_count: product
                .pointer("/aggregateRating/reviewCount")
                .and_then(value_as_count),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn matches_catalog_urls() {
        let c = PerekrestokConnector::new(super::super::default_client(Duration::from_secs(5)));
        assert!(c.matches("https://www.perekrestok.ru/cat/105/p/moloko-3-2-971234"));
        assert!(!c.matches("https://www.perekrestok.ru/cat/105"));
        assert_eq!(
            c.product_id("https://www.perekrestok.ru/cat/105/p/moloko-3-2-971234"),
            Some("971234".to_string())
        );
    }
}
