use super::{Connector, RawFields, Retailer};
use crate::error::ScrapeError;
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;

const CARD_API_BASE: &str = "https://card.wb.ru";

/// Connector for wildberries.ru (and the wb.ru short domain). Product
/// data comes from the public card API, not the HTML page.
pub struct WildberriesConnector {
    client: Client,
    pattern: Regex,
    api_base: String,
}

impl WildberriesConnector {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            pattern: Regex::new(r"(?:wildberries|wb)\.ru/catalog/(\d+)/detail")
                .expect("Wildberries URL pattern"),
            api_base: CARD_API_BASE.to_string(),
        }
    }

    /// Point the connector at a different card API host. Test hook.
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    fn card_url(&self, product_id: &str) -> String {
        format!(
            "{}/cards/v2/detail?appType=1&curr=rub&dest=-1257786&nm={}",
            self.api_base, product_id
        )
    }
}

#[derive(Debug, Deserialize)]
struct CardResponse {
    data: Option<CardData>,
}

#[derive(Debug, Deserialize)]
struct CardData {
    #[serde(default)]
    products: Vec<CardProduct>,
}

#[derive(Debug, Deserialize)]
struct CardProduct {
    #[serde(default)]
    name: String,
    /// Kopecks already.
    #[serde(rename = "salePriceU")]
    sale_price_u: Option<i64>,
    #[serde(rename = "priceU")]
    price_u: Option<i64>,
    #[serde(rename = "reviewRating")]
    review_rating: Option<f64>,
    feedbacks: Option<i64>,
    #[serde(rename = "totalQuantity")]
    total_quantity: Option<i64>,
}

#[async_trait]
impl Connector for WildberriesConnector {
    fn retailer(&self) -> Retailer {
        Retailer::Wildberries
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
        let product_id = self
            .product_id(url)
            .ok_or_else(|| ScrapeError::Parse(format!("no product id in {}", url)))?;

        let card_url = self.card_url(&product_id);
        let res = self
            .client
            .get(&card_url)
            .send()
            .await
            .map_err(|e| ScrapeError::from_http(url, &e))?;
        let status = res.status();
        if !status.is_success() {
            return Err(ScrapeError::from_status(url, status));
        }

        let card: CardResponse = res
            .json()
            .await
            .map_err(|e| ScrapeError::Parse(format!("card API response for {}: {}", url, e)))?;

        let product = card
            .data
            .and_then(|d| d.products.into_iter().next())
            .ok_or_else(|| ScrapeError::NotFound(url.to_string()))?;

        let in_stock = product.total_quantity.map(|q| q > 0).unwrap_or(true);

        Ok(RawFields {
            title: product.name,
            price_regular: product.price_u,
            price_promo: product.sale_price_u.filter(|p| Some(*p) != product.price_u),
            in_stock,
            rating: product.review_rating.filter(|r| (0.0..=5.0).contains(r)),
            reviews_count: product.feedbacks,
            ..Default::default()
        })
    }
}
