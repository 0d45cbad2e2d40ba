use super::{parse_count, parse_price, parse_rating, Connector, RawFields, Retailer};
use crate::error::ScrapeError;
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use select::document::Document;
use select::predicate::Attr;

/// Connector for vkusvill.ru. The pages are server-rendered with
/// schema.org microdata attributes, so plain HTML parsing is enough.
pub struct VkusvillConnector {
    client: Client,
    pattern: Regex,
}

impl VkusvillConnector {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            pattern: Regex::new(r"vkusvill\.ru/goods/[^/]+-(\d+)\.html")
                .expect("VkusVill URL pattern"),
        }
    }
}

fn itemprop_value(document: &Document, prop: &str) -> Option<String> {
    document.find(Attr("itemprop", prop)).next().map(|node| {
        node.attr("content")
            .or_else(|| node.attr("href"))
            .map(str::to_string)
            .unwrap_or_else(|| node.text().trim().to_string())
    })
}

#[async_trait]
impl Connector for VkusvillConnector {
    fn retailer(&self) -> Retailer {
        Retailer::VkusVill
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
        let document = Document::from(html.as_str());

        let title = itemprop_value(&document, "name").unwrap_or_default();
        let price = itemprop_value(&document, "price")
            .as_deref()
            .and_then(parse_price);
        let in_stock = itemprop_value(&document, "availability")
            .map(|a| a.contains("InStock"))
            .unwrap_or(true);
        let rating = itemprop_value(&document, "ratingValue")
            .as_deref()
            .and_then(parse_rating);
        let reviews_count = itemprop_value(&document, "reviewCount")
            .as_deref()
            .and_then(parse_count);

        if price.is_none() && title.is_empty() {
            return Err(ScrapeError::Parse(format!("no product markup on {}", url)));
        }

        Ok(RawFields {
            title,
            price_current: price,
            in_stock,
            rating,
            reviews_count,
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn matches_goods_urls() {
        let c = VkusvillConnector::new(super::super::default_client(Duration::from_secs(5)));
        assert!(c.matches("https://vkusvill.ru/goods/syrniki-s-izyumom-12345.html"));
        assert!(!c.matches("https://vkusvill.ru/news/"));
        assert_eq!(
            c.product_id("https://vkusvill.ru/goods/syrniki-s-izyumom-12345.html"),
            Some("12345".to_string())
        );
    }

    #[test]
    fn parses_microdata() {
        let html = r#"<html><body>
            <h1 itemprop="name">Сырники с изюмом</h1>
            <meta itemprop="price" content="189,00">
            <link itemprop="availability" href="https://schema.org/InStock">
            <span itemprop="ratingValue">4,8</span>
            <span itemprop="reviewCount">214</span>
        </body></html>"#;
        let document = Document::from(html);
        assert_eq!(
            itemprop_value(&document, "name").as_deref(),
            Some("Сырники с изюмом")
        );
        assert_eq!(
            itemprop_value(&document, "price").as_deref().and_then(parse_price),
            Some(18_900)
        );
        assert_eq!(
            itemprop_value(&document, "ratingValue").as_deref().and_then(parse_rating),
            Some(4.8)
        );
    }
}
