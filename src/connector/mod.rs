use crate::error::ScrapeError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub mod lavka;
pub mod ozon;
pub mod perekrestok;
pub mod vkusvill;
pub mod wildberries;

pub use lavka::LavkaConnector;
pub use ozon::OzonConnector;
pub use perekrestok::PerekrestokConnector;
pub use vkusvill::VkusvillConnector;
pub use wildberries::WildberriesConnector;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Retailer {
    Ozon,
    Wildberries,
    VkusVill,
    Perekrestok,
    YandexLavka,
}

impl Retailer {
    /// Stable slug used for config keys, storage and display.
    pub fn code(&self) -> &'static str {
        match self {
            Retailer::Ozon => "ozon",
            Retailer::Wildberries => "wildberries",
            Retailer::VkusVill => "vkusvill",
            Retailer::Perekrestok => "perekrestok",
            Retailer::YandexLavka => "lavka",
        }
    }

    pub fn from_code(code: &str) -> Option<Retailer> {
        match code {
            "ozon" => Some(Retailer::Ozon),
            "wildberries" | "wb" => Some(Retailer::Wildberries),
            "vkusvill" => Some(Retailer::VkusVill),
            "perekrestok" => Some(Retailer::Perekrestok),
            "lavka" | "yandex-lavka" => Some(Retailer::YandexLavka),
            _ => None,
        }
    }
}

impl std::fmt::Display for Retailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Raw fields a connector pulls off a product page. Prices are minor
/// units (kopecks); normalization into a final price happens later.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFields {
    pub title: String,
    pub price_regular: Option<i64>,
    pub price_promo: Option<i64>,
    pub price_card: Option<i64>,
    /// Price shown as "the" price when the page does not distinguish
    /// regular from promotional.
    pub price_current: Option<i64>,
    pub in_stock: bool,
    pub rating: Option<f64>,
    pub reviews_count: Option<i64>,
}

/// Normalized price fields ready for snapshotting.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedFields {
    pub title: String,
    pub price_regular: Option<i64>,
    pub price_promo: Option<i64>,
    pub price_card: Option<i64>,
    pub price_final: Option<i64>,
    pub in_stock: bool,
    pub rating: Option<f64>,
    pub reviews_count: Option<i64>,
}

/// Retailer-specific fetch+parse strategy. Implementations are thin
/// glue; everything interesting happens around them.
#[async_trait]
pub trait Connector: Send + Sync {
    fn retailer(&self) -> Retailer;

    /// Whether this connector handles the given URL.
    fn matches(&self, url: &str) -> bool;

    /// Stable external product id extracted from the URL, if the URL
    /// shape carries one.
    fn product_id(&self, url: &str) -> Option<String>;

    async fn fetch(&self, url: &str) -> Result<RawFields, ScrapeError>;
}

/// Ordered connector registry. First match wins; ties are broken by
/// registration order.
pub struct ConnectorRegistry {
    connectors: Vec<Arc<dyn Connector>>,
}

impl ConnectorRegistry {
    pub fn new(connectors: Vec<Arc<dyn Connector>>) -> Self {
        Self { connectors }
    }

    /// Registry with every production connector, sharing one HTTP client.
    pub fn with_default_connectors(client: Client) -> Self {
        Self::new(vec![
            Arc::new(OzonConnector::new(client.clone())),
            Arc::new(WildberriesConnector::new(client.clone())),
            Arc::new(VkusvillConnector::new(client.clone())),
            Arc::new(PerekrestokConnector::new(client.clone())),
            Arc::new(LavkaConnector::new(client)),
        ])
    }

    pub fn resolve(&self, url: &str) -> Option<Arc<dyn Connector>> {
        self.connectors.iter().find(|c| c.matches(url)).cloned()
    }

    pub fn detect(&self, url: &str) -> Option<Retailer> {
        self.resolve(url).map(|c| c.retailer())
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.connectors.len()
    }
}

/// Shared HTTP client for all connectors: bounded timeout, browser-ish
/// user agent.
pub fn default_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .user_agent("Mozilla/5.0 (X11; Linux x86_64) pricewatch/0.1")
        .build()
        .expect("Building HTTP client")
}

/// Parse a price string into kopecks. Handles "1 234,56 ₽", "1234.56",
/// "1 234 руб." and plain integers.
pub fn parse_price(raw: &str) -> Option<i64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect::<String>()
        .replace(',', ".");

    if cleaned.is_empty() {
        return None;
    }

    let mut parts = cleaned.splitn(2, '.');
    let rubles: i64 = parts.next()?.parse().ok()?;
    let kopecks = match parts.next() {
        Some(frac) if !frac.is_empty() => {
            let frac = if frac.len() > 2 { &frac[..2] } else { frac };
            let mut value: i64 = frac.parse().ok()?;
            if frac.len() == 1 {
                value *= 10;
            }
            value
        }
        _ => 0,
    };

    Some(rubles * 100 + kopecks)
}

/// Parse a rating string like "4.7" or "4,7 из 5". Values outside 0..=5
/// are rejected as parse noise.
pub fn parse_rating(raw: &str) -> Option<f64> {
    let token: String = raw
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect::<String>()
        .replace(',', ".");

    let rating: f64 = token.parse().ok()?;
    if (0.0..=5.0).contains(&rating) {
        Some((rating * 10.0).round() / 10.0)
    } else {
        None
    }
}

/// Parse a count string like "1 234 отзыва" into a number.
pub fn parse_count(raw: &str) -> Option<i64> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Extract the JSON-LD `Product` object embedded in a page, if any.
/// Server-rendered retailer pages carry one in a
/// `<script type="application/ld+json">` block.
pub(crate) fn json_ld_product(html: &str) -> Option<serde_json::Value> {
    use select::document::Document;
    use select::predicate::{Attr, Name, Predicate};

    let document = Document::from(html);
    for script in document.find(Name("script").and(Attr("type", "application/ld+json"))) {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(&script.text()) else {
            continue;
        };
        // Either a bare Product or an array/@graph containing one.
        let candidates: Vec<&serde_json::Value> = match &value {
            serde_json::Value::Array(items) => items.iter().collect(),
            serde_json::Value::Object(obj) => match obj.get("@graph") {
                Some(serde_json::Value::Array(items)) => items.iter().collect(),
                _ => vec![&value],
            },
            _ => continue,
        };
        for candidate in candidates {
            if candidate.get("@type").and_then(|t| t.as_str()) == Some("Product") {
                return Some(candidate.clone());
            }
        }
    }
    None
}

/// Normalize raw prices: the final price is the lowest one available,
/// and a lone current price doubles as the regular price.
pub fn normalize(raw: RawFields) -> NormalizedFields {
    let mut regular = raw.price_regular;

    let candidates = [raw.price_regular, raw.price_promo, raw.price_card, raw.price_current];
    let price_final = candidates.iter().flatten().min().copied();

    if regular.is_none() && raw.price_promo.is_none() {
        regular = raw.price_current;
    }

    NormalizedFields {
        title: raw.title,
        price_regular: regular,
        price_promo: raw.price_promo,
        price_card: raw.price_card,
        price_final,
        in_stock: raw.in_stock,
        rating: raw.rating,
        reviews_count: raw.reviews_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_registry() -> ConnectorRegistry {
        ConnectorRegistry::with_default_connectors(default_client(Duration::from_secs(5)))
    }

    #[test]
    fn parse_price_formats() {
        assert_eq!(parse_price("1 234,56 ₽"), Some(123_456));
        assert_eq!(parse_price("1234.56"), Some(123_456));
        assert_eq!(parse_price("1 234 руб."), Some(123_400));
        assert_eq!(parse_price("899"), Some(89_900));
        assert_eq!(parse_price("89,9"), Some(8_990));
        assert_eq!(parse_price(""), None);
        assert_eq!(parse_price("нет в наличии"), None);
    }

    #[test]
    fn parse_rating_formats() {
        assert_eq!(parse_rating("4.7"), Some(4.7));
        assert_eq!(parse_rating("4,7 из 5"), Some(4.7));
        assert_eq!(parse_rating("Рейтинг: 5"), Some(5.0));
        assert_eq!(parse_rating("47"), None);
        assert_eq!(parse_rating(""), None);
    }

    #[test]
    fn parse_count_formats() {
        assert_eq!(parse_count("1 234 отзыва"), Some(1234));
        assert_eq!(parse_count("12"), Some(12));
        assert_eq!(parse_count("нет отзывов"), None);
    }

    #[test]
    fn normalize_picks_min_price() {
        let fields = normalize(RawFields {
            price_regular: Some(100_000),
            price_promo: Some(80_000),
            price_card: Some(75_000),
            ..Default::default()
        });
        assert_eq!(fields.price_final, Some(75_000));
        assert_eq!(fields.price_regular, Some(100_000));
    }

    #[test]
    fn normalize_backfills_regular_from_current() {
        let fields = normalize(RawFields {
            price_current: Some(49_900),
            ..Default::default()
        });
        assert_eq!(fields.price_regular, Some(49_900));
        assert_eq!(fields.price_final, Some(49_900));
    }

    #[test]
    fn registry_detects_all_retailers() {
        let registry = test_registry();
        let cases = [
            ("https://www.ozon.ru/product/tovar-123456789/", Retailer::Ozon),
            (
                "https://www.wildberries.ru/catalog/12345678/detail.aspx",
                Retailer::Wildberries,
            ),
            (
                "https://vkusvill.ru/goods/syr-tvorozhnyy-12345.html",
                Retailer::VkusVill,
            ),
            (
                "https://www.perekrestok.ru/cat/105/p/moloko-3-2-971234",
                Retailer::Perekrestok,
            ),
            (
                "https://lavka.yandex.ru/213/good/moloko-prostokvashino",
                Retailer::YandexLavka,
            ),
        ];
        for (url, expected) in cases {
            assert_eq!(registry.detect(url), Some(expected), "url: {}", url);
        }
    }

    #[test]
    fn registry_resolves_aliases() {
        let registry = test_registry();
        assert_eq!(
            registry.detect("https://www.wb.ru/catalog/12345678/detail.aspx"),
            Some(Retailer::Wildberries)
        );
        assert_eq!(
            registry.detect("https://eda.yandex.ru/lavka/213/good/moloko"),
            Some(Retailer::YandexLavka)
        );
    }

    #[test]
    fn registry_rejects_unknown_hosts() {
        let registry = test_registry();
        assert_eq!(registry.detect("https://unsupported.example/x"), None);
        assert_eq!(registry.detect("https://www.ozon.ru/"), None);
    }

    #[test]
    fn json_ld_product_is_found_in_graph() {
        let html = r#"<html><head>
            <script type="application/ld+json">
            {"@graph": [
                {"@type": "BreadcrumbList"},
                {"@type": "Product", "name": "Молоко", "offers": {"price": "89.90"}}
            ]}
            </script>
        </head><body></body></html>"#;
        let product = json_ld_product(html).expect("product block");
        assert_eq!(product["name"], "Молоко");

        assert!(json_ld_product("<html><body>plain page</body></html>").is_none());
    }

    #[test]
    fn retailer_codes_round_trip() {
        for retailer in [
            Retailer::Ozon,
            Retailer::Wildberries,
            Retailer::VkusVill,
            Retailer::Perekrestok,
            Retailer::YandexLavka,
        ] {
            assert_eq!(Retailer::from_code(retailer.code()), Some(retailer));
        }
        assert_eq!(Retailer::from_code("wb"), Some(Retailer::Wildberries));
    }
}
