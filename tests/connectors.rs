//! Wildberries card API contract tests against a mock HTTP server.

use pricewatch::connector::{default_client, Connector, WildberriesConnector};
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PRODUCT_URL: &str = "https://www.wildberries.ru/catalog/12345678/detail.aspx";

fn connector_against(server: &MockServer) -> WildberriesConnector {
    WildberriesConnector::new(default_client(Duration::from_secs(5))).with_api_base(server.uri())
}

#[tokio::test]
async fn card_api_fields_are_mapped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cards/v2/detail"))
        .and(query_param("nm", "12345678"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {
                "products": [{
                    "name": "Футболка хлопковая",
                    "priceU": 129_900,
                    "salePriceU": 99_900,
                    "reviewRating": 4.6,
                    "feedbacks": 321,
                    "totalQuantity": 14
                }]
            }
        })))
        .mount(&server)
        .await;

    let connector = connector_against(&server);
    let raw = connector.fetch(PRODUCT_URL).await.unwrap();

    assert_eq!(raw.title, "Футболка хлопковая");
    assert_eq!(raw.price_regular, Some(129_900));
    assert_eq!(raw.price_promo, Some(99_900));
    assert!(raw.in_stock);
    assert_eq!(raw.rating, Some(4.6));
    assert_eq!(raw.reviews_count, Some(321));
}

#[tokio::test]
async fn sold_out_product_is_out_of_stock() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cards/v2/detail"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {
                "products": [{
                    "name": "Распроданный товар",
                    "priceU": 50_000,
                    "totalQuantity": 0
                }]
            }
        })))
        .mount(&server)
        .await;

    let connector = connector_against(&server);
    let raw = connector.fetch(PRODUCT_URL).await.unwrap();
    assert!(!raw.in_stock);
}

#[tokio::test]
async fn delisted_product_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cards/v2/detail"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": { "products": [] }
        })))
        .mount(&server)
        .await;

    let connector = connector_against(&server);
    let error = connector.fetch(PRODUCT_URL).await.unwrap_err();
    assert_eq!(error.kind(), "not_found");
}

#[tokio::test]
async fn server_errors_are_transient_network_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cards/v2/detail"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let connector = connector_against(&server);
    let error = connector.fetch(PRODUCT_URL).await.unwrap_err();
    assert_eq!(error.kind(), "network_error");
}

#[tokio::test]
async fn malformed_payload_is_a_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cards/v2/detail"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>bot check</html>"))
        .mount(&server)
        .await;

    let connector = connector_against(&server);
    let error = connector.fetch(PRODUCT_URL).await.unwrap_err();
    assert_eq!(error.kind(), "parse_error");
}
