//! Health endpoint and routing basics.

mod common;

use axum::http::StatusCode;
use serde_json::Value;

use common::{harness, test_config};

#[tokio::test]
async fn test_health_check() {
    let h = harness(test_config(), None);

    let response = h.server.get("/health").await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "dockpay");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let h = harness(test_config(), None);

    let response = h.server.get("/v1/nowhere").await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_merchant_is_404() {
    let h = harness(test_config(), None);

    let response = h.server.get("/v1/merchants/nobody/payments/pi_1").await;
    response.assert_status(StatusCode::NOT_FOUND);

    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "not_found");
}
