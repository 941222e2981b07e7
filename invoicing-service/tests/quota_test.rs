//! Plan quota enforcement over HTTP.

mod common;

use common::{TestApp, MAHARASHTRA};
use serde_json::{json, Value};

#[tokio::test]
async fn free_plan_blocks_the_sixth_invoice() {
    let app = TestApp::spawn().await;
    let user = app.register_user(MAHARASHTRA).await;
    let client = app.create_client(user, "Acme", MAHARASHTRA).await;

    for _ in 0..5 {
        app.create_simple_invoice(user, client).await;
    }

    let response = app
        .create_invoice(
            user,
            client,
            json!([{ "description": "One too many", "quantity": 1, "rate": 10 }]),
        )
        .await;
    assert_eq!(response.status().as_u16(), 403);
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["limit"], 5);
    assert_eq!(body["current"], 5);
    assert!(body["error"].as_str().unwrap_or_default().contains("Free plan"));

    let response = app.get(user, "/invoices/stats").await;
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["remainingInvoices"], 0);
    assert_eq!(body["totalInvoices"], 5);
}

#[tokio::test]
async fn free_plan_allows_a_single_client() {
    let app = TestApp::spawn().await;
    let user = app.register_user(MAHARASHTRA).await;
    app.create_client(user, "First", MAHARASHTRA).await;

    let response = app
        .post_json(user, "/clients", &json!({ "name": "Second", "state": MAHARASHTRA }))
        .await;
    assert_eq!(response.status().as_u16(), 403);
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["limit"], 1);
    assert_eq!(body["current"], 1);
}

#[tokio::test]
async fn rendering_never_consumes_quota() {
    let app = TestApp::spawn().await;
    let user = app.register_user(MAHARASHTRA).await;
    let client = app.create_client(user, "Acme", MAHARASHTRA).await;

    let mut last = None;
    for _ in 0..4 {
        last = Some(app.create_simple_invoice(user, client).await);
    }
    let invoice = last.expect("created invoices");

    for _ in 0..3 {
        let response = app.get(user, &format!("/invoices/{}/pdf", invoice)).await;
        assert_eq!(response.status().as_u16(), 200);
        assert!(response
            .headers()
            .get("content-disposition")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("invoice-draft-")));
        let body: Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["watermark"], true);
        assert_eq!(body["template"], "classic");
        assert_eq!(body["client"]["name"], "Acme");
    }

    let response = app.get(user, "/invoices/stats").await;
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["remainingInvoices"], 1);

    // The fifth invoice still fits.
    app.create_simple_invoice(user, client).await;
}

#[tokio::test]
async fn pro_plan_counts_usage_from_its_start_date() {
    let app = TestApp::spawn().await;
    let user = app.register_user(MAHARASHTRA).await;
    let client = app.create_client(user, "Before upgrade", MAHARASHTRA).await;
    for _ in 0..5 {
        app.create_simple_invoice(user, client).await;
    }

    app.upgrade(user, "pro").await;

    let response = app.get(user, "/invoices/stats").await;
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["planType"], "pro");
    assert_eq!(body["remainingInvoices"], 10);
    assert_eq!(body["remainingClients"], 5);
    assert_eq!(body["totalInvoices"], 5);

    for index in 0..5 {
        app.create_client(user, &format!("Client {}", index), MAHARASHTRA)
            .await;
    }
    let response = app
        .post_json(user, "/clients", &json!({ "name": "Sixth", "state": MAHARASHTRA }))
        .await;
    assert_eq!(response.status().as_u16(), 403);
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["limit"], 5);
    assert_eq!(body["current"], 5);
}

#[tokio::test]
async fn enterprise_plan_is_unlimited() {
    let app = TestApp::spawn().await;
    let user = app.register_user(MAHARASHTRA).await;
    app.upgrade(user, "enterprise").await;

    let client = app.create_client(user, "Acme", MAHARASHTRA).await;
    for _ in 0..12 {
        app.create_simple_invoice(user, client).await;
    }
    app.create_client(user, "Globex", MAHARASHTRA).await;

    let response = app.get(user, "/invoices/stats").await;
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["remainingInvoices"], "unlimited");
    assert_eq!(body["remainingClients"], "unlimited");
    assert_eq!(body["totalInvoices"], 12);
}

#[tokio::test]
async fn concurrent_creates_cannot_overshoot_the_quota() {
    let app = TestApp::spawn().await;
    let user = app.register_user(MAHARASHTRA).await;
    let client = app.create_client(user, "Acme", MAHARASHTRA).await;

    for _ in 0..4 {
        app.create_simple_invoice(user, client).await;
    }

    let items = json!([{ "description": "Race", "quantity": 1, "rate": 10 }]);
    let (first, second) = tokio::join!(
        app.create_invoice(user, client, items.clone()),
        app.create_invoice(user, client, items.clone()),
    );

    let mut statuses = [first.status().as_u16(), second.status().as_u16()];
    statuses.sort_unstable();
    assert_eq!(statuses, [201, 403]);

    let rejected = if first.status().as_u16() == 403 { first } else { second };
    let body: Value = rejected.json().await.expect("Failed to parse JSON");
    assert_eq!(body["limit"], 5);
    assert_eq!(body["current"], 5);

    let response = app.get(user, "/invoices/stats").await;
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["totalInvoices"], 5);
    assert_eq!(body["remainingInvoices"], 0);
}

#[tokio::test]
async fn concurrent_client_creates_admit_only_one() {
    let app = TestApp::spawn().await;
    let user = app.register_user(MAHARASHTRA).await;

    let body_one = json!({ "name": "One", "state": MAHARASHTRA });
    let body_two = json!({ "name": "Two", "state": MAHARASHTRA });
    let body_three = json!({ "name": "Three", "state": MAHARASHTRA });
    let (first, second, third) = tokio::join!(
        app.post_json(user, "/clients", &body_one),
        app.post_json(user, "/clients", &body_two),
        app.post_json(user, "/clients", &body_three),
    );

    let mut statuses = [
        first.status().as_u16(),
        second.status().as_u16(),
        third.status().as_u16(),
    ];
    statuses.sort_unstable();
    assert_eq!(statuses, [201, 403, 403]);

    let response = app.get(user, "/clients").await;
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body.as_array().map(Vec::len), Some(1));
}
