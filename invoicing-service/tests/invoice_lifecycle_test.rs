//! Draft, edit, finalize, cancel and delete over HTTP.

mod common;

use common::{id_of, invoice_body, money, TestApp, KARNATAKA, MAHARASHTRA};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use uuid::Uuid;

#[tokio::test]
async fn intra_state_invoice_splits_gst_into_cgst_and_sgst() {
    let app = TestApp::spawn().await;
    let user = app.register_user(MAHARASHTRA).await;
    let client = app.create_client(user, "Acme Pune", MAHARASHTRA).await;

    let response = app
        .create_invoice(
            user,
            client,
            json!([{ "description": "Widget", "quantity": 2, "rate": 100 }]),
        )
        .await;
    assert_eq!(response.status().as_u16(), 201);

    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["status"], "draft");
    assert!(body["invoice_number"].is_null());
    assert_eq!(body["client_name"], "Acme Pune");
    assert_eq!(money(&body["subtotal"]), dec!(200));
    assert_eq!(money(&body["cgst"]), dec!(18));
    assert_eq!(money(&body["sgst"]), dec!(18));
    assert_eq!(money(&body["igst"]), dec!(0));
    assert_eq!(money(&body["total"]), dec!(236));
    assert_eq!(body["items"].as_array().map(Vec::len), Some(1));
    assert_eq!(body["items"][0]["name"], "Widget");
    assert_eq!(money(&body["items"][0]["amount"]), dec!(200));
}

#[tokio::test]
async fn inter_state_invoice_charges_igst() {
    let app = TestApp::spawn().await;
    let user = app.register_user(MAHARASHTRA).await;
    let client = app.create_client(user, "Acme Bengaluru", KARNATAKA).await;

    let response = app
        .create_invoice(
            user,
            client,
            json!([{ "name": "Retainer", "description": "April retainer", "quantity": 1, "rate": "1000" }]),
        )
        .await;
    assert_eq!(response.status().as_u16(), 201);

    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(money(&body["subtotal"]), dec!(1000));
    assert_eq!(money(&body["cgst"]), dec!(0));
    assert_eq!(money(&body["sgst"]), dec!(0));
    assert_eq!(money(&body["igst"]), dec!(180));
    assert_eq!(money(&body["total"]), dec!(1180));
    assert_eq!(body["items"][0]["name"], "Retainer");
}

#[tokio::test]
async fn finalize_assigns_sequential_numbers_once() {
    let app = TestApp::spawn().await;
    let user = app.register_user(MAHARASHTRA).await;
    let client = app.create_client(user, "Acme", MAHARASHTRA).await;

    let first = app.create_simple_invoice(user, client).await;
    let second = app.create_simple_invoice(user, client).await;

    let response = app.post(user, &format!("/invoices/{}/finalize", first)).await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["status"], "finalized");
    assert_eq!(body["invoice_number"], "INV-0001");

    let response = app.post(user, &format!("/invoices/{}/finalize", second)).await;
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["invoice_number"], "INV-0002");

    let response = app.post(user, &format!("/invoices/{}/finalize", first)).await;
    assert_eq!(response.status().as_u16(), 400);

    let response = app.get(user, &format!("/invoices/{}", first)).await;
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["invoice_number"], "INV-0001");
}

#[tokio::test]
async fn concurrent_finalizes_get_distinct_sequential_numbers() {
    let app = TestApp::spawn().await;
    let user = app.register_user(MAHARASHTRA).await;
    let client = app.create_client(user, "Acme", MAHARASHTRA).await;

    let first = app.create_simple_invoice(user, client).await;
    let second = app.create_simple_invoice(user, client).await;

    let first_path = format!("/invoices/{}/finalize", first);
    let second_path = format!("/invoices/{}/finalize", second);
    let (a, b) = tokio::join!(app.post(user, &first_path), app.post(user, &second_path));
    assert_eq!(a.status().as_u16(), 200);
    assert_eq!(b.status().as_u16(), 200);

    let a: Value = a.json().await.expect("Failed to parse JSON");
    let b: Value = b.json().await.expect("Failed to parse JSON");
    let mut numbers = [
        a["invoice_number"].as_str().unwrap_or_default().to_string(),
        b["invoice_number"].as_str().unwrap_or_default().to_string(),
    ];
    numbers.sort();
    assert_eq!(numbers, ["INV-0001", "INV-0002"]);
}

#[tokio::test]
async fn concurrent_finalizes_of_one_draft_number_it_once() {
    let app = TestApp::spawn().await;
    let user = app.register_user(MAHARASHTRA).await;
    let client = app.create_client(user, "Acme", MAHARASHTRA).await;
    let invoice = app.create_simple_invoice(user, client).await;

    let path = format!("/invoices/{}/finalize", invoice);
    let (a, b) = tokio::join!(app.post(user, &path), app.post(user, &path));
    let mut statuses = [a.status().as_u16(), b.status().as_u16()];
    statuses.sort_unstable();
    assert_eq!(statuses, [200, 400]);

    let next = app.create_simple_invoice(user, client).await;
    let response = app.post(user, &format!("/invoices/{}/finalize", next)).await;
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["invoice_number"], "INV-0002");
}

#[tokio::test]
async fn custom_prefix_is_used_for_numbering() {
    let app = TestApp::spawn().await;
    let user = Uuid::new_v4();
    let response = app
        .post_json(
            user,
            "/users",
            &json!({
                "email": "prefix@example.com",
                "state": MAHARASHTRA,
                "invoice_prefix": "ACME/25-",
            }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 201);
    let client = app.create_client(user, "Acme", MAHARASHTRA).await;
    let invoice = app.create_simple_invoice(user, client).await;

    let response = app.post(user, &format!("/invoices/{}/finalize", invoice)).await;
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["invoice_number"], "ACME/25-0001");

    let response = app.get(user, &format!("/invoices/{}/pdf", invoice)).await;
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(
        response
            .headers()
            .get("content-disposition")
            .and_then(|v| v.to_str().ok()),
        Some("inline; filename=\"invoice-ACME-25-0001.json\"")
    );
}

#[tokio::test]
async fn prefixes_unsafe_for_headers_are_rejected() {
    let app = TestApp::spawn().await;
    let user = app.register_user(MAHARASHTRA).await;

    for prefix in ["AC\nME-", "A\"; x=\""] {
        let response = app
            .put_json(user, "/users/me", &json!({ "invoice_prefix": prefix }))
            .await;
        assert_eq!(response.status().as_u16(), 400, "prefix {:?} accepted", prefix);
    }

    let response = app
        .post_json(
            Uuid::new_v4(),
            "/users",
            &json!({ "email": "quote@example.com", "invoice_prefix": "A\"B" }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 400);

    let response = app.get(user, "/users/me").await;
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert!(body["invoice_prefix"].is_null());
}

#[tokio::test]
async fn editing_a_draft_replaces_items_and_recomputes_tax() {
    let app = TestApp::spawn().await;
    let user = app.register_user(MAHARASHTRA).await;
    let client = app.create_client(user, "Acme", MAHARASHTRA).await;

    let response = app
        .create_invoice(
            user,
            client,
            json!([
                { "description": "Design", "quantity": 1, "rate": 500 },
                { "description": "Hosting", "quantity": 12, "rate": 50 }
            ]),
        )
        .await;
    let body: Value = response.json().await.expect("Failed to parse JSON");
    let invoice = id_of(&body, "invoice_id");
    assert_eq!(money(&body["subtotal"]), dec!(1100));

    let response = app
        .put_json(
            user,
            &format!("/invoices/{}", invoice),
            &invoice_body(
                client,
                json!([{ "description": "Design", "quantity": 3, "rate": "33.33" }]),
            ),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["items"].as_array().map(Vec::len), Some(1));
    assert_eq!(money(&body["subtotal"]), dec!(99.99));
    assert_eq!(money(&body["cgst"]), dec!(9.00));
    assert_eq!(money(&body["sgst"]), dec!(9.00));
    assert_eq!(money(&body["total"]), dec!(117.99));

    let response = app.get(user, &format!("/invoices/{}", invoice)).await;
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["items"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn finalized_invoices_cannot_be_edited_or_cancelled() {
    let app = TestApp::spawn().await;
    let user = app.register_user(MAHARASHTRA).await;
    let client = app.create_client(user, "Acme", MAHARASHTRA).await;
    let invoice = app.create_simple_invoice(user, client).await;
    app.post(user, &format!("/invoices/{}/finalize", invoice)).await;

    let response = app
        .put_json(
            user,
            &format!("/invoices/{}", invoice),
            &invoice_body(
                client,
                json!([{ "description": "Changed", "quantity": 1, "rate": 1 }]),
            ),
        )
        .await;
    assert_eq!(response.status().as_u16(), 400);

    let response = app.post(user, &format!("/invoices/{}/cancel", invoice)).await;
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn cancel_and_delete_a_draft() {
    let app = TestApp::spawn().await;
    let user = app.register_user(MAHARASHTRA).await;
    let client = app.create_client(user, "Acme", MAHARASHTRA).await;
    let cancelled = app.create_simple_invoice(user, client).await;
    let deleted = app.create_simple_invoice(user, client).await;

    let response = app.post(user, &format!("/invoices/{}/cancel", cancelled)).await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["status"], "cancelled");
    assert!(body["invoice_number"].is_null());

    let response = app.delete(user, &format!("/invoices/{}", deleted)).await;
    assert_eq!(response.status().as_u16(), 204);

    let response = app.get(user, &format!("/invoices/{}", deleted)).await;
    assert_eq!(response.status().as_u16(), 404);

    let response = app.delete(user, &format!("/invoices/{}", deleted)).await;
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn invoices_are_invisible_to_other_users() {
    let app = TestApp::spawn().await;
    let owner = app.register_user(MAHARASHTRA).await;
    let stranger = app.register_user(MAHARASHTRA).await;
    let client = app.create_client(owner, "Acme", MAHARASHTRA).await;
    let invoice = app.create_simple_invoice(owner, client).await;

    let response = app.get(stranger, &format!("/invoices/{}", invoice)).await;
    assert_eq!(response.status().as_u16(), 404);

    let response = app.post(stranger, &format!("/invoices/{}/finalize", invoice)).await;
    assert_eq!(response.status().as_u16(), 404);

    let response = app.delete(stranger, &format!("/invoices/{}", invoice)).await;
    assert_eq!(response.status().as_u16(), 404);

    // Billing someone else's client is refused.
    let response = app
        .create_invoice(
            stranger,
            client,
            json!([{ "description": "x", "quantity": 1, "rate": 1 }]),
        )
        .await;
    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
async fn invalid_items_are_rejected() {
    let app = TestApp::spawn().await;
    let user = app.register_user(MAHARASHTRA).await;
    let client = app.create_client(user, "Acme", MAHARASHTRA).await;

    for items in [
        json!([]),
        json!([{ "description": "Zero", "quantity": 0, "rate": 10 }]),
        json!([{ "description": "Negative", "quantity": 1, "rate": -5 }]),
        json!([{ "description": "  ", "quantity": 1, "rate": 5 }]),
        json!([{ "description": "Text", "quantity": "many", "rate": 5 }]),
    ] {
        let response = app.create_invoice(user, client, items.clone()).await;
        assert_eq!(response.status().as_u16(), 400, "items {} accepted", items);
    }

    let response = app.get(user, "/invoices").await;
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["pagination"]["total"], 0);
}

#[tokio::test]
async fn list_filters_by_status_and_pages() {
    let app = TestApp::spawn().await;
    let user = app.register_user(MAHARASHTRA).await;
    let client = app.create_client(user, "Globex", MAHARASHTRA).await;

    let mut ids = Vec::new();
    for _ in 0..3 {
        ids.push(app.create_simple_invoice(user, client).await);
    }
    app.post(user, &format!("/invoices/{}/finalize", ids[0])).await;

    let response = app.get(user, "/invoices?status=draft").await;
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["pagination"]["total"], 2);
    assert_eq!(body["invoices"][0]["client_name"], "Globex");

    let response = app.get(user, "/invoices?page=2&limit=2").await;
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["pagination"]["total"], 3);
    assert_eq!(body["pagination"]["pages"], 2);
    assert_eq!(body["invoices"].as_array().map(Vec::len), Some(1));

    let response = app.get(user, "/invoices?search=INV-0001").await;
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["pagination"]["total"], 1);

    let response = app.get(user, "/invoices?status=overdue").await;
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn stats_reflect_revenue_and_remaining_quota() {
    let app = TestApp::spawn().await;
    let user = app.register_user(MAHARASHTRA).await;
    let client = app.create_client(user, "Acme", MAHARASHTRA).await;

    let kept = app.create_simple_invoice(user, client).await;
    let cancelled = app.create_simple_invoice(user, client).await;
    app.post(user, &format!("/invoices/{}/finalize", kept)).await;
    app.post(user, &format!("/invoices/{}/cancel", cancelled)).await;

    let response = app.get(user, "/invoices/stats").await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["totalInvoices"], 2);
    assert_eq!(body["totalClients"], 1);
    assert_eq!(money(&body["totalRevenue"]), dec!(118));
    assert_eq!(body["remainingInvoices"], 3);
    assert_eq!(body["remainingClients"], 0);
    assert_eq!(body["planType"], "free");
}
