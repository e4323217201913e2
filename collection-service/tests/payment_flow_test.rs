mod common;

use common::{TestApp, TEST_CLIENT_ID};
use reqwest::Method;

async fn gateway_order_id(app: &TestApp, payment_id: &str) -> String {
    let payment: serde_json::Value = app
        .client_req(
            Method::GET,
            &format!("/payments/{}", payment_id),
            TEST_CLIENT_ID,
        )
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    payment["gateway_order_id"].as_str().unwrap().to_string()
}

async fn fetch_invoice(app: &TestApp, invoice_id: &str) -> serde_json::Value {
    app.admin_req(Method::GET, &format!("/invoices/{}", invoice_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

async fn fetch_account(app: &TestApp, account_id: &str) -> serde_json::Value {
    app.admin_req(Method::GET, &format!("/accounts/{}", account_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn happy_path_single_payment_settles_everything() {
    let app = TestApp::spawn().await;
    let account = app.create_account("maintenance").await;
    let invoice = app
        .create_invoice(TEST_CLIENT_ID, "maintenance", "5000.00")
        .await;
    let invoice_id = invoice["invoice_id"].as_str().unwrap();

    let response = app
        .initiate_payment(TEST_CLIENT_ID, invoice_id, "5000.00")
        .await;
    assert_eq!(response.status(), 201);
    let initiated: serde_json::Value = response.json().await.unwrap();
    assert_eq!(initiated["state"], "authorized_pending");
    assert!(initiated["hosted_url"].as_str().unwrap().contains("order_test_"));
    let payment_id = initiated["payment_id"].as_str().unwrap();

    let order_id = gateway_order_id(&app, payment_id).await;
    let response = app
        .deliver_webhook(
            "evt_A",
            "payment.captured",
            &order_id,
            "pay_happy",
            "captured",
            500_000,
        )
        .await;
    assert_eq!(response.status(), 200);

    // Payment settled with processed timestamp.
    let payment: serde_json::Value = app
        .client_req(
            Method::GET,
            &format!("/payments/{}", payment_id),
            TEST_CLIENT_ID,
        )
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(payment["state"], "settled");
    assert!(!payment["processed_utc"].is_null());
    assert_eq!(payment["gateway_payment_id"], "pay_happy");

    // Invoice fully applied.
    let detail = fetch_invoice(&app, invoice_id).await;
    assert_eq!(detail["invoice"]["amount_paid"], "5000.00");
    assert_eq!(detail["invoice"]["outstanding_amount"], "0.00");
    assert_eq!(detail["invoice"]["status"], "paid");

    // Account credited with settled money only.
    let account = fetch_account(&app, account["account_id"].as_str().unwrap()).await;
    assert_eq!(account["total_collected"], "5000.00");

    app.cleanup().await;
}

#[tokio::test]
async fn partial_payment_then_remainder() {
    let app = TestApp::spawn().await;
    app.create_account("maintenance").await;
    let invoice = app
        .create_invoice(TEST_CLIENT_ID, "maintenance", "5000.00")
        .await;
    let invoice_id = invoice["invoice_id"].as_str().unwrap();

    // First payment: 2000.00 of 5000.00.
    let first: serde_json::Value = app
        .initiate_payment(TEST_CLIENT_ID, invoice_id, "2000.00")
        .await
        .json()
        .await
        .unwrap();
    let order_1 = gateway_order_id(&app, first["payment_id"].as_str().unwrap()).await;
    app.deliver_webhook("evt_p1", "payment.captured", &order_1, "pay_1", "captured", 200_000)
        .await;

    let detail = fetch_invoice(&app, invoice_id).await;
    assert_eq!(detail["invoice"]["amount_paid"], "2000.00");
    assert_eq!(detail["invoice"]["outstanding_amount"], "3000.00");
    assert_eq!(detail["invoice"]["status"], "partial_paid");

    // Remainder: 3000.00.
    let second: serde_json::Value = app
        .initiate_payment(TEST_CLIENT_ID, invoice_id, "3000.00")
        .await
        .json()
        .await
        .unwrap();
    let order_2 = gateway_order_id(&app, second["payment_id"].as_str().unwrap()).await;
    app.deliver_webhook("evt_p2", "payment.captured", &order_2, "pay_2", "captured", 300_000)
        .await;

    let detail = fetch_invoice(&app, invoice_id).await;
    assert_eq!(detail["invoice"]["amount_paid"], "5000.00");
    assert_eq!(detail["invoice"]["outstanding_amount"], "0.00");
    assert_eq!(detail["invoice"]["status"], "paid");
    assert_eq!(detail["payments"].as_array().unwrap().len(), 2);

    app.cleanup().await;
}

#[tokio::test]
async fn webhook_replay_changes_nothing() {
    let app = TestApp::spawn().await;
    let account = app.create_account("maintenance").await;
    let invoice = app
        .create_invoice(TEST_CLIENT_ID, "maintenance", "5000.00")
        .await;
    let invoice_id = invoice["invoice_id"].as_str().unwrap();

    let initiated: serde_json::Value = app
        .initiate_payment(TEST_CLIENT_ID, invoice_id, "5000.00")
        .await
        .json()
        .await
        .unwrap();
    let order_id = gateway_order_id(&app, initiated["payment_id"].as_str().unwrap()).await;

    for _ in 0..3 {
        let response = app
            .deliver_webhook(
                "evt_A",
                "payment.captured",
                &order_id,
                "pay_replay",
                "captured",
                500_000,
            )
            .await;
        // First delivery applies; replays are acknowledged as duplicates.
        assert_eq!(response.status(), 200);
    }

    let detail = fetch_invoice(&app, invoice_id).await;
    assert_eq!(detail["invoice"]["amount_paid"], "5000.00");

    let account = fetch_account(&app, account["account_id"].as_str().unwrap()).await;
    assert_eq!(account["total_collected"], "5000.00");

    app.cleanup().await;
}

#[tokio::test]
async fn late_failure_event_cannot_undo_settlement() {
    let app = TestApp::spawn().await;
    app.create_account("maintenance").await;
    let invoice = app
        .create_invoice(TEST_CLIENT_ID, "maintenance", "5000.00")
        .await;
    let invoice_id = invoice["invoice_id"].as_str().unwrap();

    let initiated: serde_json::Value = app
        .initiate_payment(TEST_CLIENT_ID, invoice_id, "5000.00")
        .await
        .json()
        .await
        .unwrap();
    let payment_id = initiated["payment_id"].as_str().unwrap();
    let order_id = gateway_order_id(&app, payment_id).await;

    app.deliver_webhook(
        "evt_A",
        "payment.captured",
        &order_id,
        "pay_ooo",
        "captured",
        500_000,
    )
    .await;

    // A distinct failure event for the same payment arrives late.
    let response = app
        .deliver_webhook("evt_B", "payment.failed", &order_id, "pay_ooo", "failed", 500_000)
        .await;
    assert_eq!(response.status(), 500);

    let payment: serde_json::Value = app
        .client_req(
            Method::GET,
            &format!("/payments/{}", payment_id),
            TEST_CLIENT_ID,
        )
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(payment["state"], "settled");

    app.cleanup().await;
}

#[tokio::test]
async fn over_initiation_is_rejected_with_no_payment_row() {
    let app = TestApp::spawn().await;
    app.create_account("maintenance").await;
    let invoice = app
        .create_invoice(TEST_CLIENT_ID, "maintenance", "5000.00")
        .await;
    let invoice_id = invoice["invoice_id"].as_str().unwrap();

    let response = app
        .initiate_payment(TEST_CLIENT_ID, invoice_id, "6000.00")
        .await;
    assert_eq!(response.status(), 400);

    let detail = fetch_invoice(&app, invoice_id).await;
    assert_eq!(detail["payments"].as_array().unwrap().len(), 0);

    app.cleanup().await;
}

#[tokio::test]
async fn refunds_accumulate_until_fully_refunded() {
    let app = TestApp::spawn().await;
    let account = app.create_account("maintenance").await;
    let invoice = app
        .create_invoice(TEST_CLIENT_ID, "maintenance", "5000.00")
        .await;
    let invoice_id = invoice["invoice_id"].as_str().unwrap();
    app.mount_refund_success().await;

    let initiated: serde_json::Value = app
        .initiate_payment(TEST_CLIENT_ID, invoice_id, "5000.00")
        .await
        .json()
        .await
        .unwrap();
    let payment_id = initiated["payment_id"].as_str().unwrap();
    let order_id = gateway_order_id(&app, payment_id).await;
    app.deliver_webhook(
        "evt_rf",
        "payment.captured",
        &order_id,
        "pay_refund",
        "captured",
        500_000,
    )
    .await;

    // Partial refund leaves the payment settled.
    let response = app
        .admin_req(Method::POST, &format!("/payments/{}/refund", payment_id))
        .json(&serde_json::json!({ "amount": "2000.00", "reason": "duplicate charge" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let refund: serde_json::Value = response.json().await.unwrap();
    assert_eq!(refund["state"], "successful");
    assert_eq!(refund["amount"], "2000.00");

    let payment: serde_json::Value = app
        .admin_req(Method::GET, &format!("/payments/{}", payment_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(payment["state"], "settled");

    let acc = fetch_account(&app, account["account_id"].as_str().unwrap()).await;
    assert_eq!(acc["total_refunded"], "2000.00");
    // The invoice stays closed; refunds live on the account.
    let detail = fetch_invoice(&app, invoice_id).await;
    assert_eq!(detail["invoice"]["amount_paid"], "5000.00");

    // Refunding the remainder flips the payment to refunded.
    let response = app
        .admin_req(Method::POST, &format!("/payments/{}/refund", payment_id))
        .json(&serde_json::json!({ "amount": "3000.00", "reason": "move-out settlement" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);

    let payment: serde_json::Value = app
        .admin_req(Method::GET, &format!("/payments/{}", payment_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(payment["state"], "refunded");

    let acc = fetch_account(&app, account["account_id"].as_str().unwrap()).await;
    assert_eq!(acc["total_refunded"], "5000.00");

    // Nothing left to refund.
    let response = app
        .admin_req(Method::POST, &format!("/payments/{}/refund", payment_id))
        .json(&serde_json::json!({ "amount": "0.01", "reason": "extra" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);

    app.cleanup().await;
}

#[tokio::test]
async fn duplicate_initiate_with_idempotency_key_returns_existing_payment() {
    let app = TestApp::spawn().await;
    app.create_account("maintenance").await;
    let invoice = app
        .create_invoice(TEST_CLIENT_ID, "maintenance", "5000.00")
        .await;
    let invoice_id = invoice["invoice_id"].as_str().unwrap();

    let body = serde_json::json!({
        "invoice_id": invoice_id,
        "amount": "5000.00",
        "provider": "razorpay",
        "payment_method": "upi",
        "client_name": "Asha Rao",
        "client_email": "asha@example.com",
        "client_phone": "+919812345678",
        "idempotency_key": "retry-key-1",
    });

    let first: serde_json::Value = app
        .client_req(Method::POST, "/payments/initiate", TEST_CLIENT_ID)
        .json(&body)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let second: serde_json::Value = app
        .client_req(Method::POST, "/payments/initiate", TEST_CLIENT_ID)
        .json(&body)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(first["payment_id"], second["payment_id"]);
    assert_eq!(first["order_id"], second["order_id"]);

    app.cleanup().await;
}

#[tokio::test]
async fn cancel_tears_down_pending_payment() {
    let app = TestApp::spawn().await;
    app.create_account("maintenance").await;
    let invoice = app
        .create_invoice(TEST_CLIENT_ID, "maintenance", "5000.00")
        .await;
    let invoice_id = invoice["invoice_id"].as_str().unwrap();

    let initiated: serde_json::Value = app
        .initiate_payment(TEST_CLIENT_ID, invoice_id, "5000.00")
        .await
        .json()
        .await
        .unwrap();
    let payment_id = initiated["payment_id"].as_str().unwrap();

    let response = app
        .client_req(
            Method::POST,
            &format!("/payments/{}/cancel", payment_id),
            TEST_CLIENT_ID,
        )
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let payment: serde_json::Value = response.json().await.unwrap();
    assert_eq!(payment["state"], "cancelled");

    // A capture after cancellation is an illegal edge.
    let order_id = payment["gateway_order_id"].as_str().unwrap();
    let response = app
        .deliver_webhook(
            "evt_late",
            "payment.captured",
            order_id,
            "pay_late",
            "captured",
            500_000,
        )
        .await;
    assert_eq!(response.status(), 500);

    app.cleanup().await;
}

#[tokio::test]
async fn cross_tenant_payment_lookup_is_not_found() {
    let app = TestApp::spawn().await;
    app.create_account("maintenance").await;
    let invoice = app
        .create_invoice(TEST_CLIENT_ID, "maintenance", "5000.00")
        .await;

    let initiated: serde_json::Value = app
        .initiate_payment(TEST_CLIENT_ID, invoice["invoice_id"].as_str().unwrap(), "5000.00")
        .await
        .json()
        .await
        .unwrap();
    let payment_id = initiated["payment_id"].as_str().unwrap();

    let response = app
        .http
        .get(format!("{}/payments/{}", app.address, payment_id))
        .header("X-Tenant-ID", "99999999-9999-4999-8999-999999999999")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    app.cleanup().await;
}
