mod common;

use common::{TestApp, TEST_CLIENT_ID};
use reqwest::Method;

async fn authorized_order(app: &TestApp, amount: &str) -> (String, String, String) {
    app.create_account("maintenance").await;
    let invoice = app.create_invoice(TEST_CLIENT_ID, "maintenance", amount).await;
    let invoice_id = invoice["invoice_id"].as_str().unwrap().to_string();

    let initiated: serde_json::Value = app
        .initiate_payment(TEST_CLIENT_ID, &invoice_id, amount)
        .await
        .json()
        .await
        .unwrap();
    let payment_id = initiated["payment_id"].as_str().unwrap().to_string();

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
    let order_id = payment["gateway_order_id"].as_str().unwrap().to_string();

    (invoice_id, payment_id, order_id)
}

#[tokio::test]
async fn unsigned_webhook_is_unauthorized() {
    let app = TestApp::spawn().await;

    let response = app
        .http
        .post(format!("{}/webhooks/razorpay", app.address))
        .header("content-type", "application/json")
        .body(r#"{"event":"payment.captured","payload":{}}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    app.cleanup().await;
}

#[tokio::test]
async fn tampered_webhook_body_is_unauthorized() {
    let app = TestApp::spawn().await;
    let (_, _, order_id) = authorized_order(&app, "5000.00").await;

    let body = serde_json::json!({
        "event": "payment.captured",
        "payload": { "payment": { "entity": {
            "id": "pay_x", "amount": 500000, "status": "captured", "order_id": order_id,
        }}}
    })
    .to_string();
    let signature = TestApp::razorpay_signature(&body);
    let tampered = body.replace("500000", "999999");

    let response = app
        .http
        .post(format!("{}/webhooks/razorpay", app.address))
        .header("X-Razorpay-Signature", signature)
        .header("X-Razorpay-Event-Id", "evt_tampered")
        .header("content-type", "application/json")
        .body(tampered)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    app.cleanup().await;
}

#[tokio::test]
async fn unknown_provider_is_not_found() {
    let app = TestApp::spawn().await;

    let response = app
        .http
        .post(format!("{}/webhooks/stripe", app.address))
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    app.cleanup().await;
}

#[tokio::test]
async fn unsupported_event_type_is_acknowledged_and_ignored() {
    let app = TestApp::spawn().await;

    let body = serde_json::json!({
        "event": "invoice.paid",
        "payload": {}
    })
    .to_string();

    let response = app
        .http
        .post(format!("{}/webhooks/razorpay", app.address))
        .header("X-Razorpay-Signature", TestApp::razorpay_signature(&body))
        .header("X-Razorpay-Event-Id", "evt_unsupported")
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let json: serde_json::Value = response.json().await.unwrap();
    assert_eq!(json["status"], "ignored");

    app.cleanup().await;
}

#[tokio::test]
async fn amount_mismatch_is_recorded_and_rejected() {
    let app = TestApp::spawn().await;
    let (invoice_id, payment_id, order_id) = authorized_order(&app, "5000.00").await;

    // The gateway claims a different amount than the payment row.
    let response = app
        .deliver_webhook(
            "evt_mismatch",
            "payment.captured",
            &order_id,
            "pay_bad",
            "captured",
            450_000,
        )
        .await;
    assert_eq!(response.status(), 500);

    // Payment and invoice are untouched.
    let payment: serde_json::Value = app
        .admin_req(Method::GET, &format!("/payments/{}", payment_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(payment["state"], "authorized_pending");

    let detail: serde_json::Value = app
        .admin_req(Method::GET, &format!("/invoices/{}", invoice_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(detail["invoice"]["amount_paid"], "0.00");

    app.cleanup().await;
}

#[tokio::test]
async fn reconcile_applies_captured_order_and_dedupes_late_webhook() {
    let app = TestApp::spawn().await;
    let (invoice_id, payment_id, order_id) = authorized_order(&app, "5000.00").await;

    app.mount_order_paid(&order_id, 500_000).await;

    // Manual reconcile settles from the gateway snapshot.
    let response = app
        .admin_req(Method::POST, &format!("/payments/{}/reconcile", payment_id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["result"], "applied");

    let detail: serde_json::Value = app
        .admin_req(Method::GET, &format!("/invoices/{}", invoice_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(detail["invoice"]["status"], "paid");

    // Reconciling again is a no-op.
    let response = app
        .admin_req(Method::POST, &format!("/payments/{}/reconcile", payment_id))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["result"], "already_applied");

    // The real webhook arriving later reconfirms without double-applying.
    let response = app
        .deliver_webhook(
            "evt_late_real",
            "payment.captured",
            &order_id,
            "pay_rec",
            "captured",
            500_000,
        )
        .await;
    assert_eq!(response.status(), 200);

    let detail: serde_json::Value = app
        .admin_req(Method::GET, &format!("/invoices/{}", invoice_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(detail["invoice"]["amount_paid"], "5000.00");

    app.cleanup().await;
}

#[tokio::test]
async fn capture_for_unknown_order_is_rejected() {
    let app = TestApp::spawn().await;

    let response = app
        .deliver_webhook(
            "evt_unknown_order",
            "payment.captured",
            "order_never_created",
            "pay_x",
            "captured",
            100_000,
        )
        .await;
    assert_eq!(response.status(), 500);

    app.cleanup().await;
}
