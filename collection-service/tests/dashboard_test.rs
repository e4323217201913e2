mod common;

use common::{TestApp, TEST_CLIENT_ID};
use reqwest::Method;

#[tokio::test]
async fn dashboard_reflects_settled_money_only() {
    let app = TestApp::spawn().await;
    app.create_account("maintenance").await;

    let invoice = app
        .create_invoice(TEST_CLIENT_ID, "maintenance", "5000.00")
        .await;
    let invoice_id = invoice["invoice_id"].as_str().unwrap();

    // An authorized-but-uncaptured payment must not count as collected.
    let initiated: serde_json::Value = app
        .initiate_payment(TEST_CLIENT_ID, invoice_id, "5000.00")
        .await
        .json()
        .await
        .unwrap();

    let dashboard: serde_json::Value = app
        .admin_req(Method::GET, "/dashboard")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(dashboard["total_collected"], "0.00");
    assert_eq!(dashboard["total_outstanding"], "5000.00");
    assert_eq!(dashboard["recent_payments"].as_array().unwrap().len(), 0);

    // Capture it; the dashboard flips.
    let payment_id = initiated["payment_id"].as_str().unwrap();
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
    app.deliver_webhook(
        "evt_dash",
        "payment.captured",
        payment["gateway_order_id"].as_str().unwrap(),
        "pay_dash",
        "captured",
        500_000,
    )
    .await;

    let dashboard: serde_json::Value = app
        .admin_req(Method::GET, "/dashboard")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(dashboard["total_collected"], "5000.00");
    assert_eq!(dashboard["total_outstanding"], "0.00");
    assert_eq!(dashboard["total_clients"], 1);
    assert_eq!(dashboard["recent_payments"].as_array().unwrap().len(), 1);

    let by_type = dashboard["collection_by_type"].as_array().unwrap();
    assert_eq!(by_type.len(), 1);
    assert_eq!(by_type[0]["charge_type"], "maintenance");
    assert_eq!(by_type[0]["total_billed"], "5000.00");
    assert_eq!(by_type[0]["total_collected"], "5000.00");
    assert_eq!(by_type[0]["paid_invoices"], 1);
    assert_eq!(by_type[0]["collection_rate"], "100.00");

    app.cleanup().await;
}

#[tokio::test]
async fn overdue_amount_sums_past_due_outstanding() {
    let app = TestApp::spawn().await;

    // Past-due invoice, never paid.
    let response = app
        .admin_req(Method::POST, "/invoices")
        .json(&serde_json::json!({
            "client_id": TEST_CLIENT_ID,
            "client_name": "Asha Rao",
            "client_email": "asha@example.com",
            "client_phone": "+919812345678",
            "charge_type": "property_tax",
            "amount": "1500.00",
            "invoice_date": "2020-01-01",
            "due_date": "2020-02-01",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let invoice: serde_json::Value = response.json().await.unwrap();
    // Display status reflects the passed due date.
    assert_eq!(invoice["status"], "overdue");

    // Current invoice on the same charge type.
    app.create_invoice(TEST_CLIENT_ID, "property_tax", "1000.00")
        .await;

    let dashboard: serde_json::Value = app
        .admin_req(Method::GET, "/dashboard")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(dashboard["overdue_amount"], "1500.00");
    assert_eq!(dashboard["overdue_invoices"], 1);
    assert_eq!(dashboard["total_outstanding"], "2500.00");

    let by_type = dashboard["collection_by_type"].as_array().unwrap();
    assert_eq!(by_type[0]["overdue_amount"], "1500.00");

    app.cleanup().await;
}
