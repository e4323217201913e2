mod common;

use common::{TestApp, OTHER_CLIENT_ID, TEST_CLIENT_ID};
use reqwest::Method;

#[tokio::test]
async fn invoice_issues_with_full_outstanding() {
    let app = TestApp::spawn().await;

    let invoice = app
        .create_invoice(TEST_CLIENT_ID, "maintenance", "5000.00")
        .await;

    assert_eq!(invoice["status"], "issued");
    assert_eq!(invoice["amount"], "5000.00");
    assert_eq!(invoice["amount_paid"], "0.00");
    assert_eq!(invoice["outstanding_amount"], "5000.00");
    assert!(invoice["invoice_number"]
        .as_str()
        .unwrap()
        .starts_with("INV-11111111-"));

    app.cleanup().await;
}

#[tokio::test]
async fn invoice_numbers_are_unique_per_tenant() {
    let app = TestApp::spawn().await;

    let a = app
        .create_invoice(TEST_CLIENT_ID, "maintenance", "100.00")
        .await;
    let b = app
        .create_invoice(TEST_CLIENT_ID, "maintenance", "200.00")
        .await;

    assert_ne!(a["invoice_number"], b["invoice_number"]);

    app.cleanup().await;
}

#[tokio::test]
async fn due_date_before_invoice_date_is_rejected() {
    let app = TestApp::spawn().await;

    let response = app
        .admin_req(Method::POST, "/invoices")
        .json(&serde_json::json!({
            "client_id": TEST_CLIENT_ID,
            "client_name": "Asha Rao",
            "client_email": "asha@example.com",
            "client_phone": "+919812345678",
            "charge_type": "maintenance",
            "amount": "100.00",
            "invoice_date": "2026-03-10",
            "due_date": "2026-03-01",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    app.cleanup().await;
}

#[tokio::test]
async fn non_positive_amount_is_rejected() {
    let app = TestApp::spawn().await;

    let response = app
        .admin_req(Method::POST, "/invoices")
        .json(&serde_json::json!({
            "client_id": TEST_CLIENT_ID,
            "client_name": "Asha Rao",
            "client_email": "asha@example.com",
            "client_phone": "+919812345678",
            "charge_type": "maintenance",
            "amount": "0",
            "due_date": "2030-01-31",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    app.cleanup().await;
}

#[tokio::test]
async fn bulk_issuance_is_all_or_nothing() {
    let app = TestApp::spawn().await;

    // Second row carries a malformed email; no invoice may survive.
    let response = app
        .admin_req(Method::POST, "/invoices/bulk")
        .json(&serde_json::json!({
            "charge_type": "maintenance",
            "due_date": "2030-01-31",
            "invoices": [
                {
                    "client_id": TEST_CLIENT_ID,
                    "client_name": "Asha Rao",
                    "client_email": "asha@example.com",
                    "client_phone": "+919812345678",
                    "amount": "1200.00",
                },
                {
                    "client_id": OTHER_CLIENT_ID,
                    "client_name": "Vikram Shah",
                    "client_email": "not-an-email",
                    "client_phone": "+919811111111",
                    "amount": "1200.00",
                }
            ]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let listed: serde_json::Value = app
        .admin_req(Method::GET, "/invoices?charge_type=maintenance")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed["total"], 0);

    app.cleanup().await;
}

#[tokio::test]
async fn bulk_issuance_creates_every_row() {
    let app = TestApp::spawn().await;

    let response = app
        .admin_req(Method::POST, "/invoices/bulk")
        .json(&serde_json::json!({
            "charge_type": "water_charges",
            "due_date": "2030-01-31",
            "invoices": [
                {
                    "client_id": TEST_CLIENT_ID,
                    "client_name": "Asha Rao",
                    "client_email": "asha@example.com",
                    "client_phone": "+919812345678",
                    "amount": "450.00",
                },
                {
                    "client_id": OTHER_CLIENT_ID,
                    "client_name": "Vikram Shah",
                    "client_email": "vikram@example.com",
                    "client_phone": "+919811111111",
                    "amount": "450.00",
                }
            ]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["count"], 2);
    assert_eq!(body["invoices"].as_array().unwrap().len(), 2);

    app.cleanup().await;
}

#[tokio::test]
async fn outstanding_list_orders_by_due_date() {
    let app = TestApp::spawn().await;

    app.admin_req(Method::POST, "/invoices")
        .json(&serde_json::json!({
            "client_id": TEST_CLIENT_ID,
            "client_name": "Asha Rao",
            "client_email": "asha@example.com",
            "client_phone": "+919812345678",
            "charge_type": "maintenance",
            "amount": "100.00",
            "due_date": "2030-06-30",
        }))
        .send()
        .await
        .unwrap();
    app.admin_req(Method::POST, "/invoices")
        .json(&serde_json::json!({
            "client_id": TEST_CLIENT_ID,
            "client_name": "Asha Rao",
            "client_email": "asha@example.com",
            "client_phone": "+919812345678",
            "charge_type": "maintenance",
            "amount": "200.00",
            "due_date": "2030-01-31",
        }))
        .send()
        .await
        .unwrap();

    let summary: serde_json::Value = app
        .admin_req(
            Method::GET,
            &format!("/clients/{}/outstanding", TEST_CLIENT_ID),
        )
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(summary["total_outstanding"], "300.00");
    assert_eq!(summary["total_paid"], "0.00");
    let by_type = summary["by_charge_type"].as_array().unwrap();
    assert_eq!(by_type.len(), 1);
    assert_eq!(by_type[0]["outstanding"], "300.00");

    app.cleanup().await;
}

#[tokio::test]
async fn void_is_rejected_once_paid() {
    let app = TestApp::spawn().await;
    app.create_account("maintenance").await;

    let invoice = app
        .create_invoice(TEST_CLIENT_ID, "maintenance", "5000.00")
        .await;
    let invoice_id = invoice["invoice_id"].as_str().unwrap();

    // Unpaid invoice voids cleanly.
    let other = app
        .create_invoice(TEST_CLIENT_ID, "maintenance", "100.00")
        .await;
    let response = app
        .admin_req(
            Method::POST,
            &format!("/invoices/{}/void", other["invoice_id"].as_str().unwrap()),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    // Settle the first invoice, then try to void it.
    let initiated: serde_json::Value = app
        .initiate_payment(TEST_CLIENT_ID, invoice_id, "5000.00")
        .await
        .json()
        .await
        .unwrap();
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
    let order_id = payment["gateway_order_id"].as_str().unwrap();

    app.deliver_webhook("evt_void_1", "payment.captured", order_id, "pay_1", "captured", 500_000)
        .await;

    let response = app
        .admin_req(Method::POST, &format!("/invoices/{}/void", invoice_id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["code"], "invalid_state");

    app.cleanup().await;
}
