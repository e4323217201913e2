mod common;

use common::TestApp;
use reqwest::Method;

#[tokio::test]
async fn create_account_returns_zero_totals() {
    let app = TestApp::spawn().await;

    let account = app.create_account("maintenance").await;
    assert_eq!(account["charge_type"], "maintenance");
    assert_eq!(account["total_collected"], "0.00");
    assert_eq!(account["total_refunded"], "0.00");
    assert_eq!(account["is_active"], true);

    app.cleanup().await;
}

#[tokio::test]
async fn duplicate_charge_type_conflicts() {
    let app = TestApp::spawn().await;

    app.create_account("property_tax").await;

    let response = app
        .admin_req(Method::POST, "/accounts")
        .json(&serde_json::json!({
            "charge_type": "property_tax",
            "display_name": "Second property tax account",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["code"], "conflict");

    app.cleanup().await;
}

#[tokio::test]
async fn update_touches_metadata_not_totals() {
    let app = TestApp::spawn().await;

    let account = app.create_account("water_charges").await;
    let account_id = account["account_id"].as_str().unwrap();

    let response = app
        .admin_req(Method::PUT, &format!("/accounts/{}", account_id))
        .json(&serde_json::json!({
            "display_name": "Water and sewage",
            "is_active": false,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let updated: serde_json::Value = response.json().await.unwrap();
    assert_eq!(updated["display_name"], "Water and sewage");
    assert_eq!(updated["is_active"], false);
    assert_eq!(updated["total_collected"], "0.00");

    app.cleanup().await;
}

#[tokio::test]
async fn list_accounts_is_tenant_scoped() {
    let app = TestApp::spawn().await;

    app.create_account("maintenance").await;
    app.create_account("electricity_tax").await;

    let response = app.admin_req(Method::GET, "/accounts").send().await.unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["total"], 2);

    // A different tenant sees nothing.
    let response = app
        .http
        .get(format!("{}/accounts", app.address))
        .header("X-Tenant-ID", "99999999-9999-4999-8999-999999999999")
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["total"], 0);

    app.cleanup().await;
}

#[tokio::test]
async fn missing_tenant_header_is_unauthorized() {
    let app = TestApp::spawn().await;

    let response = app
        .http
        .get(format!("{}/accounts", app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    app.cleanup().await;
}

#[tokio::test]
async fn gateway_credentials_update_external_ids() {
    let app = TestApp::spawn().await;

    let account = app.create_account("maintenance").await;
    let account_id = account["account_id"].as_str().unwrap();

    let response = app
        .admin_req(
            Method::PUT,
            &format!("/accounts/{}/gateway-credentials", account_id),
        )
        .json(&serde_json::json!({
            "razorpay_account_id": "acc_sub_123",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let updated: serde_json::Value = response.json().await.unwrap();
    assert_eq!(updated["razorpay_account_id"], "acc_sub_123");

    app.cleanup().await;
}

#[tokio::test]
async fn gateway_config_secret_never_appears_in_responses() {
    let app = TestApp::spawn().await;

    let response = app
        .admin_req(Method::POST, "/gateway-configs")
        .json(&serde_json::json!({
            "provider": "razorpay",
            "api_key": "rzp_live_tenant",
            "api_secret": "tenant-super-secret",
            "provider_settings": { "webhook_secret": "tenant-webhook-secret" },
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let text = response.text().await.unwrap();
    assert!(!text.contains("tenant-super-secret"));

    let response = app
        .admin_req(Method::GET, "/gateway-configs")
        .send()
        .await
        .unwrap();
    let text = response.text().await.unwrap();
    assert!(text.contains("rzp_live_tenant"));
    assert!(!text.contains("tenant-super-secret"));
    assert!(!text.contains("tenant-webhook-secret"));

    app.cleanup().await;
}

#[tokio::test]
async fn gateway_config_update_bumps_version() {
    let app = TestApp::spawn().await;

    let first: serde_json::Value = app
        .admin_req(Method::POST, "/gateway-configs")
        .json(&serde_json::json!({
            "provider": "razorpay",
            "api_key": "rzp_v1",
            "api_secret": "s1",
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(first["version"], 1);

    let second: serde_json::Value = app
        .admin_req(Method::POST, "/gateway-configs")
        .json(&serde_json::json!({
            "provider": "razorpay",
            "api_key": "rzp_v2",
            "api_secret": "s2",
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(second["version"], 2);
    assert_eq!(second["config_id"], first["config_id"]);

    app.cleanup().await;
}
