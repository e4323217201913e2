//! Request and response bodies for the REST surface.
//!
//! Amounts cross this boundary as decimals; everything behind it is i64
//! minor units. Conversion happens exactly once, here.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::models::money::to_decimal;
use crate::models::{
    ChargeType, GatewayConfig, Invoice, Payment, PaymentMethod, Provider, Refund, TenantAccount,
};
use crate::services::dashboard::{
    ClientOutstandingSummary, CollectionStats, TenantCollectionDashboard,
};
use crate::services::InvoiceService;

fn validate_positive_amount(amount: &Decimal) -> Result<(), ValidationError> {
    if *amount <= Decimal::ZERO {
        return Err(ValidationError::new("amount_must_be_positive"));
    }
    Ok(())
}

// -----------------------------------------------------------------------------
// Requests
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAccountRequest {
    pub charge_type: ChargeType,
    #[validate(length(min = 1, max = 255))]
    pub display_name: String,
    pub description: Option<String>,
    pub bank_account_name: Option<String>,
    pub bank_account_no: Option<String>,
    pub ifsc_code: Option<String>,
}

#[derive(Debug, Deserialize, Validate, Default)]
pub struct UpdateAccountRequest {
    #[validate(length(min = 1, max = 255))]
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub bank_account_name: Option<String>,
    pub bank_account_no: Option<String>,
    pub ifsc_code: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct GatewayAccountCredentialsRequest {
    pub razorpay_account_id: Option<String>,
    pub billdesk_account_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpsertGatewayConfigRequest {
    pub provider: Provider,
    #[validate(length(min = 1))]
    pub api_key: String,
    #[validate(length(min = 1))]
    pub api_secret: String,
    pub provider_settings: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateInvoiceRequest {
    pub client_id: Uuid,
    #[validate(length(min = 1, max = 255))]
    pub client_name: String,
    #[validate(email)]
    pub client_email: String,
    #[validate(length(min = 1, max = 32))]
    pub client_phone: String,
    pub charge_type: ChargeType,
    #[validate(custom(function = "validate_positive_amount"))]
    pub amount: Decimal,
    pub description: Option<String>,
    /// Defaults to today when omitted.
    pub invoice_date: Option<NaiveDate>,
    pub due_date: NaiveDate,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct BulkInvoiceItem {
    pub client_id: Uuid,
    #[validate(length(min = 1, max = 255))]
    pub client_name: String,
    #[validate(email)]
    pub client_email: String,
    #[validate(length(min = 1, max = 32))]
    pub client_phone: String,
    #[validate(custom(function = "validate_positive_amount"))]
    pub amount: Decimal,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BulkInvoiceRequest {
    pub charge_type: ChargeType,
    pub description: Option<String>,
    pub invoice_date: Option<NaiveDate>,
    pub due_date: NaiveDate,
    #[validate(length(min = 1, max = 500), nested)]
    pub invoices: Vec<BulkInvoiceItem>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct InitiatePaymentRequest {
    pub invoice_id: Uuid,
    #[validate(custom(function = "validate_positive_amount"))]
    pub amount: Decimal,
    pub provider: Provider,
    pub payment_method: PaymentMethod,
    #[validate(length(min = 1, max = 255))]
    pub client_name: String,
    #[validate(email)]
    pub client_email: String,
    #[validate(length(min = 1, max = 32))]
    pub client_phone: String,
    #[validate(length(min = 1, max = 128))]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RefundRequest {
    #[validate(custom(function = "validate_positive_amount"))]
    pub amount: Decimal,
    #[validate(length(min = 1, max = 512))]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct InvoiceListQuery {
    pub charge_type: String,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

// -----------------------------------------------------------------------------
// Responses
// -----------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub account_id: Uuid,
    pub tenant_id: Uuid,
    pub charge_type: String,
    pub display_name: String,
    pub description: Option<String>,
    pub razorpay_account_id: Option<String>,
    pub billdesk_account_id: Option<String>,
    pub bank_account_name: Option<String>,
    pub bank_account_no: Option<String>,
    pub ifsc_code: Option<String>,
    pub is_active: bool,
    pub total_collected: Decimal,
    pub total_refunded: Decimal,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl From<TenantAccount> for AccountResponse {
    fn from(a: TenantAccount) -> Self {
        Self {
            account_id: a.account_id,
            tenant_id: a.tenant_id,
            charge_type: a.charge_type,
            display_name: a.display_name,
            description: a.description,
            razorpay_account_id: a.razorpay_account_id,
            billdesk_account_id: a.billdesk_account_id,
            bank_account_name: a.bank_account_name,
            bank_account_no: a.bank_account_no,
            ifsc_code: a.ifsc_code,
            is_active: a.is_active,
            total_collected: to_decimal(a.total_collected_minor),
            total_refunded: to_decimal(a.total_refunded_minor),
            created_utc: a.created_utc,
            updated_utc: a.updated_utc,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InvoiceResponse {
    pub invoice_id: Uuid,
    pub client_id: Uuid,
    pub client_name: String,
    pub client_email: String,
    pub client_phone: String,
    pub charge_type: String,
    pub invoice_number: String,
    pub amount: Decimal,
    pub amount_paid: Decimal,
    pub outstanding_amount: Decimal,
    pub currency: String,
    pub description: Option<String>,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub status: String,
    pub metadata: Option<serde_json::Value>,
    pub created_utc: DateTime<Utc>,
}

impl From<Invoice> for InvoiceResponse {
    fn from(i: Invoice) -> Self {
        // Overdue is a function of the current date; recompute for display.
        let status = InvoiceService::display_status(&i, Utc::now().date_naive());
        Self {
            invoice_id: i.invoice_id,
            client_id: i.client_id,
            client_name: i.client_name,
            client_email: i.client_email,
            client_phone: i.client_phone,
            charge_type: i.charge_type,
            invoice_number: i.invoice_number,
            amount: to_decimal(i.amount_minor),
            amount_paid: to_decimal(i.paid_minor),
            outstanding_amount: to_decimal(i.outstanding_minor),
            currency: i.currency,
            description: i.description,
            invoice_date: i.invoice_date,
            due_date: i.due_date,
            status: status.as_str().to_string(),
            metadata: i.metadata,
            created_utc: i.created_utc,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub payment_id: Uuid,
    pub client_id: Uuid,
    pub invoice_id: Uuid,
    pub charge_type: String,
    pub order_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub state: String,
    pub provider: String,
    pub payment_method: String,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub hosted_payment_url: Option<String>,
    pub receipt_url: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub processed_utc: Option<DateTime<Utc>>,
    pub expires_utc: Option<DateTime<Utc>>,
}

impl From<Payment> for PaymentResponse {
    fn from(p: Payment) -> Self {
        Self {
            payment_id: p.payment_id,
            client_id: p.client_id,
            invoice_id: p.invoice_id,
            charge_type: p.charge_type,
            order_id: p.order_id,
            amount: to_decimal(p.amount_minor),
            currency: p.currency,
            state: p.state,
            provider: p.provider,
            payment_method: p.method,
            gateway_order_id: p.gateway_order_id,
            gateway_payment_id: p.gateway_payment_id,
            hosted_payment_url: p.hosted_payment_url,
            receipt_url: p.receipt_url,
            error_code: p.error_code,
            error_message: p.error_message,
            created_utc: p.created_utc,
            processed_utc: p.processed_utc,
            expires_utc: p.expires_utc,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RefundResponse {
    pub refund_id: Uuid,
    pub payment_id: Uuid,
    pub amount: Decimal,
    pub state: String,
    pub gateway_refund_id: Option<String>,
    pub reason: String,
    pub created_utc: DateTime<Utc>,
    pub processed_utc: Option<DateTime<Utc>>,
}

impl From<Refund> for RefundResponse {
    fn from(r: Refund) -> Self {
        Self {
            refund_id: r.refund_id,
            payment_id: r.payment_id,
            amount: to_decimal(r.amount_minor),
            state: r.state,
            gateway_refund_id: r.gateway_refund_id,
            reason: r.reason,
            created_utc: r.created_utc,
            processed_utc: r.processed_utc,
        }
    }
}

/// Gateway config without its secret.
#[derive(Debug, Serialize)]
pub struct GatewayConfigResponse {
    pub config_id: Uuid,
    pub provider: String,
    pub is_active: bool,
    pub api_key: String,
    pub version: i32,
    pub updated_utc: DateTime<Utc>,
}

impl From<GatewayConfig> for GatewayConfigResponse {
    fn from(c: GatewayConfig) -> Self {
        Self {
            config_id: c.config_id,
            provider: c.provider,
            is_active: c.is_active,
            api_key: c.api_key,
            version: c.version,
            updated_utc: c.updated_utc,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InitiatePaymentResponse {
    pub payment_id: Uuid,
    pub order_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub state: String,
    pub hosted_url: String,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct BulkInvoiceResponse {
    pub invoices: Vec<InvoiceResponse>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct InvoiceDetailResponse {
    pub invoice: InvoiceResponse,
    pub payments: Vec<PaymentResponse>,
}

#[derive(Debug, Serialize)]
pub struct PaymentHistoryResponse {
    pub payments: Vec<PaymentResponse>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Serialize)]
pub struct CollectionStatsResponse {
    pub charge_type: String,
    pub total_billed: Decimal,
    pub total_collected: Decimal,
    pub outstanding: Decimal,
    pub collection_rate: Decimal,
    pub total_invoices: i64,
    pub paid_invoices: i64,
    pub overdue_amount: Decimal,
}

impl From<CollectionStats> for CollectionStatsResponse {
    fn from(s: CollectionStats) -> Self {
        Self {
            charge_type: s.charge_type,
            total_billed: to_decimal(s.total_billed),
            total_collected: to_decimal(s.total_collected),
            outstanding: to_decimal(s.outstanding_amount),
            collection_rate: s.collection_rate,
            total_invoices: s.total_invoices,
            paid_invoices: s.paid_invoices,
            overdue_amount: to_decimal(s.overdue_amount),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub tenant_id: Uuid,
    pub total_collected: Decimal,
    pub total_outstanding: Decimal,
    pub overdue_amount: Decimal,
    pub total_clients: i64,
    pub partial_paid_invoices: i64,
    pub overdue_invoices: i64,
    pub collection_by_type: Vec<CollectionStatsResponse>,
    pub recent_payments: Vec<PaymentResponse>,
}

impl From<TenantCollectionDashboard> for DashboardResponse {
    fn from(d: TenantCollectionDashboard) -> Self {
        Self {
            tenant_id: d.tenant_id,
            total_collected: to_decimal(d.total_collected_minor),
            total_outstanding: to_decimal(d.total_outstanding_minor),
            overdue_amount: to_decimal(d.overdue_minor),
            total_clients: d.total_clients,
            partial_paid_invoices: d.partial_paid_invoices,
            overdue_invoices: d.overdue_invoices,
            collection_by_type: d.collection_by_type.into_iter().map(Into::into).collect(),
            recent_payments: d.recent_payments.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OutstandingByTypeResponse {
    pub charge_type: String,
    pub total: Decimal,
    pub paid: Decimal,
    pub outstanding: Decimal,
}

#[derive(Debug, Serialize)]
pub struct OutstandingSummaryResponse {
    pub client_id: Uuid,
    pub client_name: Option<String>,
    pub client_email: Option<String>,
    pub total_outstanding: Decimal,
    pub total_paid: Decimal,
    pub by_charge_type: Vec<OutstandingByTypeResponse>,
    pub invoices: Vec<InvoiceResponse>,
}

impl From<ClientOutstandingSummary> for OutstandingSummaryResponse {
    fn from(s: ClientOutstandingSummary) -> Self {
        Self {
            client_id: s.client_id,
            client_name: s.client_name,
            client_email: s.client_email,
            total_outstanding: to_decimal(s.total_outstanding_minor),
            total_paid: to_decimal(s.total_paid_minor),
            by_charge_type: s
                .by_charge_type
                .into_iter()
                .map(|t| OutstandingByTypeResponse {
                    charge_type: t.charge_type,
                    total: to_decimal(t.total_minor),
                    paid: to_decimal(t.paid_minor),
                    outstanding: to_decimal(t.outstanding_minor),
                })
                .collect(),
            invoices: s.invoices.into_iter().map(Into::into).collect(),
        }
    }
}
