//! Collection reporting: tenant dashboard and per-client outstanding
//! summaries. Collected figures reflect settled money only.

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;
use tracing::instrument;
use uuid::Uuid;

use crate::models::{Invoice, Payment};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::{Database, InvoiceService};
use service_core::error::AppError;

/// One row of `v_tenant_collection_summary`.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CollectionStats {
    pub charge_type: String,
    pub total_billed: i64,
    pub total_collected: i64,
    pub outstanding_amount: i64,
    pub collection_rate: Decimal,
    pub total_invoices: i64,
    pub paid_invoices: i64,
    pub overdue_amount: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TenantCollectionDashboard {
    pub tenant_id: Uuid,
    pub total_collected_minor: i64,
    pub total_outstanding_minor: i64,
    pub overdue_minor: i64,
    pub total_clients: i64,
    pub partial_paid_invoices: i64,
    pub overdue_invoices: i64,
    pub collection_by_type: Vec<CollectionStats>,
    pub recent_payments: Vec<Payment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutstandingByType {
    pub charge_type: String,
    pub total_minor: i64,
    pub paid_minor: i64,
    pub outstanding_minor: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClientOutstandingSummary {
    pub client_id: Uuid,
    pub client_name: Option<String>,
    pub client_email: Option<String>,
    pub total_outstanding_minor: i64,
    pub total_paid_minor: i64,
    pub by_charge_type: Vec<OutstandingByType>,
    pub invoices: Vec<Invoice>,
}

#[derive(Debug, Clone, FromRow)]
struct InvoiceCounters {
    total_clients: i64,
    partial_paid_invoices: i64,
    overdue_invoices: i64,
}

#[derive(Clone)]
pub struct DashboardService {
    db: Database,
    invoices: InvoiceService,
}

impl DashboardService {
    pub fn new(db: Database, invoices: InvoiceService) -> Self {
        Self { db, invoices }
    }

    /// Tenant collection dashboard: per-charge-type stats from the summary
    /// view plus headline counters and recent settled payments.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn collection_dashboard(
        &self,
        tenant_id: Uuid,
        recent_limit: i64,
    ) -> Result<TenantCollectionDashboard, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["collection_dashboard"])
            .start_timer();

        let by_type = sqlx::query_as::<_, CollectionStats>(
            r#"
            SELECT charge_type, total_billed, total_collected, outstanding_amount,
                   collection_rate, total_invoices, paid_invoices, overdue_amount
            FROM v_tenant_collection_summary
            WHERE tenant_id = $1
            ORDER BY charge_type
            "#,
        )
        .bind(tenant_id)
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to read collection summary: {}", e))
        })?;

        let counters = sqlx::query_as::<_, InvoiceCounters>(
            r#"
            SELECT COUNT(DISTINCT client_id)                                          AS total_clients,
                   COUNT(*) FILTER (WHERE status = 'partial_paid')                    AS partial_paid_invoices,
                   COUNT(*) FILTER (WHERE due_date < CURRENT_DATE
                                      AND outstanding_minor > 0
                                      AND status <> 'void')                           AS overdue_invoices
            FROM client_invoices
            WHERE tenant_id = $1
            "#,
        )
        .bind(tenant_id)
        .fetch_one(self.db.pool())
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to read invoice counters: {}", e))
        })?;

        let recent_payments = sqlx::query_as::<_, Payment>(
            r#"
            SELECT payment_id, tenant_id, client_id, invoice_id, account_id,
                charge_type, order_id, amount_minor, currency, state, provider, method,
                gateway_order_id, gateway_payment_id, last_gateway_event_id, client_name,
                client_email, client_phone, hosted_payment_url, receipt_url, idempotency_key,
                error_code, error_message, created_utc, updated_utc, processed_utc, expires_utc
            FROM client_payments
            WHERE tenant_id = $1 AND state = 'settled'
            ORDER BY processed_utc DESC
            LIMIT $2
            "#,
        )
        .bind(tenant_id)
        .bind(recent_limit.clamp(1, 100))
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to read recent payments: {}", e))
        })?;

        timer.observe_duration();

        let total_collected_minor = by_type.iter().map(|s| s.total_collected).sum();
        let total_outstanding_minor = by_type.iter().map(|s| s.outstanding_amount).sum();
        let overdue_minor = by_type.iter().map(|s| s.overdue_amount).sum();

        Ok(TenantCollectionDashboard {
            tenant_id,
            total_collected_minor,
            total_outstanding_minor,
            overdue_minor,
            total_clients: counters.total_clients,
            partial_paid_invoices: counters.partial_paid_invoices,
            overdue_invoices: counters.overdue_invoices,
            collection_by_type: by_type,
            recent_payments,
        })
    }

    /// Per-client outstanding summary, aggregated by charge type.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, client_id = %client_id))]
    pub async fn client_outstanding(
        &self,
        tenant_id: Uuid,
        client_id: Uuid,
    ) -> Result<ClientOutstandingSummary, AppError> {
        let invoices = self.invoices.list_by_client(tenant_id, client_id).await?;

        let mut by_type: Vec<OutstandingByType> = Vec::new();
        let mut total_outstanding = 0i64;
        let mut total_paid = 0i64;

        for invoice in invoices.iter().filter(|i| i.status != "void") {
            total_paid += invoice.paid_minor;
            total_outstanding += invoice.outstanding_minor;

            match by_type
                .iter_mut()
                .find(|entry| entry.charge_type == invoice.charge_type)
            {
                Some(entry) => {
                    entry.total_minor += invoice.amount_minor;
                    entry.paid_minor += invoice.paid_minor;
                    entry.outstanding_minor += invoice.outstanding_minor;
                }
                None => by_type.push(OutstandingByType {
                    charge_type: invoice.charge_type.clone(),
                    total_minor: invoice.amount_minor,
                    paid_minor: invoice.paid_minor,
                    outstanding_minor: invoice.outstanding_minor,
                }),
            }
        }

        Ok(ClientOutstandingSummary {
            client_id,
            client_name: invoices.first().map(|i| i.client_name.clone()),
            client_email: invoices.first().map(|i| i.client_email.clone()),
            total_outstanding_minor: total_outstanding,
            total_paid_minor: total_paid,
            by_charge_type: by_type,
            invoices,
        })
    }

}
