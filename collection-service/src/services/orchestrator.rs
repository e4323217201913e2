//! Payment orchestrator.
//!
//! Drives a payment from initiation to a terminal state. Two rules govern
//! everything here: no database transaction is ever held across a gateway
//! HTTP call, and every state transition happens under the payment row
//! lock with the invoice and account rows locked in the same transaction.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::gateway::{
    CanonicalEvent, CreateOrder, EventOutcome, GatewayRegistry, OrderState,
};
use crate::models::{
    ChargeType, CreatePayment, Payment, PaymentMethod, PaymentState, Provider, Refund,
    WebhookApplyState,
};
use crate::services::metrics::{PAYMENTS_TOTAL, REFUNDS_TOTAL, UNRECORDED_CAPTURE_TOTAL};
use crate::services::{AccountService, Database, InvoiceService, PaymentStore};
use service_core::error::AppError;

/// Result of applying a canonical event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The event transitioned the payment and was recorded.
    Applied,
    /// The event (or an equivalent one) was applied before; no mutation.
    AlreadyApplied,
    /// The gateway still reports a non-terminal order; nothing to apply.
    Pending,
    /// The event was recorded and rejected without touching the payment.
    Rejected { reason: String },
}

/// What `initiate` hands back to the client.
#[derive(Debug, Clone)]
pub struct InitiatedPayment {
    pub payment: Payment,
    pub hosted_url: String,
    pub expires_utc: Option<DateTime<Utc>>,
}

/// Validated initiate input, post-DTO.
#[derive(Debug, Clone)]
pub struct InitiateRequest {
    pub invoice_id: Uuid,
    pub amount_minor: i64,
    pub provider: Provider,
    pub method: PaymentMethod,
    pub client_name: String,
    pub client_email: String,
    pub client_phone: String,
    pub idempotency_key: Option<String>,
}

pub struct PaymentOrchestrator {
    db: Database,
    accounts: AccountService,
    invoices: InvoiceService,
    payments: PaymentStore,
    registry: Arc<GatewayRegistry>,
}

impl PaymentOrchestrator {
    pub fn new(
        db: Database,
        accounts: AccountService,
        invoices: InvoiceService,
        payments: PaymentStore,
        registry: Arc<GatewayRegistry>,
    ) -> Self {
        Self {
            db,
            accounts,
            invoices,
            payments,
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<GatewayRegistry> {
        &self.registry
    }

    async fn resolve_adapter(
        &self,
        tenant_id: Uuid,
        provider: Provider,
    ) -> Result<Arc<dyn crate::gateway::Gateway>, AppError> {
        let tenant_config = self
            .db
            .get_active_gateway_config(tenant_id, provider.as_str())
            .await?;
        self.registry.resolve(tenant_config.as_ref(), provider)
    }

    // -------------------------------------------------------------------------
    // Initiate
    // -------------------------------------------------------------------------

    /// Begin a payment against an invoice.
    ///
    /// Phase one inserts the payment row in `created` under the invoice and
    /// account row locks, then commits. The gateway order is created with
    /// no transaction open. Phase two re-locks the payment and either
    /// promotes it to `authorized_pending` or marks it `failed`.
    #[instrument(skip(self, req), fields(tenant_id = %tenant_id, client_id = %client_id, invoice_id = %req.invoice_id))]
    pub async fn initiate(
        &self,
        tenant_id: Uuid,
        client_id: Uuid,
        req: InitiateRequest,
    ) -> Result<InitiatedPayment, AppError> {
        // Duplicate initiate with the same key returns the existing payment.
        if let Some(key) = req.idempotency_key.as_deref() {
            if let Some(existing) = self
                .payments
                .find_by_idempotency_key(tenant_id, req.invoice_id, key)
                .await?
            {
                info!(payment_id = %existing.payment_id, "Initiate replay matched idempotency key");
                return Ok(InitiatedPayment {
                    hosted_url: existing.hosted_payment_url.clone().unwrap_or_default(),
                    expires_utc: existing.expires_utc,
                    payment: existing,
                });
            }
        }

        // Phase one: validate and insert under row locks.
        let mut tx = self.db.begin().await?;

        let invoice = InvoiceService::lock(&mut tx, tenant_id, req.invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("invoice not found")))?;

        if invoice.client_id != client_id {
            return Err(AppError::Forbidden(anyhow::anyhow!(
                "invoice {} does not belong to client {}",
                invoice.invoice_id,
                client_id
            )));
        }
        if invoice.status == "void" {
            return Err(AppError::InvalidState {
                current: invoice.status.clone(),
                message: "cannot pay a void invoice".to_string(),
            });
        }
        if req.amount_minor > invoice.outstanding_minor {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "amount {} exceeds outstanding balance {}",
                req.amount_minor,
                invoice.outstanding_minor
            )));
        }

        let charge_type = ChargeType::parse(&invoice.charge_type).ok_or_else(|| {
            AppError::Integrity(anyhow::anyhow!(
                "invoice {} has unknown charge type '{}'",
                invoice.invoice_id,
                invoice.charge_type
            ))
        })?;

        let account = self
            .accounts
            .lock_by_charge_type(&mut tx, tenant_id, charge_type)
            .await?
            .ok_or_else(|| {
                AppError::BadRequest(anyhow::anyhow!(
                    "no revenue account for charge type '{}'",
                    charge_type.as_str()
                ))
            })?;
        if !account.is_active {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "revenue account for '{}' is deactivated",
                charge_type.as_str()
            )));
        }

        let payment = self
            .payments
            .insert_created(
                &mut tx,
                &CreatePayment {
                    tenant_id,
                    client_id,
                    invoice_id: invoice.invoice_id,
                    account_id: account.account_id,
                    charge_type,
                    amount_minor: req.amount_minor,
                    currency: invoice.currency.clone(),
                    provider: req.provider,
                    method: req.method,
                    client_name: req.client_name.clone(),
                    client_email: req.client_email.clone(),
                    client_phone: req.client_phone.clone(),
                    idempotency_key: req.idempotency_key.clone(),
                },
            )
            .await?;

        // Locks are released here; they must not span the gateway call.
        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit payment insert: {}", e))
        })?;

        let adapter = self.resolve_adapter(tenant_id, req.provider).await?;
        let order_result = adapter
            .create_order(&CreateOrder {
                amount_minor: req.amount_minor,
                currency: invoice.currency.clone(),
                internal_order_id: payment.order_id,
                description: format!("Invoice {}", invoice.invoice_number),
                allowed_methods: vec![req.method],
            })
            .await;

        match order_result {
            Ok(order) => {
                let mut tx = self.db.begin().await?;
                let locked = self
                    .payments
                    .lock(&mut tx, tenant_id, payment.payment_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::Integrity(anyhow::anyhow!("payment row vanished after insert"))
                    })?;
                if locked.state != PaymentState::Created.as_str() {
                    // Torn down concurrently (e.g. cancel); the gateway
                    // order will expire on its own.
                    return Err(AppError::InvalidState {
                        current: locked.state,
                        message: "payment left 'created' during order creation".to_string(),
                    });
                }

                let updated = self
                    .payments
                    .mark_authorized(
                        &mut tx,
                        payment.payment_id,
                        &order.gateway_order_id,
                        &order.hosted_payment_url,
                        order.expires_utc,
                    )
                    .await?;
                tx.commit().await.map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to commit authorization: {}", e))
                })?;

                info!(
                    payment_id = %updated.payment_id,
                    gateway_order_id = %order.gateway_order_id,
                    amount_minor = updated.amount_minor,
                    "Payment authorized pending capture"
                );

                Ok(InitiatedPayment {
                    payment: updated,
                    hosted_url: order.hosted_payment_url,
                    expires_utc: order.expires_utc,
                })
            }
            Err(gateway_err) => {
                let app_err: AppError = gateway_err.into();
                let mut tx = self.db.begin().await?;
                if let Some(locked) = self
                    .payments
                    .lock(&mut tx, tenant_id, payment.payment_id)
                    .await?
                {
                    if locked.state == PaymentState::Created.as_str() {
                        self.payments
                            .transition(
                                &mut tx,
                                payment.payment_id,
                                PaymentState::Created,
                                PaymentState::Failed,
                                None,
                                None,
                                Some(app_err.code()),
                                Some("gateway order creation failed"),
                            )
                            .await?;
                        tx.commit().await.map_err(|e| {
                            AppError::DatabaseError(anyhow::anyhow!(
                                "Failed to commit failure: {}",
                                e
                            ))
                        })?;
                    }
                }

                PAYMENTS_TOTAL
                    .with_label_values(&[req.provider.as_str(), "failed"])
                    .inc();
                warn!(payment_id = %payment.payment_id, error = %app_err, "Initiate failed at gateway");

                Err(app_err)
            }
        }
    }

    // -------------------------------------------------------------------------
    // Apply
    // -------------------------------------------------------------------------

    /// Apply a verified canonical event. Strictly idempotent: the unique
    /// insert into webhook_events is the fence, so a replayed
    /// gateway_event_id commits nothing new.
    #[instrument(skip(self, event, payload_hash), fields(provider = %event.provider, gateway_event_id = %event.gateway_event_id, outcome = event.outcome.as_str()))]
    pub async fn apply(
        &self,
        event: &CanonicalEvent,
        payload_hash: &str,
    ) -> Result<ApplyOutcome, AppError> {
        let provider = event.provider.as_str();
        let mut tx = self.db.begin().await?;

        let inserted = self
            .db
            .insert_webhook_event(&mut tx, provider, &event.gateway_event_id, true, payload_hash)
            .await?;
        if !inserted {
            tx.commit().await.map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to commit dedup: {}", e))
            })?;
            info!("Duplicate gateway event ignored");
            return Ok(ApplyOutcome::AlreadyApplied);
        }

        let payment = match self
            .payments
            .lock_by_gateway_order(&mut tx, provider, &event.gateway_order_id)
            .await?
        {
            Some(p) => p,
            None => {
                return self
                    .finish_rejected(tx, event, None, "unknown_order")
                    .await;
            }
        };

        let state = payment.typed_state().ok_or_else(|| {
            AppError::Integrity(anyhow::anyhow!(
                "payment {} holds unknown state '{}'",
                payment.payment_id,
                payment.state
            ))
        })?;

        if state.is_terminal() {
            let confirms = match event.outcome {
                EventOutcome::Captured => state == PaymentState::Settled,
                EventOutcome::Failed => state == PaymentState::Failed,
                EventOutcome::Expired => state == PaymentState::Expired,
                // Refund webhooks for refunds we drove through the API are
                // reconfirmations of money already recorded.
                EventOutcome::Refunded => {
                    state == PaymentState::Refunded || state == PaymentState::Settled
                }
            };

            if confirms {
                self.db
                    .set_webhook_event_state(
                        &mut tx,
                        provider,
                        &event.gateway_event_id,
                        WebhookApplyState::Applied,
                        Some(payment.payment_id),
                        None,
                    )
                    .await?;
                tx.commit().await.map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to commit reconfirm: {}", e))
                })?;
                return Ok(ApplyOutcome::AlreadyApplied);
            }

            let reason = format!("invalid_transition_from_{}", state);
            return self
                .finish_rejected(tx, event, Some(payment.payment_id), &reason)
                .await;
        }

        if event.outcome != EventOutcome::Refunded && event.amount_minor != payment.amount_minor {
            return self
                .finish_rejected(tx, event, Some(payment.payment_id), "amount_mismatch")
                .await;
        }

        match event.outcome {
            EventOutcome::Captured => {
                let settle_result = self.settle(&mut tx, &payment, state, event).await;
                if let Err(e) = settle_result {
                    // The gateway holds captured money we could not record.
                    UNRECORDED_CAPTURE_TOTAL.with_label_values(&[provider]).inc();
                    error!(
                        payment_id = %payment.payment_id,
                        gateway_event_id = %event.gateway_event_id,
                        error = %e,
                        "ALERT: gateway capture could not be recorded; manual reconciliation required"
                    );
                    return Err(e);
                }
            }
            EventOutcome::Failed => {
                self.payments
                    .transition(
                        &mut tx,
                        payment.payment_id,
                        state,
                        PaymentState::Failed,
                        event.gateway_payment_id.as_deref(),
                        Some(&event.gateway_event_id),
                        event.error_code.as_deref(),
                        event.error_message.as_deref(),
                    )
                    .await?;
                PAYMENTS_TOTAL.with_label_values(&[provider, "failed"]).inc();
            }
            EventOutcome::Expired => {
                self.payments
                    .transition(
                        &mut tx,
                        payment.payment_id,
                        state,
                        PaymentState::Expired,
                        None,
                        Some(&event.gateway_event_id),
                        None,
                        None,
                    )
                    .await?;
                PAYMENTS_TOTAL.with_label_values(&[provider, "expired"]).inc();
            }
            EventOutcome::Refunded => {
                // A refund event can only confirm a settled payment; any
                // other live state is an illegal edge.
                let reason = format!("invalid_transition_from_{}", state);
                return self
                    .finish_rejected(tx, event, Some(payment.payment_id), &reason)
                    .await;
            }
        }

        self.db
            .set_webhook_event_state(
                &mut tx,
                provider,
                &event.gateway_event_id,
                WebhookApplyState::Applied,
                Some(payment.payment_id),
                None,
            )
            .await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit apply: {}", e))
        })?;

        info!(payment_id = %payment.payment_id, "Gateway event applied");

        Ok(ApplyOutcome::Applied)
    }

    /// Settle a captured payment: payment -> SETTLED, invoice paid amounts,
    /// account collected total, all under the locks this transaction holds.
    async fn settle(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        payment: &Payment,
        state: PaymentState,
        event: &CanonicalEvent,
    ) -> Result<(), AppError> {
        self.payments
            .transition(
                tx,
                payment.payment_id,
                state,
                PaymentState::Settled,
                event.gateway_payment_id.as_deref(),
                Some(&event.gateway_event_id),
                None,
                None,
            )
            .await?;

        let invoice = InvoiceService::lock(tx, payment.tenant_id, payment.invoice_id)
            .await?
            .ok_or_else(|| {
                AppError::Integrity(anyhow::anyhow!(
                    "invoice {} missing for settling payment {}",
                    payment.invoice_id,
                    payment.payment_id
                ))
            })?;
        InvoiceService::apply_payment(tx, &invoice, payment.amount_minor).await?;

        let account = self
            .accounts
            .lock(tx, payment.tenant_id, payment.account_id)
            .await?
            .ok_or_else(|| {
                AppError::Integrity(anyhow::anyhow!(
                    "account {} missing for settling payment {}",
                    payment.account_id,
                    payment.payment_id
                ))
            })?;
        self.accounts
            .credit_collected(tx, account.account_id, payment.amount_minor)
            .await?;

        PAYMENTS_TOTAL
            .with_label_values(&[payment.provider.as_str(), "settled"])
            .inc();

        info!(
            payment_id = %payment.payment_id,
            invoice_id = %payment.invoice_id,
            amount_minor = payment.amount_minor,
            "Payment settled"
        );

        Ok(())
    }

    /// Record a rejection on the event row and commit. The payment is
    /// untouched.
    async fn finish_rejected(
        &self,
        mut tx: sqlx::Transaction<'_, sqlx::Postgres>,
        event: &CanonicalEvent,
        payment_id: Option<Uuid>,
        reason: &str,
    ) -> Result<ApplyOutcome, AppError> {
        self.db
            .set_webhook_event_state(
                &mut tx,
                event.provider.as_str(),
                &event.gateway_event_id,
                WebhookApplyState::Rejected,
                payment_id,
                Some(reason),
            )
            .await?;
        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit rejection: {}", e))
        })?;

        warn!(
            gateway_event_id = %event.gateway_event_id,
            reason = reason,
            "Gateway event rejected"
        );

        Ok(ApplyOutcome::Rejected {
            reason: reason.to_string(),
        })
    }

    // -------------------------------------------------------------------------
    // Reconcile
    // -------------------------------------------------------------------------

    /// Polling fallback for a payment whose webhook never arrived. The
    /// synthesized event id is deterministic so a real webhook arriving
    /// later deduplicates against it (and vice versa).
    #[instrument(skip(self), fields(tenant_id = %tenant_id, payment_id = %payment_id))]
    pub async fn reconcile(
        &self,
        tenant_id: Uuid,
        payment_id: Uuid,
    ) -> Result<ApplyOutcome, AppError> {
        let payment = self
            .payments
            .get(tenant_id, payment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("payment not found")))?;
        self.reconcile_payment(&payment).await
    }

    async fn reconcile_payment(&self, payment: &Payment) -> Result<ApplyOutcome, AppError> {
        let state = payment.typed_state().ok_or_else(|| {
            AppError::Integrity(anyhow::anyhow!(
                "payment {} holds unknown state '{}'",
                payment.payment_id,
                payment.state
            ))
        })?;
        if state.is_terminal() {
            return Ok(ApplyOutcome::AlreadyApplied);
        }

        let gateway_order_id = match payment.gateway_order_id.as_deref() {
            Some(id) => id,
            // Never reached the gateway; nothing to poll.
            None => return Ok(ApplyOutcome::Pending),
        };

        let provider = payment.typed_provider().ok_or_else(|| {
            AppError::Integrity(anyhow::anyhow!(
                "payment {} holds unknown provider '{}'",
                payment.payment_id,
                payment.provider
            ))
        })?;

        let adapter = self.resolve_adapter(payment.tenant_id, provider).await?;
        let snapshot = adapter.fetch_order(gateway_order_id).await.map_err(AppError::from)?;

        let outcome = match snapshot.state {
            OrderState::Captured => EventOutcome::Captured,
            OrderState::Failed => EventOutcome::Failed,
            OrderState::Expired => EventOutcome::Expired,
            OrderState::Refunded => EventOutcome::Refunded,
            OrderState::Created | OrderState::Authorized => {
                return Ok(ApplyOutcome::Pending);
            }
        };

        let event = CanonicalEvent {
            provider,
            gateway_event_id: format!(
                "reconcile:{}:{}",
                payment.payment_id,
                outcome.as_str()
            ),
            gateway_order_id: gateway_order_id.to_string(),
            gateway_payment_id: snapshot.gateway_payment_id,
            outcome,
            amount_minor: snapshot.amount_minor,
            error_code: snapshot.error_code,
            error_message: None,
        };

        let payload_hash = hex::encode(Sha256::digest(event.gateway_event_id.as_bytes()));
        self.apply(&event, &payload_hash).await
    }

    /// Sweep AUTHORIZED_PENDING payments older than the staleness
    /// threshold. Failures on individual payments are logged and skipped so
    /// one broken gateway cannot stall the sweep.
    #[instrument(skip(self))]
    pub async fn reconcile_stale(&self, stale_after_minutes: i64) -> Result<usize, AppError> {
        let stale = self
            .payments
            .list_stale_authorized(stale_after_minutes, 50)
            .await?;
        let mut reconciled = 0usize;

        for payment in &stale {
            match self.reconcile_payment(payment).await {
                Ok(ApplyOutcome::Applied) => reconciled += 1,
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        payment_id = %payment.payment_id,
                        error = %e,
                        "Reconcile sweep failed for payment"
                    );
                }
            }
        }

        if !stale.is_empty() {
            info!(
                swept = stale.len(),
                reconciled = reconciled,
                "Reconcile sweep completed"
            );
        }

        Ok(reconciled)
    }

    // -------------------------------------------------------------------------
    // Refund
    // -------------------------------------------------------------------------

    /// Refund part or all of a settled payment. The invoice stays closed;
    /// refunds are accounted on the revenue account only.
    #[instrument(skip(self, reason), fields(tenant_id = %tenant_id, payment_id = %payment_id, amount_minor = amount_minor))]
    pub async fn refund(
        &self,
        tenant_id: Uuid,
        payment_id: Uuid,
        amount_minor: i64,
        reason: &str,
    ) -> Result<Refund, AppError> {
        if amount_minor <= 0 {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "refund amount must be positive"
            )));
        }

        // Precondition check under the payment lock, then release before
        // the gateway call.
        {
            let mut tx = self.db.begin().await?;
            let payment = self
                .payments
                .lock(&mut tx, tenant_id, payment_id)
                .await?
                .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("payment not found")))?;

            let state = payment.typed_state().ok_or_else(|| {
                AppError::Integrity(anyhow::anyhow!("unknown payment state '{}'", payment.state))
            })?;
            if state != PaymentState::Settled {
                return Err(AppError::InvalidState {
                    current: state.as_str().to_string(),
                    message: "only settled payments can be refunded".to_string(),
                });
            }

            let refunded = self
                .payments
                .sum_successful_refunds(&mut tx, payment_id)
                .await?;
            if amount_minor > payment.amount_minor - refunded {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "refund of {} exceeds refundable balance {}",
                    amount_minor,
                    payment.amount_minor - refunded
                )));
            }
            tx.commit().await.map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to commit precheck: {}", e))
            })?;
        }

        let payment = self
            .payments
            .get(tenant_id, payment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("payment not found")))?;
        let provider = payment.typed_provider().ok_or_else(|| {
            AppError::Integrity(anyhow::anyhow!("unknown provider '{}'", payment.provider))
        })?;

        // Razorpay refunds against the captured payment; Billdesk against
        // the order.
        let refund_target = match provider {
            Provider::Razorpay => payment.gateway_payment_id.clone(),
            Provider::Billdesk => payment.gateway_order_id.clone(),
        }
        .ok_or_else(|| {
            AppError::Integrity(anyhow::anyhow!(
                "settled payment {} has no gateway reference",
                payment_id
            ))
        })?;

        let refund = self
            .payments
            .insert_refund_pending(tenant_id, payment_id, amount_minor, reason)
            .await?;

        let adapter = self.resolve_adapter(tenant_id, provider).await?;
        let gateway_refund = match adapter
            .create_refund(&refund_target, amount_minor, reason)
            .await
        {
            Ok(r) if r.accepted => r,
            Ok(_) => {
                self.payments.mark_refund_failed(refund.refund_id).await?;
                REFUNDS_TOTAL
                    .with_label_values(&[provider.as_str(), "failed"])
                    .inc();
                return Err(AppError::GatewayPermanent(anyhow::anyhow!(
                    "gateway declined the refund"
                )));
            }
            Err(e) => {
                self.payments.mark_refund_failed(refund.refund_id).await?;
                REFUNDS_TOTAL
                    .with_label_values(&[provider.as_str(), "failed"])
                    .inc();
                return Err(e.into());
            }
        };

        // Money has moved at the gateway; record it in one transaction.
        let mut tx = self.db.begin().await?;
        let locked = self
            .payments
            .lock(&mut tx, tenant_id, payment_id)
            .await?
            .ok_or_else(|| AppError::Integrity(anyhow::anyhow!("payment row vanished")))?;

        let successful = self
            .payments
            .mark_refund_successful(&mut tx, refund.refund_id, &gateway_refund.gateway_refund_id)
            .await?;

        self.accounts
            .credit_refunded(&mut tx, locked.account_id, amount_minor)
            .await?;

        let cumulative = self
            .payments
            .sum_successful_refunds(&mut tx, payment_id)
            .await?;
        if cumulative == locked.amount_minor {
            self.payments
                .transition(
                    &mut tx,
                    payment_id,
                    PaymentState::Settled,
                    PaymentState::Refunded,
                    None,
                    None,
                    None,
                    None,
                )
                .await?;
        } else if cumulative > locked.amount_minor {
            return Err(AppError::Integrity(anyhow::anyhow!(
                "refunds on payment {} exceed its amount",
                payment_id
            )));
        }

        tx.commit().await.map_err(|e| {
            error!(
                payment_id = %payment_id,
                refund_id = %refund.refund_id,
                error = %e,
                "ALERT: gateway refund succeeded but local commit failed"
            );
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit refund: {}", e))
        })?;

        REFUNDS_TOTAL
            .with_label_values(&[provider.as_str(), "successful"])
            .inc();

        info!(
            refund_id = %successful.refund_id,
            gateway_refund_id = %gateway_refund.gateway_refund_id,
            "Refund recorded"
        );

        Ok(successful)
    }

    // -------------------------------------------------------------------------
    // Cancel
    // -------------------------------------------------------------------------

    /// Tear down an in-flight payment. CREATED rows fail immediately;
    /// AUTHORIZED_PENDING rows move to CANCELLED and the gateway order is
    /// left to expire on its own.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, payment_id = %payment_id))]
    pub async fn cancel(&self, tenant_id: Uuid, payment_id: Uuid) -> Result<Payment, AppError> {
        let mut tx = self.db.begin().await?;
        let payment = self
            .payments
            .lock(&mut tx, tenant_id, payment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("payment not found")))?;

        let state = payment.typed_state().ok_or_else(|| {
            AppError::Integrity(anyhow::anyhow!("unknown payment state '{}'", payment.state))
        })?;

        let (to, error_code) = match state {
            PaymentState::Created => (PaymentState::Failed, Some("cancelled_before_gateway")),
            PaymentState::AuthorizedPending => (PaymentState::Cancelled, None),
            _ => {
                return Err(AppError::InvalidState {
                    current: state.as_str().to_string(),
                    message: "payment is not cancellable".to_string(),
                });
            }
        };

        let updated = self
            .payments
            .transition(
                &mut tx,
                payment_id,
                state,
                to,
                None,
                None,
                error_code,
                Some("cancelled by client"),
            )
            .await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit cancel: {}", e))
        })?;

        PAYMENTS_TOTAL
            .with_label_values(&[updated.provider.as_str(), to.as_str()])
            .inc();
        info!(payment_id = %payment_id, state = %to, "Payment cancelled");

        Ok(updated)
    }
}
