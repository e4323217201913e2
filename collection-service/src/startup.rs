//! Application startup and lifecycle management.

use axum::middleware::from_fn;
use axum::{
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::gateway::GatewayRegistry;
use crate::handlers;
use crate::services::{
    init_metrics, AccountService, DashboardService, Database, InvoiceService, PaymentOrchestrator,
    PaymentStore,
};
use service_core::error::AppError;
use service_core::middleware::{metrics::metrics_middleware, tracing::request_id_middleware};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub accounts: AccountService,
    pub invoices: InvoiceService,
    pub payments: PaymentStore,
    pub dashboard: DashboardService,
    pub orchestrator: Arc<PaymentOrchestrator>,
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
    state: AppState,
}

impl Application {
    /// Build the application: pool, migrations, adapter registry, router.
    pub async fn build(config: Config) -> Result<Self, AppError> {
        init_metrics();

        let db = Database::new(
            config.database_url(),
            config.database.max_connections,
            config.database.min_connections,
        )
        .await?;
        db.run_migrations().await?;

        let registry = Arc::new(GatewayRegistry::new(&config));

        let accounts = AccountService::new(db.clone());
        let invoices = InvoiceService::new(db.clone());
        let payments = PaymentStore::new(db.clone());
        let dashboard = DashboardService::new(db.clone(), invoices.clone());
        let orchestrator = Arc::new(PaymentOrchestrator::new(
            db.clone(),
            accounts.clone(),
            invoices.clone(),
            payments.clone(),
            registry,
        ));

        let state = AppState {
            config: config.clone(),
            db,
            accounts,
            invoices,
            payments,
            dashboard,
            orchestrator,
        };

        let router = Router::new()
            .route("/health", get(handlers::health_check))
            .route("/metrics", get(handlers::metrics))
            // Tenant revenue accounts
            .route(
                "/accounts",
                post(handlers::accounts::create_account).get(handlers::accounts::list_accounts),
            )
            .route(
                "/accounts/:id",
                get(handlers::accounts::get_account).put(handlers::accounts::update_account),
            )
            .route(
                "/accounts/:id/gateway-credentials",
                put(handlers::accounts::update_gateway_credentials),
            )
            // Per-tenant gateway credentials
            .route(
                "/gateway-configs",
                post(handlers::accounts::upsert_gateway_config)
                    .get(handlers::accounts::list_gateway_configs),
            )
            // Invoices
            .route(
                "/invoices",
                post(handlers::invoices::create_invoice).get(handlers::invoices::list_invoices),
            )
            .route(
                "/invoices/bulk",
                post(handlers::invoices::create_bulk_invoices),
            )
            .route("/invoices/:id", get(handlers::invoices::get_invoice))
            .route("/invoices/:id/void", post(handlers::invoices::void_invoice))
            // Client views
            .route(
                "/clients/:id/invoices",
                get(handlers::invoices::client_invoices),
            )
            .route(
                "/clients/:id/outstanding",
                get(handlers::invoices::client_outstanding),
            )
            // Payments
            .route(
                "/payments/initiate",
                post(handlers::payments::initiate_payment),
            )
            .route("/payments", get(handlers::payments::list_payments))
            .route("/payments/:id", get(handlers::payments::get_payment))
            .route(
                "/payments/:id/refund",
                post(handlers::payments::refund_payment),
            )
            .route(
                "/payments/:id/cancel",
                post(handlers::payments::cancel_payment),
            )
            .route(
                "/payments/:id/reconcile",
                post(handlers::payments::reconcile_payment),
            )
            // Gateway callbacks
            .route("/webhooks/:provider", post(handlers::webhooks::gateway_webhook))
            // Reporting
            .route("/dashboard", get(handlers::dashboard::collection_dashboard))
            .layer(from_fn(metrics_middleware))
            .layer(from_fn(request_id_middleware))
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or("-");

                    tracing::info_span!(
                        "http_request",
                        request_id = %request_id,
                        method = %request.method(),
                        uri = %request.uri(),
                        tenant_id = tracing::field::Empty,
                        client_id = tracing::field::Empty,
                    )
                }),
            )
            .with_state(state.clone());

        // Bind here so tests can ask for port 0 and read the real port back.
        let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Collection service listening on port {}", port);

        Ok(Self {
            port,
            listener,
            router,
            state,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get the application state (used by tests to seed data).
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Run the application until stopped. Also starts the reconcile sweep
    /// when enabled.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        if self.state.config.reconcile.enabled {
            let orchestrator = self.state.orchestrator.clone();
            let reconcile = self.state.config.reconcile.clone();
            tokio::spawn(async move {
                let mut ticker =
                    tokio::time::interval(Duration::from_secs(reconcile.sweep_interval_seconds));
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    if let Err(e) = orchestrator
                        .reconcile_stale(reconcile.stale_after_minutes)
                        .await
                    {
                        tracing::warn!(error = %e, "Reconcile sweep failed");
                    }
                }
            });
        }

        axum::serve(self.listener, self.router).await
    }
}
