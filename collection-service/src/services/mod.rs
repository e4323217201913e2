pub mod accounts;
pub mod dashboard;
pub mod database;
pub mod invoices;
pub mod metrics;
pub mod orchestrator;
pub mod payments;

pub use accounts::AccountService;
pub use dashboard::DashboardService;
pub use database::Database;
pub use invoices::InvoiceService;
pub use metrics::{get_metrics, init_metrics};
pub use orchestrator::{ApplyOutcome, InitiateRequest, InitiatedPayment, PaymentOrchestrator};
pub use payments::PaymentStore;
