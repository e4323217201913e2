pub mod account;
pub mod enums;
pub mod gateway_config;
pub mod invoice;
pub mod invoice_number;
pub mod money;
pub mod payment;
pub mod refund;
pub mod webhook_event;

pub use account::{CreateAccount, TenantAccount, UpdateAccount};
pub use enums::{ChargeType, PaymentMethod, Provider};
pub use gateway_config::{GatewayConfig, RazorpaySettings, BilldeskSettings};
pub use invoice::{CreateInvoice, Invoice, InvoiceStatus};
pub use payment::{CreatePayment, Payment, PaymentState};
pub use refund::{Refund, RefundState};
pub use webhook_event::{WebhookApplyState, WebhookEvent};
