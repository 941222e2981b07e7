//! Services module for invoicing-service.

pub mod clients;
pub mod database;
pub mod lifecycle;
pub mod memory;
pub mod metrics;
pub mod numbering;
pub mod payment;
pub mod profiles;
pub mod quota;
pub mod renderer;
pub mod store;
pub mod subscriptions;
pub mod tax;

pub use clients::ClientRegistry;
pub use database::Database;
pub use lifecycle::InvoiceLifecycle;
pub use memory::MemoryStore;
pub use metrics::{get_metrics, init_metrics};
pub use payment::{MockGateway, PaymentGateway, RazorpayGateway};
pub use profiles::ProfileService;
pub use renderer::{InvoiceRenderer, JsonRenderer};
pub use store::Store;
pub use subscriptions::SubscriptionManager;
