pub mod clients;
pub mod health;
pub mod invoices;
pub mod subscriptions;
pub mod users;

pub use health::{health_check, metrics_handler, readiness_check};
