pub mod metrics;
pub mod user_id;

pub use metrics::metrics_middleware;
pub use user_id::{request_span, UserId};
