pub mod clients;
pub mod invoices;
pub mod subscriptions;
pub mod users;

pub use clients::{CreateClientRequest, UpdateClientRequest};
pub use invoices::{
    InvoiceItemRequest, InvoiceListResponse, InvoiceRequest, ListInvoicesQuery, Pagination,
};
pub use subscriptions::{CreateSubscriptionRequest, VerifyPaymentRequest};
pub use users::{RegisterUserRequest, UpdateUserRequest, UserProfileResponse};
