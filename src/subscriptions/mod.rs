pub mod api;
pub mod models;
pub mod service;

pub use models::{PaymentSummaryEntry, UserPack};
pub use service::{choose_subscription, LedgerService};
