use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// key: ledger-model -> per-purchase subscription rows
///
/// One row per completed purchase or free-tier grant. `is_premium` is copied
/// from the pack at creation and immutable afterwards. Exhausted rows
/// (`submissions_remaining == 0`) are retained for history.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserPack {
    pub id: Uuid,
    pub user_id: Uuid,
    pub pack_id: Uuid,
    pub submissions_remaining: i32,
    pub is_premium: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserPack {
    pub fn has_remaining(&self) -> bool {
        self.submissions_remaining > 0
    }
}

/// Display projection for the payment screen: subscription joined with its
/// pack's name and price.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PaymentSummaryEntry {
    pub id: Uuid,
    pub pack_name: String,
    pub price_cents: i64,
    pub is_premium: bool,
    pub submissions_remaining: i32,
    pub purchased_at: DateTime<Utc>,
}
