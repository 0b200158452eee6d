use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// key: catalog-model -> purchasable submission packs
///
/// Catalog rows are created by administrative seeding and never mutated by
/// the submission flow. Price is stored in currency-agnostic minor units;
/// the free pack is the row with `price_cents == 0`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Pack {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub submission_quota: i32,
    pub is_premium: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Pack {
    pub fn is_purchasable(&self) -> bool {
        self.is_active && self.price_cents > 0
    }

    pub fn is_free(&self) -> bool {
        self.price_cents == 0
    }
}
