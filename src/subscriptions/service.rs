use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::store::{NewUserPack, PackStore, SubscriptionStore};

use super::models::{PaymentSummaryEntry, UserPack};

/// key: ledger-service -> purchase grants and submission-quota allocation
#[derive(Clone)]
pub struct LedgerService {
    packs: Arc<dyn PackStore>,
    subscriptions: Arc<dyn SubscriptionStore>,
}

impl LedgerService {
    pub fn new(packs: Arc<dyn PackStore>, subscriptions: Arc<dyn SubscriptionStore>) -> Self {
        Self {
            packs,
            subscriptions,
        }
    }

    /// Grants the catalog's free pack to a new user. Idempotent: a user who
    /// already holds a subscription tied to the free pack gets that row back
    /// unchanged, regardless of how much quota is left on it.
    pub async fn grant_free_pack(&self, user_id: Uuid) -> AppResult<UserPack> {
        let pack = self
            .packs
            .free_pack()
            .await?
            .ok_or_else(|| AppError::Message("no free pack configured in the catalog".into()))?;

        if let Some(existing) = self
            .subscriptions
            .subscription_for_user_and_pack(user_id, pack.id)
            .await?
        {
            return Ok(existing);
        }

        let granted = self
            .subscriptions
            .insert_subscription(NewUserPack {
                user_id,
                pack_id: pack.id,
                submissions_remaining: pack.submission_quota,
                is_premium: pack.is_premium,
            })
            .await?;
        info!(%user_id, subscription_id = %granted.id, "granted free pack");
        Ok(granted)
    }

    /// Records a completed purchase as its own ledger row. Purchases of the
    /// same pack are never merged; per-purchase usage history depends on
    /// each one staying a separate row.
    pub async fn complete_purchase(&self, user_id: Uuid, pack_id: Uuid) -> AppResult<UserPack> {
        let pack = self
            .packs
            .pack_by_id(pack_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if !pack.is_active {
            return Err(AppError::BadRequest(format!(
                "pack `{}` is no longer offered",
                pack.name
            )));
        }

        let purchased = self
            .subscriptions
            .insert_subscription(NewUserPack {
                user_id,
                pack_id: pack.id,
                submissions_remaining: pack.submission_quota,
                is_premium: pack.is_premium,
            })
            .await?;
        info!(%user_id, subscription_id = %purchased.id, pack = %pack.name, "purchase recorded");
        Ok(purchased)
    }

    /// Picks the subscription a new submission would consume. `Ok(None)`
    /// means no eligible quota exists, which is a user-visible condition and
    /// not a store failure.
    pub async fn select_subscription(
        &self,
        user_id: Uuid,
        prefer_premium: bool,
    ) -> AppResult<Option<UserPack>> {
        let subscriptions = self.subscriptions.subscriptions_for_user(user_id).await?;
        Ok(choose_subscription(&subscriptions, prefer_premium).cloned())
    }

    /// Atomically consumes one submission unit. Raced-to-zero rows surface
    /// as `Conflict`, never as a negative count.
    pub async fn consume(&self, subscription_id: Uuid) -> AppResult<UserPack> {
        self.subscriptions.consume(subscription_id).await
    }

    pub async fn payment_summary(
        &self,
        user_id: Uuid,
        include_exhausted: bool,
    ) -> AppResult<Vec<PaymentSummaryEntry>> {
        self.subscriptions
            .payment_summary(user_id, include_exhausted)
            .await
    }
}

/// key: allocator -> tier-preference selection over the ordered ledger
///
/// `subscriptions` must already be in the ledger's deterministic order
/// (creation order). Premium intent never falls back to standard quota; a
/// standard request may fall back to premium quota when no standard row has
/// anything left.
pub fn choose_subscription(
    subscriptions: &[UserPack],
    prefer_premium: bool,
) -> Option<&UserPack> {
    if prefer_premium {
        subscriptions
            .iter()
            .find(|s| s.is_premium && s.has_remaining())
    } else {
        subscriptions
            .iter()
            .find(|s| !s.is_premium && s.has_remaining())
            .or_else(|| {
                subscriptions
                    .iter()
                    .find(|s| s.is_premium && s.has_remaining())
            })
    }
}
