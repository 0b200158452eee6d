pub mod memory;
pub mod pg;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::catalog::Pack;
use crate::error::AppResult;
use crate::submissions::{
    Submission, SubmissionFile, SubmissionResult, SubmissionStatus, Tier,
};
use crate::subscriptions::{PaymentSummaryEntry, UserPack};

pub use memory::MemoryStore;
pub use pg::PgStore;

/// key: pack-store -> read-only catalog queries
#[async_trait]
pub trait PackStore: Send + Sync {
    async fn list_packs(&self) -> AppResult<Vec<Pack>>;
    /// Active packs with a positive price, i.e. the set offered at checkout.
    async fn purchasable_packs(&self) -> AppResult<Vec<Pack>>;
    async fn pack_by_id(&self, id: Uuid) -> AppResult<Option<Pack>>;
    async fn pack_by_name(&self, name: &str) -> AppResult<Option<Pack>>;
    /// The active zero-price pack granted at registration, if seeded.
    async fn free_pack(&self) -> AppResult<Option<Pack>>;
}

#[derive(Debug, Clone)]
pub struct NewUserPack {
    pub user_id: Uuid,
    pub pack_id: Uuid,
    pub submissions_remaining: i32,
    pub is_premium: bool,
}

/// key: subscription-store -> ledger rows and atomic consumption
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn insert_subscription(&self, new: NewUserPack) -> AppResult<UserPack>;
    /// All rows for the user in the ledger's deterministic order
    /// (created_at, then id), the order the allocator's "first" refers to.
    async fn subscriptions_for_user(&self, user_id: Uuid) -> AppResult<Vec<UserPack>>;
    async fn subscription_by_id(&self, id: Uuid) -> AppResult<Option<UserPack>>;
    async fn subscription_for_user_and_pack(
        &self,
        user_id: Uuid,
        pack_id: Uuid,
    ) -> AppResult<Option<UserPack>>;
    /// Conditional decrement: succeeds only while `submissions_remaining > 0`,
    /// otherwise `Conflict`. Never produces a negative count.
    async fn consume(&self, id: Uuid) -> AppResult<UserPack>;
    async fn payment_summary(
        &self,
        user_id: Uuid,
        include_exhausted: bool,
    ) -> AppResult<Vec<PaymentSummaryEntry>>;
}

#[derive(Debug, Clone)]
pub struct NewSubmissionRow {
    pub user_id: Uuid,
    pub tier: Tier,
    pub title: String,
    pub submission_type: String,
    pub fiscal_number: String,
    pub year: i32,
    pub base_irs_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewSubmissionFile {
    pub submission_id: Uuid,
    pub broker_name: String,
    pub file_type: String,
    pub file_path: String,
}

/// key: submission-store -> submissions, file mirror, result history
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn insert_submission(&self, new: NewSubmissionRow) -> AppResult<Submission>;
    /// Compensation path for a failed quota consume; removing an already
    /// absent row is not an error.
    async fn delete_submission(&self, id: Uuid) -> AppResult<()>;
    async fn submission_by_id(&self, id: Uuid) -> AppResult<Option<Submission>>;
    async fn submissions_for_user(&self, user_id: Uuid) -> AppResult<Vec<Submission>>;
    /// Atomic guard: moves to `to` only if the current status is in `from`,
    /// otherwise `Conflict` (`NotFound` for a missing row).
    async fn transition_status(
        &self,
        id: Uuid,
        from: &[SubmissionStatus],
        to: SubmissionStatus,
    ) -> AppResult<Submission>;
    async fn insert_files(&self, files: Vec<NewSubmissionFile>) -> AppResult<Vec<SubmissionFile>>;
    async fn file_by_id(&self, id: Uuid) -> AppResult<Option<SubmissionFile>>;
    async fn files_for_submission(&self, submission_id: Uuid) -> AppResult<Vec<SubmissionFile>>;
    async fn delete_file(&self, id: Uuid) -> AppResult<()>;
    async fn delete_files_for_broker(
        &self,
        submission_id: Uuid,
        broker_name: &str,
    ) -> AppResult<u64>;
    async fn append_result(&self, submission_id: Uuid, results: Value)
        -> AppResult<SubmissionResult>;
    async fn latest_result(&self, submission_id: Uuid) -> AppResult<Option<SubmissionResult>>;
}
