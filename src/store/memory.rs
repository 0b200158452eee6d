use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::catalog::Pack;
use crate::error::{AppError, AppResult};
use crate::submissions::{Submission, SubmissionFile, SubmissionResult, SubmissionStatus};
use crate::subscriptions::{PaymentSummaryEntry, UserPack};

use super::{
    NewSubmissionFile, NewSubmissionRow, NewUserPack, PackStore, SubmissionStore,
    SubscriptionStore,
};

/// key: memory-store -> stub implementation of the store seams
///
/// Backs the service tests and local development without Postgres. Vectors
/// preserve insertion order, which keeps the ledger's tie-break
/// deterministic even when rows share a creation timestamp.
#[derive(Default)]
pub struct MemoryStore {
    packs: Mutex<Vec<Pack>>,
    subscriptions: Mutex<Vec<UserPack>>,
    submissions: Mutex<Vec<Submission>>,
    files: Mutex<Vec<SubmissionFile>>,
    results: Mutex<Vec<SubmissionResult>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds one catalog row, standing in for the administrative seed
    /// migration.
    pub fn seed_pack(
        &self,
        name: &str,
        price_cents: i64,
        submission_quota: i32,
        is_premium: bool,
    ) -> Pack {
        let now = Utc::now();
        let pack = Pack {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: None,
            price_cents,
            submission_quota,
            is_premium,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        lock(&self.packs).push(pack.clone());
        pack
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl PackStore for MemoryStore {
    async fn list_packs(&self) -> AppResult<Vec<Pack>> {
        Ok(lock(&self.packs).clone())
    }

    async fn purchasable_packs(&self) -> AppResult<Vec<Pack>> {
        Ok(lock(&self.packs)
            .iter()
            .filter(|pack| pack.is_purchasable())
            .cloned()
            .collect())
    }

    async fn pack_by_id(&self, id: Uuid) -> AppResult<Option<Pack>> {
        Ok(lock(&self.packs).iter().find(|pack| pack.id == id).cloned())
    }

    async fn pack_by_name(&self, name: &str) -> AppResult<Option<Pack>> {
        Ok(lock(&self.packs)
            .iter()
            .find(|pack| pack.name == name)
            .cloned())
    }

    async fn free_pack(&self) -> AppResult<Option<Pack>> {
        Ok(lock(&self.packs)
            .iter()
            .find(|pack| pack.is_active && pack.is_free())
            .cloned())
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn insert_subscription(&self, new: NewUserPack) -> AppResult<UserPack> {
        let now = Utc::now();
        let row = UserPack {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            pack_id: new.pack_id,
            submissions_remaining: new.submissions_remaining,
            is_premium: new.is_premium,
            created_at: now,
            updated_at: now,
        };
        lock(&self.subscriptions).push(row.clone());
        Ok(row)
    }

    async fn subscriptions_for_user(&self, user_id: Uuid) -> AppResult<Vec<UserPack>> {
        let mut rows: Vec<UserPack> = lock(&self.subscriptions)
            .iter()
            .filter(|row| row.user_id == user_id)
            .cloned()
            .collect();
        // Stable sort: equal timestamps keep insertion order.
        rows.sort_by_key(|row| row.created_at);
        Ok(rows)
    }

    async fn subscription_by_id(&self, id: Uuid) -> AppResult<Option<UserPack>> {
        Ok(lock(&self.subscriptions)
            .iter()
            .find(|row| row.id == id)
            .cloned())
    }

    async fn subscription_for_user_and_pack(
        &self,
        user_id: Uuid,
        pack_id: Uuid,
    ) -> AppResult<Option<UserPack>> {
        Ok(lock(&self.subscriptions)
            .iter()
            .find(|row| row.user_id == user_id && row.pack_id == pack_id)
            .cloned())
    }

    async fn consume(&self, id: Uuid) -> AppResult<UserPack> {
        let mut rows = lock(&self.subscriptions);
        let row = rows
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or(AppError::NotFound)?;
        if row.submissions_remaining == 0 {
            return Err(AppError::Conflict("subscription already exhausted".into()));
        }
        row.submissions_remaining -= 1;
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    async fn payment_summary(
        &self,
        user_id: Uuid,
        include_exhausted: bool,
    ) -> AppResult<Vec<PaymentSummaryEntry>> {
        let packs = lock(&self.packs).clone();
        let rows = self.subscriptions_for_user(user_id).await?;
        Ok(rows
            .into_iter()
            .filter(|row| include_exhausted || row.has_remaining())
            .map(|row| {
                let pack = packs.iter().find(|pack| pack.id == row.pack_id);
                PaymentSummaryEntry {
                    id: row.id,
                    pack_name: pack.map(|p| p.name.clone()).unwrap_or_default(),
                    price_cents: pack.map(|p| p.price_cents).unwrap_or_default(),
                    is_premium: row.is_premium,
                    submissions_remaining: row.submissions_remaining,
                    purchased_at: row.created_at,
                }
            })
            .collect())
    }
}

#[async_trait]
impl SubmissionStore for MemoryStore {
    async fn insert_submission(&self, new: NewSubmissionRow) -> AppResult<Submission> {
        let now = Utc::now();
        let row = Submission {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            status: SubmissionStatus::Draft,
            tier: new.tier,
            title: new.title,
            submission_type: new.submission_type,
            fiscal_number: new.fiscal_number,
            year: new.year,
            base_irs_path: new.base_irs_path,
            created_at: now,
            updated_at: now,
        };
        lock(&self.submissions).push(row.clone());
        Ok(row)
    }

    async fn delete_submission(&self, id: Uuid) -> AppResult<()> {
        lock(&self.submissions).retain(|row| row.id != id);
        Ok(())
    }

    async fn submission_by_id(&self, id: Uuid) -> AppResult<Option<Submission>> {
        Ok(lock(&self.submissions)
            .iter()
            .find(|row| row.id == id)
            .cloned())
    }

    async fn submissions_for_user(&self, user_id: Uuid) -> AppResult<Vec<Submission>> {
        let mut rows: Vec<Submission> = lock(&self.submissions)
            .iter()
            .filter(|row| row.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: &[SubmissionStatus],
        to: SubmissionStatus,
    ) -> AppResult<Submission> {
        let mut rows = lock(&self.submissions);
        let row = rows
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or(AppError::NotFound)?;
        if !from.contains(&row.status) {
            return Err(AppError::Conflict(format!(
                "submission is {} and cannot move to {}",
                row.status.as_str(),
                to.as_str()
            )));
        }
        row.status = to;
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    async fn insert_files(&self, files: Vec<NewSubmissionFile>) -> AppResult<Vec<SubmissionFile>> {
        let now = Utc::now();
        let rows: Vec<SubmissionFile> = files
            .into_iter()
            .map(|file| SubmissionFile {
                id: Uuid::new_v4(),
                submission_id: file.submission_id,
                broker_name: file.broker_name,
                file_type: file.file_type,
                file_path: file.file_path,
                created_at: now,
            })
            .collect();
        lock(&self.files).extend(rows.iter().cloned());
        Ok(rows)
    }

    async fn file_by_id(&self, id: Uuid) -> AppResult<Option<SubmissionFile>> {
        Ok(lock(&self.files).iter().find(|row| row.id == id).cloned())
    }

    async fn files_for_submission(&self, submission_id: Uuid) -> AppResult<Vec<SubmissionFile>> {
        let mut rows: Vec<SubmissionFile> = lock(&self.files)
            .iter()
            .filter(|row| row.submission_id == submission_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.broker_name.cmp(&b.broker_name));
        Ok(rows)
    }

    async fn delete_file(&self, id: Uuid) -> AppResult<()> {
        let mut rows = lock(&self.files);
        let before = rows.len();
        rows.retain(|row| row.id != id);
        if rows.len() == before {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn delete_files_for_broker(
        &self,
        submission_id: Uuid,
        broker_name: &str,
    ) -> AppResult<u64> {
        let mut rows = lock(&self.files);
        let before = rows.len();
        rows.retain(|row| !(row.submission_id == submission_id && row.broker_name == broker_name));
        Ok((before - rows.len()) as u64)
    }

    async fn append_result(
        &self,
        submission_id: Uuid,
        results: Value,
    ) -> AppResult<SubmissionResult> {
        let row = SubmissionResult {
            id: Uuid::new_v4(),
            submission_id,
            results,
            created_at: Utc::now(),
        };
        lock(&self.results).push(row.clone());
        Ok(row)
    }

    async fn latest_result(&self, submission_id: Uuid) -> AppResult<Option<SubmissionResult>> {
        Ok(lock(&self.results)
            .iter()
            .rev()
            .find(|row| row.submission_id == submission_id)
            .cloned())
    }
}
