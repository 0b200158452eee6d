use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::catalog::Pack;
use crate::error::{AppError, AppResult};
use crate::submissions::{
    Submission, SubmissionFile, SubmissionResult, SubmissionStatus, Tier,
};
use crate::subscriptions::{PaymentSummaryEntry, UserPack};

use super::{
    NewSubmissionFile, NewSubmissionRow, NewUserPack, PackStore, SubmissionStore,
    SubscriptionStore,
};

/// key: pg-store -> sqlx implementation of all three store seams
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PackStore for PgStore {
    async fn list_packs(&self) -> AppResult<Vec<Pack>> {
        let packs = sqlx::query_as::<_, Pack>("SELECT * FROM packs ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(packs)
    }

    async fn purchasable_packs(&self) -> AppResult<Vec<Pack>> {
        let packs = sqlx::query_as::<_, Pack>(
            "SELECT * FROM packs WHERE is_active = TRUE AND price_cents > 0 ORDER BY price_cents ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(packs)
    }

    async fn pack_by_id(&self, id: Uuid) -> AppResult<Option<Pack>> {
        let pack = sqlx::query_as::<_, Pack>("SELECT * FROM packs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(pack)
    }

    async fn pack_by_name(&self, name: &str) -> AppResult<Option<Pack>> {
        let pack = sqlx::query_as::<_, Pack>("SELECT * FROM packs WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(pack)
    }

    async fn free_pack(&self) -> AppResult<Option<Pack>> {
        let pack = sqlx::query_as::<_, Pack>(
            "SELECT * FROM packs WHERE is_active = TRUE AND price_cents = 0 ORDER BY created_at ASC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(pack)
    }
}

#[async_trait]
impl SubscriptionStore for PgStore {
    async fn insert_subscription(&self, new: NewUserPack) -> AppResult<UserPack> {
        let row = sqlx::query_as::<_, UserPack>(
            r#"
            INSERT INTO user_packs (id, user_id, pack_id, submissions_remaining, is_premium)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.user_id)
        .bind(new.pack_id)
        .bind(new.submissions_remaining)
        .bind(new.is_premium)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn subscriptions_for_user(&self, user_id: Uuid) -> AppResult<Vec<UserPack>> {
        let rows = sqlx::query_as::<_, UserPack>(
            "SELECT * FROM user_packs WHERE user_id = $1 ORDER BY created_at ASC, id ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn subscription_by_id(&self, id: Uuid) -> AppResult<Option<UserPack>> {
        let row = sqlx::query_as::<_, UserPack>("SELECT * FROM user_packs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn subscription_for_user_and_pack(
        &self,
        user_id: Uuid,
        pack_id: Uuid,
    ) -> AppResult<Option<UserPack>> {
        let row = sqlx::query_as::<_, UserPack>(
            r#"
            SELECT * FROM user_packs
            WHERE user_id = $1 AND pack_id = $2
            ORDER BY created_at ASC, id ASC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(pack_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn consume(&self, id: Uuid) -> AppResult<UserPack> {
        // Conditional update, not read-then-write: the loser of a race on
        // the last unit gets zero rows back instead of a negative count.
        let row = sqlx::query_as::<_, UserPack>(
            r#"
            UPDATE user_packs
            SET submissions_remaining = submissions_remaining - 1, updated_at = NOW()
            WHERE id = $1 AND submissions_remaining > 0
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(consumed) => Ok(consumed),
            None => match self.subscription_by_id(id).await? {
                Some(_) => Err(AppError::Conflict("subscription already exhausted".into())),
                None => Err(AppError::NotFound),
            },
        }
    }

    async fn payment_summary(
        &self,
        user_id: Uuid,
        include_exhausted: bool,
    ) -> AppResult<Vec<PaymentSummaryEntry>> {
        let rows = sqlx::query_as::<_, PaymentSummaryEntry>(
            r#"
            SELECT
                up.id,
                p.name AS pack_name,
                p.price_cents,
                up.is_premium,
                up.submissions_remaining,
                up.created_at AS purchased_at
            FROM user_packs up
            JOIN packs p ON p.id = up.pack_id
            WHERE up.user_id = $1
              AND ($2 OR up.submissions_remaining > 0)
            ORDER BY up.created_at ASC, up.id ASC
            "#,
        )
        .bind(user_id)
        .bind(include_exhausted)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl SubmissionStore for PgStore {
    async fn insert_submission(&self, new: NewSubmissionRow) -> AppResult<Submission> {
        let row = sqlx::query(
            r#"
            INSERT INTO submissions (
                id, user_id, status, tier, title, submission_type, fiscal_number, year, base_irs_path
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.user_id)
        .bind(SubmissionStatus::Draft.as_str())
        .bind(new.tier.as_str())
        .bind(&new.title)
        .bind(&new.submission_type)
        .bind(&new.fiscal_number)
        .bind(new.year)
        .bind(&new.base_irs_path)
        .fetch_one(&self.pool)
        .await?;
        map_submission(&row)
    }

    async fn delete_submission(&self, id: Uuid) -> AppResult<()> {
        sqlx::query("DELETE FROM submissions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn submission_by_id(&self, id: Uuid) -> AppResult<Option<Submission>> {
        let row = sqlx::query("SELECT * FROM submissions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(map_submission).transpose()
    }

    async fn submissions_for_user(&self, user_id: Uuid) -> AppResult<Vec<Submission>> {
        let rows = sqlx::query(
            "SELECT * FROM submissions WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(map_submission).collect()
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: &[SubmissionStatus],
        to: SubmissionStatus,
    ) -> AppResult<Submission> {
        let from_raw: Vec<String> = from.iter().map(|s| s.as_str().to_string()).collect();
        let row = sqlx::query(
            r#"
            UPDATE submissions
            SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = ANY($2)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&from_raw)
        .bind(to.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => map_submission(&row),
            None => match self.submission_by_id(id).await? {
                Some(current) => Err(AppError::Conflict(format!(
                    "submission is {} and cannot move to {}",
                    current.status.as_str(),
                    to.as_str()
                ))),
                None => Err(AppError::NotFound),
            },
        }
    }

    async fn insert_files(&self, files: Vec<NewSubmissionFile>) -> AppResult<Vec<SubmissionFile>> {
        let mut stored = Vec::with_capacity(files.len());
        for file in files {
            let row = sqlx::query_as::<_, SubmissionFile>(
                r#"
                INSERT INTO submission_files (id, submission_id, broker_name, file_type, file_path)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(file.submission_id)
            .bind(&file.broker_name)
            .bind(&file.file_type)
            .bind(&file.file_path)
            .fetch_one(&self.pool)
            .await?;
            stored.push(row);
        }
        Ok(stored)
    }

    async fn file_by_id(&self, id: Uuid) -> AppResult<Option<SubmissionFile>> {
        let row =
            sqlx::query_as::<_, SubmissionFile>("SELECT * FROM submission_files WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row)
    }

    async fn files_for_submission(&self, submission_id: Uuid) -> AppResult<Vec<SubmissionFile>> {
        let rows = sqlx::query_as::<_, SubmissionFile>(
            r#"
            SELECT * FROM submission_files
            WHERE submission_id = $1
            ORDER BY broker_name ASC, created_at ASC
            "#,
        )
        .bind(submission_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn delete_file(&self, id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM submission_files WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn delete_files_for_broker(
        &self,
        submission_id: Uuid,
        broker_name: &str,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            "DELETE FROM submission_files WHERE submission_id = $1 AND broker_name = $2",
        )
        .bind(submission_id)
        .bind(broker_name)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn append_result(
        &self,
        submission_id: Uuid,
        results: Value,
    ) -> AppResult<SubmissionResult> {
        let row = sqlx::query(
            r#"
            INSERT INTO submission_results (id, submission_id, results)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(submission_id)
        .bind(results)
        .fetch_one(&self.pool)
        .await?;
        Ok(map_result(&row))
    }

    async fn latest_result(&self, submission_id: Uuid) -> AppResult<Option<SubmissionResult>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM submission_results
            WHERE submission_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(submission_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(map_result))
    }
}

fn map_submission(row: &PgRow) -> AppResult<Submission> {
    let status_raw: String = row.get("status");
    let tier_raw: String = row.get("tier");
    Ok(Submission {
        id: row.get("id"),
        user_id: row.get("user_id"),
        status: SubmissionStatus::parse(&status_raw).map_err(AppError::Message)?,
        tier: Tier::parse(&tier_raw).map_err(AppError::Message)?,
        title: row.get("title"),
        submission_type: row.get("submission_type"),
        fiscal_number: row.get("fiscal_number"),
        year: row.get("year"),
        base_irs_path: row.get("base_irs_path"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn map_result(row: &PgRow) -> SubmissionResult {
    SubmissionResult {
        id: row.get("id"),
        submission_id: row.get("submission_id"),
        results: row.get("results"),
        created_at: row.get("created_at"),
    }
}
