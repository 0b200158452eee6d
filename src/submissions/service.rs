use std::sync::Arc;

use dashmap::DashMap;
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::notifications::{NotificationEvent, NotifierHandle};
use crate::processor::{CalculationFileRef, CalculationRequest, ProcessorClient};
use crate::store::{NewSubmissionRow, SubmissionStore};
use crate::subscriptions::LedgerService;

use super::models::{
    group_by_broker, NewSubmission, Submission, SubmissionDetail, SubmissionStatus, Tier,
};

/// key: submission-service -> lifecycle, quota consumption, orchestration
#[derive(Clone)]
pub struct SubmissionService {
    pub(super) store: Arc<dyn SubmissionStore>,
    pub(super) ledger: LedgerService,
    pub(super) processor: Arc<dyn ProcessorClient>,
    notifier: NotifierHandle,
    active_calculations: Arc<DashMap<Uuid, ()>>,
}

impl SubmissionService {
    pub fn new(
        store: Arc<dyn SubmissionStore>,
        ledger: LedgerService,
        processor: Arc<dyn ProcessorClient>,
        notifier: NotifierHandle,
    ) -> Self {
        Self {
            store,
            ledger,
            processor,
            notifier,
            active_calculations: Arc::new(DashMap::new()),
        }
    }

    /// Creates a DRAFT submission funded by one ledger unit. The draft row
    /// and the consumed unit stand or fall together: a consume conflict
    /// rolls the draft back before the error propagates.
    pub async fn create_submission(
        &self,
        user_id: Uuid,
        new: NewSubmission,
    ) -> AppResult<Submission> {
        let subscription = self
            .ledger
            .select_subscription(user_id, new.wants_premium)
            .await?
            .ok_or(AppError::QuotaExhausted)?;

        let submission = self
            .store
            .insert_submission(NewSubmissionRow {
                user_id,
                tier: Tier::from_premium(subscription.is_premium),
                title: new.title,
                submission_type: new.submission_type,
                fiscal_number: new.fiscal_number,
                year: new.year,
                base_irs_path: new.base_irs_path,
            })
            .await?;

        if let Err(err) = self.ledger.consume(subscription.id).await {
            if let Err(cleanup) = self.store.delete_submission(submission.id).await {
                error!(
                    ?cleanup,
                    submission_id = %submission.id,
                    "failed to roll back draft after consume conflict"
                );
            }
            return Err(err);
        }

        info!(
            submission_id = %submission.id,
            %user_id,
            tier = submission.tier.as_str(),
            subscription_id = %subscription.id,
            "submission created"
        );
        Ok(submission)
    }

    /// Drives one calculation attempt. Non-reentrant per submission; a
    /// second concurrent call gets `Conflict`. Re-invoking sequentially on a
    /// PROCESSING submission re-runs the processor call (retries are not
    /// deduplicated here).
    pub async fn calculate(&self, submission_id: Uuid) -> AppResult<Submission> {
        if self.active_calculations.insert(submission_id, ()).is_some() {
            return Err(AppError::Conflict(
                "calculation already in progress for this submission".into(),
            ));
        }
        let result = self.calculate_inner(submission_id).await;
        self.active_calculations.remove(&submission_id);
        result
    }

    async fn calculate_inner(&self, submission_id: Uuid) -> AppResult<Submission> {
        let submission = self
            .store
            .submission_by_id(submission_id)
            .await?
            .ok_or(AppError::NotFound)?;

        if let Err(reason) = validate_for_calculation(&submission) {
            // The only road to FAILED: rejected before the processor is ever
            // involved.
            self.store
                .transition_status(
                    submission_id,
                    &[SubmissionStatus::Draft, SubmissionStatus::Processing],
                    SubmissionStatus::Failed,
                )
                .await?;
            self.store
                .append_result(
                    submission_id,
                    json!({ "status": "rejected", "errorMessage": reason }),
                )
                .await?;
            self.notifier.notify(NotificationEvent::SubmissionFailed {
                submission_id,
                user_id: submission.user_id,
                reason: reason.clone(),
            });
            return Err(AppError::BadRequest(reason));
        }

        // Persisted before the remote call so a crash mid-calculation leaves
        // an inspectable PROCESSING record.
        let submission = self
            .store
            .transition_status(
                submission_id,
                &[SubmissionStatus::Draft, SubmissionStatus::Processing],
                SubmissionStatus::Processing,
            )
            .await?;

        let files = self.store.files_for_submission(submission_id).await?;
        let request = CalculationRequest {
            submission_id,
            title: submission.title.clone(),
            submission_type: submission.submission_type.clone(),
            fiscal_number: submission.fiscal_number.clone(),
            year: submission.year,
            tier: submission.tier.as_str().to_string(),
            base_irs_path: submission.base_irs_path.clone(),
            files: files
                .iter()
                .map(|file| CalculationFileRef {
                    broker_name: file.broker_name.clone(),
                    file_type: file.file_type.clone(),
                    file_path: file.file_path.clone(),
                })
                .collect(),
        };

        match self
            .processor
            .calculate_taxes(submission.user_id, &request)
            .await
        {
            Ok(outcome) => {
                // Raw payload is kept whether the processor succeeded or
                // reported an internal error.
                self.store
                    .append_result(submission_id, outcome.payload.clone())
                    .await?;

                if outcome.is_success() {
                    let complete = self
                        .store
                        .transition_status(
                            submission_id,
                            &[SubmissionStatus::Processing],
                            SubmissionStatus::Complete,
                        )
                        .await?;
                    info!(submission_id = %complete.id, "calculation complete");
                    Ok(complete)
                } else {
                    let reason = outcome.error_message.unwrap_or_else(|| {
                        format!("processor reported status `{}`", outcome.status)
                    });
                    self.flag_for_review(&submission, reason).await
                }
            }
            Err(err) => {
                // Transport failure or timeout. The submission stays in
                // PROCESSING; a paid submission is never dropped over a
                // transient remote error.
                self.flag_for_review(&submission, err.to_string()).await
            }
        }
    }

    async fn flag_for_review(
        &self,
        submission: &Submission,
        reason: String,
    ) -> AppResult<Submission> {
        warn!(
            submission_id = %submission.id,
            %reason,
            "calculation did not complete; submission left in PROCESSING for manual review"
        );
        self.notifier
            .notify(NotificationEvent::CalculationNeedsReview {
                submission_id: submission.id,
                user_id: submission.user_id,
                reason,
            });
        self.store
            .submission_by_id(submission.id)
            .await?
            .ok_or(AppError::NotFound)
    }

    pub async fn submission_detail(&self, submission_id: Uuid) -> AppResult<SubmissionDetail> {
        let submission = self
            .store
            .submission_by_id(submission_id)
            .await?
            .ok_or(AppError::NotFound)?;
        let files = self.store.files_for_submission(submission_id).await?;
        let latest_result = self.store.latest_result(submission_id).await?;
        Ok(SubmissionDetail {
            submission,
            platforms: group_by_broker(files),
            latest_result,
        })
    }

    pub async fn submissions_for_user(&self, user_id: Uuid) -> AppResult<Vec<Submission>> {
        self.store.submissions_for_user(user_id).await
    }
}

fn validate_for_calculation(submission: &Submission) -> Result<(), String> {
    if submission.fiscal_number.trim().is_empty() {
        return Err("fiscal number is required".to_string());
    }
    if !(2000..=2100).contains(&submission.year) {
        return Err(format!(
            "year {} is outside the supported range",
            submission.year
        ));
    }
    Ok(())
}
