use tracing::info;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::processor::{UploadFile, UploadOutcome};
use crate::store::NewSubmissionFile;

use super::models::SubmissionFile;
use super::service::SubmissionService;

/// key: file-intake -> remote-first mirror of the processor's file store
///
/// The processor owns file storage. Local rows are written only after a
/// successful remote upload and removed only after a successful remote
/// delete, so the mirror never claims a file the processor does not hold.
impl SubmissionService {
    /// Uploads a batch of broker files. Files the processor accepts are
    /// persisted even when others in the same batch are rejected; the
    /// rejections come back as one aggregated `PartialUpload` error.
    pub async fn upload_files(
        &self,
        submission_id: Uuid,
        broker_id: &str,
        files: Vec<UploadFile>,
    ) -> AppResult<Vec<SubmissionFile>> {
        let submission = self
            .store
            .submission_by_id(submission_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if files.is_empty() {
            return Err(AppError::BadRequest("no files provided".into()));
        }

        let outcomes = self
            .processor
            .upload_files(submission.user_id, broker_id, files)
            .await?;
        let (accepted, rejected) = partition_outcomes(outcomes);

        let stored = if accepted.is_empty() {
            Vec::new()
        } else {
            let rows = accepted
                .into_iter()
                .map(|outcome| NewSubmissionFile {
                    submission_id,
                    broker_name: broker_id.to_string(),
                    file_type: outcome
                        .document_type
                        .unwrap_or_else(|| "document".to_string()),
                    // accepted() guarantees the path is present
                    file_path: outcome.path.unwrap_or_default(),
                })
                .collect();
            self.store.insert_files(rows).await?
        };

        info!(
            %submission_id,
            broker = broker_id,
            stored = stored.len(),
            rejected = rejected.len(),
            "broker files uploaded"
        );

        if !rejected.is_empty() {
            return Err(AppError::PartialUpload(aggregate_rejections(&rejected)));
        }
        Ok(stored)
    }

    /// Deletes one mirrored file. The remote delete runs first; the local
    /// row survives any remote failure so a retry can find it again.
    pub async fn remove_file(&self, file_id: Uuid) -> AppResult<()> {
        let file = self
            .store
            .file_by_id(file_id)
            .await?
            .ok_or(AppError::NotFound)?;
        let submission = self
            .store
            .submission_by_id(file.submission_id)
            .await?
            .ok_or(AppError::NotFound)?;

        self.processor
            .delete_file(
                submission.user_id,
                &file.broker_name,
                &file.file_type,
                remote_file_name(&file.file_path),
            )
            .await?;
        self.store.delete_file(file_id).await
    }

    /// Drops every mirrored file for one broker, remote bulk-delete first.
    pub async fn remove_all_files_for_broker(
        &self,
        submission_id: Uuid,
        broker_id: &str,
    ) -> AppResult<u64> {
        let submission = self
            .store
            .submission_by_id(submission_id)
            .await?
            .ok_or(AppError::NotFound)?;

        self.processor
            .delete_all_files(submission.user_id, broker_id)
            .await?;
        self.store
            .delete_files_for_broker(submission_id, broker_id)
            .await
    }

    pub async fn list_brokers(&self) -> AppResult<Vec<String>> {
        self.processor.list_brokers().await
    }
}

fn partition_outcomes(outcomes: Vec<UploadOutcome>) -> (Vec<UploadOutcome>, Vec<UploadOutcome>) {
    outcomes.into_iter().partition(|outcome| outcome.accepted())
}

fn aggregate_rejections(rejected: &[UploadOutcome]) -> String {
    rejected
        .iter()
        .map(|outcome| {
            format!(
                "{}: {}",
                outcome.file_name,
                outcome
                    .error_message
                    .as_deref()
                    .unwrap_or("rejected without a reason")
            )
        })
        .collect::<Vec<_>>()
        .join("; ")
}

fn remote_file_name(file_path: &str) -> &str {
    file_path.rsplit('/').next().unwrap_or(file_path)
}
