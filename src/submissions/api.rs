use axum::{
    extract::{Extension, Multipart, Path},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::processor::UploadFile;

use super::models::{NewSubmission, Submission, SubmissionDetail, SubmissionFile};
use super::service::SubmissionService;

/// key: submission-api -> wizard/dashboard entrypoints
#[derive(Debug, Deserialize)]
pub struct CreateSubmissionRequest {
    pub user_id: Uuid,
    #[serde(flatten)]
    pub submission: NewSubmission,
}

pub async fn create_submission(
    Extension(service): Extension<SubmissionService>,
    Json(payload): Json<CreateSubmissionRequest>,
) -> AppResult<(StatusCode, Json<Submission>)> {
    let submission = service
        .create_submission(payload.user_id, payload.submission)
        .await?;
    Ok((StatusCode::CREATED, Json(submission)))
}

pub async fn get_submission(
    Extension(service): Extension<SubmissionService>,
    Path(submission_id): Path<Uuid>,
) -> AppResult<Json<SubmissionDetail>> {
    Ok(Json(service.submission_detail(submission_id).await?))
}

pub async fn list_submissions(
    Extension(service): Extension<SubmissionService>,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<Vec<Submission>>> {
    Ok(Json(service.submissions_for_user(user_id).await?))
}

pub async fn calculate(
    Extension(service): Extension<SubmissionService>,
    Path(submission_id): Path<Uuid>,
) -> AppResult<Json<Submission>> {
    Ok(Json(service.calculate(submission_id).await?))
}

pub async fn upload_files(
    Extension(service): Extension<SubmissionService>,
    Path((submission_id, broker_id)): Path<(Uuid, String)>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<Vec<SubmissionFile>>)> {
    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::BadRequest(err.to_string()))?
    {
        let file_name = field
            .file_name()
            .map(|name| name.to_string())
            .unwrap_or_else(|| "file.bin".to_string());
        let content_type = field.content_type().map(|mime| mime.to_string());
        let data = field
            .bytes()
            .await
            .map_err(|err| AppError::BadRequest(err.to_string()))?;
        files.push(UploadFile {
            file_name,
            content_type,
            bytes: data,
        });
    }

    let stored = service
        .upload_files(submission_id, &broker_id, files)
        .await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

pub async fn delete_file(
    Extension(service): Extension<SubmissionService>,
    Path(file_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    service.remove_file(file_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_broker_files(
    Extension(service): Extension<SubmissionService>,
    Path((submission_id, broker_id)): Path<(Uuid, String)>,
) -> AppResult<StatusCode> {
    service
        .remove_all_files_for_broker(submission_id, &broker_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_brokers(
    Extension(service): Extension<SubmissionService>,
) -> AppResult<Json<Vec<String>>> {
    Ok(Json(service.list_brokers().await?))
}
