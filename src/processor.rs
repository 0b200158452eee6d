use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::config;
use crate::error::AppResult;

/// key: processor-client -> remote calculation and broker-file storage
///
/// Narrow seam over the external tax-calculation processor. The processor is
/// opaque: it stores broker files under its own keys and runs the actual tax
/// computation. Everything behind this trait is remote state.
#[async_trait]
pub trait ProcessorClient: Send + Sync {
    async fn upload_files(
        &self,
        user_id: Uuid,
        broker_id: &str,
        files: Vec<UploadFile>,
    ) -> AppResult<Vec<UploadOutcome>>;

    async fn delete_file(
        &self,
        user_id: Uuid,
        broker_id: &str,
        file_type: &str,
        file_name: &str,
    ) -> AppResult<()>;

    async fn delete_all_files(&self, user_id: Uuid, broker_id: &str) -> AppResult<()>;

    async fn calculate_taxes(
        &self,
        user_id: Uuid,
        request: &CalculationRequest,
    ) -> AppResult<CalculationOutcome>;

    async fn list_brokers(&self) -> AppResult<Vec<String>>;
}

#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// Per-file verdict from the processor's upload endpoint: either a storage
/// path or a rejection reason, never both.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOutcome {
    pub file_name: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub document_type: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl UploadOutcome {
    pub fn accepted(&self) -> bool {
        self.path.is_some() && self.error_message.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationRequest {
    pub submission_id: Uuid,
    pub title: String,
    pub submission_type: String,
    pub fiscal_number: String,
    pub year: i32,
    pub tier: String,
    pub base_irs_path: Option<String>,
    pub files: Vec<CalculationFileRef>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationFileRef {
    pub broker_name: String,
    pub file_type: String,
    pub file_path: String,
}

/// The processor's calculation response. `payload` carries the raw body so it
/// can be persisted verbatim; `status`/`error_message` are the fields this
/// system actually interprets.
#[derive(Debug, Clone)]
pub struct CalculationOutcome {
    pub status: String,
    pub error_message: Option<String>,
    pub payload: Value,
}

impl CalculationOutcome {
    pub fn from_payload(payload: Value) -> Self {
        let status = payload
            .get("status")
            .and_then(|v| v.as_str())
            .unwrap_or("error")
            .to_string();
        let error_message = payload
            .get("errorMessage")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        Self {
            status,
            error_message,
            payload,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self.status.to_ascii_lowercase().as_str(),
            "success" | "completed"
        )
    }
}

/// key: processor-http -> reqwest transport
pub struct HttpProcessorClient {
    base: String,
    token: Option<String>,
    client: Client,
}

impl HttpProcessorClient {
    pub fn from_env() -> Self {
        Self::new(
            config::PROCESSOR_ENDPOINT.as_str(),
            config::PROCESSOR_TOKEN.clone(),
            Duration::from_secs(*config::PROCESSOR_TIMEOUT_SECS),
        )
    }

    pub fn new(base: impl Into<String>, token: Option<String>, timeout: Duration) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
            token,
            client: Client::builder()
                .timeout(timeout)
                .build()
                .expect("client build"),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/v1/{}", self.base, path);
        let mut req = self.client.request(method, url);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        req
    }
}

#[async_trait]
impl ProcessorClient for HttpProcessorClient {
    async fn upload_files(
        &self,
        user_id: Uuid,
        broker_id: &str,
        files: Vec<UploadFile>,
    ) -> AppResult<Vec<UploadOutcome>> {
        let mut form = reqwest::multipart::Form::new();
        for file in files {
            let mut part = reqwest::multipart::Part::bytes(file.bytes.to_vec())
                .file_name(file.file_name.clone());
            if let Some(content_type) = &file.content_type {
                part = part.mime_str(content_type).map_err(|_| {
                    crate::error::AppError::BadRequest(format!(
                        "invalid content type `{content_type}` for {}",
                        file.file_name
                    ))
                })?;
            }
            form = form.part("files", part);
        }

        let resp = self
            .request(
                reqwest::Method::POST,
                &format!("files/{user_id}/{broker_id}"),
            )
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }

    async fn delete_file(
        &self,
        user_id: Uuid,
        broker_id: &str,
        file_type: &str,
        file_name: &str,
    ) -> AppResult<()> {
        self.request(
            reqwest::Method::DELETE,
            &format!("files/{user_id}/{broker_id}/{file_type}/{file_name}"),
        )
        .send()
        .await?
        .error_for_status()?;
        Ok(())
    }

    async fn delete_all_files(&self, user_id: Uuid, broker_id: &str) -> AppResult<()> {
        self.request(
            reqwest::Method::DELETE,
            &format!("files/{user_id}/{broker_id}"),
        )
        .send()
        .await?
        .error_for_status()?;
        Ok(())
    }

    async fn calculate_taxes(
        &self,
        user_id: Uuid,
        request: &CalculationRequest,
    ) -> AppResult<CalculationOutcome> {
        let resp = self
            .request(reqwest::Method::POST, &format!("calculations/{user_id}"))
            .json(request)
            .send()
            .await?
            .error_for_status()?;
        let payload: Value = resp.json().await?;
        Ok(CalculationOutcome::from_payload(payload))
    }

    async fn list_brokers(&self) -> AppResult<Vec<String>> {
        let resp = self
            .request(reqwest::Method::GET, "brokers")
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::CalculationOutcome;
    use serde_json::json;

    #[test]
    fn outcome_reads_status_and_error_from_payload() {
        let outcome = CalculationOutcome::from_payload(json!({
            "status": "error",
            "errorMessage": "missing broker statement",
            "totals": {},
        }));
        assert!(!outcome.is_success());
        assert_eq!(
            outcome.error_message.as_deref(),
            Some("missing broker statement")
        );
    }

    #[test]
    fn outcome_defaults_to_error_when_status_missing() {
        let outcome = CalculationOutcome::from_payload(json!({ "totals": {} }));
        assert_eq!(outcome.status, "error");
        assert!(!outcome.is_success());
    }

    #[test]
    fn success_statuses_are_case_insensitive() {
        let outcome = CalculationOutcome::from_payload(json!({ "status": "Success" }));
        assert!(outcome.is_success());
    }
}
