use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// key: submission-model -> lifecycle states
///
/// DRAFT -> PROCESSING -> COMPLETE is the success path. FAILED is reached
/// only through upfront validation; a processor-side failure leaves the
/// submission in PROCESSING for manual review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionStatus {
    Draft,
    Processing,
    Complete,
    Failed,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Draft => "DRAFT",
            SubmissionStatus::Processing => "PROCESSING",
            SubmissionStatus::Complete => "COMPLETE",
            SubmissionStatus::Failed => "FAILED",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw {
            "DRAFT" => Ok(SubmissionStatus::Draft),
            "PROCESSING" => Ok(SubmissionStatus::Processing),
            "COMPLETE" => Ok(SubmissionStatus::Complete),
            "FAILED" => Ok(SubmissionStatus::Failed),
            other => Err(format!("unknown submission status `{other}`")),
        }
    }
}

/// Fixed at creation from the consumed subscription's premium flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    Standard,
    Premium,
}

impl Tier {
    pub fn from_premium(is_premium: bool) -> Self {
        if is_premium {
            Tier::Premium
        } else {
            Tier::Standard
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Standard => "STANDARD",
            Tier::Premium => "PREMIUM",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw {
            "STANDARD" => Ok(Tier::Standard),
            "PREMIUM" => Ok(Tier::Premium),
            other => Err(format!("unknown tier `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: SubmissionStatus,
    pub tier: Tier,
    pub title: String,
    pub submission_type: String,
    pub fiscal_number: String,
    pub year: i32,
    pub base_irs_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A broker file mirrored locally. The row exists only if the upload to the
/// processor succeeded; `file_path` is the processor's storage key.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct SubmissionFile {
    pub id: Uuid,
    pub submission_id: Uuid,
    pub broker_name: String,
    pub file_type: String,
    pub file_path: String,
    pub created_at: DateTime<Utc>,
}

/// Append-only calculation output. The payload is opaque to this system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub id: Uuid,
    pub submission_id: Uuid,
    pub results: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewSubmission {
    pub title: String,
    pub submission_type: String,
    pub fiscal_number: String,
    pub year: i32,
    #[serde(default)]
    pub base_irs_path: Option<String>,
    #[serde(default)]
    pub wants_premium: bool,
}

/// Files clustered by broker, derived on read for the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct PlatformGroup {
    pub broker_name: String,
    pub files: Vec<SubmissionFile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionDetail {
    pub submission: Submission,
    pub platforms: Vec<PlatformGroup>,
    pub latest_result: Option<SubmissionResult>,
}

pub fn group_by_broker(files: Vec<SubmissionFile>) -> Vec<PlatformGroup> {
    let mut groups: Vec<PlatformGroup> = Vec::new();
    for file in files {
        match groups
            .iter_mut()
            .find(|group| group.broker_name == file.broker_name)
        {
            Some(group) => group.files.push(file),
            None => groups.push(PlatformGroup {
                broker_name: file.broker_name.clone(),
                files: vec![file],
            }),
        }
    }
    groups.sort_by(|a, b| a.broker_name.cmp(&b.broker_name));
    groups
}
