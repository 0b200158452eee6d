pub mod api;
mod files;
pub mod models;
pub mod service;

pub use models::{
    group_by_broker, NewSubmission, PlatformGroup, Submission, SubmissionDetail, SubmissionFile,
    SubmissionResult, SubmissionStatus, Tier,
};
pub use service::SubmissionService;
