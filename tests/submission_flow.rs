use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

use taxfolio_backend::error::{AppError, AppResult};
use taxfolio_backend::notifications::NotifierHandle;
use taxfolio_backend::processor::{
    CalculationOutcome, CalculationRequest, ProcessorClient, UploadFile, UploadOutcome,
};
use taxfolio_backend::store::{MemoryStore, NewUserPack, SubscriptionStore};
use taxfolio_backend::submissions::{NewSubmission, SubmissionService, SubmissionStatus, Tier};
use taxfolio_backend::subscriptions::{LedgerService, PaymentSummaryEntry, UserPack};

enum CalculationScript {
    Success(Value),
    ProcessorError(String),
    TransportError,
}

struct ScriptedProcessor {
    upload_outcomes: Mutex<Vec<UploadOutcome>>,
    calculation: Mutex<CalculationScript>,
    fail_deletes: AtomicBool,
    deleted_files: Mutex<Vec<String>>,
    deleted_brokers: Mutex<Vec<String>>,
}

impl ScriptedProcessor {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            upload_outcomes: Mutex::new(Vec::new()),
            calculation: Mutex::new(CalculationScript::Success(
                json!({ "status": "success", "totalTax": 1234.56 }),
            )),
            fail_deletes: AtomicBool::new(false),
            deleted_files: Mutex::new(Vec::new()),
            deleted_brokers: Mutex::new(Vec::new()),
        })
    }

    fn script_calculation(&self, script: CalculationScript) {
        *self.calculation.lock().unwrap() = script;
    }

    fn script_uploads(&self, outcomes: Vec<UploadOutcome>) {
        *self.upload_outcomes.lock().unwrap() = outcomes;
    }

    fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProcessorClient for ScriptedProcessor {
    async fn upload_files(
        &self,
        _user_id: Uuid,
        _broker_id: &str,
        _files: Vec<UploadFile>,
    ) -> AppResult<Vec<UploadOutcome>> {
        Ok(self.upload_outcomes.lock().unwrap().clone())
    }

    async fn delete_file(
        &self,
        _user_id: Uuid,
        _broker_id: &str,
        _file_type: &str,
        file_name: &str,
    ) -> AppResult<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(AppError::Message("remote delete failed".into()));
        }
        self.deleted_files
            .lock()
            .unwrap()
            .push(file_name.to_string());
        Ok(())
    }

    async fn delete_all_files(&self, _user_id: Uuid, broker_id: &str) -> AppResult<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(AppError::Message("remote delete failed".into()));
        }
        self.deleted_brokers
            .lock()
            .unwrap()
            .push(broker_id.to_string());
        Ok(())
    }

    async fn calculate_taxes(
        &self,
        _user_id: Uuid,
        _request: &CalculationRequest,
    ) -> AppResult<CalculationOutcome> {
        match &*self.calculation.lock().unwrap() {
            CalculationScript::Success(payload) => {
                Ok(CalculationOutcome::from_payload(payload.clone()))
            }
            CalculationScript::ProcessorError(message) => Ok(CalculationOutcome::from_payload(
                json!({ "status": "error", "errorMessage": message }),
            )),
            CalculationScript::TransportError => {
                Err(AppError::Message("connection reset by peer".into()))
            }
        }
    }

    async fn list_brokers(&self) -> AppResult<Vec<String>> {
        Ok(vec!["degiro".to_string(), "etoro".to_string()])
    }
}

fn service_over(store: Arc<MemoryStore>, processor: Arc<ScriptedProcessor>) -> SubmissionService {
    let ledger = LedgerService::new(store.clone(), store.clone());
    SubmissionService::new(store, ledger, processor, NotifierHandle::disabled())
}

fn new_submission(wants_premium: bool) -> NewSubmission {
    NewSubmission {
        title: "IRS 2025".to_string(),
        submission_type: "annual".to_string(),
        fiscal_number: "123456789".to_string(),
        year: 2025,
        base_irs_path: None,
        wants_premium,
    }
}

fn accepted(name: &str, broker: &str) -> UploadOutcome {
    UploadOutcome {
        file_name: name.to_string(),
        path: Some(format!("{broker}/{name}")),
        document_type: Some("statement".to_string()),
        error_message: None,
    }
}

fn rejected(name: &str, reason: &str) -> UploadOutcome {
    UploadOutcome {
        file_name: name.to_string(),
        path: None,
        document_type: None,
        error_message: Some(reason.to_string()),
    }
}

fn raw_file(name: &str) -> UploadFile {
    UploadFile {
        file_name: name.to_string(),
        content_type: Some("text/csv".to_string()),
        bytes: bytes::Bytes::from_static(b"date,amount\n"),
    }
}

#[tokio::test]
async fn premium_intent_fails_then_standard_succeeds_on_last_unit() {
    let store = Arc::new(MemoryStore::new());
    let pack = store.seed_pack("standard-1", 2495, 1, false);
    let service = service_over(store.clone(), ScriptedProcessor::new());
    let ledger = LedgerService::new(store.clone(), store.clone());

    let user_id = Uuid::new_v4();
    let subscription = ledger.complete_purchase(user_id, pack.id).await.unwrap();

    let err = service
        .create_submission(user_id, new_submission(true))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::QuotaExhausted));

    let submission = service
        .create_submission(user_id, new_submission(false))
        .await
        .unwrap();
    assert_eq!(submission.tier, Tier::Standard);
    assert_eq!(submission.status, SubmissionStatus::Draft);

    let remaining = ledger
        .payment_summary(user_id, true)
        .await
        .unwrap()
        .into_iter()
        .find(|entry| entry.id == subscription.id)
        .unwrap()
        .submissions_remaining;
    assert_eq!(remaining, 0);
}

#[tokio::test]
async fn creation_without_any_quota_is_refused() {
    let store = Arc::new(MemoryStore::new());
    let service = service_over(store, ScriptedProcessor::new());

    let err = service
        .create_submission(Uuid::new_v4(), new_submission(false))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::QuotaExhausted));
}

#[tokio::test]
async fn standard_request_on_premium_fallback_yields_premium_tier() {
    let store = Arc::new(MemoryStore::new());
    let pack = store.seed_pack("premium-5", 4995, 5, true);
    let service = service_over(store.clone(), ScriptedProcessor::new());
    let ledger = LedgerService::new(store.clone(), store.clone());

    let user_id = Uuid::new_v4();
    ledger.complete_purchase(user_id, pack.id).await.unwrap();

    // Premium quota may satisfy a standard request; the tier then mirrors
    // the subscription that actually funded it.
    let submission = service
        .create_submission(user_id, new_submission(false))
        .await
        .unwrap();
    assert_eq!(submission.tier, Tier::Premium);
}

/// Wrapper that loses every consume race, for exercising the compensation
/// path in isolation.
struct RacingLedger {
    inner: Arc<MemoryStore>,
}

#[async_trait]
impl SubscriptionStore for RacingLedger {
    async fn insert_subscription(&self, new: NewUserPack) -> AppResult<UserPack> {
        self.inner.insert_subscription(new).await
    }

    async fn subscriptions_for_user(&self, user_id: Uuid) -> AppResult<Vec<UserPack>> {
        self.inner.subscriptions_for_user(user_id).await
    }

    async fn subscription_by_id(&self, id: Uuid) -> AppResult<Option<UserPack>> {
        self.inner.subscription_by_id(id).await
    }

    async fn subscription_for_user_and_pack(
        &self,
        user_id: Uuid,
        pack_id: Uuid,
    ) -> AppResult<Option<UserPack>> {
        self.inner
            .subscription_for_user_and_pack(user_id, pack_id)
            .await
    }

    async fn consume(&self, _id: Uuid) -> AppResult<UserPack> {
        Err(AppError::Conflict("subscription already exhausted".into()))
    }

    async fn payment_summary(
        &self,
        user_id: Uuid,
        include_exhausted: bool,
    ) -> AppResult<Vec<PaymentSummaryEntry>> {
        self.inner.payment_summary(user_id, include_exhausted).await
    }
}

#[tokio::test]
async fn losing_the_consume_race_leaves_no_submission_behind() {
    let store = Arc::new(MemoryStore::new());
    let pack = store.seed_pack("standard-1", 2495, 1, false);
    let racing = Arc::new(RacingLedger {
        inner: store.clone(),
    });
    let ledger = LedgerService::new(store.clone(), racing);
    let service = SubmissionService::new(
        store.clone(),
        ledger.clone(),
        ScriptedProcessor::new(),
        NotifierHandle::disabled(),
    );

    let user_id = Uuid::new_v4();
    ledger.complete_purchase(user_id, pack.id).await.unwrap();

    let err = service
        .create_submission(user_id, new_submission(false))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let submissions = service.submissions_for_user(user_id).await.unwrap();
    assert!(
        submissions.is_empty(),
        "draft must be rolled back when consumption fails"
    );
}

async fn draft_submission(
    store: &Arc<MemoryStore>,
    service: &SubmissionService,
    fiscal_number: &str,
) -> Uuid {
    let pack = store.seed_pack(
        &format!("pack-{}", Uuid::new_v4()),
        2495,
        5,
        false,
    );
    let user_id = Uuid::new_v4();
    let ledger = LedgerService::new(store.clone(), store.clone());
    ledger.complete_purchase(user_id, pack.id).await.unwrap();

    let mut new = new_submission(false);
    new.fiscal_number = fiscal_number.to_string();
    service.create_submission(user_id, new).await.unwrap().id
}

#[tokio::test]
async fn successful_calculation_completes_and_keeps_the_payload() {
    let store = Arc::new(MemoryStore::new());
    let processor = ScriptedProcessor::new();
    let service = service_over(store.clone(), processor);
    let submission_id = draft_submission(&store, &service, "123456789").await;

    let completed = service.calculate(submission_id).await.unwrap();
    assert_eq!(completed.status, SubmissionStatus::Complete);

    let detail = service.submission_detail(submission_id).await.unwrap();
    let result = detail.latest_result.expect("payload must be persisted");
    assert_eq!(result.results["status"], "success");
}

#[tokio::test]
async fn processor_error_keeps_processing_and_allows_a_retry() {
    let store = Arc::new(MemoryStore::new());
    let processor = ScriptedProcessor::new();
    processor.script_calculation(CalculationScript::ProcessorError(
        "missing broker statement".to_string(),
    ));
    let service = service_over(store.clone(), processor.clone());
    let submission_id = draft_submission(&store, &service, "123456789").await;

    let stuck = service.calculate(submission_id).await.unwrap();
    assert_eq!(stuck.status, SubmissionStatus::Processing);

    // The error payload is still appended for the operator to inspect.
    let detail = service.submission_detail(submission_id).await.unwrap();
    let result = detail.latest_result.expect("error payload must be kept");
    assert_eq!(result.results["errorMessage"], "missing broker statement");

    // Manual retry after the processor recovers.
    processor.script_calculation(CalculationScript::Success(
        json!({ "status": "success", "totalTax": 99.0 }),
    ));
    let completed = service.calculate(submission_id).await.unwrap();
    assert_eq!(completed.status, SubmissionStatus::Complete);
}

#[tokio::test]
async fn transport_failure_keeps_processing_without_a_payload() {
    let store = Arc::new(MemoryStore::new());
    let processor = ScriptedProcessor::new();
    processor.script_calculation(CalculationScript::TransportError);
    let service = service_over(store.clone(), processor);
    let submission_id = draft_submission(&store, &service, "123456789").await;

    let stuck = service.calculate(submission_id).await.unwrap();
    assert_eq!(stuck.status, SubmissionStatus::Processing);

    let detail = service.submission_detail(submission_id).await.unwrap();
    assert!(
        detail.latest_result.is_none(),
        "no payload exists when the call itself failed"
    );
}

#[tokio::test]
async fn completed_submissions_reject_further_calculation() {
    let store = Arc::new(MemoryStore::new());
    let service = service_over(store.clone(), ScriptedProcessor::new());
    let submission_id = draft_submission(&store, &service, "123456789").await;

    service.calculate(submission_id).await.unwrap();
    let err = service.calculate(submission_id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn upfront_validation_failure_is_the_only_road_to_failed() {
    let store = Arc::new(MemoryStore::new());
    let service = service_over(store.clone(), ScriptedProcessor::new());
    let submission_id = draft_submission(&store, &service, "  ").await;

    let err = service.calculate(submission_id).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let detail = service.submission_detail(submission_id).await.unwrap();
    assert_eq!(detail.submission.status, SubmissionStatus::Failed);
    let result = detail.latest_result.expect("rejection must be recorded");
    assert_eq!(result.results["status"], "rejected");

    // FAILED is terminal.
    let err = service.calculate(submission_id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn partial_upload_persists_accepted_files_and_reports_the_rest() {
    let store = Arc::new(MemoryStore::new());
    let processor = ScriptedProcessor::new();
    processor.script_uploads(vec![
        accepted("a.csv", "etoro"),
        accepted("b.csv", "etoro"),
        rejected("c.xls", "unsupported format"),
    ]);
    let service = service_over(store.clone(), processor);
    let submission_id = draft_submission(&store, &service, "123456789").await;

    let err = service
        .upload_files(
            submission_id,
            "etoro",
            vec![raw_file("a.csv"), raw_file("b.csv"), raw_file("c.xls")],
        )
        .await
        .unwrap_err();
    match err {
        AppError::PartialUpload(message) => {
            assert!(message.contains("c.xls"), "message must name the file");
            assert!(message.contains("unsupported format"));
        }
        other => panic!("expected PartialUpload, got {other:?}"),
    }

    let detail = service.submission_detail(submission_id).await.unwrap();
    assert_eq!(detail.platforms.len(), 1);
    assert_eq!(detail.platforms[0].broker_name, "etoro");
    assert_eq!(detail.platforms[0].files.len(), 2);
}

#[tokio::test]
async fn clean_upload_returns_the_stored_rows() {
    let store = Arc::new(MemoryStore::new());
    let processor = ScriptedProcessor::new();
    processor.script_uploads(vec![accepted("a.csv", "degiro")]);
    let service = service_over(store.clone(), processor);
    let submission_id = draft_submission(&store, &service, "123456789").await;

    let stored = service
        .upload_files(submission_id, "degiro", vec![raw_file("a.csv")])
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].broker_name, "degiro");
    assert_eq!(stored[0].file_path, "degiro/a.csv");
}

#[tokio::test]
async fn remove_file_keeps_the_local_row_until_the_remote_delete_succeeds() {
    let store = Arc::new(MemoryStore::new());
    let processor = ScriptedProcessor::new();
    processor.script_uploads(vec![accepted("a.csv", "etoro")]);
    let service = service_over(store.clone(), processor.clone());
    let submission_id = draft_submission(&store, &service, "123456789").await;

    let stored = service
        .upload_files(submission_id, "etoro", vec![raw_file("a.csv")])
        .await
        .unwrap();
    let file_id = stored[0].id;

    processor.set_fail_deletes(true);
    service.remove_file(file_id).await.unwrap_err();
    let detail = service.submission_detail(submission_id).await.unwrap();
    assert_eq!(
        detail.platforms[0].files.len(),
        1,
        "row must survive a failed remote delete"
    );

    processor.set_fail_deletes(false);
    service.remove_file(file_id).await.unwrap();
    let detail = service.submission_detail(submission_id).await.unwrap();
    assert!(detail.platforms.is_empty());
    assert_eq!(
        processor.deleted_files.lock().unwrap().clone(),
        vec!["a.csv".to_string()]
    );
}

#[tokio::test]
async fn removing_a_missing_file_is_not_found() {
    let store = Arc::new(MemoryStore::new());
    let service = service_over(store, ScriptedProcessor::new());

    let err = service.remove_file(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound));
}

#[tokio::test]
async fn broker_wipe_is_remote_first_and_scoped_to_one_broker() {
    let store = Arc::new(MemoryStore::new());
    let processor = ScriptedProcessor::new();
    let service = service_over(store.clone(), processor.clone());
    let submission_id = draft_submission(&store, &service, "123456789").await;

    processor.script_uploads(vec![accepted("a.csv", "etoro")]);
    service
        .upload_files(submission_id, "etoro", vec![raw_file("a.csv")])
        .await
        .unwrap();
    processor.script_uploads(vec![accepted("b.csv", "degiro")]);
    service
        .upload_files(submission_id, "degiro", vec![raw_file("b.csv")])
        .await
        .unwrap();

    processor.set_fail_deletes(true);
    service
        .remove_all_files_for_broker(submission_id, "etoro")
        .await
        .unwrap_err();
    let detail = service.submission_detail(submission_id).await.unwrap();
    assert_eq!(detail.platforms.len(), 2, "remote failure removes nothing");

    processor.set_fail_deletes(false);
    let removed = service
        .remove_all_files_for_broker(submission_id, "etoro")
        .await
        .unwrap();
    assert_eq!(removed, 1);
    let detail = service.submission_detail(submission_id).await.unwrap();
    assert_eq!(detail.platforms.len(), 1);
    assert_eq!(detail.platforms[0].broker_name, "degiro");
    assert_eq!(
        processor.deleted_brokers.lock().unwrap().clone(),
        vec!["etoro".to_string()]
    );
}
