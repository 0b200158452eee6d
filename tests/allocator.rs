use std::sync::Arc;

use taxfolio_backend::error::AppError;
use taxfolio_backend::store::MemoryStore;
use taxfolio_backend::subscriptions::LedgerService;
use uuid::Uuid;

fn ledger_over(store: Arc<MemoryStore>) -> LedgerService {
    LedgerService::new(store.clone(), store)
}

#[tokio::test]
async fn consume_counts_down_and_refuses_at_zero() {
    let store = Arc::new(MemoryStore::new());
    store.seed_pack("free", 0, 1, false);
    let pack = store.seed_pack("standard-5", 2495, 5, false);
    let ledger = ledger_over(store);

    let user_id = Uuid::new_v4();
    let subscription = ledger.complete_purchase(user_id, pack.id).await.unwrap();
    assert_eq!(subscription.submissions_remaining, 5);

    for expected in (0..5).rev() {
        let updated = ledger.consume(subscription.id).await.unwrap();
        assert_eq!(updated.submissions_remaining, expected);
    }

    let err = ledger.consume(subscription.id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let after = ledger
        .select_subscription(user_id, false)
        .await
        .unwrap();
    assert!(after.is_none(), "exhausted row must not be selectable");
}

#[tokio::test]
async fn free_pack_grant_is_idempotent() {
    let store = Arc::new(MemoryStore::new());
    store.seed_pack("free", 0, 1, false);
    let ledger = ledger_over(store);

    let user_id = Uuid::new_v4();
    let first = ledger.grant_free_pack(user_id).await.unwrap();
    ledger.consume(first.id).await.unwrap();

    // A second grant returns the existing row untouched, even exhausted.
    let second = ledger.grant_free_pack(user_id).await.unwrap();
    assert_eq!(second.id, first.id);
    assert_eq!(second.submissions_remaining, 0);

    let summary = ledger.payment_summary(user_id, true).await.unwrap();
    assert_eq!(summary.len(), 1);
}

#[tokio::test]
async fn purchases_of_the_same_pack_stay_separate_rows() {
    let store = Arc::new(MemoryStore::new());
    let pack = store.seed_pack("standard-5", 2495, 5, false);
    let ledger = ledger_over(store);

    let user_id = Uuid::new_v4();
    let first = ledger.complete_purchase(user_id, pack.id).await.unwrap();
    let second = ledger.complete_purchase(user_id, pack.id).await.unwrap();
    assert_ne!(first.id, second.id);

    let summary = ledger.payment_summary(user_id, true).await.unwrap();
    assert_eq!(summary.len(), 2);
    assert!(summary.iter().all(|entry| entry.pack_name == "standard-5"));
}

#[tokio::test]
async fn premium_request_without_premium_quota_selects_nothing() {
    let store = Arc::new(MemoryStore::new());
    let standard = store.seed_pack("standard-5", 2495, 5, false);
    let ledger = ledger_over(store);

    let user_id = Uuid::new_v4();
    ledger.complete_purchase(user_id, standard.id).await.unwrap();

    let chosen = ledger.select_subscription(user_id, true).await.unwrap();
    assert!(chosen.is_none(), "premium intent must not use standard quota");
}

#[tokio::test]
async fn standard_request_prefers_standard_and_falls_back_to_premium() {
    let store = Arc::new(MemoryStore::new());
    let standard = store.seed_pack("standard-5", 2495, 1, false);
    let premium = store.seed_pack("premium-5", 4995, 5, true);
    let ledger = ledger_over(store);

    let user_id = Uuid::new_v4();
    let premium_sub = ledger.complete_purchase(user_id, premium.id).await.unwrap();
    let standard_sub = ledger
        .complete_purchase(user_id, standard.id)
        .await
        .unwrap();

    let chosen = ledger
        .select_subscription(user_id, false)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(chosen.id, standard_sub.id);

    ledger.consume(standard_sub.id).await.unwrap();
    let fallback = ledger
        .select_subscription(user_id, false)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fallback.id, premium_sub.id);
}

#[tokio::test]
async fn selection_is_deterministic_in_creation_order() {
    let store = Arc::new(MemoryStore::new());
    let pack = store.seed_pack("standard-5", 2495, 5, false);
    let ledger = ledger_over(store);

    let user_id = Uuid::new_v4();
    let first = ledger.complete_purchase(user_id, pack.id).await.unwrap();
    let _second = ledger.complete_purchase(user_id, pack.id).await.unwrap();

    for _ in 0..3 {
        let chosen = ledger
            .select_subscription(user_id, false)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(chosen.id, first.id, "earliest-created row wins every time");
    }
}

#[tokio::test]
async fn payment_summary_filters_exhausted_rows() {
    let store = Arc::new(MemoryStore::new());
    let pack = store.seed_pack("standard-1", 2495, 1, false);
    let ledger = ledger_over(store);

    let user_id = Uuid::new_v4();
    let kept = ledger.complete_purchase(user_id, pack.id).await.unwrap();
    let spent = ledger.complete_purchase(user_id, pack.id).await.unwrap();
    ledger.consume(spent.id).await.unwrap();

    let active_only = ledger.payment_summary(user_id, false).await.unwrap();
    assert_eq!(active_only.len(), 1);
    assert_eq!(active_only[0].id, kept.id);

    let everything = ledger.payment_summary(user_id, true).await.unwrap();
    assert_eq!(everything.len(), 2);
}

#[tokio::test]
async fn purchase_of_unknown_or_inactive_pack_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    let ledger = ledger_over(store);

    let err = ledger
        .complete_purchase(Uuid::new_v4(), Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound));
}
