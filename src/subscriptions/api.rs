use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;

use super::{LedgerService, PaymentSummaryEntry, UserPack};

/// key: ledger-api -> summary endpoint and collaborator webhooks
#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    #[serde(default)]
    pub include_exhausted: bool,
}

pub async fn payment_summary(
    Extension(ledger): Extension<LedgerService>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<SummaryQuery>,
) -> AppResult<Json<Vec<PaymentSummaryEntry>>> {
    let entries = ledger
        .payment_summary(user_id, query.include_exhausted)
        .await?;
    Ok(Json(entries))
}

/// Entry point for the user-registration collaborator. Safe to call more
/// than once for the same user.
#[derive(Debug, Deserialize)]
pub struct RegistrationWebhookRequest {
    pub user_id: Uuid,
}

pub async fn registration_webhook(
    Extension(ledger): Extension<LedgerService>,
    Json(payload): Json<RegistrationWebhookRequest>,
) -> AppResult<Json<UserPack>> {
    let granted = ledger.grant_free_pack(payload.user_id).await?;
    Ok(Json(granted))
}

/// Entry point for the payment/checkout collaborator, invoked after the card
/// processor confirms the charge.
#[derive(Debug, Deserialize)]
pub struct PaymentWebhookRequest {
    pub user_id: Uuid,
    pub pack_id: Uuid,
    pub event: String,
}

pub async fn payment_webhook(
    Extension(ledger): Extension<LedgerService>,
    Json(payload): Json<PaymentWebhookRequest>,
) -> AppResult<(StatusCode, Json<Option<UserPack>>)> {
    match payload.event.as_str() {
        "payment.completed" => {
            let purchased = ledger
                .complete_purchase(payload.user_id, payload.pack_id)
                .await?;
            Ok((StatusCode::CREATED, Json(Some(purchased))))
        }
        _ => Ok((StatusCode::ACCEPTED, Json(None))),
    }
}
