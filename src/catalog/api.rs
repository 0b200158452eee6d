use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    Json,
};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::store::PackStore;

use super::Pack;

/// key: catalog-api -> read-only rest endpoints
pub async fn list_packs(
    Extension(packs): Extension<Arc<dyn PackStore>>,
) -> AppResult<Json<Vec<Pack>>> {
    Ok(Json(packs.list_packs().await?))
}

pub async fn list_purchasable_packs(
    Extension(packs): Extension<Arc<dyn PackStore>>,
) -> AppResult<Json<Vec<Pack>>> {
    Ok(Json(packs.purchasable_packs().await?))
}

pub async fn get_pack(
    Extension(packs): Extension<Arc<dyn PackStore>>,
    Path(pack_id): Path<Uuid>,
) -> AppResult<Json<Pack>> {
    let pack = packs.pack_by_id(pack_id).await?.ok_or(AppError::NotFound)?;
    Ok(Json(pack))
}
