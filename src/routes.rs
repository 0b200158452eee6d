use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::{catalog, submissions, subscriptions};

pub fn api_routes() -> Router {
    Router::new()
        .route("/api/packs", get(catalog::api::list_packs))
        .route(
            "/api/packs/purchasable",
            get(catalog::api::list_purchasable_packs),
        )
        .route("/api/packs/:id", get(catalog::api::get_pack))
        .route(
            "/api/webhooks/registration",
            post(subscriptions::api::registration_webhook),
        )
        .route(
            "/api/webhooks/payment",
            post(subscriptions::api::payment_webhook),
        )
        .route(
            "/api/users/:user_id/subscriptions",
            get(subscriptions::api::payment_summary),
        )
        .route(
            "/api/users/:user_id/submissions",
            get(submissions::api::list_submissions),
        )
        .route("/api/submissions", post(submissions::api::create_submission))
        .route("/api/submissions/:id", get(submissions::api::get_submission))
        .route(
            "/api/submissions/:id/calculate",
            post(submissions::api::calculate),
        )
        .route(
            "/api/submissions/:id/brokers/:broker/files",
            post(submissions::api::upload_files).delete(submissions::api::delete_broker_files),
        )
        .route("/api/files/:file_id", delete(submissions::api::delete_file))
        .route("/api/brokers", get(submissions::api::list_brokers))
}
