//! API router.
//!
//! Returns a composable `Router` that can be mounted on any axum server.
//! Routes are nested under `/api/`.

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::endpoints;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;

/// Build the API router with tracing and permissive CORS for local tools.
pub fn api_router(core: Arc<CoreState>) -> Router {
    build_router(ApiContext::new(core))
}

fn build_router(ctx: ApiContext) -> Router {
    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let api = Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/edit", post(endpoints::edit::edit))
        .route("/reset", post(endpoints::conversations::reset_conversation))
        .route(
            "/conversations/:id/current",
            get(endpoints::conversations::current),
        )
        .route(
            "/conversations/:id/history",
            get(endpoints::conversations::history),
        )
        .route(
            "/conversations/:id/versions/:version",
            get(endpoints::conversations::version),
        )
        .route("/conversations/:id/diff", get(endpoints::conversations::diff))
        .route(
            "/conversations/:id/findings/:field",
            post(endpoints::findings::submit).get(endpoints::findings::list),
        )
        .route(
            "/conversations/:id/findings/:field/:index",
            delete(endpoints::findings::delete),
        )
        .route("/fields", get(endpoints::findings::fields))
        .route("/edit-form/noael", post(endpoints::forms::noael))
        .route("/edit-form/dap", post(endpoints::forms::dap))
        .route("/edit/batch", post(endpoints::batch::run))
        .route("/edit/batch/:batch_id", get(endpoints::batch::by_batch))
        .route("/edit/inci/:inci_name", get(endpoints::batch::by_inci))
        .with_state(ctx);

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
