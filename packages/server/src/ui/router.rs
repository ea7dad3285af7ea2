//! Route table.
//!
//! `route_layer` wraps only the routes added before it, and the last layer
//! added runs first. Each group below is therefore written innermost-first:
//! domain, then auth, then the route-specific rate limit.

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post, put},
};
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::usecase::RouteClass;

use super::{
    handler,
    middleware::{
        access_log, optional_auth, optional_domain, rate_limit, require_auth, require_domain,
    },
    state::AppState,
};

pub fn build_router(state: Arc<AppState>) -> Router {
    let limit = |class: RouteClass| from_fn_with_state((state.clone(), class), rate_limit);

    let connect = Router::new()
        .route("/api/secure-connect", post(handler::secure_connect))
        .route("/api/connect", post(handler::basic_connect))
        .route_layer(limit(RouteClass::Connection));

    let open = Router::new()
        .route("/api/status/{session_id}", get(handler::status))
        .route("/api/disconnect", post(handler::disconnect))
        .route("/api/health", get(handler::health))
        .route("/api/stats/connections", get(handler::stats_connections))
        .route(
            "/api/customer/upload",
            post(handler::upload).layer(DefaultBodyLimit::max(handler::MAX_UPLOAD_BYTES)),
        );

    let send = Router::new()
        .route("/api/send", post(handler::send))
        .route_layer(from_fn_with_state(state.clone(), optional_domain))
        .route_layer(from_fn_with_state(state.clone(), optional_auth))
        .route_layer(limit(RouteClass::MessageSend));

    let poll = Router::new()
        .route("/api/client/messages", get(handler::poll))
        .route_layer(from_fn_with_state(state.clone(), optional_auth));

    let customer = Router::new()
        .route(
            "/api/client/messages/{user_id}/history",
            get(handler::history),
        )
        .route(
            "/api/client/messages/{user_id}/status",
            put(handler::update_status),
        )
        .route_layer(from_fn_with_state(state.clone(), require_domain))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    let admin = Router::new()
        .route("/api/admin/send-reply", post(handler::send_reply))
        .route("/api/admin/broadcast", post(handler::broadcast))
        .route_layer(from_fn_with_state(state.clone(), require_auth))
        .route_layer(limit(RouteClass::MessageSend));

    let api = Router::new()
        .merge(connect)
        .merge(open)
        .merge(send)
        .merge(poll)
        .merge(customer)
        .merge(admin)
        .layer(limit(RouteClass::General));

    // 接続先の探索に使うため制限しない
    let discovery = Router::new()
        .route("/api/config", get(handler::discovery))
        .route("/api/sdk/version", get(handler::sdk_version));

    Router::new()
        .merge(api)
        .merge(discovery)
        .route(
            "/ws/customer/{shop_id}/{customer_id}",
            get(handler::customer_socket),
        )
        .nest_service("/uploads", ServeDir::new(&state.config.upload_dir))
        .layer(from_fn_with_state(state.clone(), access_log))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
