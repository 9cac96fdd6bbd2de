//! Home base 应用装配：路由、CORS、nonce 清理任务与监听。

use axum::{
    Router,
    http::{
        Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::{
    auth::handlers::{session_handler, whoami_handler},
    commands::handlers::{command_handler, nonce_validate_handler},
    config::Config,
    nonce::guard::spawn_cleanup_task,
    state::AppState,
    telemetry::handlers::ingest_handler,
};

/// 构建路由。
pub(crate) fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION]);

    Router::new()
        .route("/healthz", get(healthz))
        .route("/auth/session", post(session_handler))
        .route("/auth/whoami", get(whoami_handler))
        .route("/networks/{network_id}/command", post(command_handler))
        .route("/nonces/validate", post(nonce_validate_handler))
        .route("/logs/ingest", post(ingest_handler))
        .layer(cors)
        .with_state(state)
}

/// Home base 入口：装配状态、启动清理任务并监听 HTTP。
pub(crate) async fn run(config: Config) -> anyhow::Result<()> {
    let state = AppState::from_config(&config).await?;
    let cleanup = spawn_cleanup_task(
        state.nonces.clone(),
        config.nonce_cleanup_interval,
        config.nonce_max_age_min,
    );

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    info!("hb-homebase listening on {}", config.addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cleanup.abort();
    info!("hb-homebase stopped");
    Ok(())
}

/// 健康检查接口。
async fn healthz() -> &'static str {
    "ok"
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("listen for shutdown signal failed: {err}");
        std::future::pending::<()>().await;
    }
}
