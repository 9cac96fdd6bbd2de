//! 遥测 HTTP 接口处理。

use axum::{Json, extract::State};

use hb_shared_protocol::{IngestSummary, TelemetryBatch};

use crate::state::AppState;

/// 遥测批量上报接口：总是返回 200，逐条结果体现在计数里。
pub(crate) async fn ingest_handler(
    State(state): State<AppState>,
    Json(batch): Json<TelemetryBatch>,
) -> Json<IngestSummary> {
    Json(state.ingest_telemetry(batch).await)
}
