use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use tracing::info;

use crate::cli::ServeArgs;
use crate::infra::{AppState, InMemoryRecordService, StubDocumentService, TracingNotifier};
use crate::routes::with_application_routes;
use admission_flow::config::AppConfig;
use admission_flow::error::AppError;
use admission_flow::telemetry;
use admission_flow::workflows::application::{
    ApplicationStepService, JsonFileDraftPersistence, TokioPollTimer,
};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let records = Arc::new(InMemoryRecordService::default());
    let documents = Arc::new(StubDocumentService::new(2));
    let draft_path = std::env::temp_dir().join("admission-flow-draft.json");
    let persistence = Arc::new(JsonFileDraftPersistence::new(draft_path));
    let workflow_service = Arc::new(ApplicationStepService::with_parts(
        records,
        documents,
        Arc::new(TokioPollTimer),
        Arc::new(TracingNotifier),
        persistence,
        config.extraction.to_extraction_config(),
    ));
    if workflow_service.restore_draft() {
        info!("resumed a persisted draft session");
    }

    let app = with_application_routes(workflow_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "admission intake orchestrator ready");

    axum::serve(listener, app).await?;
    Ok(())
}
