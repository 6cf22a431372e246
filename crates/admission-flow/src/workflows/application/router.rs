use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use serde_json::json;

use super::clients::{
    ApplicationRecordService, DocumentService, ExtractionNotifier, RecordServiceError,
};
use super::domain::{ApplicationId, SectionRecord, UploadedFile, SECTION_COUNT};
use super::extraction::PollTimer;
use super::service::{ApplicationStepService, WorkflowError};

/// Router builder exposing the step workflow over HTTP for the form layer.
pub fn application_router<B, D, T, N>(
    service: Arc<ApplicationStepService<B, D, T, N>>,
) -> Router
where
    B: ApplicationRecordService + 'static,
    D: DocumentService + 'static,
    T: PollTimer + 'static,
    N: ExtractionNotifier + 'static,
{
    Router::new()
        .route("/api/v1/application/steps", get(steps_handler::<B, D, T, N>))
        .route(
            "/api/v1/application/modes/create",
            post(create_mode_handler::<B, D, T, N>),
        )
        .route(
            "/api/v1/application/modes/edit/:application_id",
            post(edit_mode_handler::<B, D, T, N>),
        )
        .route(
            "/api/v1/application/modes/view/:application_id",
            post(view_mode_handler::<B, D, T, N>),
        )
        .route(
            "/api/v1/application/sections/:index",
            get(get_section_handler::<B, D, T, N>).put(put_section_handler::<B, D, T, N>),
        )
        .route(
            "/api/v1/application/sections/:index/complete",
            post(complete_step_handler::<B, D, T, N>),
        )
        .route(
            "/api/v1/application/sections/:index/extraction",
            post(trigger_extraction_handler::<B, D, T, N>)
                .get(extraction_status_handler::<B, D, T, N>)
                .delete(cancel_extraction_handler::<B, D, T, N>),
        )
        .route(
            "/api/v1/application/navigation/goto/:index",
            post(goto_handler::<B, D, T, N>),
        )
        .route(
            "/api/v1/application/navigation/next",
            post(next_handler::<B, D, T, N>),
        )
        .route(
            "/api/v1/application/navigation/previous",
            post(previous_handler::<B, D, T, N>),
        )
        .route(
            "/api/v1/application/submit",
            post(submit_handler::<B, D, T, N>),
        )
        .with_state(service)
}

/// Session-level progress exposed to the form layer.
#[derive(Debug, Serialize)]
pub struct StepStatusView {
    pub mode: &'static str,
    pub application_id: Option<String>,
    pub current_step: usize,
    pub completed_steps: Vec<usize>,
    pub section_count: usize,
    pub hydrated: bool,
}

fn status_view<B, D, T, N>(service: &ApplicationStepService<B, D, T, N>) -> StepStatusView
where
    B: ApplicationRecordService,
    D: DocumentService,
    T: PollTimer,
    N: ExtractionNotifier,
{
    StepStatusView {
        mode: service.mode().label(),
        application_id: service.application_id().map(|id| id.0),
        current_step: service.current_step(),
        completed_steps: service.completed_steps(),
        section_count: SECTION_COUNT,
        hydrated: service.is_hydrated(),
    }
}

fn error_response(error: WorkflowError) -> Response {
    let status = match &error {
        WorkflowError::StepLocked(_) | WorkflowError::ReadOnly | WorkflowError::Unbound => {
            StatusCode::CONFLICT
        }
        WorkflowError::ValidationRejected(_)
        | WorkflowError::ExtractionUnsupported(_)
        | WorkflowError::EmptySection(_) => StatusCode::UNPROCESSABLE_ENTITY,
        WorkflowError::UnknownSection(_) => StatusCode::NOT_FOUND,
        WorkflowError::Record(RecordServiceError::NotFound) => StatusCode::NOT_FOUND,
        WorkflowError::Record(RecordServiceError::Rejected(_)) => StatusCode::UNPROCESSABLE_ENTITY,
        WorkflowError::Record(RecordServiceError::Unavailable(_)) => StatusCode::BAD_GATEWAY,
    };
    let body = axum::Json(json!({ "error": error.to_string() }));
    (status, body).into_response()
}

async fn steps_handler<B, D, T, N>(
    State(service): State<Arc<ApplicationStepService<B, D, T, N>>>,
) -> Response
where
    B: ApplicationRecordService + 'static,
    D: DocumentService + 'static,
    T: PollTimer + 'static,
    N: ExtractionNotifier + 'static,
{
    (StatusCode::OK, axum::Json(status_view(service.as_ref()))).into_response()
}

async fn create_mode_handler<B, D, T, N>(
    State(service): State<Arc<ApplicationStepService<B, D, T, N>>>,
) -> Response
where
    B: ApplicationRecordService + 'static,
    D: DocumentService + 'static,
    T: PollTimer + 'static,
    N: ExtractionNotifier + 'static,
{
    service.begin_create();
    (StatusCode::OK, axum::Json(status_view(service.as_ref()))).into_response()
}

async fn edit_mode_handler<B, D, T, N>(
    State(service): State<Arc<ApplicationStepService<B, D, T, N>>>,
    Path(application_id): Path<String>,
) -> Response
where
    B: ApplicationRecordService + 'static,
    D: DocumentService + 'static,
    T: PollTimer + 'static,
    N: ExtractionNotifier + 'static,
{
    match service.begin_edit(ApplicationId(application_id)).await {
        Ok(()) => (StatusCode::OK, axum::Json(status_view(service.as_ref()))).into_response(),
        Err(error) => error_response(error),
    }
}

async fn view_mode_handler<B, D, T, N>(
    State(service): State<Arc<ApplicationStepService<B, D, T, N>>>,
    Path(application_id): Path<String>,
) -> Response
where
    B: ApplicationRecordService + 'static,
    D: DocumentService + 'static,
    T: PollTimer + 'static,
    N: ExtractionNotifier + 'static,
{
    match service.begin_view(ApplicationId(application_id)).await {
        Ok(()) => (StatusCode::OK, axum::Json(status_view(service.as_ref()))).into_response(),
        Err(error) => error_response(error),
    }
}

async fn get_section_handler<B, D, T, N>(
    State(service): State<Arc<ApplicationStepService<B, D, T, N>>>,
    Path(index): Path<usize>,
) -> Response
where
    B: ApplicationRecordService + 'static,
    D: DocumentService + 'static,
    T: PollTimer + 'static,
    N: ExtractionNotifier + 'static,
{
    match service.section(index) {
        Ok(record) => (
            StatusCode::OK,
            axum::Json(json!({
                "section": index,
                "data": record,
                "completed": service.is_step_completed(index),
            })),
        )
            .into_response(),
        Err(error) => error_response(error),
    }
}

async fn put_section_handler<B, D, T, N>(
    State(service): State<Arc<ApplicationStepService<B, D, T, N>>>,
    Path(index): Path<usize>,
    axum::Json(record): axum::Json<SectionRecord>,
) -> Response
where
    B: ApplicationRecordService + 'static,
    D: DocumentService + 'static,
    T: PollTimer + 'static,
    N: ExtractionNotifier + 'static,
{
    match service.set_section(index, record) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error_response(error),
    }
}

async fn complete_step_handler<B, D, T, N>(
    State(service): State<Arc<ApplicationStepService<B, D, T, N>>>,
    Path(index): Path<usize>,
) -> Response
where
    B: ApplicationRecordService + 'static,
    D: DocumentService + 'static,
    T: PollTimer + 'static,
    N: ExtractionNotifier + 'static,
{
    match service.complete_step(index).await {
        Ok(()) => (StatusCode::OK, axum::Json(status_view(service.as_ref()))).into_response(),
        Err(error) => error_response(error),
    }
}

async fn goto_handler<B, D, T, N>(
    State(service): State<Arc<ApplicationStepService<B, D, T, N>>>,
    Path(index): Path<usize>,
) -> Response
where
    B: ApplicationRecordService + 'static,
    D: DocumentService + 'static,
    T: PollTimer + 'static,
    N: ExtractionNotifier + 'static,
{
    navigation_response(service.go_to_step(index))
}

async fn next_handler<B, D, T, N>(
    State(service): State<Arc<ApplicationStepService<B, D, T, N>>>,
) -> Response
where
    B: ApplicationRecordService + 'static,
    D: DocumentService + 'static,
    T: PollTimer + 'static,
    N: ExtractionNotifier + 'static,
{
    navigation_response(service.go_to_next())
}

async fn previous_handler<B, D, T, N>(
    State(service): State<Arc<ApplicationStepService<B, D, T, N>>>,
) -> Response
where
    B: ApplicationRecordService + 'static,
    D: DocumentService + 'static,
    T: PollTimer + 'static,
    N: ExtractionNotifier + 'static,
{
    navigation_response(service.go_to_previous())
}

fn navigation_response(result: Result<usize, WorkflowError>) -> Response {
    match result {
        Ok(current_step) => (
            StatusCode::OK,
            axum::Json(json!({ "current_step": current_step })),
        )
            .into_response(),
        Err(error) => error_response(error),
    }
}

async fn submit_handler<B, D, T, N>(
    State(service): State<Arc<ApplicationStepService<B, D, T, N>>>,
) -> Response
where
    B: ApplicationRecordService + 'static,
    D: DocumentService + 'static,
    T: PollTimer + 'static,
    N: ExtractionNotifier + 'static,
{
    match service.submit().await {
        Ok(()) => (
            StatusCode::OK,
            axum::Json(json!({ "status": "submitted" })),
        )
            .into_response(),
        Err(error) => error_response(error),
    }
}

async fn trigger_extraction_handler<B, D, T, N>(
    State(service): State<Arc<ApplicationStepService<B, D, T, N>>>,
    Path(index): Path<usize>,
    axum::Json(file): axum::Json<UploadedFile>,
) -> Response
where
    B: ApplicationRecordService + 'static,
    D: DocumentService + 'static,
    T: PollTimer + 'static,
    N: ExtractionNotifier + 'static,
{
    // Pre-flight checks answer synchronously; the poll loop itself runs in
    // the background and is observed via the status endpoint.
    if let Err(error) = service.validate_upload(index, &file) {
        return error_response(error);
    }

    let task_service = service.clone();
    tokio::spawn(async move {
        let _ = task_service.trigger_extraction(index, file).await;
    });

    (
        StatusCode::ACCEPTED,
        axum::Json(json!({ "section": index, "status": "accepted" })),
    )
        .into_response()
}

async fn extraction_status_handler<B, D, T, N>(
    State(service): State<Arc<ApplicationStepService<B, D, T, N>>>,
    Path(index): Path<usize>,
) -> Response
where
    B: ApplicationRecordService + 'static,
    D: DocumentService + 'static,
    T: PollTimer + 'static,
    N: ExtractionNotifier + 'static,
{
    match service.extraction_status(index) {
        Some(job) => (StatusCode::OK, axum::Json(job)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            axum::Json(json!({ "error": "no extraction job for section" })),
        )
            .into_response(),
    }
}

async fn cancel_extraction_handler<B, D, T, N>(
    State(service): State<Arc<ApplicationStepService<B, D, T, N>>>,
    Path(index): Path<usize>,
) -> Response
where
    B: ApplicationRecordService + 'static,
    D: DocumentService + 'static,
    T: PollTimer + 'static,
    N: ExtractionNotifier + 'static,
{
    service.cancel_extraction(index);
    StatusCode::NO_CONTENT.into_response()
}
