use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, warn};

use super::domain::{BorrowerId, DocumentId, EvaluationRequest};
use super::error::CoordinationError;
use super::eligibility::submission_eligibility;
use super::explanation::DecisionExplanation;
use super::export::ledger_csv;
use super::ledger::{LedgerError, LedgerStore};
use super::overrides::{ManualDecisionUpdate, OverrideError, OverrideOutcome, UnderwriterOverrides};
use super::service::DecisionCoordinator;

/// Body posted by the document-intake service once a document is stored.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessDecisionRequest {
    pub user_id: String,
    pub document_id: String,
}

impl From<ProcessDecisionRequest> for EvaluationRequest {
    fn from(value: ProcessDecisionRequest) -> Self {
        EvaluationRequest {
            borrower_id: BorrowerId(value.user_id),
            document_id: DocumentId(value.document_id),
        }
    }
}

/// Shared handler state.
pub struct DecisionApi<S> {
    pub coordinator: Arc<DecisionCoordinator<S>>,
    pub overrides: Arc<UnderwriterOverrides<S>>,
}

impl<S> Clone for DecisionApi<S> {
    fn clone(&self) -> Self {
        Self {
            coordinator: Arc::clone(&self.coordinator),
            overrides: Arc::clone(&self.overrides),
        }
    }
}

/// Router builder exposing coordination, status and override endpoints.
pub fn decision_router<S>(
    coordinator: Arc<DecisionCoordinator<S>>,
    overrides: Arc<UnderwriterOverrides<S>>,
) -> Router
where
    S: LedgerStore + 'static,
{
    Router::new()
        .route("/process-decision", post(process_handler::<S>))
        .route(
            "/api/v1/borrowers/:borrower_id/decision",
            get(current_handler::<S>),
        )
        .route(
            "/api/v1/borrowers/:borrower_id/decisions",
            get(history_handler::<S>),
        )
        .route(
            "/api/v1/borrowers/:borrower_id/explanation",
            get(explanation_handler::<S>),
        )
        .route(
            "/api/v1/borrowers/:borrower_id/eligibility",
            get(eligibility_handler::<S>),
        )
        .route("/api/v1/decisions/export", get(export_handler::<S>))
        .route(
            "/underwriter/manual-decision-update",
            post(override_handler::<S>),
        )
        .with_state(DecisionApi {
            coordinator,
            overrides,
        })
}

fn error_status(err: &CoordinationError) -> StatusCode {
    match err {
        CoordinationError::TaskFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        _ if err.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::BAD_GATEWAY,
    }
}

fn ledger_unavailable(err: LedgerError) -> Response {
    error!(error = %err, "decision ledger read failed");
    let payload = json!({ "error": err.to_string() });
    (StatusCode::SERVICE_UNAVAILABLE, Json(payload)).into_response()
}

fn no_decision(borrower_id: &BorrowerId) -> Response {
    let payload = json!({
        "borrower_id": borrower_id,
        "error": "no decision recorded for borrower",
    });
    (StatusCode::NOT_FOUND, Json(payload)).into_response()
}

pub(crate) async fn process_handler<S>(
    State(api): State<DecisionApi<S>>,
    payload: Result<Json<ProcessDecisionRequest>, JsonRejection>,
) -> Response
where
    S: LedgerStore + 'static,
{
    // no attempt was made, so nothing is recorded
    let Json(request) = match payload {
        Ok(request) => request,
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "process-decision body rejected");
            let payload = json!({
                "status": "error",
                "reason": "exception",
                "explanation": rejection.body_text(),
                "decision_id": null,
            });
            return (rejection.status(), Json(payload)).into_response();
        }
    };

    let outcome = api.coordinator.process(request.into()).await;

    match outcome.result {
        Ok(resolved) => {
            let payload = json!({
                "status": "ok",
                "final_decision": resolved.final_decision,
                "explanation": resolved.justification,
                "decision_id": outcome.decision_id,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => {
            let payload = json!({
                "status": "error",
                "reason": err.reason(),
                "explanation": err.ledger_message(),
                "decision_id": outcome.decision_id,
            });
            (error_status(&err), Json(payload)).into_response()
        }
    }
}

pub(crate) async fn current_handler<S>(
    State(api): State<DecisionApi<S>>,
    Path(borrower_id): Path<String>,
) -> Response
where
    S: LedgerStore + 'static,
{
    let borrower_id = BorrowerId(borrower_id);
    match api.coordinator.ledger().current(&borrower_id) {
        Ok(Some(record)) => (StatusCode::OK, Json(record)).into_response(),
        Ok(None) => no_decision(&borrower_id),
        Err(err) => ledger_unavailable(err),
    }
}

pub(crate) async fn history_handler<S>(
    State(api): State<DecisionApi<S>>,
    Path(borrower_id): Path<String>,
) -> Response
where
    S: LedgerStore + 'static,
{
    let borrower_id = BorrowerId(borrower_id);
    match api.coordinator.ledger().history(&borrower_id) {
        Ok(records) => {
            let payload = json!({
                "borrower_id": borrower_id,
                "decisions": records,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => ledger_unavailable(err),
    }
}

pub(crate) async fn explanation_handler<S>(
    State(api): State<DecisionApi<S>>,
    Path(borrower_id): Path<String>,
) -> Response
where
    S: LedgerStore + 'static,
{
    let borrower_id = BorrowerId(borrower_id);
    match api.coordinator.ledger().current(&borrower_id) {
        Ok(Some(record)) => {
            let explanation = DecisionExplanation::from_record(&record);
            (StatusCode::OK, Json(explanation)).into_response()
        }
        Ok(None) => no_decision(&borrower_id),
        Err(err) => ledger_unavailable(err),
    }
}

pub(crate) async fn eligibility_handler<S>(
    State(api): State<DecisionApi<S>>,
    Path(borrower_id): Path<String>,
) -> Response
where
    S: LedgerStore + 'static,
{
    let borrower_id = BorrowerId(borrower_id);
    match api.coordinator.ledger().current(&borrower_id) {
        Ok(current) => {
            let verdict = submission_eligibility(&borrower_id, current.as_ref());
            (StatusCode::OK, Json(verdict)).into_response()
        }
        Err(err) => ledger_unavailable(err),
    }
}

pub(crate) async fn export_handler<S>(State(api): State<DecisionApi<S>>) -> Response
where
    S: LedgerStore + 'static,
{
    let records = match api.coordinator.ledger().export() {
        Ok(records) => records,
        Err(err) => return ledger_unavailable(err),
    };

    match ledger_csv(&records) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/csv; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "ledger export failed");
            let payload = json!({ "error": err.to_string() });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
        }
    }
}

pub(crate) async fn override_handler<S>(
    State(api): State<DecisionApi<S>>,
    Json(update): Json<ManualDecisionUpdate>,
) -> Response
where
    S: LedgerStore + 'static,
{
    match api.overrides.apply(update) {
        Ok(OverrideOutcome::Recorded(record)) => {
            let payload = json!({
                "message": format!("Status successfully updated to '{}'", record.final_decision),
                "new_decision_id": record.id,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Ok(OverrideOutcome::Unchanged { current }) => {
            let payload = json!({
                "message": format!("Status is already '{current}'"),
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => {
            let status = match &err {
                OverrideError::Unauthorized(_) => StatusCode::FORBIDDEN,
                OverrideError::NoDecision(_) => StatusCode::NOT_FOUND,
                OverrideError::EmptyStatus => StatusCode::UNPROCESSABLE_ENTITY,
                OverrideError::Ledger(_) => StatusCode::SERVICE_UNAVAILABLE,
            };
            let payload = json!({ "error": err.to_string() });
            (status, Json(payload)).into_response()
        }
    }
}
