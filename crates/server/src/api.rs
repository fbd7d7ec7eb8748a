//! JSON API for the procurement workflow.
//!
//! - `POST /api/requests`                  create a request
//! - `GET  /api/requests?status=`          list visible requests
//! - `GET  /api/requests/{id}`             fetch one request
//! - `PUT  /api/requests/{id}/status`      administrative status override
//! - `POST /api/requests/{id}/approvals`   approve or reject a pending request
//! - `GET  /api/requests/{id}/approvals`   approval history
//!
//! Caller identity comes from the `x-user-id` and `x-user-role` headers set by the gateway.

use std::str::FromStr;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequestParts, Path, Query, State,
    },
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use uuid::Uuid;

use procura_core::approvals::{ApprovalInput, ApprovalWorkflowService};
use procura_core::domain::approval::{ApprovalDetail, Decision};
use procura_core::domain::request::{
    NewProcurementRequest, ProcurementRequest, RequestDetail, RequestId, RequestStatus,
};
use procura_core::domain::user::{Identity, Role, UserId};
use procura_core::errors::{ApplicationError, DomainError, InterfaceError};
use procura_core::requests::RequestLifecycleService;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[derive(Clone)]
pub struct ApiState {
    pub lifecycle: RequestLifecycleService,
    pub approvals: ApprovalWorkflowService,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/requests", post(create_request).get(list_requests))
        .route("/api/requests/{id}", get(get_request))
        .route("/api/requests/{id}/status", put(force_status))
        .route("/api/requests/{id}/approvals", post(submit_approval).get(list_approvals))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct ApprovalBody {
    pub status: String,
    #[serde(default)]
    pub comments: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub detail: String,
    pub correlation_id: String,
}

// ---------------------------------------------------------------------------
// Identity and errors
// ---------------------------------------------------------------------------

/// Trusted caller identity taken from gateway headers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Caller(pub Identity);

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
        };

        let user_id = header(USER_ID_HEADER)
            .ok_or_else(|| ApiError::Unauthenticated(format!("missing {USER_ID_HEADER} header")))?
            .parse::<i64>()
            .map_err(|_| ApiError::Unauthenticated(format!("malformed {USER_ID_HEADER} header")))?;
        let role = header(USER_ROLE_HEADER)
            .ok_or_else(|| {
                ApiError::Unauthenticated(format!("missing {USER_ROLE_HEADER} header"))
            })
            .and_then(|value| {
                Role::from_str(value).map_err(|_| {
                    ApiError::Unauthenticated(format!("malformed {USER_ROLE_HEADER} header"))
                })
            })?;

        Ok(Self(Identity::new(UserId(user_id), role)))
    }
}

#[derive(Debug)]
pub enum ApiError {
    Unauthenticated(String),
    Interface(InterfaceError),
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        ApplicationError::from(DomainError::Validation(message.into())).into()
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        let correlation_id = Uuid::new_v4().to_string();
        match &error {
            ApplicationError::Domain(_) => warn!(
                event_name = "api.request.rejected",
                correlation_id = %correlation_id,
                error = %error,
                "request rejected"
            ),
            _ => error!(
                event_name = "api.request.failed",
                correlation_id = %correlation_id,
                error = %error,
                "request failed"
            ),
        }
        Self::Interface(error.into_interface(correlation_id))
    }
}

impl From<DomainError> for ApiError {
    fn from(error: DomainError) -> Self {
        ApplicationError::from(error).into()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(format!("invalid JSON body: {}", rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::bad_request(format!("invalid path: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(format!("invalid query: {}", rejection.body_text()))
    }
}

fn status_for(error: &InterfaceError) -> StatusCode {
    match error {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::Forbidden { .. } => StatusCode::FORBIDDEN,
        InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
        InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthenticated(detail) => {
                let body = ErrorBody {
                    error: "Caller identity is missing or invalid.",
                    detail,
                    correlation_id: Uuid::new_v4().to_string(),
                };
                (StatusCode::UNAUTHORIZED, Json(body)).into_response()
            }
            Self::Interface(error) => {
                let body = ErrorBody {
                    error: error.user_message(),
                    detail: error.message().to_string(),
                    correlation_id: error.correlation_id().to_string(),
                };
                (status_for(&error), Json(body)).into_response()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn create_request(
    State(state): State<ApiState>,
    Caller(caller): Caller,
    body: Result<Json<NewProcurementRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RequestDetail>), ApiError> {
    let Json(input) = body?;
    let created = state.lifecycle.create_request(&caller, input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_requests(
    State(state): State<ApiState>,
    Caller(caller): Caller,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Vec<RequestDetail>>, ApiError> {
    let Query(query) = query?;
    let status = query
        .status
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(RequestStatus::from_str)
        .transpose()?;

    Ok(Json(state.lifecycle.list_requests(&caller, status).await?))
}

async fn get_request(
    State(state): State<ApiState>,
    Caller(caller): Caller,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<RequestDetail>, ApiError> {
    let Path(id) = id?;
    Ok(Json(state.lifecycle.get_request(RequestId(id), &caller).await?))
}

async fn force_status(
    State(state): State<ApiState>,
    Caller(caller): Caller,
    id: Result<Path<i64>, PathRejection>,
    body: Result<Json<StatusBody>, JsonRejection>,
) -> Result<Json<ProcurementRequest>, ApiError> {
    let Path(id) = id?;
    let Json(body) = body?;
    let status = RequestStatus::from_str(&body.status)?;

    Ok(Json(state.lifecycle.force_set_status(RequestId(id), &caller, status).await?))
}

async fn submit_approval(
    State(state): State<ApiState>,
    Caller(caller): Caller,
    id: Result<Path<i64>, PathRejection>,
    body: Result<Json<ApprovalBody>, JsonRejection>,
) -> Result<(StatusCode, Json<ApprovalDetail>), ApiError> {
    let Path(id) = id?;
    let Json(body) = body?;
    let decision = Decision::from_str(&body.status)?;

    let input = ApprovalInput { decision, comments: body.comments };
    let approval = state.approvals.submit_approval(RequestId(id), &caller, input).await?;
    Ok((StatusCode::CREATED, Json(approval)))
}

async fn list_approvals(
    State(state): State<ApiState>,
    Caller(caller): Caller,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Vec<ApprovalDetail>>, ApiError> {
    let Path(id) = id?;
    Ok(Json(state.approvals.list_approvals(RequestId(id), &caller).await?))
}
