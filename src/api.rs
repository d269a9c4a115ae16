use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::request::Parts,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    config::AuthConfig,
    errors::{classify_database_error, ApiError, ErrorContext, ErrorResponse},
    models::*,
    revision_service::RevisionService,
};

use crate::{log_api_error, log_api_start, log_api_success, log_api_warn};

#[derive(Clone)]
pub struct AppState {
    pub revision_service: RevisionService,
    pub auth: AuthConfig,
}

impl AppState {
    pub fn new(revision_service: RevisionService) -> Self {
        Self {
            revision_service,
            auth: AuthConfig::default(),
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ErrorResponse>;

/// Identity supplied by the upstream auth provider through a request header.
#[derive(Debug, Clone)]
pub struct AuthUser(pub String);

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ErrorResponse;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(state.auth.user_header.as_str())
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty());

        match user_id {
            Some(user_id) => Ok(AuthUser(user_id.to_string())),
            None => Err(ApiError::Unauthorized(format!(
                "missing '{}' header",
                state.auth.user_header
            ))
            .to_response_with_context(ErrorContext::new("authenticate", "user"))),
        }
    }
}

#[derive(Deserialize)]
pub struct SubjectParams {
    pub class: Option<i32>,
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

// Content endpoints
pub async fn list_subjects(
    State(state): State<AppState>,
    AuthUser(_user_id): AuthUser,
    Query(params): Query<SubjectParams>,
) -> ApiResult<Vec<Subject>> {
    log_api_start!("list_subjects");

    match state.revision_service.list_subjects(params.class).await {
        Ok(subjects) => {
            log_api_success!("list_subjects", count = subjects.len(), "subjects listed");
            Ok(Json(ApiResponse::success(subjects)))
        }
        Err(e) => Err(ApiError::DatabaseError(e)
            .to_response_with_context(ErrorContext::new("list_subjects", "subject"))),
    }
}

pub async fn list_chapters(
    State(state): State<AppState>,
    AuthUser(_user_id): AuthUser,
    Path(subject_id): Path<Uuid>,
) -> ApiResult<Vec<ChapterSummary>> {
    match state.revision_service.list_chapters(subject_id).await {
        Ok(Some(chapters)) => Ok(Json(ApiResponse::success(chapters))),
        Ok(None) => Err(ApiError::NotFound(format!("Subject '{}' not found", subject_id))
            .to_response_with_context(
                ErrorContext::new("list_chapters", "subject").with_id(&subject_id.to_string()),
            )),
        Err(e) => Err(ApiError::DatabaseError(e).to_response_with_context(
            ErrorContext::new("list_chapters", "subject").with_id(&subject_id.to_string()),
        )),
    }
}

pub async fn get_chapter(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(chapter_id): Path<Uuid>,
) -> ApiResult<ChapterView> {
    log_api_start!("get_chapter", chapter_id = chapter_id);

    match state.revision_service.chapter_view(&user_id, chapter_id).await {
        Ok(Some(view)) => {
            log_api_success!("get_chapter", chapter_id = chapter_id, "chapter view built");
            Ok(Json(ApiResponse::success(view)))
        }
        Ok(None) => {
            log_api_warn!("get_chapter", chapter_id = chapter_id, "chapter not found");
            Err(ApiError::NotFound(format!("Chapter '{}' not found", chapter_id))
                .to_response_with_context(
                    ErrorContext::new("get_chapter", "chapter").with_id(&chapter_id.to_string()),
                ))
        }
        Err(e) => {
            log_api_error!("get_chapter", chapter_id = chapter_id, error = e, "database error");
            Err(ApiError::DatabaseError(e).to_response_with_context(
                ErrorContext::new("get_chapter", "chapter").with_id(&chapter_id.to_string()),
            ))
        }
    }
}

// Progress endpoints
pub async fn save_progress(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(request): Json<SaveProgressRequest>,
) -> ApiResult<ProgressRecord> {
    log_api_start!("save_progress", chapter_id = request.chapter_id);

    if request.last_viewed_topic_order < 0 {
        return Err(ApiError::ValidationError(
            "last_viewed_topic_order must not be negative".to_string(),
        )
        .to_response_with_context(
            ErrorContext::new("save_progress", "chapter").with_id(&request.chapter_id.to_string()),
        ));
    }

    match state
        .revision_service
        .save_progress(&user_id, request.chapter_id, request.last_viewed_topic_order)
        .await
    {
        Ok(Some(record)) => {
            log_api_success!("save_progress", chapter_id = request.chapter_id, "progress saved");
            Ok(Json(ApiResponse::success(record)))
        }
        Ok(None) => Err(ApiError::NotFound(format!("Chapter '{}' not found", request.chapter_id))
            .to_response_with_context(
                ErrorContext::new("save_progress", "chapter")
                    .with_id(&request.chapter_id.to_string())
                    .with_user_message("Chapter does not exist"),
            )),
        Err(e) => Err(classify_database_error(&e).to_response_with_context(
            ErrorContext::new("save_progress", "chapter").with_id(&request.chapter_id.to_string()),
        )),
    }
}

pub async fn latest_progress(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<Option<ContinueReading>> {
    match state.revision_service.continue_reading(&user_id).await {
        Ok(latest) => Ok(Json(ApiResponse::success(latest))),
        Err(e) => Err(ApiError::DatabaseError(e)
            .to_response_with_context(ErrorContext::new("latest_progress", "progress"))),
    }
}

// Topic status endpoints
pub async fn set_topic_status(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(request): Json<SetTopicStatusRequest>,
) -> ApiResult<TopicStatusRecord> {
    log_api_start!("set_topic_status", topic_id = request.topic_id);

    let status: TopicStatus = match request.status.parse() {
        Ok(status) => status,
        Err(_) => {
            return Err(ApiError::ValidationError(
                "status must be one of got_it, revise_later".to_string(),
            )
            .to_response_with_context(
                ErrorContext::new("set_topic_status", "topic").with_id(&request.topic_id.to_string()),
            ));
        }
    };

    match state
        .revision_service
        .set_topic_status(&user_id, request.topic_id, status)
        .await
    {
        Ok(Some(record)) => {
            log_api_success!("set_topic_status", topic_id = request.topic_id, "status stored");
            Ok(Json(ApiResponse::success(record)))
        }
        Ok(None) => Err(ApiError::NotFound(format!("Topic '{}' not found", request.topic_id))
            .to_response_with_context(
                ErrorContext::new("set_topic_status", "topic").with_id(&request.topic_id.to_string()),
            )),
        Err(e) => {
            log_api_error!("set_topic_status", topic_id = request.topic_id, error = e, "database error");
            Err(classify_database_error(&e).to_response_with_context(
                ErrorContext::new("set_topic_status", "topic").with_id(&request.topic_id.to_string()),
            ))
        }
    }
}

pub async fn clear_topic_status(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(request): Json<ClearTopicStatusRequest>,
) -> ApiResult<Value> {
    log_api_start!("clear_topic_status", topic_id = request.topic_id);

    match state
        .revision_service
        .clear_topic_status(&user_id, request.topic_id)
        .await
    {
        Ok(removed) => {
            log_api_success!("clear_topic_status", topic_id = request.topic_id, "status cleared");
            Ok(Json(ApiResponse::success(json!({ "removed": removed }))))
        }
        Err(e) => Err(ApiError::DatabaseError(e).to_response_with_context(
            ErrorContext::new("clear_topic_status", "topic").with_id(&request.topic_id.to_string()),
        )),
    }
}

pub async fn revise_later(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<Vec<ReviseLaterItem>> {
    match state.revision_service.revise_later(&user_id).await {
        Ok(items) => {
            log_api_success!("revise_later", count = items.len(), "bookmarks listed");
            Ok(Json(ApiResponse::success(items)))
        }
        Err(e) => Err(ApiError::DatabaseError(e)
            .to_response_with_context(ErrorContext::new("revise_later", "topic_status"))),
    }
}

pub async fn onboarding(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(request): Json<OnboardingRequest>,
) -> ApiResult<User> {
    match state.revision_service.onboard(&user_id, request.selected_class).await {
        Ok(Some(user)) => Ok(Json(ApiResponse::success(user))),
        Ok(None) => Err(ApiError::BadRequest(format!(
            "Invalid class selection: {}",
            request.selected_class
        ))
        .to_response_with_context(ErrorContext::new("onboarding", "user").with_id(&user_id))),
        Err(e) => Err(ApiError::DatabaseError(e)
            .to_response_with_context(ErrorContext::new("onboarding", "user").with_id(&user_id))),
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        // Content routes
        .route("/api/subjects", get(list_subjects))
        .route("/api/subjects/:id/chapters", get(list_chapters))
        .route("/api/chapters/:id", get(get_chapter))
        // Progress routes
        .route("/api/chapters/progress", post(save_progress))
        .route("/api/progress/latest", get(latest_progress))
        // Topic status routes
        .route("/api/topics/status", post(set_topic_status).delete(clear_topic_status))
        .route("/api/revise-later", get(revise_later))
        // Users
        .route("/api/onboarding", post(onboarding))
        .with_state(state)
}
