//! # API REST
//!
//! REST API implementation for Mixlab.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON serialization, CORS, status codes)
//!
//! Uses `api-shared` for request/response types and caller identification.

#![warn(rust_2018_idioms)]

use api_shared::{
    auth, ApiKey, AuthError, CreateFormulationReq, DerivationRes, EditFormulationReq,
    EditFormulationRes, FormulationRes, FormulationSummary, HealthRes, HealthService,
    ListFormulationsRes, API_KEY_HEADER, USER_EMAIL_HEADER, USER_ID_HEADER, USER_NAME_HEADER,
};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path as AxumPath, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use mixlab_core::{
    config::{
        data_dir_from_env_value, default_batch_volume_from_env_value,
        max_cover_bytes_from_env_value,
    },
    coerce, Actor, CoreConfig, CreateOptions, ExportFormat, FormulationError, FormulationId,
    FormulationService, ObjectStoreError, OrderBy,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Slack on top of the cover limit for multipart-free uploads.
const COVER_BODY_SLACK_BYTES: usize = 1024;

/// Application state shared across REST API handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: FormulationService,
    pub api_key: ApiKey,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        ready,
        list_formulations,
        create_formulation,
        get_formulation,
        edit_formulation,
        delete_formulation,
        duplicate_formulation,
        upload_cover,
        derived,
        export,
    ),
    components(schemas(
        HealthRes,
        CreateFormulationReq,
        EditFormulationReq,
        EditFormulationRes,
        FormulationRes,
        FormulationSummary,
        ListFormulationsRes,
        DerivationRes,
        api_shared::RowRes,
        api_shared::TotalsRes,
    ))
)]
pub struct ApiDoc;

/// Resolves configuration from the environment and opens the file-backed stores.
///
/// # Environment Variables
/// - `MIXLAB_DATA_DIR`: data directory (default: `mixlab_data`)
/// - `MIXLAB_DEFAULT_BATCH_ML`: batch volume for new and legacy formulations (default: 500)
/// - `MIXLAB_MAX_COVER_BYTES`: cover upload limit in bytes
/// - `API_KEY`: when set, every request must carry it in `x-api-key`
pub fn state_from_env() -> anyhow::Result<AppState> {
    let cfg = CoreConfig::new(
        data_dir_from_env_value(std::env::var("MIXLAB_DATA_DIR").ok()),
        default_batch_volume_from_env_value(std::env::var("MIXLAB_DEFAULT_BATCH_ML").ok())?,
        max_cover_bytes_from_env_value(std::env::var("MIXLAB_MAX_COVER_BYTES").ok())?,
    )?;
    tracing::info!("-- Data directory: {}", cfg.data_dir().display());

    let api_key = ApiKey::new(std::env::var("API_KEY").ok());
    if !api_key.is_enabled() {
        tracing::warn!("API_KEY is not set; requests are not key-checked");
    }

    Ok(AppState {
        service: FormulationService::open(Arc::new(cfg))?,
        api_key,
    })
}

/// Builds the full REST router, Swagger UI included.
pub fn router(state: AppState) -> Router {
    let cover_limit = usize::try_from(state.service.config().max_cover_bytes())
        .unwrap_or(usize::MAX)
        .saturating_add(COVER_BODY_SLACK_BYTES);

    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route(
            "/formulations",
            get(list_formulations).post(create_formulation),
        )
        .route(
            "/formulations/:id",
            get(get_formulation)
                .patch(edit_formulation)
                .delete(delete_formulation),
        )
        .route("/formulations/:id/duplicate", post(duplicate_formulation))
        .route(
            "/formulations/:id/cover",
            put(upload_cover).layer(DefaultBodyLimit::max(cover_limit)),
        )
        .route("/formulations/:id/derived", get(derived))
        .route("/formulations/:id/export", get(export))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

type ApiResult<T> = Result<T, (StatusCode, &'static str)>;

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn auth_status(err: AuthError) -> (StatusCode, &'static str) {
    match err {
        AuthError::MissingApiKey | AuthError::InvalidApiKey => {
            (StatusCode::UNAUTHORIZED, "Invalid API key")
        }
        AuthError::Anonymous => (StatusCode::UNAUTHORIZED, "Caller identity required"),
        AuthError::InvalidIdentity(_) => (StatusCode::BAD_REQUEST, "Invalid caller identity"),
    }
}

fn error_status(err: FormulationError) -> (StatusCode, &'static str) {
    match err {
        FormulationError::NotFound(_) => (StatusCode::NOT_FOUND, "Formulation not found"),
        FormulationError::Private(_) => (StatusCode::FORBIDDEN, "Formulation is private"),
        FormulationError::NotOwner(_) => (
            StatusCode::FORBIDDEN,
            "Only the owner may modify this formulation",
        ),
        FormulationError::InvalidInput(_)
        | FormulationError::Text(_)
        | FormulationError::Uuid(_) => (StatusCode::BAD_REQUEST, "Invalid input"),
        FormulationError::ObjectStore(ObjectStoreError::TooLarge { .. }) => {
            (StatusCode::PAYLOAD_TOO_LARGE, "Cover image too large")
        }
        FormulationError::ObjectStore(ObjectStoreError::Invalid(_)) => {
            (StatusCode::BAD_REQUEST, "Invalid cover upload")
        }
        other => {
            tracing::error!("Formulation error: {:?}", other);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    }
}

/// Checks the API key and resolves the (possibly anonymous) caller.
fn caller(state: &AppState, headers: &HeaderMap) -> ApiResult<Option<Actor>> {
    state
        .api_key
        .validate(header_str(headers, API_KEY_HEADER))
        .map_err(auth_status)?;
    auth::identify(
        header_str(headers, USER_ID_HEADER),
        header_str(headers, USER_NAME_HEADER),
        header_str(headers, USER_EMAIL_HEADER),
    )
    .map_err(auth_status)
}

fn required_caller(state: &AppState, headers: &HeaderMap) -> ApiResult<Actor> {
    caller(state, headers)?.ok_or_else(|| auth_status(AuthError::Anonymous))
}

fn parse_id(raw: &str) -> ApiResult<FormulationId> {
    FormulationId::parse(raw.trim()).map_err(|_| (StatusCode::NOT_FOUND, "Formulation not found"))
}

fn formulation_res(state: &AppState, f: &mixlab_core::Formulation) -> FormulationRes {
    FormulationRes::new(f, state.service.cover_url(f))
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Liveness check.
async fn health() -> Json<HealthRes> {
    Json(HealthService::check_health())
}

#[utoipa::path(
    get,
    path = "/ready",
    responses(
        (status = 200, description = "Store is reachable", body = HealthRes),
        (status = 503, description = "Store is unavailable", body = HealthRes)
    )
)]
/// Readiness check against the document store.
async fn ready(State(state): State<AppState>) -> (StatusCode, Json<HealthRes>) {
    let res = HealthService::check_ready(&state.service);
    let status = if res.ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(res))
}

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    order: Option<String>,
}

fn parse_order(raw: Option<&str>) -> ApiResult<OrderBy> {
    match raw.map(str::trim) {
        None | Some("") | Some("updated_desc") => Ok(OrderBy::UpdatedAtDesc),
        Some("updated_asc") => Ok(OrderBy::UpdatedAtAsc),
        Some("created_desc") => Ok(OrderBy::CreatedAtDesc),
        Some("title") => Ok(OrderBy::TitleAsc),
        Some(_) => Err((StatusCode::BAD_REQUEST, "Unknown order")),
    }
}

#[utoipa::path(
    get,
    path = "/formulations",
    params(
        ("order" = Option<String>, Query, description = "updated_desc (default), updated_asc, created_desc or title")
    ),
    responses(
        (status = 200, description = "The caller's formulations", body = ListFormulationsRes),
        (status = 401, description = "Caller identity required"),
        (status = 500, description = "Internal server error")
    )
)]
/// Lists the caller's own formulations, most recently updated first.
async fn list_formulations(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<ListFormulationsRes>> {
    let actor = required_caller(&state, &headers)?;
    let order = parse_order(query.order.as_deref())?;
    let formulations = state
        .service
        .list_mine_ordered(&actor, order)
        .map_err(error_status)?;
    Ok(Json(ListFormulationsRes {
        formulations: formulations.iter().map(FormulationSummary::from).collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/formulations",
    request_body = CreateFormulationReq,
    responses(
        (status = 201, description = "Formulation created", body = FormulationRes),
        (status = 400, description = "Bad request"),
        (status = 401, description = "Caller identity required"),
        (status = 500, description = "Internal server error")
    )
)]
/// Creates a private draft owned by the caller.
#[axum::debug_handler]
async fn create_formulation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateFormulationReq>,
) -> ApiResult<(StatusCode, Json<FormulationRes>)> {
    let actor = required_caller(&state, &headers)?;
    let basis = req
        .quantity_basis()
        .map_err(|_| (StatusCode::BAD_REQUEST, "Unknown quantity basis"))?;
    let batch_volume_ml = req.requested_batch_volume();
    let created = state
        .service
        .create(
            &actor,
            CreateOptions {
                title: req.title,
                basis,
                seeded: req.seeded,
                batch_volume_ml,
            },
        )
        .map_err(error_status)?;
    Ok((StatusCode::CREATED, Json(formulation_res(&state, &created))))
}

#[utoipa::path(
    get,
    path = "/formulations/{id}",
    params(("id" = String, Path, description = "Formulation id")),
    responses(
        (status = 200, description = "The formulation", body = FormulationRes),
        (status = 403, description = "Formulation is private"),
        (status = 404, description = "Formulation not found")
    )
)]
/// Reads a formulation. Public ones are readable by anyone, private ones by their owner.
async fn get_formulation(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    headers: HeaderMap,
) -> ApiResult<Json<FormulationRes>> {
    let requester = caller(&state, &headers)?;
    let formulation = state
        .service
        .lookup_str(&id, requester.as_ref())
        .map_err(error_status)?;
    Ok(Json(formulation_res(&state, &formulation)))
}

#[utoipa::path(
    patch,
    path = "/formulations/{id}",
    params(("id" = String, Path, description = "Formulation id")),
    request_body = EditFormulationReq,
    responses(
        (status = 200, description = "Edits applied and saved", body = EditFormulationRes),
        (status = 403, description = "Caller is not the owner"),
        (status = 404, description = "Formulation not found")
    )
)]
/// Applies a batch of edit commands and saves the result.
#[axum::debug_handler]
async fn edit_formulation(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    headers: HeaderMap,
    Json(req): Json<EditFormulationReq>,
) -> ApiResult<Json<EditFormulationRes>> {
    let actor = required_caller(&state, &headers)?;
    let id = parse_id(&id)?;
    let (saved, outcomes) = state
        .service
        .edit(&id, &actor, req.into_commands())
        .map_err(error_status)?;
    Ok(Json(EditFormulationRes {
        formulation: formulation_res(&state, &saved),
        outcomes,
    }))
}

#[utoipa::path(
    delete,
    path = "/formulations/{id}",
    params(("id" = String, Path, description = "Formulation id")),
    responses(
        (status = 204, description = "Formulation deleted"),
        (status = 403, description = "Caller is not the owner"),
        (status = 404, description = "Formulation not found")
    )
)]
/// Deletes a formulation. Only the owner may do this.
async fn delete_formulation(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    let actor = required_caller(&state, &headers)?;
    let id = parse_id(&id)?;
    state.service.delete(&id, &actor).map_err(error_status)?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/formulations/{id}/duplicate",
    params(("id" = String, Path, description = "Formulation id")),
    responses(
        (status = 201, description = "Copy created", body = FormulationRes),
        (status = 403, description = "Formulation is private"),
        (status = 404, description = "Formulation not found")
    )
)]
/// Copies a readable formulation into a new private draft owned by the caller.
async fn duplicate_formulation(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    headers: HeaderMap,
) -> ApiResult<(StatusCode, Json<FormulationRes>)> {
    let actor = required_caller(&state, &headers)?;
    let id = parse_id(&id)?;
    let copy = state.service.duplicate(&id, &actor).map_err(error_status)?;
    Ok((StatusCode::CREATED, Json(formulation_res(&state, &copy))))
}

#[derive(Debug, Default, Deserialize)]
struct CoverQuery {
    file_name: Option<String>,
}

#[utoipa::path(
    put,
    path = "/formulations/{id}/cover",
    params(
        ("id" = String, Path, description = "Formulation id"),
        ("file_name" = Option<String>, Query, description = "Original file name")
    ),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 200, description = "Cover stored", body = FormulationRes),
        (status = 403, description = "Caller is not the owner"),
        (status = 404, description = "Formulation not found"),
        (status = 413, description = "Cover image too large")
    )
)]
/// Uploads raw image bytes as the formulation's cover.
async fn upload_cover(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    Query(query): Query<CoverQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<FormulationRes>> {
    let actor = required_caller(&state, &headers)?;
    let id = parse_id(&id)?;
    if body.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Empty cover upload"));
    }
    let file_name = query.file_name.unwrap_or_else(|| "cover".to_string());
    let updated = state
        .service
        .upload_cover(&id, &actor, &file_name, &body)
        .map_err(error_status)?;
    Ok(Json(formulation_res(&state, &updated)))
}

#[derive(Debug, Default, Deserialize)]
struct VolumeQuery {
    volume_ml: Option<String>,
    format: Option<String>,
}

#[utoipa::path(
    get,
    path = "/formulations/{id}/derived",
    params(
        ("id" = String, Path, description = "Formulation id"),
        ("volume_ml" = Option<String>, Query, description = "What-if batch volume; defaults to the stored one, malformed values count as 0")
    ),
    responses(
        (status = 200, description = "Derived percentages and volumes", body = DerivationRes),
        (status = 403, description = "Formulation is private"),
        (status = 404, description = "Formulation not found")
    )
)]
/// Derived view at the stored or a what-if batch volume.
async fn derived(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    Query(query): Query<VolumeQuery>,
    headers: HeaderMap,
) -> ApiResult<Json<DerivationRes>> {
    let requester = caller(&state, &headers)?;
    let id = parse_id(&id)?;
    let derivation = state
        .service
        .derived(&id, requester.as_ref(), coerce::text_override(query.volume_ml.as_deref()))
        .map_err(error_status)?;
    Ok(Json(DerivationRes::from(&derivation)))
}

#[utoipa::path(
    get,
    path = "/formulations/{id}/export",
    params(
        ("id" = String, Path, description = "Formulation id"),
        ("format" = Option<String>, Query, description = "json (default) or markdown"),
        ("volume_ml" = Option<String>, Query, description = "Batch volume to export at, malformed values count as 0")
    ),
    responses(
        (status = 200, description = "Rendered export document"),
        (status = 400, description = "Unknown format"),
        (status = 403, description = "Formulation is private"),
        (status = 404, description = "Formulation not found")
    )
)]
/// Renders a self-contained export of the formulation.
#[axum::debug_handler]
async fn export(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    Query(query): Query<VolumeQuery>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let requester = caller(&state, &headers)?;
    let id = parse_id(&id)?;
    let format = match query.format.as_deref() {
        None => ExportFormat::default(),
        Some(raw) => raw
            .parse::<ExportFormat>()
            .map_err(|_| (StatusCode::BAD_REQUEST, "Unknown export format"))?,
    };
    let document = state
        .service
        .export(
            &id,
            requester.as_ref(),
            coerce::text_override(query.volume_ml.as_deref()),
            format,
        )
        .map_err(error_status)?;

    let disposition = format!("attachment; filename=\"{}\"", document.file_name);
    Ok((
        [
            (header::CONTENT_TYPE, document.media_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        document.bytes,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn app(temp_dir: &TempDir, api_key: Option<&str>) -> Router {
        let cfg = CoreConfig::with_data_dir(temp_dir.path().to_path_buf()).unwrap();
        let service = FormulationService::open(Arc::new(cfg)).unwrap();
        router(AppState {
            service,
            api_key: ApiKey::new(api_key.map(str::to_string)),
        })
    }

    fn request(method: &str, uri: &str, user: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder
                .header(USER_ID_HEADER, user)
                .header(USER_NAME_HEADER, format!("{user} name"))
                .header(USER_EMAIL_HEADER, format!("{user}@example.com"));
        }
        match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, bytes.to_vec())
    }

    async fn send_json(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let (status, bytes) = send(app, req).await;
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn create_seeded(app: &Router, user: &str) -> String {
        let (status, body) = send_json(
            app,
            request(
                "POST",
                "/formulations",
                Some(user),
                Some(json!({ "title": "Sea Breeze", "seeded": true })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let temp_dir = TempDir::new().unwrap();
        let app = app(&temp_dir, None);
        let (status, body) = send_json(&app, request("GET", "/health", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);

        let (status, _) = send_json(&app, request("GET", "/ready", None, None)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_create_and_read_back() {
        let temp_dir = TempDir::new().unwrap();
        let app = app(&temp_dir, None);
        let id = create_seeded(&app, "u1").await;

        let (status, body) = send_json(
            &app,
            request("GET", &format!("/formulations/{id}"), Some("u1"), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["title"], "Sea Breeze");
        assert_eq!(body["owner_name"], "u1 name");
        assert_eq!(body["derived"]["totals"]["total_parts"], 57.0);
        assert_eq!(body["derived"]["rows"][0]["name"], "Ethanol");
    }

    #[tokio::test]
    async fn test_anonymous_create_is_unauthorised() {
        let temp_dir = TempDir::new().unwrap();
        let app = app(&temp_dir, None);
        let (status, _) = send(
            &app,
            request("POST", "/formulations", None, Some(json!({}))),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_not_found_and_private_status_codes() {
        let temp_dir = TempDir::new().unwrap();
        let app = app(&temp_dir, None);
        let id = create_seeded(&app, "u1").await;

        let (status, _) = send(
            &app,
            request("GET", &format!("/formulations/{}", FormulationId::new()), Some("u2"), None),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            &app,
            request("GET", &format!("/formulations/{id}"), Some("u2"), None),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(&app, request("GET", "/formulations/garbage", None, None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_edit_publish_and_duplicate() {
        let temp_dir = TempDir::new().unwrap();
        let app = app(&temp_dir, None);
        let id = create_seeded(&app, "u1").await;

        let (status, body) = send_json(
            &app,
            request(
                "PATCH",
                &format!("/formulations/{id}"),
                Some("u1"),
                Some(json!({
                    "commands": [{ "op": "set_batch_volume", "value": "250" }],
                    "metadata": { "is_public": true, "status": "final" }
                })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["formulation"]["batch_volume_ml"], 250.0);
        assert_eq!(body["formulation"]["is_public"], true);
        assert_eq!(body["outcomes"][0]["outcome"], "applied");

        let (status, _) = send(
            &app,
            request(
                "PATCH",
                &format!("/formulations/{id}"),
                Some("u2"),
                Some(json!({ "commands": [] })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, copy) = send_json(
            &app,
            request("POST", &format!("/formulations/{id}/duplicate"), Some("u2"), None),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(copy["title"], "Sea Breeze (Copy)");
        assert_eq!(copy["status"], "draft");
        assert_eq!(copy["is_public"], false);
        assert_eq!(copy["owner_id"], "u2");

        let (status, list) =
            send_json(&app, request("GET", "/formulations", Some("u2"), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list["formulations"].as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn test_derived_what_if_volume() {
        let temp_dir = TempDir::new().unwrap();
        let app = app(&temp_dir, None);
        let id = create_seeded(&app, "u1").await;

        let (status, body) = send_json(
            &app,
            request(
                "GET",
                &format!("/formulations/{id}/derived?volume_ml=100"),
                Some("u1"),
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["batch_volume_ml"], 100.0);
        let total = body["totals"]["volume_total_ml"].as_f64().unwrap();
        assert!((total - 100.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_malformed_numbers_are_coerced() {
        let temp_dir = TempDir::new().unwrap();
        let app = app(&temp_dir, None);
        let id = create_seeded(&app, "u1").await;

        let (status, body) = send_json(
            &app,
            request(
                "GET",
                &format!("/formulations/{id}/derived?volume_ml=abc"),
                Some("u1"),
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["batch_volume_ml"], 0.0);
        assert_eq!(body["totals"]["volume_total_ml"], 0.0);

        let (status, body) = send_json(
            &app,
            request(
                "POST",
                "/formulations",
                Some("u1"),
                Some(json!({ "seeded": true, "batch_volume_ml": "abc" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["batch_volume_ml"], 0.0);
    }

    #[tokio::test]
    async fn test_markdown_export() {
        let temp_dir = TempDir::new().unwrap();
        let app = app(&temp_dir, None);
        let id = create_seeded(&app, "u1").await;

        let response = app
            .clone()
            .oneshot(request(
                "GET",
                &format!("/formulations/{id}/export?format=markdown"),
                Some("u1"),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/markdown; charset=utf-8"
        );
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"sea-breeze.md\""
        );
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("| 1 | Ethanol | 45 | 78.95 | 394.74 |"));
        assert!(text.contains("u1@example.com"));

        let (status, _) = send(
            &app,
            request(
                "GET",
                &format!("/formulations/{id}/export?format=pdf"),
                Some("u1"),
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_cover_upload() {
        let temp_dir = TempDir::new().unwrap();
        let app = app(&temp_dir, None);
        let id = create_seeded(&app, "u1").await;
        let png: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

        let req = Request::builder()
            .method("PUT")
            .uri(format!("/formulations/{id}/cover?file_name=cover.png"))
            .header(USER_ID_HEADER, "u1")
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(Body::from(png.to_vec()))
            .unwrap();
        let (status, body) = send_json(&app, req).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body["cover_reference"]
            .as_str()
            .is_some_and(|r| r.starts_with("sha256:")));
        assert!(body["cover_url"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_delete_by_owner() {
        let temp_dir = TempDir::new().unwrap();
        let app = app(&temp_dir, None);
        let id = create_seeded(&app, "u1").await;

        let (status, _) = send(
            &app,
            request("DELETE", &format!("/formulations/{id}"), Some("u2"), None),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(
            &app,
            request("DELETE", &format!("/formulations/{id}"), Some("u1"), None),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(
            &app,
            request("GET", &format!("/formulations/{id}"), Some("u1"), None),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_api_key_is_enforced_when_configured() {
        let temp_dir = TempDir::new().unwrap();
        let app = app(&temp_dir, Some("secret"));

        let (status, _) = send(&app, request("GET", "/formulations", Some("u1"), None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let req = Request::builder()
            .uri("/formulations")
            .header(USER_ID_HEADER, "u1")
            .header(API_KEY_HEADER, "secret")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
    }
}
