use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use apprentice_hub_api::{
    ApprenticeHubApi, CreateEvidenceRequest, CreateLearningLogRequest, HealthReport,
    MigrateResult, SchemaReport, StoreConfig, API_CONTRACT_VERSION,
};
use apprentice_hub_core::{
    DashboardOverview, EvidenceEdit, EvidenceFilter, EvidenceRecord, HubError, KsbId, KsbSummary,
    LearningLog, NewKsb, NewProject, NewUser, Project, ProjectId, User, UserId,
};
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const SERVICE_CONTRACT_VERSION: &str = "service.v1";
const SERVICE_NAME: &str = "Apprentice Hub Backend";

#[derive(Debug, Clone)]
struct ServiceState {
    api: ApprenticeHubApi,
}

#[derive(Debug, Clone, Serialize)]
struct ServiceEnvelope<T>
where
    T: Serialize,
{
    service_contract_version: &'static str,
    api_contract_version: &'static str,
    data: T,
}

#[derive(Debug, Clone, Serialize)]
struct ErrorBody {
    service_contract_version: &'static str,
    kind: &'static str,
    error: String,
}

#[derive(Debug, Clone)]
struct ServiceError {
    status: StatusCode,
    body: ErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
struct MigrateRequest {
    #[serde(default)]
    dry_run: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct EvidenceQuery {
    user_id: Option<i64>,
    project_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
struct UserQuery {
    user_id: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct OptionalUserQuery {
    user_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
struct RootResponse {
    message: &'static str,
    version: &'static str,
    status: &'static str,
}

#[derive(Debug, Parser)]
#[command(name = "apprentice-hub-service")]
#[command(about = "HTTP service for Apprentice Hub evidence tracking")]
struct Args {
    /// YAML file naming the store locations.
    #[arg(long, env = "APPRENTICE_HUB_CONFIG")]
    config: Option<PathBuf>,
    #[arg(long, env = "APPRENTICE_HUB_RELATIONAL_DB")]
    relational_db: Option<PathBuf>,
    #[arg(long, env = "APPRENTICE_HUB_DOCUMENT_DB")]
    document_db: Option<PathBuf>,
    #[arg(long, env = "APPRENTICE_HUB_BIND", default_value = "127.0.0.1:8000")]
    bind: SocketAddr,
}

impl From<anyhow::Error> for ServiceError {
    fn from(err: anyhow::Error) -> Self {
        let (status, kind) = match err.downcast_ref::<HubError>() {
            Some(HubError::NotFound(_)) => (StatusCode::NOT_FOUND, "not_found"),
            Some(hub_error) => (StatusCode::BAD_REQUEST, hub_error.kind()),
            None => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };

        if status.is_server_error() {
            error!(error = %format!("{err:#}"), "request failed");
        } else {
            warn!(%kind, error = %err, "request rejected");
        }

        Self {
            status,
            body: ErrorBody {
                service_contract_version: SERVICE_CONTRACT_VERSION,
                kind,
                error: err.to_string(),
            },
        }
    }
}

impl ServiceError {
    /// A request axum could not decode; always a client error.
    fn rejected(kind: &'static str, error: String) -> Self {
        warn!(%kind, %error, "request could not be decoded");
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorBody { service_contract_version: SERVICE_CONTRACT_VERSION, kind, error },
        }
    }
}

impl From<JsonRejection> for ServiceError {
    fn from(rejection: JsonRejection) -> Self {
        // Well-formed JSON of the wrong shape, e.g. a missing required field.
        let kind = match &rejection {
            JsonRejection::JsonDataError(_) => "validation",
            _ => "malformed_input",
        };
        Self::rejected(kind, rejection.body_text())
    }
}

impl From<PathRejection> for ServiceError {
    fn from(rejection: PathRejection) -> Self {
        Self::rejected("malformed_input", rejection.body_text())
    }
}

impl From<QueryRejection> for ServiceError {
    fn from(rejection: QueryRejection) -> Self {
        Self::rejected("malformed_input", rejection.body_text())
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl EvidenceQuery {
    fn into_filter(self) -> EvidenceFilter {
        EvidenceFilter {
            user_id: self.user_id.map(UserId),
            project_id: self.project_id.map(ProjectId),
        }
    }
}

type ServiceResult<T> = Result<Json<ServiceEnvelope<T>>, ServiceError>;

type JsonBody<T> = Result<Json<T>, JsonRejection>;
type PathParam<T> = Result<Path<T>, PathRejection>;
type QueryParams<T> = Result<Query<T>, QueryRejection>;

fn envelope<T>(data: T) -> Json<ServiceEnvelope<T>>
where
    T: Serialize,
{
    Json(ServiceEnvelope {
        service_contract_version: SERVICE_CONTRACT_VERSION,
        api_contract_version: API_CONTRACT_VERSION,
        data,
    })
}

fn app(state: ServiceState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/db/schema-version", get(db_schema_version))
        .route("/db/migrate", post(db_migrate))
        .route("/ksbs", get(ksb_list).post(ksb_create))
        .route("/ksbs/:ksb_id", get(ksb_show))
        .route("/evidence", get(evidence_list).post(evidence_create))
        .route("/evidence/:evidence_id", get(evidence_show).patch(evidence_update))
        .route("/dashboard/overview", get(dashboard_overview))
        .route("/users", post(user_create))
        .route("/users/:user_id", get(user_show))
        .route("/projects", get(project_list).post(project_create))
        .route("/projects/:project_id", get(project_show))
        .route("/learning-logs", get(learning_log_list).post(learning_log_create))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = StoreConfig::resolve(args.config.as_deref(), args.relational_db, args.document_db)?;
    info!(
        relational_db = %config.relational_db.display(),
        document_db = %config.document_db.display(),
        "using stores"
    );

    let state = ServiceState { api: ApprenticeHubApi::new(config) };
    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    info!(bind = %args.bind, "apprentice hub service listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        status: "ok",
    })
}

async fn health(State(state): State<ServiceState>) -> ServiceResult<HealthReport> {
    Ok(envelope(state.api.health()?))
}

async fn db_schema_version(State(state): State<ServiceState>) -> ServiceResult<SchemaReport> {
    Ok(envelope(state.api.schema_status()?))
}

async fn db_migrate(
    State(state): State<ServiceState>,
    request: JsonBody<MigrateRequest>,
) -> ServiceResult<MigrateResult> {
    let Json(request) = request?;
    Ok(envelope(state.api.migrate(request.dry_run)?))
}

async fn ksb_list(State(state): State<ServiceState>) -> ServiceResult<Vec<KsbSummary>> {
    Ok(envelope(state.api.list_ksbs()?))
}

async fn ksb_create(
    State(state): State<ServiceState>,
    request: JsonBody<NewKsb>,
) -> ServiceResult<KsbSummary> {
    let Json(request) = request?;
    Ok(envelope(state.api.create_ksb(&request)?))
}

async fn ksb_show(
    State(state): State<ServiceState>,
    ksb_id: PathParam<i64>,
) -> ServiceResult<KsbSummary> {
    let Path(ksb_id) = ksb_id?;
    Ok(envelope(state.api.get_ksb(KsbId(ksb_id))?))
}

async fn evidence_create(
    State(state): State<ServiceState>,
    request: JsonBody<CreateEvidenceRequest>,
) -> ServiceResult<EvidenceRecord> {
    let Json(request) = request?;
    Ok(envelope(state.api.create_evidence(request)?))
}

async fn evidence_list(
    State(state): State<ServiceState>,
    query: QueryParams<EvidenceQuery>,
) -> ServiceResult<Vec<EvidenceRecord>> {
    let Query(query) = query?;
    Ok(envelope(state.api.list_evidence(&query.into_filter())?))
}

async fn evidence_show(
    State(state): State<ServiceState>,
    evidence_id: PathParam<String>,
) -> ServiceResult<EvidenceRecord> {
    let Path(evidence_id) = evidence_id?;
    Ok(envelope(state.api.get_evidence(&evidence_id)?))
}

async fn evidence_update(
    State(state): State<ServiceState>,
    evidence_id: PathParam<String>,
    edit: JsonBody<EvidenceEdit>,
) -> ServiceResult<EvidenceRecord> {
    let Path(evidence_id) = evidence_id?;
    let Json(edit) = edit?;
    Ok(envelope(state.api.update_evidence(&evidence_id, edit)?))
}

async fn dashboard_overview(
    State(state): State<ServiceState>,
    query: QueryParams<UserQuery>,
) -> ServiceResult<DashboardOverview> {
    let Query(query) = query?;
    Ok(envelope(state.api.dashboard_overview(UserId(query.user_id))?))
}

async fn user_create(
    State(state): State<ServiceState>,
    request: JsonBody<NewUser>,
) -> ServiceResult<User> {
    let Json(request) = request?;
    Ok(envelope(state.api.create_user(&request)?))
}

async fn user_show(
    State(state): State<ServiceState>,
    user_id: PathParam<i64>,
) -> ServiceResult<User> {
    let Path(user_id) = user_id?;
    Ok(envelope(state.api.get_user(UserId(user_id))?))
}

async fn project_create(
    State(state): State<ServiceState>,
    request: JsonBody<NewProject>,
) -> ServiceResult<Project> {
    let Json(request) = request?;
    Ok(envelope(state.api.create_project(&request)?))
}

async fn project_list(
    State(state): State<ServiceState>,
    query: QueryParams<OptionalUserQuery>,
) -> ServiceResult<Vec<Project>> {
    let Query(query) = query?;
    Ok(envelope(state.api.list_projects(query.user_id.map(UserId))?))
}

async fn project_show(
    State(state): State<ServiceState>,
    project_id: PathParam<i64>,
) -> ServiceResult<Project> {
    let Path(project_id) = project_id?;
    Ok(envelope(state.api.get_project(ProjectId(project_id))?))
}

async fn learning_log_create(
    State(state): State<ServiceState>,
    request: JsonBody<CreateLearningLogRequest>,
) -> ServiceResult<LearningLog> {
    let Json(request) = request?;
    Ok(envelope(state.api.add_learning_log(request)?))
}

async fn learning_log_list(
    State(state): State<ServiceState>,
    query: QueryParams<UserQuery>,
) -> ServiceResult<Vec<LearningLog>> {
    let Query(query) = query?;
    Ok(envelope(state.api.list_learning_logs(UserId(query.user_id))?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    struct TestService {
        router: Router,
        config: StoreConfig,
    }

    impl TestService {
        fn new() -> Self {
            let suffix = ulid::Ulid::new();
            let dir = std::env::temp_dir();
            let config = StoreConfig {
                relational_db: dir.join(format!("apprentice-hub-service-{suffix}.sqlite3")),
                document_db: dir.join(format!("apprentice-hub-service-docs-{suffix}.sqlite3")),
            };
            let router = app(ServiceState { api: ApprenticeHubApi::new(config.clone()) });
            Self { router, config }
        }

        async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
            let builder = Request::builder().uri(uri).method(method);
            let request = match body {
                Some(body) => builder
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string())),
                None => builder.body(Body::empty()),
            }
            .unwrap_or_else(|err| panic!("failed to build request {method} {uri}: {err}"));

            let response = match self.router.clone().oneshot(request).await {
                Ok(response) => response,
                Err(err) => panic!("router request {method} {uri} failed: {err}"),
            };
            let status = response.status();
            (status, response_json(response).await)
        }
    }

    impl Drop for TestService {
        fn drop(&mut self) {
            for path in [&self.config.relational_db, &self.config.document_db] {
                let _ = std::fs::remove_file(path);
            }
        }
    }

    async fn response_json(response: Response) -> Value {
        let bytes = match to_bytes(response.into_body(), 1024 * 1024).await {
            Ok(bytes) => bytes,
            Err(err) => panic!("failed to read response body: {err}"),
        };
        let body = match String::from_utf8(bytes.to_vec()) {
            Ok(body) => body,
            Err(err) => panic!("response body is not UTF-8: {err}"),
        };
        match serde_json::from_str(&body) {
            Ok(value) => value,
            Err(err) => panic!("response body is not JSON: {err}; body={body}"),
        }
    }

    fn data_i64(value: &Value, key: &str) -> i64 {
        value
            .get("data")
            .and_then(|data| data.get(key))
            .and_then(Value::as_i64)
            .unwrap_or_else(|| panic!("missing data.{key} in response: {value}"))
    }

    // Test IDs: TSVC-001
    #[tokio::test]
    async fn health_and_root_report_service_status() {
        let service = TestService::new();

        let (status, value) = service.send("GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            value.get("service_contract_version").and_then(Value::as_str),
            Some(SERVICE_CONTRACT_VERSION)
        );
        assert_eq!(value["data"]["relational"], "connected");
        assert_eq!(value["data"]["document"], "connected");

        let (status, value) = service.send("GET", "/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["message"], SERVICE_NAME);
    }

    // Test IDs: TSVC-002
    #[tokio::test]
    async fn missing_ksb_is_404_and_duplicate_code_is_400() {
        let service = TestService::new();

        let (status, value) = service.send("GET", "/ksbs/4242", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(value["kind"], "not_found");

        let payload = json!({"code": "K1", "description": "Data pipelines"});
        let (status, created) = service.send("POST", "/ksbs", Some(payload.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(created["data"]["evidence_count"], 0);

        let (status, value) = service.send("POST", "/ksbs", Some(payload)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(value["kind"], "conflict");

        let ksb_id = data_i64(&created, "id");
        let (status, value) = service.send("GET", &format!("/ksbs/{ksb_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["data"]["code"], "K1");
    }

    // Test IDs: TSVC-003
    #[tokio::test]
    async fn malformed_evidence_id_is_400_and_unknown_is_404() {
        let service = TestService::new();

        let (status, value) = service.send("GET", "/evidence/not-a-valid-id", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(value["kind"], "malformed_input");

        let unknown = ulid::Ulid::new();
        let (status, value) = service.send("GET", &format!("/evidence/{unknown}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(value["kind"], "not_found");
    }

    // Test IDs: TSVC-004
    #[tokio::test]
    async fn evidence_with_unknown_ksb_is_400_and_not_listed() {
        let service = TestService::new();

        let (status, value) = service
            .send(
                "POST",
                "/evidence",
                Some(json!({
                    "user_id": 11,
                    "title": "Ghost evidence",
                    "content": "should not persist",
                    "ksb_ids": [9999]
                })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(value["kind"], "validation");
        assert!(value["error"].as_str().is_some_and(|message| message.contains("9999")));

        let (status, value) = service.send("GET", "/evidence?user_id=11", None).await;
        assert_eq!(status, StatusCode::OK);
        let titles = value["data"]
            .as_array()
            .unwrap_or_else(|| panic!("evidence list should be an array: {value}"))
            .iter()
            .filter_map(|record| record["title"].as_str())
            .collect::<Vec<_>>();
        assert!(!titles.contains(&"Ghost evidence"));
    }

    // Test IDs: TSVC-005
    #[tokio::test]
    async fn dashboard_scenario_reports_half_coverage() {
        let service = TestService::new();

        let (_, k1) = service
            .send("POST", "/ksbs", Some(json!({"code": "K1", "description": "Knowledge one"})))
            .await;
        let (_, _k2) = service
            .send("POST", "/ksbs", Some(json!({"code": "K2", "description": "Knowledge two"})))
            .await;
        let k1_id = data_i64(&k1, "id");

        let (status, created) = service
            .send(
                "POST",
                "/evidence",
                Some(json!({
                    "user_id": 1,
                    "title": "Feature store",
                    "content": "Built a feature store",
                    "ksb_ids": [k1_id]
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(created["data"]["ksb_ids"], json!([k1_id]));
        assert_eq!(created["data"]["content_type"], "markdown");

        let (status, overview) = service.send("GET", "/dashboard/overview?user_id=1", None).await;
        assert_eq!(status, StatusCode::OK);
        let stats = &overview["data"]["stats"];
        assert_eq!(stats["total_ksbs"], 2);
        assert_eq!(stats["covered_ksbs"], 1);
        assert_eq!(stats["coverage_percentage"], 50.0);
        assert_eq!(stats["total_evidence"], 1);
        assert_eq!(overview["data"]["ksb_progress"][1]["status"], "not_covered");
    }

    // Test IDs: TSVC-006
    #[tokio::test]
    async fn evidence_patch_updates_fields_in_place() {
        let service = TestService::new();

        let (_, created) = service
            .send(
                "POST",
                "/evidence",
                Some(json!({"user_id": 3, "title": "Draft", "content": "v1", "content_type": "text"})),
            )
            .await;
        let evidence_id = created["data"]["id"]
            .as_str()
            .unwrap_or_else(|| panic!("missing evidence id: {created}"))
            .to_string();

        let (status, updated) = service
            .send("PATCH", &format!("/evidence/{evidence_id}"), Some(json!({"content": "v2"})))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["data"]["content"], "v2");
        assert_eq!(updated["data"]["title"], "Draft");
        assert_eq!(updated["data"]["created_at"], created["data"]["created_at"]);

        let (status, fetched) = service.send("GET", &format!("/evidence/{evidence_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["data"]["content"], "v2");
    }

    // Test IDs: TSVC-007
    #[tokio::test]
    async fn users_projects_and_learning_logs_flow() {
        let service = TestService::new();

        let (status, user) = service
            .send("POST", "/users", Some(json!({"email": "a@example.com", "name": "Ada"})))
            .await;
        assert_eq!(status, StatusCode::OK);
        let user_id = data_i64(&user, "id");

        let (status, value) = service
            .send("POST", "/users", Some(json!({"email": "a@example.com"})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(value["kind"], "conflict");

        let (status, _) = service.send("GET", "/users/999", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, project) = service
            .send("POST", "/projects", Some(json!({"user_id": user_id, "name": "Churn"})))
            .await;
        assert_eq!(status, StatusCode::OK);
        let project_id = data_i64(&project, "id");

        let (status, orphan) = service
            .send("POST", "/projects", Some(json!({"user_id": 999, "name": "Orphan"})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(orphan["kind"], "validation");

        let (status, listed) =
            service.send("GET", &format!("/projects?user_id={user_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed["data"][0]["id"], project_id);

        let (status, log) = service
            .send(
                "POST",
                "/learning-logs",
                Some(json!({
                    "user_id": user_id,
                    "date": "2024-03-01T09:00:00Z",
                    "duration_minutes": 60
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(log["data"]["duration_minutes"], 60);

        let (status, logs) =
            service.send("GET", &format!("/learning-logs?user_id={user_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(logs["data"].as_array().map(Vec::len), Some(1));
    }

    // Test IDs: TSVC-008
    #[tokio::test]
    async fn schema_endpoints_report_both_stores() {
        let service = TestService::new();

        let (status, plan) =
            service.send("POST", "/db/migrate", Some(json!({"dry_run": true}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(plan["data"]["relational"]["would_apply_versions"], json!([1]));

        let (status, _) = service.send("POST", "/db/migrate", Some(json!({}))).await;
        assert_eq!(status, StatusCode::OK);

        let (status, schema) = service.send("GET", "/db/schema-version", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(schema["data"]["relational"]["pending_versions"], json!([]));
        assert_eq!(schema["data"]["document"]["current_version"], 1);
    }

    // Test IDs: TSVC-009
    #[tokio::test]
    async fn undecodable_requests_use_the_error_body() {
        let service = TestService::new();

        let (status, value) = service.send("POST", "/ksbs", Some(json!({"code": "K1"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(value["service_contract_version"], SERVICE_CONTRACT_VERSION);
        assert_eq!(value["kind"], "validation");
        assert!(value["error"].as_str().is_some_and(|message| message.contains("description")));

        let (status, value) = service.send("GET", "/ksbs/abc", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(value["service_contract_version"], SERVICE_CONTRACT_VERSION);
        assert_eq!(value["kind"], "malformed_input");

        let (status, value) = service.send("GET", "/dashboard/overview", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(value["kind"], "malformed_input");
        assert!(value["error"].as_str().is_some_and(|message| message.contains("user_id")));

        let (status, value) = service.send("GET", "/learning-logs?user_id=seven", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(value["kind"], "malformed_input");

        let (_, created) = service
            .send("POST", "/evidence", Some(json!({"user_id": 4, "title": "Note", "content": "x"})))
            .await;
        let evidence_id = created["data"]["id"]
            .as_str()
            .unwrap_or_else(|| panic!("missing evidence id: {created}"))
            .to_string();
        let (status, value) =
            service.send("PATCH", &format!("/evidence/{evidence_id}"), Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(value["kind"], "validation");
    }
}
