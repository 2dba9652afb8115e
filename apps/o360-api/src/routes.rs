use std::collections::HashMap;

use axum::{
	Json, Router,
	body::Bytes,
	extract::{Path, Query, Request, State},
	http::{HeaderMap, HeaderValue, Method, StatusCode, header},
	middleware::{self, Next},
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value, json};

use o360_config::Cors;
use o360_domain::{mgfx::MgfxGroups, scope::ScopeInputs};
use o360_service::{
	ActivityListResponse, ConnectionReport, DeleteItemRequest, DeleteItemResponse, Error,
	ListActivityRequest, ListItemsRequest, ListItemsResponse, LogActivityRequest,
	MgfxGroupsRequest, ProxyBody, ProxyReply, ScopeStageResponse, SummaryResponse,
	UpsertItemRequest, UpsertItemResponse, projects,
};

use crate::state::AppState;

pub const CLIENT_PRINCIPAL_HEADER: &str = "x-ms-client-principal";

const ALLOW_METHODS: &str = "GET,POST,PUT,DELETE,OPTIONS";

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/api/HttpTrigger1", get(list_items).post(upsert_item).delete(delete_item))
		.route("/api/GetItems", get(get_items))
		.route("/api/DeleteItem", post(delete_categorized_item).delete(delete_categorized_item))
		.route(
			"/api/projects",
			get(list_projects).post(create_project).put(replace_project).delete(delete_project),
		)
		.route("/api/LogicAppProxy", post(logic_app_proxy))
		.route("/api/uid-lookup-proxy/{uid}", get(uid_lookup))
		.route("/api/vso-email-proxy", post(vso_email))
		.route("/api/ai-summary", post(ai_summary))
		.route("/api/log", get(list_activity).post(log_activity))
		.route("/api/testConnection", get(test_connection))
		.route("/api/mgfx-groups", post(mgfx_groups))
		.route("/api/scope-stage", post(scope_stage))
		.fallback(not_found)
		.layer(middleware::from_fn_with_state(state.clone(), cors))
		.with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn not_found() -> ApiError {
	ApiError::new(StatusCode::NOT_FOUND, "Not found", None)
}

async fn list_items(
	State(state): State<AppState>,
	Query(query): Query<ListItemsRequest>,
) -> Result<Json<ListItemsResponse>, ApiError> {
	let response = state.service.list_items(query).await?;
	Ok(Json(response))
}

async fn get_items(
	State(state): State<AppState>,
	Query(query): Query<ListItemsRequest>,
) -> Result<Json<ListItemsResponse>, ApiError> {
	let response = state.service.get_items(query).await?;
	Ok(Json(response))
}

async fn upsert_item(
	State(state): State<AppState>,
	body: Bytes,
) -> Result<Json<UpsertItemResponse>, ApiError> {
	let payload: UpsertItemRequest = parse_json(&body)?;
	let response = state.service.upsert_item(payload).await?;
	Ok(Json(response))
}

async fn delete_item(
	State(state): State<AppState>,
	Query(query): Query<HashMap<String, String>>,
	body: Bytes,
) -> Result<Json<DeleteItemResponse>, ApiError> {
	let fields = delete_fields(query, &body)?;
	let response = state.service.delete_item(DeleteItemRequest::from_fields(&fields)).await?;
	Ok(Json(response))
}

async fn delete_categorized_item(
	State(state): State<AppState>,
	Query(query): Query<HashMap<String, String>>,
	body: Bytes,
) -> Result<Json<DeleteItemResponse>, ApiError> {
	let fields = delete_fields(query, &body)?;
	let response =
		state.service.delete_categorized_item(DeleteItemRequest::from_fields(&fields)).await?;
	Ok(Json(response))
}

async fn list_projects(
	State(state): State<AppState>,
	headers: HeaderMap,
) -> Result<Json<Vec<Value>>, ApiError> {
	let user = principal(&headers);
	let response = state.service.list_projects(&user).await?;
	Ok(Json(response))
}

async fn create_project(
	State(state): State<AppState>,
	headers: HeaderMap,
	body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
	let user = principal(&headers);
	let payload: Map<String, Value> = parse_json(&body)?;
	let response = state.service.create_project(&user, payload).await?;
	Ok((StatusCode::CREATED, Json(response)))
}

async fn replace_project(
	State(state): State<AppState>,
	headers: HeaderMap,
	body: Bytes,
) -> Result<Json<Value>, ApiError> {
	let user = principal(&headers);
	let payload: Map<String, Value> = parse_json(&body)?;
	let response = state.service.replace_project(&user, payload).await?;
	Ok(Json(response))
}

#[derive(Debug, Deserialize)]
struct ProjectQuery {
	id: Option<String>,
}

async fn delete_project(
	State(state): State<AppState>,
	headers: HeaderMap,
	Query(query): Query<ProjectQuery>,
) -> Result<StatusCode, ApiError> {
	let user = principal(&headers);
	state.service.delete_project(&user, query.id.as_deref()).await?;
	Ok(StatusCode::NO_CONTENT)
}

async fn logic_app_proxy(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
	let payload: Map<String, Value> = parse_json(&body)?;
	let reply = state.service.logic_app_proxy(payload).await?;
	Ok(proxy_response(reply))
}

async fn uid_lookup(
	State(state): State<AppState>,
	Path(uid): Path<String>,
) -> Result<Response, ApiError> {
	let reply = state.service.uid_lookup(&uid).await?;
	Ok(proxy_response(reply))
}

async fn vso_email(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
	let payload: Value = parse_json(&body)?;
	let reply = state.service.vso_email(payload).await?;
	Ok(proxy_response(reply))
}

async fn ai_summary(
	State(state): State<AppState>,
	body: Bytes,
) -> Result<Json<SummaryResponse>, ApiError> {
	let payload: Value = parse_json(&body)?;
	let response = state.service.summarize(&payload).await;
	Ok(Json(response))
}

async fn list_activity(
	State(state): State<AppState>,
	Query(query): Query<ListActivityRequest>,
) -> Result<Json<ActivityListResponse>, ApiError> {
	let response = state.service.list_activity(query).await?;
	Ok(Json(response))
}

async fn log_activity(State(state): State<AppState>, body: Bytes) -> Result<Json<Value>, ApiError> {
	let payload: LogActivityRequest = parse_json(&body)?;
	state.service.log_activity(payload).await?;
	Ok(Json(json!({ "ok": true })))
}

async fn test_connection(
	State(state): State<AppState>,
) -> Result<Json<ConnectionReport>, ApiError> {
	let response = state.service.test_connection().await?;
	Ok(Json(response))
}

async fn mgfx_groups(
	State(state): State<AppState>,
	body: Bytes,
) -> Result<Json<MgfxGroups>, ApiError> {
	let payload: MgfxGroupsRequest = parse_json(&body)?;
	Ok(Json(state.service.mgfx_groups(&payload)))
}

async fn scope_stage(
	State(state): State<AppState>,
	body: Bytes,
) -> Result<Json<ScopeStageResponse>, ApiError> {
	let payload: ScopeInputs = parse_json(&body)?;
	Ok(Json(state.service.scope_stage(&payload)))
}

async fn cors(State(state): State<AppState>, req: Request, next: Next) -> Response {
	let mut response = if req.method() == Method::OPTIONS {
		StatusCode::NO_CONTENT.into_response()
	} else {
		next.run(req).await
	};

	apply_cors(response.headers_mut(), &state.service.cfg.cors);

	response
}

fn apply_cors(headers: &mut HeaderMap, cors: &Cors) {
	match HeaderValue::from_str(&cors.allow_origin) {
		Ok(origin) => {
			headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
		},
		Err(_) => tracing::warn!(origin = %cors.allow_origin, "CORS origin is not a header value."),
	}

	headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(ALLOW_METHODS));
	headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("*"));

	if cors.allow_credentials && cors.allow_origin != "*" {
		headers.insert(header::ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
	}
}

fn principal(headers: &HeaderMap) -> String {
	projects::principal_email(
		headers.get(CLIENT_PRINCIPAL_HEADER).and_then(|value| value.to_str().ok()),
	)
}

/// An empty body reads as `{}`.
fn parse_json<T>(body: &Bytes) -> Result<T, ApiError>
where
	T: DeserializeOwned,
{
	let raw: &[u8] = if body.iter().all(u8::is_ascii_whitespace) { b"{}" } else { &body[..] };

	serde_json::from_slice(raw).map_err(|err| {
		ApiError::new(StatusCode::BAD_REQUEST, "Invalid JSON", Some(Value::String(err.to_string())))
	})
}

/// Query parameters take precedence over body fields.
fn delete_fields(
	query: HashMap<String, String>,
	body: &Bytes,
) -> Result<Map<String, Value>, ApiError> {
	let mut fields: Map<String, Value> = parse_json(body)?;

	for (key, value) in query {
		fields.insert(key, Value::String(value));
	}

	Ok(fields)
}

fn proxy_response(reply: ProxyReply) -> Response {
	let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::BAD_GATEWAY);

	match reply.body {
		ProxyBody::Json(body) => (status, Json(body)).into_response(),
		ProxyBody::Text(body) => (status, body).into_response(),
	}
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	ok: bool,
	error: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	details: Option<Value>,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error: String,
	details: Option<Value>,
}
impl ApiError {
	fn new(status: StatusCode, error: impl Into<String>, details: Option<Value>) -> Self {
		Self { status, error: error.into(), details }
	}
}

impl From<Error> for ApiError {
	fn from(err: Error) -> Self {
		match err {
			Error::Validation { message } => Self::new(StatusCode::BAD_REQUEST, message, None),
			Error::NotFound { message } => Self::new(StatusCode::NOT_FOUND, message, None),
			Error::Conflict { message } => Self::new(StatusCode::CONFLICT, message, None),
			Error::Upstream { status, message, details } => Self::new(
				StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
				message,
				details,
			),
			Error::Config { message } =>
				Self::new(StatusCode::INTERNAL_SERVER_ERROR, message, None),
			err @ Error::Storage { .. } =>
				Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string(), None),
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		if self.status.is_server_error() {
			tracing::error!(status = %self.status, error = %self.error, "Request failed.");
		}

		let body = ErrorBody { ok: false, error: self.error, details: self.details };

		(self.status, Json(body)).into_response()
	}
}
