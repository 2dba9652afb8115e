use axum::{
	Router,
	body::{self, Body},
	http::{HeaderMap, Request, StatusCode, header},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::{Value, json};
use tower::util::ServiceExt;

use o360_api::{routes, state::AppState};
use o360_config::{Config, Cors, LogicApps, Service, Storage, Tables};
use o360_testkit::{MockUpstream, Reply};

fn test_config(uid_url: Option<String>) -> Config {
	Config {
		service: Service { http_bind: "127.0.0.1:0".to_string(), log_level: "info".to_string() },
		cors: Cors::default(),
		storage: Storage {
			backend: "memory".to_string(),
			account_url: None,
			connection_string: None,
			allow_connection_string: false,
			managed_identity_client_id: None,
			ensure_tables: true,
			timeout_ms: 1_000,
		},
		tables: Tables::default(),
		logic_apps: LogicApps {
			uid_url,
			vso_url: None,
			vso_email_url: None,
			timeout_ms: Some(2_000),
		},
		summary: None,
	}
}

async fn app(config: Config) -> Router {
	let state = AppState::new(config).await.expect("Failed to initialize app state.");

	routes::router(state)
}

fn request(method: &str, uri: &str, payload: Option<&Value>) -> Request<Body> {
	let builder = Request::builder().method(method).uri(uri);
	let body = match payload {
		Some(payload) => Body::from(payload.to_string()),
		None => Body::empty(),
	};

	builder
		.header("content-type", "application/json")
		.body(body)
		.expect("Failed to build request.")
}

async fn call(app: &Router, req: Request<Body>) -> (StatusCode, HeaderMap, Value) {
	let response = app.clone().oneshot(req).await.expect("Failed to call router.");
	let status = response.status();
	let headers = response.headers().clone();
	let body = body::to_bytes(response.into_body(), usize::MAX)
		.await
		.expect("Failed to read response body.");
	let json = if body.is_empty() {
		Value::Null
	} else {
		serde_json::from_slice(&body).expect("Failed to parse response.")
	};

	(status, headers, json)
}

#[tokio::test]
async fn health_ok() {
	let app = app(test_config(None)).await;
	let (status, headers, _) = call(&app, request("GET", "/health", None)).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
}

#[tokio::test]
async fn preflight_is_answered_with_cors_headers() {
	let app = app(test_config(None)).await;
	let (status, headers, _) = call(&app, request("OPTIONS", "/api/HttpTrigger1", None)).await;

	assert_eq!(status, StatusCode::NO_CONTENT);
	assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "GET,POST,PUT,DELETE,OPTIONS");
	assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_HEADERS], "*");
}

#[tokio::test]
async fn fixed_origins_allow_credentials() {
	let mut config = test_config(None);

	config.cors =
		Cors { allow_origin: "https://optical360.net".to_string(), allow_credentials: true };

	let app = app(config).await;
	let (status, headers, json) = call(&app, request("GET", "/api/nowhere", None)).await;

	assert_eq!(status, StatusCode::NOT_FOUND);
	assert_eq!(json["ok"], false);
	assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "https://optical360.net");
	assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
}

#[tokio::test]
async fn items_are_saved_listed_and_deleted() {
	let app = app(test_config(None)).await;
	let payload = json!({
		"uid": "12345678901",
		"category": "notes",
		"title": "Splice check",
		"description": "Rack 3 tray 2"
	});
	let (status, _, saved) = call(&app, request("POST", "/api/HttpTrigger1", Some(&payload))).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(saved["message"], "Saved notes");

	let row_key = saved["entity"]["rowKey"].as_str().expect("Saved entity has no rowKey.");
	let (status, _, listed) =
		call(&app, request("GET", "/api/HttpTrigger1?uid=12345678901&category=notes", None)).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(listed["count"], 1);
	assert_eq!(listed["items"][0]["title"], "Splice check");
	assert_eq!(listed["items"][0]["description"], "Rack 3 tray 2");
	assert_eq!(listed["items"][0]["owner"], "Unknown");

	let delete = json!({ "uid": "12345678901", "category": "notes", "rowKey": row_key });
	let (status, _, deleted) =
		call(&app, request("DELETE", "/api/HttpTrigger1", Some(&delete))).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(deleted["message"], format!("Deleted {row_key}"));

	let (status, _, missing) =
		call(&app, request("DELETE", "/api/HttpTrigger1", Some(&delete))).await;

	assert_eq!(status, StatusCode::NOT_FOUND);
	assert_eq!(missing["ok"], false);

	let (_, _, listed) =
		call(&app, request("GET", "/api/HttpTrigger1?uid=12345678901&category=notes", None)).await;

	assert_eq!(listed["count"], 0);
}

#[tokio::test]
async fn malformed_json_is_a_bad_request() {
	let app = app(test_config(None)).await;
	let req = Request::builder()
		.method("POST")
		.uri("/api/HttpTrigger1")
		.header("content-type", "application/json")
		.body(Body::from("{not json"))
		.expect("Failed to build request.");
	let (status, headers, json) = call(&app, req).await;

	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert_eq!(json["ok"], false);
	assert_eq!(json["error"], "Invalid JSON");
	assert!(json["details"].is_string());
	assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
}

#[tokio::test]
async fn required_fields_are_enforced() {
	let app = app(test_config(None)).await;
	let (status, _, json) = call(&app, request("GET", "/api/GetItems?uid=12345678901", None)).await;

	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert_eq!(json["error"], "Missing uid or category");

	let delete = json!({ "partitionKey": "UID_12345678901", "rowKey": "r1" });
	let (status, _, json) = call(&app, request("POST", "/api/DeleteItem", Some(&delete))).await;

	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert_eq!(json["error"], "Missing partitionKey, rowKey, or category");
}

#[tokio::test]
async fn projects_belong_to_the_signed_in_user() {
	let app = app(test_config(None)).await;
	let principal =
		STANDARD.encode(r#"{"identityProvider":"aad","userDetails":"Ops@Contoso.com"}"#);
	let with_user = |method: &str, uri: &str, payload: Option<&Value>| {
		let mut req = request(method, uri, payload);

		req.headers_mut().insert(
			routes::CLIENT_PRINCIPAL_HEADER,
			principal.parse().expect("Failed to build principal header."),
		);

		req
	};
	let project = json!({ "id": "p1", "name": "Fiber ring", "data": { "uids": ["12345678901"] } });
	let (status, _, created) = call(&app, with_user("POST", "/api/projects", Some(&project))).await;

	assert_eq!(status, StatusCode::CREATED);
	assert_eq!(created["partitionKey"], "ops@contoso.com");
	assert_eq!(created["Name"], "Fiber ring");

	let (status, _, _) = call(&app, with_user("POST", "/api/projects", Some(&project))).await;

	assert_eq!(status, StatusCode::CONFLICT);

	let (_, _, mine) = call(&app, with_user("GET", "/api/projects", None)).await;
	let (_, _, anonymous) = call(&app, request("GET", "/api/projects", None)).await;

	assert_eq!(mine.as_array().map(Vec::len), Some(1));
	assert_eq!(anonymous, json!([]));

	let (status, _, _) = call(&app, with_user("DELETE", "/api/projects?id=p1", None)).await;

	assert_eq!(status, StatusCode::NO_CONTENT);

	let (status, _, _) = call(&app, with_user("DELETE", "/api/projects?id=p1", None)).await;

	assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn uid_lookup_proxies_upstream_json() {
	let upstream = MockUpstream::start(Reply::json(200, json!({ "UID": "12345678901" })))
		.await
		.expect("Failed to start mock upstream.");
	let app = app(test_config(Some(upstream.url("/uid?sig=abc")))).await;
	let (status, _, json) =
		call(&app, request("GET", "/api/uid-lookup-proxy/12345678901", None)).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(json, json!({ "UID": "12345678901" }));
	assert_eq!(upstream.requests()[0].query.as_deref(), Some("sig=abc&UID=12345678901"));

	upstream.push_reply(Reply::text(404, "no such uid"));

	let (status, _, json) =
		call(&app, request("GET", "/api/uid-lookup-proxy/12345678901", None)).await;

	assert_eq!(status, StatusCode::NOT_FOUND);
	assert_eq!(json["error"], "Upstream error 404");
	assert_eq!(json["details"], "no such uid");

	let (status, _, json) = call(&app, request("GET", "/api/uid-lookup-proxy/1234", None)).await;

	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert_eq!(json["error"], "Invalid UID. It must contain exactly 11 numbers.");
	assert_eq!(upstream.requests().len(), 2);
}

#[tokio::test]
async fn missing_logic_app_configuration_is_a_server_error() {
	let app = app(test_config(None)).await;
	let payload = json!({ "type": "vso", "Title": "New span" });
	let (status, _, json) = call(&app, request("POST", "/api/LogicAppProxy", Some(&payload))).await;

	assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
	assert_eq!(json["error"], "LogicApp VSO URL missing");

	let (status, _, json) =
		call(&app, request("POST", "/api/vso-email-proxy", Some(&payload))).await;

	assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
	assert_eq!(json["error"], "Server configuration missing (VSO_LOGICAPP_URL)");
}

#[tokio::test]
async fn summary_falls_back_to_the_local_summary() {
	let app = app(test_config(None)).await;
	let payload = json!({ "KQLData": { "WorkflowStatus": "Finished" } });
	let (status, _, json) = call(&app, request("POST", "/api/ai-summary", Some(&payload))).await;

	assert_eq!(status, StatusCode::OK);

	let message = json["message"].as_str().expect("Summary has no message.");

	assert!(message.starts_with("Path: Unknown → Unknown"));
	assert!(message.contains("WF Status: WF Finished"));
}

#[tokio::test]
async fn scope_stage_reads_camel_case_inputs() {
	let app = app(test_config(None)).await;
	let payload = json!({ "facilityA": "ZRH21", "diversity": "East", "spliceA": "AM111" });
	let (status, _, json) = call(&app, request("POST", "/api/scope-stage", Some(&payload))).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(json, json!({ "stage": "2" }));
}

#[tokio::test]
async fn activity_is_logged_and_listed() {
	let app = app(test_config(None)).await;

	for action in ["login", "lookup"] {
		let payload = json!({ "email": "ops@contoso.com", "action": action });
		let (status, _, json) = call(&app, request("POST", "/api/log", Some(&payload))).await;

		assert_eq!(status, StatusCode::OK);
		assert_eq!(json, json!({ "ok": true }));
	}

	let (status, _, json) =
		call(&app, request("POST", "/api/log", Some(&json!({ "email": "ops@contoso.com" })))).await;

	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert_eq!(json["error"], "Missing email or action");

	let (_, _, json) = call(&app, request("GET", "/api/log?limit=1", None)).await;

	assert_eq!(json["ok"], true);
	assert_eq!(json["items"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn connection_test_reports_the_memory_store() {
	let app = app(test_config(None)).await;
	let (status, _, json) = call(&app, request("GET", "/api/testConnection", None)).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(json, json!({ "ok": true, "auth": "Memory", "table": "Projects" }));
}
