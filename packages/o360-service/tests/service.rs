use std::{
	sync::{Arc, Mutex},
	time::Duration,
};

use serde_json::{Map, Value, json};

use o360_config::{Config, Cors, LogicApps, Service, Storage, Summary, Tables};
use o360_providers::logic_app::UpstreamResponse;
use o360_service::{
	BoxFuture, DeleteItemRequest, Error, ListActivityRequest, ListItemsRequest, LogActivityRequest,
	LogicAppProvider, O360Service, ProxyBody, Providers, SummaryProvider, UpsertItemRequest,
};
use o360_storage::{TableStore, memory::MemoryTableStore};

fn test_config() -> Config {
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
			uid_url: Some("https://logic.example/uid?sig=abc".to_string()),
			vso_url: Some("https://logic.example/vso".to_string()),
			vso_email_url: Some("https://logic.example/vso-email".to_string()),
			timeout_ms: None,
		},
		summary: None,
	}
}

fn fields(value: Value) -> Map<String, Value> {
	value.as_object().cloned().expect("Test payload must be an object.")
}

fn upsert(value: Value) -> UpsertItemRequest {
	UpsertItemRequest { fields: fields(value) }
}

fn list(uid: Option<&str>, category: Option<&str>) -> ListItemsRequest {
	ListItemsRequest {
		uid: uid.map(str::to_string),
		category: category.map(str::to_string),
		..Default::default()
	}
}

fn memory_service() -> (O360Service, Arc<MemoryTableStore>) {
	let store = Arc::new(MemoryTableStore::new());
	let service = O360Service::new(test_config(), store.clone() as Arc<dyn TableStore>);

	(service, store)
}

#[derive(Default)]
struct SpyLogicApp {
	replies: Mutex<Vec<color_eyre::Result<UpstreamResponse>>>,
	calls: Mutex<Vec<(String, Option<Value>)>>,
}
impl SpyLogicApp {
	fn replying(reply: color_eyre::Result<UpstreamResponse>) -> Self {
		Self { replies: Mutex::new(vec![reply]), calls: Mutex::new(Vec::new()) }
	}

	fn calls(&self) -> Vec<(String, Option<Value>)> {
		self.calls.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}

	fn next(&self) -> color_eyre::Result<UpstreamResponse> {
		self.replies
			.lock()
			.unwrap_or_else(|err| err.into_inner())
			.pop()
			.unwrap_or_else(|| Ok(json_response(200, json!({}))))
	}
}
impl LogicAppProvider for SpyLogicApp {
	fn lookup_uid<'a>(
		&'a self,
		base_url: &'a str,
		uid: &'a str,
		_timeout: Option<Duration>,
	) -> BoxFuture<'a, color_eyre::Result<UpstreamResponse>> {
		self.calls
			.lock()
			.unwrap_or_else(|err| err.into_inner())
			.push((format!("{base_url}&UID={uid}"), None));

		let reply = self.next();

		Box::pin(async move { reply })
	}

	fn post_json<'a>(
		&'a self,
		url: &'a str,
		body: &'a Value,
		_timeout: Option<Duration>,
	) -> BoxFuture<'a, color_eyre::Result<UpstreamResponse>> {
		self.calls
			.lock()
			.unwrap_or_else(|err| err.into_inner())
			.push((url.to_string(), Some(body.clone())));

		let reply = self.next();

		Box::pin(async move { reply })
	}
}

struct FixedSummary(Option<&'static str>);
impl SummaryProvider for FixedSummary {
	fn complete<'a>(
		&'a self,
		_cfg: &'a Summary,
		_system: &'a str,
		_user: &'a Value,
	) -> BoxFuture<'a, color_eyre::Result<Option<String>>> {
		let answer = match self.0 {
			Some("") => Ok(None),
			Some(text) => Ok(Some(text.to_string())),
			None => Err(color_eyre::eyre::eyre!("Chat endpoint unavailable.")),
		};

		Box::pin(async move { answer })
	}
}

fn json_response(status: u16, body: Value) -> UpstreamResponse {
	UpstreamResponse {
		status,
		content_type: Some("application/json; charset=utf-8".to_string()),
		body: body.to_string(),
	}
}

fn service_with(logic_app: Arc<SpyLogicApp>, summary: FixedSummary, cfg: Config) -> O360Service {
	let providers = Providers::new(logic_app, Arc::new(summary));

	O360Service::with_providers(cfg, Arc::new(MemoryTableStore::new()), providers)
}

#[tokio::test]
async fn saved_entries_are_listed_back() {
	let (service, _) = memory_service();
	let saved = service
		.upsert_item(upsert(json!({
			"uid": "12345678901",
			"category": "Notes",
			"title": "Span swap",
			"description": "Swap span 3",
			"owner": "kim",
			"ticket": 4211
		})))
		.await
		.expect("Failed to save note.");

	assert_eq!(saved.message, "Saved Notes");
	assert_eq!(saved.entity["partitionKey"], "UID_12345678901");

	let listed = service
		.list_items(list(Some("12345678901"), Some("Notes")))
		.await
		.expect("Failed to list notes.");

	assert_eq!(listed.count, 1);
	assert_eq!(listed.items[0]["title"], "Span swap");
	assert_eq!(listed.items[0]["description"], "Swap span 3");
	assert_eq!(listed.items[0]["owner"], "kim");
	assert_eq!(listed.items[0]["ticket"], json!(4211));
}

#[tokio::test]
async fn pascal_case_requests_are_accepted() {
	let (service, _) = memory_service();
	let saved = service
		.upsert_item(upsert(json!({
			"UID": "12345678901",
			"Category": "troubleshooting",
			"Title": "LOS on A side",
			"RowKey": "fixed-row"
		})))
		.await
		.expect("Failed to save entry.");

	assert_eq!(saved.entity["rowKey"], "fixed-row");
	assert_eq!(saved.entity["owner"], "Unknown");
	assert_eq!(saved.entity["description"], "");
}

#[tokio::test]
async fn listing_is_newest_first_and_filtered_by_category() {
	let (service, _) = memory_service();

	for (timestamp, category) in [
		("2024-05-01T10:00:00Z", "Notes"),
		("2024-05-03T10:00:00Z", "Comments"),
		("2024-05-02T10:00:00Z", "Notes"),
	] {
		service
			.upsert_item(upsert(json!({
				"uid": "12345678901",
				"category": category,
				"title": format!("{category} at {timestamp}"),
				"timestamp": timestamp
			})))
			.await
			.expect("Failed to save entry.");
	}

	let notes = service
		.list_items(list(Some("12345678901"), Some("Notes")))
		.await
		.expect("Failed to list notes.");
	let keys = notes.items.iter().map(|item| item["rowKey"].clone()).collect::<Vec<_>>();

	assert_eq!(keys, [json!("2024-05-02T10:00:00.000Z"), json!("2024-05-01T10:00:00.000Z")]);

	let everything = service
		.list_items(ListItemsRequest {
			uid: Some("12345678901".to_string()),
			table_name: Some("Notes".to_string()),
			..Default::default()
		})
		.await
		.expect("Failed to list entries.");

	assert_eq!(everything.count, 3);
	assert_eq!(everything.items[0]["category"], "Comments");
}

#[tokio::test]
async fn suggestions_share_a_partition_and_need_no_uid() {
	let (service, _) = memory_service();
	let saved = service
		.upsert_item(upsert(json!({"category": "suggestions", "title": "Dark mode"})))
		.await
		.expect("Failed to save suggestion.");

	assert_eq!(saved.entity["partitionKey"], "Suggestions");

	let listed = service
		.list_items(list(Some("12345678901"), Some("suggestions")))
		.await
		.expect("Failed to list suggestions.");

	assert_eq!(listed.count, 1);

	let err = service
		.upsert_item(upsert(json!({"category": "Notes", "title": "No uid"})))
		.await
		.expect_err("Notes without a UID must be rejected.");

	assert!(matches!(err, Error::Validation { .. }), "Unexpected error: {err}");
}

#[tokio::test]
async fn unknown_categories_use_the_default_table() {
	let (service, store) = memory_service();

	service
		.upsert_item(upsert(json!({"uid": "12345678901", "category": "Inventory", "title": "x"})))
		.await
		.expect("Failed to save entry.");
	service
		.upsert_item(upsert(json!({"uid": "12345678901", "category": "calendar", "title": "y"})))
		.await
		.expect("Failed to save entry.");

	assert_eq!(store.table_names().await, ["Projects", "VsoCalendar"]);
}

#[tokio::test]
async fn conditional_upserts_detect_stale_etags() {
	let (service, _) = memory_service();
	let body = json!({
		"uid": "12345678901",
		"category": "status",
		"title": "Ready",
		"rowKey": "current"
	});
	let first = service.upsert_item(upsert(body.clone())).await.expect("Failed to save status.");
	let etag = first.entity["etag"].as_str().expect("Saved entity must carry an etag.").to_string();
	let mut update = fields(body);

	update.insert("etag".to_string(), Value::String(etag.clone()));
	update.insert("title".to_string(), Value::String("Blocked".to_string()));

	service
		.upsert_item(UpsertItemRequest { fields: update.clone() })
		.await
		.expect("Upsert with the current etag must succeed.");

	let err = service
		.upsert_item(UpsertItemRequest { fields: update })
		.await
		.expect_err("Upsert with a stale etag must fail.");

	assert!(matches!(err, Error::Conflict { .. }), "Unexpected error: {err}");
}

#[tokio::test]
async fn deletes_report_missing_rows() {
	let (service, _) = memory_service();

	service
		.upsert_item(upsert(json!({
			"uid": "12345678901",
			"category": "Notes",
			"title": "Temporary",
			"rowKey": "r1"
		})))
		.await
		.expect("Failed to save note.");

	let req = DeleteItemRequest::from_fields(&fields(json!({
		"uid": "12345678901",
		"rowKey": "r1",
		"category": "Notes"
	})));
	let deleted = service.delete_item(req.clone()).await.expect("Failed to delete note.");

	assert_eq!(deleted.message, "Deleted r1");

	let err = service.delete_item(req).await.expect_err("Second delete must fail.");

	assert!(matches!(err, Error::NotFound { .. }), "Unexpected error: {err}");

	let listed = service
		.list_items(list(Some("12345678901"), Some("Notes")))
		.await
		.expect("Failed to list notes.");

	assert_eq!(listed.count, 0);

	let strict =
		DeleteItemRequest::from_fields(&fields(json!({"uid": "12345678901", "rowKey": "r1"})));

	assert!(matches!(
		service.delete_categorized_item(strict).await,
		Err(Error::Validation { .. })
	));
}

#[tokio::test]
async fn shared_partition_entries_are_deleted_by_uid_and_category() {
	let (service, _) = memory_service();

	service
		.upsert_item(upsert(json!({
			"uid": "12345678901",
			"category": "suggestions",
			"title": "Dark mode",
			"rowKey": "s1"
		})))
		.await
		.expect("Failed to save suggestion.");
	service
		.upsert_item(upsert(json!({"category": "calendar", "title": "Window", "rowKey": "c1"})))
		.await
		.expect("Failed to save calendar entry.");

	let suggestion = DeleteItemRequest::from_fields(&fields(json!({
		"uid": "12345678901",
		"category": "suggestions",
		"rowKey": "s1"
	})));

	service.delete_item(suggestion).await.expect("Failed to delete suggestion.");

	let calendar =
		DeleteItemRequest::from_fields(&fields(json!({"category": "calendar", "rowKey": "c1"})));

	service.delete_item(calendar).await.expect("Failed to delete calendar entry.");

	let suggestions = service
		.list_items(list(Some("12345678901"), Some("suggestions")))
		.await
		.expect("Failed to list suggestions.");
	let calendar =
		service.list_items(list(None, Some("calendar"))).await.expect("Failed to list calendar.");

	assert_eq!(suggestions.count, 0);
	assert_eq!(calendar.count, 0);
}

#[tokio::test]
async fn activity_log_filters_and_limits() {
	let (service, _) = memory_service();

	for action in ["login", "lookup", "logout"] {
		service
			.log_activity(LogActivityRequest {
				email: Some("kim@contoso.com".to_string()),
				action: Some(action.to_string()),
				metadata: Some(json!({"uid": "12345678901"})),
			})
			.await
			.expect("Failed to log activity.");
		tokio::time::sleep(Duration::from_millis(2)).await;
	}

	let latest = service
		.list_activity(ListActivityRequest { limit: Some("2".to_string()), ..Default::default() })
		.await
		.expect("Failed to list activity.");

	assert_eq!(latest.items.len(), 2);
	assert_eq!(latest.items[0]["action"], "logout");
	assert_eq!(latest.items[0]["metadata"], r#"{"uid":"12345678901"}"#);

	let none = service
		.list_activity(ListActivityRequest {
			date_to: Some("2000-01-01".to_string()),
			..Default::default()
		})
		.await
		.expect("Failed to list activity.");

	assert!(none.items.is_empty());

	let err = service
		.log_activity(LogActivityRequest { email: Some(" ".to_string()), ..Default::default() })
		.await
		.expect_err("Blank e-mail must be rejected.");

	assert_eq!(err.to_string(), "Missing email or action");
}

#[tokio::test]
async fn projects_are_scoped_to_their_owner() {
	let (service, _) = memory_service();
	let user = "kim@contoso.com";
	let created = service
		.create_project(user, fields(json!({"id": "p1", "name": "Ring", "data": {"uids": 2}})))
		.await
		.expect("Failed to create project.");

	assert_eq!(created["Name"], "Ring");
	assert_eq!(created["Data"], r#"{"uids":2}"#);
	assert!(matches!(
		service.create_project(user, fields(json!({"id": "p1"}))).await,
		Err(Error::Conflict { .. })
	));

	let replaced = service
		.replace_project(user, fields(json!({"id": "p1", "Name": "Ring v2"})))
		.await
		.expect("Failed to replace project.");

	assert_eq!(replaced["Name"], "Ring v2");
	assert_eq!(replaced["CreatedByEmail"], user);
	assert!(
		service.list_projects("other@contoso.com").await.expect("Failed to list.").is_empty()
	);
	assert_eq!(service.list_projects(user).await.expect("Failed to list.").len(), 1);

	service.delete_project(user, Some("p1")).await.expect("Failed to delete project.");

	assert!(matches!(
		service.delete_project(user, Some("p1")).await,
		Err(Error::NotFound { .. })
	));
	assert!(matches!(
		service.replace_project(user, fields(json!({"id": "p1"}))).await,
		Err(Error::NotFound { .. })
	));
}

#[tokio::test]
async fn uid_proxy_passes_upstream_json_through() {
	let spy = Arc::new(SpyLogicApp::replying(Ok(json_response(200, json!({"OLSLinks": []})))));
	let service = service_with(spy.clone(), FixedSummary(None), test_config());
	let reply = service
		.logic_app_proxy(fields(json!({"type": " uid ", "uid": "12345678901"})))
		.await
		.expect("Failed to proxy UID lookup.");

	assert_eq!(reply.status, 200);
	assert_eq!(reply.body, ProxyBody::Json(json!({"OLSLinks": []})));
	assert_eq!(spy.calls()[0].0, "https://logic.example/uid?sig=abc&UID=12345678901");
}

#[tokio::test]
async fn uid_proxy_failures_carry_details() {
	let spy = Arc::new(SpyLogicApp::replying(Ok(json_response(404, json!({"error": "gone"})))));
	let service = service_with(spy, FixedSummary(None), test_config());
	let err = service
		.logic_app_proxy(fields(json!({"type": "UID", "uid": "12345678901"})))
		.await
		.expect_err("Upstream failures must surface.");

	match err {
		Error::Upstream { status, message, details } => {
			assert_eq!(status, 500);
			assert_eq!(message, "Request failed with status code 404");
			assert_eq!(details, Some(json!({"error": "gone"})));
		},
		other => panic!("Unexpected error: {other}"),
	}
}

#[tokio::test]
async fn proxy_validates_type_and_configuration() {
	let mut cfg = test_config();

	cfg.logic_apps.vso_url = None;

	let service = service_with(Arc::new(SpyLogicApp::default()), FixedSummary(None), cfg);

	assert_eq!(
		service.logic_app_proxy(Map::new()).await.expect_err("Missing type").to_string(),
		"Missing type"
	);
	assert_eq!(
		service
			.logic_app_proxy(fields(json!({"type": "KQL"})))
			.await
			.expect_err("Unsupported type")
			.to_string(),
		"Unsupported type: KQL"
	);
	assert!(matches!(
		service.logic_app_proxy(fields(json!({"type": "VSO"}))).await,
		Err(Error::Config { .. })
	));
	assert!(matches!(service.uid_lookup("1234").await, Err(Error::Validation { .. })));
}

#[tokio::test]
async fn vso_requests_are_normalized_before_posting() {
	let spy = Arc::new(SpyLogicApp::default());
	let service = service_with(spy.clone(), FixedSummary(None), test_config());

	service
		.logic_app_proxy(fields(json!({
			"type": "VSO",
			"FacilityCodeA": "ZRH21",
			"FacilityCodeZ": "AMS20",
			"Tags": ["a", "b"]
		})))
		.await
		.expect("Failed to proxy VSO request.");

	let (url, body) = spy.calls().remove(0);
	let body = body.expect("VSO requests carry a body.");

	assert_eq!(url, "https://logic.example/vso");
	assert_eq!(body["Stage"], "12");
	assert_eq!(body["Tags"], "a; b");
}

#[tokio::test]
async fn uid_lookup_mirrors_upstream_status() {
	let spy = Arc::new(SpyLogicApp::replying(Ok(UpstreamResponse {
		status: 429,
		content_type: Some("text/plain".to_string()),
		body: "slow down".to_string(),
	})));
	let service = service_with(spy, FixedSummary(None), test_config());

	match service.uid_lookup("12345678901").await {
		Err(Error::Upstream { status, message, details }) => {
			assert_eq!(status, 429);
			assert_eq!(message, "Upstream error 429");
			assert_eq!(details, Some(json!("slow down")));
		},
		other => panic!("Unexpected result: {other:?}"),
	}
}

#[tokio::test]
async fn vso_email_passes_text_bodies_through() {
	let spy = Arc::new(SpyLogicApp::replying(Ok(UpstreamResponse {
		status: 202,
		content_type: Some("text/plain".to_string()),
		body: "queued".to_string(),
	})));
	let service = service_with(spy, FixedSummary(None), test_config());
	let reply = service.vso_email(json!({"Stage": "1"})).await.expect("Failed to send e-mail.");

	assert_eq!(reply.status, 200);
	assert_eq!(reply.body, ProxyBody::Text("queued".to_string()));
}

#[tokio::test]
async fn summary_prefers_the_model_and_falls_back_locally() {
	let input = json!({"OLSLinks": [{"APort": "HundredGigE0/0/0"}]});
	let mut cfg = test_config();

	cfg.summary = Some(Summary::new(
		"https://o360.openai.azure.com".to_string(),
		"gpt-4o".to_string(),
		"key".to_string(),
	));

	let spy = Arc::new(SpyLogicApp::default());
	let answered = service_with(spy.clone(), FixedSummary(Some("From model")), cfg.clone());
	let failing = service_with(spy.clone(), FixedSummary(None), cfg.clone());
	let empty = service_with(spy, FixedSummary(Some("")), cfg);
	let local = o360_domain::summary::build_local_summary(&input);

	assert_eq!(answered.summarize(&input).await.message, "From model");
	assert_eq!(failing.summarize(&input).await.message, local);
	assert_eq!(empty.summarize(&input).await.message, local);
}

#[tokio::test]
async fn connection_test_reports_auth_mode() {
	let (service, store) = memory_service();
	let report = service.test_connection().await.expect("Connection test failed.");

	assert!(report.ok);
	assert_eq!(report.auth, "Memory");
	assert_eq!(report.table, "Projects");
	assert_eq!(store.table_names().await, ["Projects"]);
}
