mod error;

pub use error::{Error, Result};

use std::{
	collections::VecDeque,
	env,
	net::SocketAddr,
	sync::{Arc, Mutex},
	time::Duration,
};

use axum::{
	Router,
	body::Bytes,
	extract::State,
	http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri, header::CONTENT_TYPE},
	response::{IntoResponse, Response},
};
use serde_json::Value;
use tokio::{net::TcpListener, task::JoinHandle};
use uuid::Uuid;

/// Canned response served by [`MockUpstream`].
#[derive(Debug, Clone)]
pub struct Reply {
	pub status: u16,
	pub content_type: String,
	pub body: String,
	pub headers: Vec<(String, String)>,
	pub delay: Option<Duration>,
}
impl Reply {
	pub fn json(status: u16, body: Value) -> Self {
		Self {
			status,
			content_type: "application/json".to_string(),
			body: body.to_string(),
			headers: Vec::new(),
			delay: None,
		}
	}

	pub fn text(status: u16, body: &str) -> Self {
		Self {
			status,
			content_type: "text/plain; charset=utf-8".to_string(),
			body: body.to_string(),
			headers: Vec::new(),
			delay: None,
		}
	}

	pub fn with_header(mut self, name: &str, value: &str) -> Self {
		self.headers.push((name.to_string(), value.to_string()));

		self
	}

	pub fn delayed(mut self, delay: Duration) -> Self {
		self.delay = Some(delay);

		self
	}
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
	pub method: String,
	pub path: String,
	pub query: Option<String>,
	pub headers: Vec<(String, String)>,
	pub body: String,
}
impl RecordedRequest {
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers
			.iter()
			.find(|(key, _)| key.eq_ignore_ascii_case(name))
			.map(|(_, value)| value.as_str())
	}

	pub fn json(&self) -> Option<Value> {
		serde_json::from_str(&self.body).ok()
	}
}

#[derive(Clone)]
struct Shared {
	requests: Arc<Mutex<Vec<RecordedRequest>>>,
	replies: Arc<Mutex<VecDeque<Reply>>>,
	fallback: Reply,
}

/// Local HTTP server standing in for Logic Apps and the chat endpoint.
///
/// Every request is recorded. Queued replies are served first, then `fallback` forever.
pub struct MockUpstream {
	addr: SocketAddr,
	shared: Shared,
	handle: JoinHandle<()>,
}
impl MockUpstream {
	pub async fn start(fallback: Reply) -> Result<Self> {
		let listener = TcpListener::bind("127.0.0.1:0").await?;
		let addr = listener.local_addr()?;
		let shared = Shared {
			requests: Arc::new(Mutex::new(Vec::new())),
			replies: Arc::new(Mutex::new(VecDeque::new())),
			fallback,
		};
		let app = Router::new().fallback(record).with_state(shared.clone());
		let handle = tokio::spawn(async move {
			if let Err(err) = axum::serve(listener, app).await {
				eprintln!("Mock upstream stopped: {err}.");
			}
		});

		Ok(Self { addr, shared, handle })
	}

	pub fn url(&self, path_and_query: &str) -> String {
		format!("http://{}{path_and_query}", self.addr)
	}

	pub fn push_reply(&self, reply: Reply) {
		self.shared.replies.lock().unwrap_or_else(|err| err.into_inner()).push_back(reply);
	}

	pub fn requests(&self) -> Vec<RecordedRequest> {
		self.shared.requests.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}
}
impl Drop for MockUpstream {
	fn drop(&mut self) {
		self.handle.abort();
	}
}

/// Connection string for the opt-in live Table Storage tests.
pub fn env_tables_connection_string() -> Option<String> {
	env::var("O360_TABLES_CONNECTION_STRING").ok().filter(|value| !value.trim().is_empty())
}

/// Table name that is unique per test run, e.g. `O360Test3f2a...`.
pub fn unique_table_name(prefix: &str) -> String {
	let suffix = Uuid::new_v4().simple().to_string();

	format!("{prefix}{}", &suffix[..12])
}

async fn record(
	State(shared): State<Shared>,
	method: Method,
	uri: Uri,
	headers: HeaderMap,
	body: Bytes,
) -> Response {
	let request = RecordedRequest {
		method: method.to_string(),
		path: uri.path().to_string(),
		query: uri.query().map(str::to_string),
		headers: headers
			.iter()
			.map(|(name, value)| {
				(name.to_string(), String::from_utf8_lossy(value.as_bytes()).into_owned())
			})
			.collect(),
		body: String::from_utf8_lossy(&body).into_owned(),
	};

	shared.requests.lock().unwrap_or_else(|err| err.into_inner()).push(request);

	let reply = shared
		.replies
		.lock()
		.unwrap_or_else(|err| err.into_inner())
		.pop_front()
		.unwrap_or_else(|| shared.fallback.clone());

	if let Some(delay) = reply.delay {
		tokio::time::sleep(delay).await;
	}

	let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

	let mut response = (status, [(CONTENT_TYPE, reply.content_type)], reply.body).into_response();

	for (name, value) in reply.headers {
		if let (Ok(name), Ok(value)) =
			(HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(&value))
		{
			response.headers_mut().insert(name, value);
		}
	}

	response
}
