//! Azure Table Storage over the REST API.

use std::time::Duration;

use reqwest::{
	Client, Method, RequestBuilder, Response, StatusCode, Url,
	header::{ACCEPT, CONTENT_TYPE, ETAG},
};
use serde_json::{Value, json};
use time::OffsetDateTime;

use crate::{
	BoxFuture, Error, Result, TableStore,
	auth::{self, ConnectionString, ManagedIdentity, SharedKey},
	models::{AuthMode, Filter, TableEntity, UpsertMode},
	odata,
};

pub const API_VERSION: &str = "2019-02-02";
const JSON_METADATA: &str = "application/json;odata=minimalmetadata";
const DATA_SERVICE_VERSION: &str = "3.0;NetFx";
const CONTINUATION_PARTITION: &str = "x-ms-continuation-NextPartitionKey";
const CONTINUATION_ROW: &str = "x-ms-continuation-NextRowKey";

enum Credential {
	SharedKey(SharedKey),
	ManagedIdentity(ManagedIdentity),
}

pub struct AzureTableStore {
	http: Client,
	endpoint: String,
	base_path: String,
	credential: Credential,
}
impl AzureTableStore {
	pub fn from_connection_string(raw: &str, timeout: Duration) -> Result<Self> {
		let conn = ConnectionString::parse(raw)?;
		let key = SharedKey::new(&conn.account_name, &conn.account_key)?;

		Self::new(&conn.table_endpoint, Credential::SharedKey(key), timeout)
	}

	pub fn with_managed_identity(
		account_url: &str,
		client_id: Option<String>,
		timeout: Duration,
	) -> Result<Self> {
		let http = Client::builder().timeout(timeout).build()?;
		let identity = ManagedIdentity::from_env(http, client_id);

		Self::new(account_url, Credential::ManagedIdentity(identity), timeout)
	}

	fn new(endpoint: &str, credential: Credential, timeout: Duration) -> Result<Self> {
		let endpoint = endpoint.trim().trim_end_matches('/').to_string();
		let parsed = Url::parse(&endpoint).map_err(|err| Error::Config {
			message: format!("Table endpoint {endpoint:?} is not a valid URL: {err}."),
		})?;
		let base_path = parsed.path().trim_end_matches('/').to_string();
		let http = Client::builder().timeout(timeout).build()?;

		Ok(Self { http, endpoint, base_path, credential })
	}

	/// Builds a signed request for `path`, which starts with `/` and is already encoded.
	async fn request(
		&self,
		method: Method,
		path: &str,
		query: &[(&str, String)],
	) -> Result<RequestBuilder> {
		let now = OffsetDateTime::now_utc();
		let date = auth::rfc1123(now);
		let mut url = format!("{}{path}", self.endpoint);

		if !query.is_empty() {
			let encoded = query
				.iter()
				.map(|(key, value)| format!("{key}={}", odata::encode(value)))
				.collect::<Vec<_>>()
				.join("&");

			url.push('?');
			url.push_str(&encoded);
		}

		let builder = self
			.http
			.request(method, url)
			.header("x-ms-date", &date)
			.header("x-ms-version", API_VERSION)
			.header(ACCEPT, JSON_METADATA)
			.header("DataServiceVersion", DATA_SERVICE_VERSION)
			.header("MaxDataServiceVersion", DATA_SERVICE_VERSION);
		let authorization = match &self.credential {
			Credential::SharedKey(key) =>
				key.authorization(&date, &format!("{}{path}", self.base_path))?,
			Credential::ManagedIdentity(identity) => format!("Bearer {}", identity.token().await?),
		};

		Ok(builder.header("Authorization", authorization))
	}

	async fn write_entity(
		&self,
		method: Method,
		path: &str,
		entity: &TableEntity,
		if_match: Option<&str>,
	) -> Result<TableEntity> {
		let mut request = self
			.request(method, path, &[])
			.await?
			.header(CONTENT_TYPE, "application/json")
			.header("Prefer", "return-no-content")
			.json(&entity.to_wire());

		if let Some(etag) = if_match {
			request = request.header("If-Match", etag);
		}

		let res = check(request.send().await?, &entity.partition_key, &entity.row_key).await?;
		let etag = res.headers().get(ETAG).and_then(|v| v.to_str().ok()).map(str::to_string);

		Ok(TableEntity { etag, timestamp: None, ..entity.clone() })
	}
}

impl TableStore for AzureTableStore {
	fn auth_mode(&self) -> AuthMode {
		match self.credential {
			Credential::SharedKey(_) => AuthMode::ConnectionString,
			Credential::ManagedIdentity(_) => AuthMode::ManagedIdentity,
		}
	}

	fn ensure_table<'a>(&'a self, table: &'a str) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let res = self
				.request(Method::POST, "/Tables", &[])
				.await?
				.header(CONTENT_TYPE, "application/json")
				.header("Prefer", "return-no-content")
				.json(&json!({ "TableName": table }))
				.send()
				.await?;

			if res.status() == StatusCode::CONFLICT {
				tracing::debug!(table, "Table already exists.");

				return Ok(());
			}

			check(res, table, "").await?;

			tracing::info!(table, "Table created.");

			Ok(())
		})
	}

	fn query<'a>(
		&'a self,
		table: &'a str,
		filter: Option<&'a Filter>,
	) -> BoxFuture<'a, Result<Vec<TableEntity>>> {
		Box::pin(async move {
			let path = format!("/{table}()");
			let mut out = Vec::new();
			let mut continuation: Option<(String, Option<String>)> = None;

			loop {
				let mut query = Vec::new();

				if let Some(filter) = filter {
					query.push(("$filter", odata::render(filter)));
				}
				if let Some((next_pk, next_rk)) = continuation.take() {
					query.push(("NextPartitionKey", next_pk));

					if let Some(next_rk) = next_rk {
						query.push(("NextRowKey", next_rk));
					}
				}

				let res = self.request(Method::GET, &path, &query).await?.send().await?;

				if res.status() == StatusCode::NOT_FOUND {
					return Err(Error::NotFound(format!("Table {table} does not exist.")));
				}

				let res = check(res, table, "").await?;
				let header = |name: &str| {
					res.headers().get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
				};
				let next = header(CONTINUATION_PARTITION).map(|pk| (pk, header(CONTINUATION_ROW)));
				let body: Value = res.json().await?;
				let rows = body.get("value").and_then(Value::as_array).cloned().unwrap_or_default();

				for row in rows {
					out.push(TableEntity::from_wire(row)?);
				}

				match next {
					Some(next) => continuation = Some(next),
					None => break,
				}
			}

			Ok(out)
		})
	}

	fn get<'a>(
		&'a self,
		table: &'a str,
		partition_key: &'a str,
		row_key: &'a str,
	) -> BoxFuture<'a, Result<Option<TableEntity>>> {
		Box::pin(async move {
			let path = odata::entity_path(table, partition_key, row_key);
			let res = self.request(Method::GET, &path, &[]).await?.send().await?;

			if res.status() == StatusCode::NOT_FOUND {
				return Ok(None);
			}

			let res = check(res, partition_key, row_key).await?;
			let etag = res.headers().get(ETAG).and_then(|v| v.to_str().ok()).map(str::to_string);
			let mut entity = TableEntity::from_wire(res.json().await?)?;

			if entity.etag.is_none() {
				entity.etag = etag;
			}

			Ok(Some(entity))
		})
	}

	fn insert<'a>(
		&'a self,
		table: &'a str,
		entity: &'a TableEntity,
	) -> BoxFuture<'a, Result<TableEntity>> {
		Box::pin(async move {
			let path = format!("/{table}");

			self.write_entity(Method::POST, &path, entity, None).await
		})
	}

	fn upsert<'a>(
		&'a self,
		table: &'a str,
		entity: &'a TableEntity,
		mode: UpsertMode,
		if_match: Option<&'a str>,
	) -> BoxFuture<'a, Result<TableEntity>> {
		Box::pin(async move {
			let path = odata::entity_path(table, &entity.partition_key, &entity.row_key);
			let method = match mode {
				UpsertMode::Merge => Method::PATCH,
				UpsertMode::Replace => Method::PUT,
			};

			self.write_entity(method, &path, entity, if_match).await
		})
	}

	fn delete<'a>(
		&'a self,
		table: &'a str,
		partition_key: &'a str,
		row_key: &'a str,
		if_match: Option<&'a str>,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let path = odata::entity_path(table, partition_key, row_key);
			let res = self
				.request(Method::DELETE, &path, &[])
				.await?
				.header("If-Match", if_match.unwrap_or("*"))
				.send()
				.await?;

			check(res, partition_key, row_key).await?;

			Ok(())
		})
	}
}

/// Maps service status codes onto the store error taxonomy.
async fn check(res: Response, partition_key: &str, row_key: &str) -> Result<Response> {
	let status = res.status();

	if status.is_success() {
		return Ok(res);
	}

	let body = res.text().await.unwrap_or_default();
	let message = service_message(&body);

	match status {
		StatusCode::NOT_FOUND =>
			Err(Error::NotFound(format!("Entity {partition_key}/{row_key} does not exist."))),
		StatusCode::CONFLICT => Err(Error::Conflict(message)),
		StatusCode::PRECONDITION_FAILED =>
			Err(Error::Conflict("The entity was modified by another writer.".to_string())),
		StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(Error::Auth { message }),
		_ => Err(Error::Status { status: status.as_u16(), message }),
	}
}

/// Pulls `odata.error.message.value` out of an error body, falling back to the raw text.
fn service_message(body: &str) -> String {
	serde_json::from_str::<Value>(body)
		.ok()
		.and_then(|json| {
			json.pointer("/odata.error/message/value").and_then(Value::as_str).map(str::to_string)
		})
		.unwrap_or_else(|| body.trim().to_string())
}
