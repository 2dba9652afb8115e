pub mod activity;
pub mod diagnostics;
pub mod items;
pub mod projects;
pub mod proxy;
pub mod summary;
pub mod topology;

mod error;

pub use activity::{ActivityListResponse, ListActivityRequest, LogActivityRequest};
pub use diagnostics::ConnectionReport;
pub use error::{Error, Result};
pub use items::{
	DeleteItemRequest, DeleteItemResponse, ListItemsRequest, ListItemsResponse, UpsertItemRequest,
	UpsertItemResponse,
};
pub use proxy::{ProxyBody, ProxyReply};
pub use summary::SummaryResponse;
pub use topology::{MgfxGroupsRequest, ScopeStageResponse};

use std::{collections::HashSet, future::Future, pin::Pin, sync::Arc, time::Duration};

use serde_json::{Map, Value};
use tokio::sync::Mutex;

use o360_config::{Config, Summary};
use o360_providers::{
	chat,
	logic_app::{self, UpstreamResponse},
};
use o360_storage::{TableStore, models::TableEntity};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait LogicAppProvider
where
	Self: Send + Sync,
{
	fn lookup_uid<'a>(
		&'a self,
		base_url: &'a str,
		uid: &'a str,
		timeout: Option<Duration>,
	) -> BoxFuture<'a, color_eyre::Result<UpstreamResponse>>;

	fn post_json<'a>(
		&'a self,
		url: &'a str,
		body: &'a Value,
		timeout: Option<Duration>,
	) -> BoxFuture<'a, color_eyre::Result<UpstreamResponse>>;
}

pub trait SummaryProvider
where
	Self: Send + Sync,
{
	fn complete<'a>(
		&'a self,
		cfg: &'a Summary,
		system: &'a str,
		user: &'a Value,
	) -> BoxFuture<'a, color_eyre::Result<Option<String>>>;
}

#[derive(Clone)]
pub struct Providers {
	pub logic_app: Arc<dyn LogicAppProvider>,
	pub summary: Arc<dyn SummaryProvider>,
}
impl Providers {
	pub fn new(logic_app: Arc<dyn LogicAppProvider>, summary: Arc<dyn SummaryProvider>) -> Self {
		Self { logic_app, summary }
	}
}
impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);

		Self { logic_app: provider.clone(), summary: provider }
	}
}

pub struct O360Service {
	pub cfg: Config,
	pub store: Arc<dyn TableStore>,
	pub providers: Providers,
	ensured: Mutex<HashSet<String>>,
}
impl O360Service {
	pub fn new(cfg: Config, store: Arc<dyn TableStore>) -> Self {
		Self::with_providers(cfg, store, Providers::default())
	}

	pub fn with_providers(cfg: Config, store: Arc<dyn TableStore>, providers: Providers) -> Self {
		Self { cfg, store, providers, ensured: Mutex::new(HashSet::new()) }
	}

	/// Creates `table` the first time this process touches it.
	pub(crate) async fn ensure_table(&self, table: &str) -> Result<()> {
		if !self.cfg.storage.ensure_tables {
			return Ok(());
		}

		let mut ensured = self.ensured.lock().await;

		if ensured.contains(table) {
			return Ok(());
		}

		self.store.ensure_table(table).await?;
		ensured.insert(table.to_string());

		Ok(())
	}

	pub(crate) fn logic_app_timeout(&self) -> Option<Duration> {
		self.cfg.logic_apps.timeout_ms.map(Duration::from_millis)
	}
}

struct DefaultProviders;
impl LogicAppProvider for DefaultProviders {
	fn lookup_uid<'a>(
		&'a self,
		base_url: &'a str,
		uid: &'a str,
		timeout: Option<Duration>,
	) -> BoxFuture<'a, color_eyre::Result<UpstreamResponse>> {
		Box::pin(logic_app::lookup_uid(base_url, uid, timeout))
	}

	fn post_json<'a>(
		&'a self,
		url: &'a str,
		body: &'a Value,
		timeout: Option<Duration>,
	) -> BoxFuture<'a, color_eyre::Result<UpstreamResponse>> {
		Box::pin(logic_app::post_json(url, body, timeout))
	}
}
impl SummaryProvider for DefaultProviders {
	fn complete<'a>(
		&'a self,
		cfg: &'a Summary,
		system: &'a str,
		user: &'a Value,
	) -> BoxFuture<'a, color_eyre::Result<Option<String>>> {
		Box::pin(chat::complete(cfg, system, user))
	}
}

/// Raw JSON view of a stored row: keys, properties, then the store metadata.
pub(crate) fn entity_json(entity: &TableEntity) -> Map<String, Value> {
	let mut out = Map::with_capacity(entity.properties.len() + 4);

	out.insert("partitionKey".to_string(), Value::String(entity.partition_key.clone()));
	out.insert("rowKey".to_string(), Value::String(entity.row_key.clone()));

	for (name, value) in &entity.properties {
		out.entry(name.clone()).or_insert_with(|| value.clone());
	}

	if let Some(timestamp) = entity.timestamp.as_ref() {
		out.entry("Timestamp".to_string()).or_insert_with(|| Value::String(timestamp.clone()));
	}
	if let Some(etag) = entity.etag.as_ref() {
		out.insert("etag".to_string(), Value::String(etag.clone()));
	}

	out
}

/// First non-blank text among `keys` in a loosely typed request body.
pub(crate) fn field(fields: &Map<String, Value>, keys: &[&str]) -> Option<String> {
	keys.iter()
		.filter_map(|key| fields.get(*key))
		.map(|value| o360_domain::value_text(value).trim().to_string())
		.find(|text| !text.is_empty())
}
