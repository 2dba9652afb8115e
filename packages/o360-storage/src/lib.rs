pub mod auth;
pub mod azure;
pub mod memory;
pub mod models;
pub mod odata;

mod error;

pub use error::{Error, Result};

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use crate::{
	azure::AzureTableStore,
	memory::MemoryTableStore,
	models::{AuthMode, Filter, TableEntity, UpsertMode},
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Entity storage addressed by table, partition key and row key.
///
/// `if_match` carries an entity ETag; `"*"` matches any existing entity. A mismatch fails with
/// [`Error::Conflict`].
pub trait TableStore
where
	Self: Send + Sync,
{
	fn auth_mode(&self) -> AuthMode;

	/// Creates `table` unless it already exists.
	fn ensure_table<'a>(&'a self, table: &'a str) -> BoxFuture<'a, Result<()>>;

	fn query<'a>(
		&'a self,
		table: &'a str,
		filter: Option<&'a Filter>,
	) -> BoxFuture<'a, Result<Vec<TableEntity>>>;

	fn get<'a>(
		&'a self,
		table: &'a str,
		partition_key: &'a str,
		row_key: &'a str,
	) -> BoxFuture<'a, Result<Option<TableEntity>>>;

	/// Fails with [`Error::Conflict`] when the row already exists.
	fn insert<'a>(
		&'a self,
		table: &'a str,
		entity: &'a TableEntity,
	) -> BoxFuture<'a, Result<TableEntity>>;

	fn upsert<'a>(
		&'a self,
		table: &'a str,
		entity: &'a TableEntity,
		mode: UpsertMode,
		if_match: Option<&'a str>,
	) -> BoxFuture<'a, Result<TableEntity>>;

	fn delete<'a>(
		&'a self,
		table: &'a str,
		partition_key: &'a str,
		row_key: &'a str,
		if_match: Option<&'a str>,
	) -> BoxFuture<'a, Result<()>>;
}

/// Builds the configured store. Managed Identity wins when an `https://` account URL is set.
pub fn connect(cfg: &o360_config::Storage) -> Result<Arc<dyn TableStore>> {
	match cfg.backend.as_str() {
		o360_config::STORAGE_BACKEND_MEMORY => Ok(Arc::new(MemoryTableStore::new())),
		o360_config::STORAGE_BACKEND_AZURE => {
			let timeout = Duration::from_millis(cfg.timeout_ms);

			if let Some(account_url) = cfg
				.account_url
				.as_deref()
				.filter(|url| url.to_ascii_lowercase().starts_with("https://"))
			{
				let store = AzureTableStore::with_managed_identity(
					account_url,
					cfg.managed_identity_client_id.clone(),
					timeout,
				)?;

				return Ok(Arc::new(store));
			}
			if !cfg.allow_connection_string {
				return Err(Error::Config { message: "Connection strings disabled.".to_string() });
			}

			let Some(conn) = cfg.connection_string.as_deref() else {
				return Err(Error::Config { message: "Missing connection string.".to_string() });
			};

			Ok(Arc::new(AzureTableStore::from_connection_string(conn, timeout)?))
		},
		other => Err(Error::Config { message: format!("Unknown storage backend {other:?}.") }),
	}
}
