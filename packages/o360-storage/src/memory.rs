//! Process-local table store used by tests and the `memory` backend.

use std::{
	collections::{BTreeMap, HashMap},
	sync::atomic::{AtomicU64, Ordering},
};

use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tokio::sync::RwLock;

use crate::{
	BoxFuture, Error, Result, TableStore,
	models::{AuthMode, Filter, TableEntity, UpsertMode},
};

type Rows = BTreeMap<(String, String), TableEntity>;

const MODIFIED: &str = "The entity was modified by another writer.";

#[derive(Default)]
pub struct MemoryTableStore {
	tables: RwLock<HashMap<String, Rows>>,
	version: AtomicU64,
}
impl MemoryTableStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub async fn table_names(&self) -> Vec<String> {
		let mut names = self.tables.read().await.keys().cloned().collect::<Vec<_>>();

		names.sort();

		names
	}

	fn stamp(&self, entity: &mut TableEntity) {
		let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
		let now = OffsetDateTime::now_utc();

		entity.etag = Some(format!("W/\"{version}\""));
		entity.timestamp = now.format(&Rfc3339).ok();
	}

	async fn write(
		&self,
		table: &str,
		entity: &TableEntity,
		mode: WriteMode,
		if_match: Option<&str>,
	) -> Result<TableEntity> {
		let mut tables = self.tables.write().await;
		let rows = tables.entry(table.to_string()).or_default();
		let key = (entity.partition_key.clone(), entity.row_key.clone());
		let existing = rows.get(&key);

		match (mode, existing, if_match) {
			(WriteMode::Insert, Some(_), _) =>
				return Err(Error::Conflict(format!(
					"Entity {}/{} already exists.",
					entity.partition_key, entity.row_key
				))),
			(_, None, Some(_)) =>
				return Err(Error::NotFound(format!(
					"Entity {}/{} does not exist.",
					entity.partition_key, entity.row_key
				))),
			(_, Some(current), Some(expected))
				if expected != "*" && current.etag.as_deref() != Some(expected) =>
				return Err(Error::Conflict(MODIFIED.to_string())),
			_ => {},
		}

		let mut stored = match (mode, existing) {
			(WriteMode::Merge, Some(current)) => {
				let mut merged = current.clone();

				for (name, value) in &entity.properties {
					merged.properties.insert(name.clone(), value.clone());
				}

				merged
			},
			_ => TableEntity { etag: None, timestamp: None, ..entity.clone() },
		};

		stored.properties = entity_properties(&stored);

		self.stamp(&mut stored);
		rows.insert(key, stored.clone());

		Ok(stored)
	}
}

impl TableStore for MemoryTableStore {
	fn auth_mode(&self) -> AuthMode {
		AuthMode::Memory
	}

	fn ensure_table<'a>(&'a self, table: &'a str) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			self.tables.write().await.entry(table.to_string()).or_default();

			Ok(())
		})
	}

	fn query<'a>(
		&'a self,
		table: &'a str,
		filter: Option<&'a Filter>,
	) -> BoxFuture<'a, Result<Vec<TableEntity>>> {
		Box::pin(async move {
			let tables = self.tables.read().await;
			let Some(rows) = tables.get(table) else {
				return Ok(Vec::new());
			};

			Ok(rows
				.values()
				.filter(|entity| filter.is_none_or(|filter| filter.matches(entity)))
				.cloned()
				.collect())
		})
	}

	fn get<'a>(
		&'a self,
		table: &'a str,
		partition_key: &'a str,
		row_key: &'a str,
	) -> BoxFuture<'a, Result<Option<TableEntity>>> {
		Box::pin(async move {
			let tables = self.tables.read().await;

			Ok(tables
				.get(table)
				.and_then(|rows| rows.get(&(partition_key.to_string(), row_key.to_string())))
				.cloned())
		})
	}

	fn insert<'a>(
		&'a self,
		table: &'a str,
		entity: &'a TableEntity,
	) -> BoxFuture<'a, Result<TableEntity>> {
		Box::pin(self.write(table, entity, WriteMode::Insert, None))
	}

	fn upsert<'a>(
		&'a self,
		table: &'a str,
		entity: &'a TableEntity,
		mode: UpsertMode,
		if_match: Option<&'a str>,
	) -> BoxFuture<'a, Result<TableEntity>> {
		let mode = match mode {
			UpsertMode::Merge => WriteMode::Merge,
			UpsertMode::Replace => WriteMode::Replace,
		};

		Box::pin(self.write(table, entity, mode, if_match))
	}

	fn delete<'a>(
		&'a self,
		table: &'a str,
		partition_key: &'a str,
		row_key: &'a str,
		if_match: Option<&'a str>,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut tables = self.tables.write().await;
			let key = (partition_key.to_string(), row_key.to_string());
			let not_found =
				|| Error::NotFound(format!("Entity {partition_key}/{row_key} does not exist."));
			let rows = tables.get_mut(table).ok_or_else(not_found)?;
			let current = rows.get(&key).ok_or_else(not_found)?;

			if let Some(expected) = if_match
				&& expected != "*"
				&& current.etag.as_deref() != Some(expected)
			{
				return Err(Error::Conflict(MODIFIED.to_string()));
			}

			rows.remove(&key);

			Ok(())
		})
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
	Insert,
	Merge,
	Replace,
}

fn entity_properties(entity: &TableEntity) -> serde_json::Map<String, serde_json::Value> {
	let mut clean = TableEntity::new(&entity.partition_key, &entity.row_key);

	for (name, value) in &entity.properties {
		if !crate::models::is_system_property(name) {
			clean.set(name, value.clone());
		}
	}

	clean.properties
}
