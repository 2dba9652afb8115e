//! Generic UID-scoped entries: notes, comments, troubleshooting, calendar, status, suggestions.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use o360_domain::{
	keys,
	routing::{self, Category, RouteSource, TableOverride, TableRoute},
};
use o360_storage::models::{Filter, TableEntity, UpsertMode};

use crate::{Error, O360Service, Result};

/// Request keys that address or route an entry and are never stored as properties.
const RESERVED_FIELDS: &[&str] = &[
	"uid",
	"UID",
	"Uid",
	"category",
	"Category",
	"title",
	"Title",
	"description",
	"Description",
	"owner",
	"Owner",
	"partitionKey",
	"PartitionKey",
	"rowKey",
	"RowKey",
	"timestamp",
	"Timestamp",
	"etag",
	"ETag",
	"savedAt",
	"tableName",
	"TableName",
	"targetTable",
];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListItemsRequest {
	pub uid: Option<String>,
	pub category: Option<String>,
	#[serde(rename = "tableName")]
	pub table_name: Option<String>,
	#[serde(rename = "TableName")]
	pub pascal_table_name: Option<String>,
	#[serde(rename = "targetTable")]
	pub target_table: Option<String>,
}
impl ListItemsRequest {
	fn overrides(&self) -> TableOverride {
		TableOverride {
			table_name: self.table_name.clone(),
			pascal_table_name: self.pascal_table_name.clone(),
			target_table: self.target_table.clone(),
		}
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct ListItemsResponse {
	pub ok: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub uid: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub category: Option<String>,
	pub count: usize,
	pub items: Vec<Value>,
}

/// A save request. Any field beyond the known ones is stored verbatim.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct UpsertItemRequest {
	pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpsertItemResponse {
	pub ok: bool,
	pub message: String,
	pub entity: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteItemRequest {
	pub partition_key: Option<String>,
	pub row_key: Option<String>,
	pub uid: Option<String>,
	pub category: Option<String>,
	pub overrides: TableOverride,
	pub etag: Option<String>,
}
impl DeleteItemRequest {
	/// Reads a delete request from merged query parameters and body fields.
	pub fn from_fields(fields: &Map<String, Value>) -> Self {
		Self {
			partition_key: crate::field(fields, &["partitionKey", "PartitionKey"]),
			row_key: crate::field(fields, &["rowKey", "RowKey"]),
			uid: crate::field(fields, &["uid", "UID", "Uid"]),
			category: crate::field(fields, &["category", "Category"]),
			overrides: TableOverride {
				table_name: crate::field(fields, &["tableName"]),
				pascal_table_name: crate::field(fields, &["TableName"]),
				target_table: crate::field(fields, &["targetTable"]),
			},
			etag: crate::field(fields, &["etag", "ETag"]),
		}
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteItemResponse {
	pub ok: bool,
	pub message: String,
}

impl O360Service {
	pub async fn list_items(&self, req: ListItemsRequest) -> Result<ListItemsResponse> {
		let uid = req.uid.as_deref().map(str::trim).filter(|uid| !uid.is_empty());
		let raw_category = req.category.as_deref().map(str::trim).filter(|c| !c.is_empty());
		let category = raw_category.and_then(Category::parse);
		let route = self.route(category.as_ref(), &req.overrides())?;
		let filter = match (category.as_ref(), uid) {
			(Some(category), _) if category.shared_partition() =>
				Some(Filter::partition(keys::partition_key_for(Some(category), uid)?)),
			(_, Some(uid)) => {
				keys::validate_key("uid", uid)?;

				let partition = Filter::partition(keys::uid_partition(uid));

				match raw_category {
					Some(raw) => Some(Filter::And(vec![
						partition,
						Filter::Or(vec![
							Filter::property("category", raw),
							Filter::property("Category", raw),
						]),
					])),
					None => Some(partition),
				}
			},
			(_, None) => None,
		};

		self.ensure_table(&route.table).await?;

		let mut rows = self.store.query(&route.table, filter.as_ref()).await?;

		rows.sort_by(|a, b| b.row_key.cmp(&a.row_key));

		tracing::debug!(table = %route.table, count = rows.len(), "Listed items.");

		let items = rows.iter().map(normalize_entity).collect::<Vec<_>>();

		Ok(ListItemsResponse {
			ok: true,
			uid: uid.map(str::to_string),
			category: raw_category.map(str::to_string),
			count: items.len(),
			items,
		})
	}

	/// Listing for callers that always address one UID and one category.
	pub async fn get_items(&self, req: ListItemsRequest) -> Result<ListItemsResponse> {
		let has = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.trim().is_empty());

		if !has(&req.uid) || !has(&req.category) {
			return Err(Error::validation("Missing uid or category"));
		}

		self.list_items(req).await
	}

	/// Merge-upserts an entry. A request `etag` makes the write conditional.
	pub async fn upsert_item(&self, req: UpsertItemRequest) -> Result<UpsertItemResponse> {
		let fields = &req.fields;
		let raw_category = crate::field(fields, &["category", "Category"]);
		let title = crate::field(fields, &["title", "Title"]);
		let (Some(raw_category), Some(title)) = (raw_category, title) else {
			return Err(Error::validation("Missing category or title."));
		};
		let category = Category::parse(&raw_category);
		let uid = crate::field(fields, &["uid", "UID", "Uid"]);
		let overrides = TableOverride {
			table_name: crate::field(fields, &["tableName"]),
			pascal_table_name: crate::field(fields, &["TableName"]),
			target_table: crate::field(fields, &["targetTable"]),
		};
		let route = self.route(category.as_ref(), &overrides)?;
		let partition_key = keys::partition_key_for(category.as_ref(), uid.as_deref())
			.map_err(|_| Error::validation("Missing UID."))?;
		let row_key = keys::resolve_row_key(
			crate::field(fields, &["rowKey", "RowKey"]).as_deref(),
			crate::field(fields, &["timestamp"]).as_deref(),
		)?;
		let etag = crate::field(fields, &["etag", "ETag"]);

		keys::validate_key("partitionKey", &partition_key)?;

		let mut entity = TableEntity::new(partition_key, row_key);

		for (name, value) in fields {
			if RESERVED_FIELDS.contains(&name.as_str())
				|| o360_storage::models::is_system_property(name)
			{
				continue;
			}

			entity.set(name, value.clone());
		}

		entity.set("category", raw_category.as_str());
		entity.set("title", title);
		entity.set(
			"description",
			crate::field(fields, &["description", "Description"]).unwrap_or_default(),
		);
		entity.set(
			"owner",
			crate::field(fields, &["owner", "Owner"]).unwrap_or_else(|| "Unknown".to_string()),
		);
		entity.set("savedAt", keys::now_iso());

		self.ensure_table(&route.table).await?;

		let saved =
			self.store.upsert(&route.table, &entity, UpsertMode::Merge, etag.as_deref()).await?;

		tracing::debug!(
			table = %route.table,
			partition_key = %saved.partition_key,
			row_key = %saved.row_key,
			conditional = etag.is_some(),
			"Saved item."
		);

		Ok(UpsertItemResponse {
			ok: true,
			message: format!("Saved {raw_category}"),
			entity: normalize_entity(&saved),
		})
	}

	/// Without an explicit `partitionKey` the row is addressed the way [`Self::upsert_item`]
	/// placed it, so shared-partition categories are found by `uid` and `category` too.
	pub async fn delete_item(&self, req: DeleteItemRequest) -> Result<DeleteItemResponse> {
		let category = req.category.as_deref().and_then(Category::parse);
		let partition_key = req.partition_key.clone().or_else(|| {
			keys::partition_key_for(category.as_ref(), req.uid.as_deref()).ok()
		});
		let (Some(partition_key), Some(row_key)) = (partition_key, req.row_key.clone()) else {
			return Err(Error::validation("Missing partitionKey or rowKey."));
		};

		keys::validate_key("partitionKey", &partition_key)?;
		keys::validate_key("rowKey", &row_key)?;

		let route = self.route(category.as_ref(), &req.overrides)?;

		self.ensure_table(&route.table).await?;
		self.store
			.delete(&route.table, &partition_key, &row_key, req.etag.as_deref())
			.await
			.map_err(|err| match err {
				o360_storage::Error::NotFound(_) =>
					Error::NotFound { message: format!("Item {row_key} not found.") },
				other => other.into(),
			})?;

		tracing::debug!(table = %route.table, %partition_key, %row_key, "Deleted item.");

		Ok(DeleteItemResponse { ok: true, message: format!("Deleted {row_key}") })
	}

	/// Delete for callers that must name the category explicitly.
	pub async fn delete_categorized_item(
		&self,
		req: DeleteItemRequest,
	) -> Result<DeleteItemResponse> {
		if req.partition_key.is_none() || req.row_key.is_none() || req.category.is_none() {
			return Err(Error::validation("Missing partitionKey, rowKey, or category"));
		}

		self.delete_item(req).await
	}

	fn route(&self, category: Option<&Category>, overrides: &TableOverride) -> Result<TableRoute> {
		let route = routing::resolve_table(category, overrides, &self.cfg.tables)?;

		if route.source == RouteSource::Fallback
			&& let Some(Category::Other(name)) = category
		{
			tracing::warn!(
				category = %name,
				table = %route.table,
				"Unknown category; using the default table."
			);
		}

		Ok(route)
	}
}

/// The portal's read shape: the common columns are always present, with PascalCase and legacy
/// spellings folded in.
pub fn normalize_entity(entity: &TableEntity) -> Value {
	let props = &entity.properties;
	let mut out = Map::new();

	out.insert("partitionKey".to_string(), Value::String(entity.partition_key.clone()));
	out.insert("rowKey".to_string(), Value::String(entity.row_key.clone()));

	for (name, value) in [
		("category", crate::field(props, &["category", "Category"])),
		("title", crate::field(props, &["title", "Title", "projectName", "ProjectName"])),
		("description", crate::field(props, &["description", "Description"])),
		("owner", crate::field(props, &["owner", "Owner"])),
		(
			"savedAt",
			crate::field(props, &["savedAt"])
				.or_else(|| entity.timestamp.clone())
				.or_else(|| Some(entity.row_key.clone())),
		),
	] {
		out.insert(name.to_string(), Value::String(value.unwrap_or_default()));
	}

	for (name, value) in crate::entity_json(entity) {
		out.entry(name).or_insert(value);
	}

	Value::Object(out)
}
