//! Per-user project records, partitioned by the signed-in user's e-mail.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use time::OffsetDateTime;

use o360_domain::keys;
use o360_storage::models::{Filter, TableEntity, UpsertMode};

use crate::{Error, O360Service, Result};

pub const ANONYMOUS_USER: &str = "anonymous@example.com";

#[derive(Debug, Deserialize)]
struct ClientPrincipal {
	#[serde(rename = "userDetails")]
	user_details: Option<String>,
}

/// The user named by an App Service `x-ms-client-principal` header, lower-cased.
///
/// Missing or unreadable headers resolve to [`ANONYMOUS_USER`].
pub fn principal_email(header: Option<&str>) -> String {
	header
		.and_then(|raw| STANDARD.decode(raw.trim()).ok())
		.and_then(|bytes| serde_json::from_slice::<ClientPrincipal>(&bytes).ok())
		.and_then(|principal| principal.user_details)
		.map(|user| user.trim().to_lowercase())
		.filter(|user| !user.is_empty())
		.unwrap_or_else(|| ANONYMOUS_USER.to_string())
}

impl O360Service {
	pub async fn list_projects(&self, user: &str) -> Result<Vec<Value>> {
		let table = &self.cfg.tables.user_projects;

		self.ensure_table(table).await?;

		let rows = self.store.query(table, Some(&Filter::partition(user))).await?;

		Ok(rows.iter().map(|row| Value::Object(crate::entity_json(row))).collect())
	}

	/// Fails with [`Error::Conflict`] when the user already has a project with this id.
	pub async fn create_project(&self, user: &str, body: Map<String, Value>) -> Result<Value> {
		let table = &self.cfg.tables.user_projects;
		let id = crate::field(&body, &["id"]).unwrap_or_else(|| {
			(OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000).to_string()
		});

		keys::validate_key("id", &id)?;

		let name = crate::field(&body, &["name"]).unwrap_or_else(|| "Untitled".to_string());
		let data = body.get("data").filter(|data| !data.is_null()).cloned().unwrap_or(json!({}));
		let entity = TableEntity::new(user, id)
			.with("Name", name)
			.with("CreatedAt", keys::now_iso())
			.with("CreatedByEmail", user)
			.with("Data", data.to_string());

		self.ensure_table(table).await?;

		let saved = self.store.insert(table, &entity).await.map_err(|err| match err {
			o360_storage::Error::Conflict(_) =>
				Error::Conflict { message: format!("Project {} already exists.", entity.row_key) },
			other => other.into(),
		})?;

		tracing::info!(%user, id = %saved.row_key, "Project created.");

		Ok(Value::Object(crate::entity_json(&saved)))
	}

	/// Replaces an existing project with its stored fields overlaid by `body`.
	pub async fn replace_project(&self, user: &str, body: Map<String, Value>) -> Result<Value> {
		let table = &self.cfg.tables.user_projects;
		let Some(id) = crate::field(&body, &["id"]) else {
			return Err(Error::validation("Missing id"));
		};

		keys::validate_key("id", &id)?;
		self.ensure_table(table).await?;

		let Some(mut entity) = self.store.get(table, user, &id).await? else {
			return Err(Error::NotFound { message: format!("Project {id} not found.") });
		};
		let etag = entity.etag.take();

		for (name, value) in body {
			if matches!(name.as_str(), "partitionKey" | "rowKey" | "etag")
				|| o360_storage::models::is_system_property(&name)
			{
				continue;
			}

			entity.set(&name, value);
		}

		let saved = self.store.upsert(table, &entity, UpsertMode::Replace, etag.as_deref()).await?;

		Ok(Value::Object(crate::entity_json(&saved)))
	}

	pub async fn delete_project(&self, user: &str, id: Option<&str>) -> Result<()> {
		let table = &self.cfg.tables.user_projects;
		let Some(id) = id.map(str::trim).filter(|id| !id.is_empty()) else {
			return Err(Error::validation("Missing id"));
		};

		keys::validate_key("id", id)?;
		self.ensure_table(table).await?;
		self.store.delete(table, user, id, None).await.map_err(|err| match err {
			o360_storage::Error::NotFound(_) =>
				Error::NotFound { message: format!("Project {id} not found.") },
			other => other.into(),
		})?;

		Ok(())
	}
}
