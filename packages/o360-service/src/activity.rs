//! User activity log.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::{
	Date, PrimitiveDateTime, Time,
	macros::{format_description, time},
};
use uuid::Uuid;

use o360_domain::keys;
use o360_storage::models::{Filter, TableEntity};

use crate::{Error, O360Service, Result};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogActivityRequest {
	#[serde(default)]
	pub email: Option<String>,
	#[serde(default)]
	pub action: Option<String>,
	#[serde(default)]
	pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListActivityRequest {
	pub limit: Option<String>,
	#[serde(rename = "dateFrom")]
	pub date_from: Option<String>,
	#[serde(rename = "dateTo")]
	pub date_to: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityListResponse {
	pub ok: bool,
	pub items: Vec<Value>,
}

impl O360Service {
	pub async fn log_activity(&self, req: LogActivityRequest) -> Result<()> {
		let email = req.email.as_deref().map(str::trim).unwrap_or_default();
		let action = req.action.as_deref().map(str::trim).unwrap_or_default();

		if email.is_empty() || action.is_empty() {
			return Err(Error::validation("Missing email or action"));
		}

		let table = &self.cfg.tables.activity_log;
		let metadata = match req.metadata {
			None | Some(Value::Null) => String::new(),
			Some(value) => value.to_string(),
		};
		let entity = TableEntity::new(keys::ACTIVITY_PARTITION, Uuid::new_v4().to_string())
			.with("email", email)
			.with("action", action)
			.with("timestamp", keys::now_iso())
			.with("metadata", metadata);

		self.ensure_table(table).await?;
		self.store.insert(table, &entity).await?;

		tracing::debug!(%table, action, "Activity logged.");

		Ok(())
	}

	/// Newest first. Date bounds are inclusive; a bare `dateTo` date covers that whole day.
	pub async fn list_activity(&self, req: ListActivityRequest) -> Result<ActivityListResponse> {
		let from = req
			.date_from
			.as_deref()
			.filter(|raw| !raw.trim().is_empty())
			.map(|raw| bound("dateFrom", raw, false))
			.transpose()?;
		let to = req
			.date_to
			.as_deref()
			.filter(|raw| !raw.trim().is_empty())
			.map(|raw| bound("dateTo", raw, true))
			.transpose()?;
		let limit = req.limit.as_deref().and_then(parse_limit);
		let table = &self.cfg.tables.activity_log;

		self.ensure_table(table).await?;

		let rows =
			self.store.query(table, Some(&Filter::partition(keys::ACTIVITY_PARTITION))).await?;
		let mut rows = rows
			.into_iter()
			.map(|row| (sort_key(&row), row))
			.filter(|(at, _)| from.as_ref().is_none_or(|from| at >= from))
			.filter(|(at, _)| to.as_ref().is_none_or(|to| at <= to))
			.collect::<Vec<_>>();

		rows.sort_by(|a, b| b.0.cmp(&a.0));

		if let Some(limit) = limit {
			rows.truncate(limit);
		}

		let items =
			rows.iter().map(|(_, row)| Value::Object(crate::entity_json(row))).collect::<Vec<_>>();

		Ok(ActivityListResponse { ok: true, items })
	}
}

fn sort_key(row: &TableEntity) -> String {
	row.get_str("timestamp")
		.map(str::to_string)
		.or_else(|| row.timestamp.clone())
		.unwrap_or_default()
}

/// Leading digits of `raw`, so `"10abc"` reads as 10. Zero, negative and digit-less values mean
/// no limit.
fn parse_limit(raw: &str) -> Option<usize> {
	let raw = raw.trim_start();
	let raw = raw.strip_prefix('+').unwrap_or(raw);
	let digits = raw.find(|c: char| !c.is_ascii_digit()).map_or(raw, |end| &raw[..end]);

	if digits.is_empty() {
		return None;
	}

	let limit = digits.parse::<usize>().unwrap_or(usize::MAX);

	(limit > 0).then_some(limit)
}

/// Normalizes a query bound to the stored ISO form so bounds compare as strings.
fn bound(name: &str, raw: &str, end_of_day: bool) -> Result<String> {
	if let Ok(at) = keys::parse_timestamp(raw) {
		return Ok(keys::iso_timestamp(at));
	}

	let date = Date::parse(raw.trim(), format_description!("[year]-[month]-[day]"))
		.map_err(|_| Error::validation(format!("Invalid {name}: {raw}")))?;
	let at = if end_of_day { time!(23:59:59.999) } else { Time::MIDNIGHT };

	Ok(keys::iso_timestamp(PrimitiveDateTime::new(date, at).assume_utc()))
}
