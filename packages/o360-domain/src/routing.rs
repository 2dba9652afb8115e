//! Category to physical table routing.
//!
//! Every storage endpoint resolves its table through [`resolve_table`]; the category names are
//! matched case-insensitively.

use o360_config::Tables;

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Category {
	Projects,
	Suggestions,
	Troubleshooting,
	Calendar,
	Status,
	Notes,
	Comments,
	ActivityLog,
	Other(String),
}
impl Category {
	/// Returns `None` for a blank category.
	pub fn parse(raw: &str) -> Option<Self> {
		let trimmed = raw.trim();

		if trimmed.is_empty() {
			return None;
		}

		let category = match trimmed.to_ascii_lowercase().as_str() {
			"projects" => Self::Projects,
			"suggestions" => Self::Suggestions,
			"troubleshooting" => Self::Troubleshooting,
			"calendar" => Self::Calendar,
			"status" => Self::Status,
			"notes" => Self::Notes,
			"comments" => Self::Comments,
			"activitylog" => Self::ActivityLog,
			_ => Self::Other(trimmed.to_string()),
		};

		Some(category)
	}

	/// The table that owns this category, or `None` when the default table applies.
	pub fn table<'a>(&self, tables: &'a Tables) -> Option<&'a str> {
		let table = match self {
			Self::Projects => &tables.projects,
			Self::Suggestions => &tables.suggestions,
			Self::Troubleshooting => &tables.troubleshooting,
			Self::Calendar => &tables.calendar,
			Self::Status => &tables.status,
			Self::Notes | Self::Comments => &tables.notes,
			Self::ActivityLog => &tables.activity_log,
			Self::Other(_) => return None,
		};

		Some(table.as_str())
	}

	/// Categories stored under a shared partition instead of `UID_<uid>`.
	pub fn shared_partition(&self) -> bool {
		matches!(self, Self::Suggestions)
	}
}

/// Explicit table selection sent by older clients in any of three spellings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableOverride {
	pub table_name: Option<String>,
	pub pascal_table_name: Option<String>,
	pub target_table: Option<String>,
}
impl TableOverride {
	pub fn first(&self) -> Option<&str> {
		[&self.table_name, &self.pascal_table_name, &self.target_table]
			.into_iter()
			.filter_map(|value| value.as_deref())
			.map(str::trim)
			.find(|value| !value.is_empty())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteSource {
	Override,
	Category,
	Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRoute {
	pub table: String,
	pub source: RouteSource,
}

pub fn resolve_table(
	category: Option<&Category>,
	overrides: &TableOverride,
	tables: &Tables,
) -> Result<TableRoute> {
	if let Some(name) = overrides.first() {
		if !o360_config::is_valid_table_name(name) {
			return Err(Error::InvalidTableName { name: name.to_string() });
		}

		return Ok(TableRoute { table: name.to_string(), source: RouteSource::Override });
	}

	match category.and_then(|category| category.table(tables)) {
		Some(table) => Ok(TableRoute { table: table.to_string(), source: RouteSource::Category }),
		None => Ok(TableRoute { table: tables.default.clone(), source: RouteSource::Fallback }),
	}
}
