use serde_json::{Map, Value};

use crate::{Error, Result};

pub const PARTITION_KEY: &str = "PartitionKey";
pub const ROW_KEY: &str = "RowKey";
pub const TIMESTAMP: &str = "Timestamp";

/// One Table Storage row. `properties` never contains the system columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableEntity {
	pub partition_key: String,
	pub row_key: String,
	pub etag: Option<String>,
	pub timestamp: Option<String>,
	pub properties: Map<String, Value>,
}
impl TableEntity {
	pub fn new(partition_key: impl Into<String>, row_key: impl Into<String>) -> Self {
		Self {
			partition_key: partition_key.into(),
			row_key: row_key.into(),
			etag: None,
			timestamp: None,
			properties: Map::new(),
		}
	}

	pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
		self.set(name, value);

		self
	}

	/// Stores `value` as a table property. Nested values become JSON text and `null` removes the
	/// property.
	pub fn set(&mut self, name: &str, value: impl Into<Value>) {
		match scalar(value.into()) {
			Some(value) => {
				self.properties.insert(name.to_string(), value);
			},
			None => {
				self.properties.remove(name);
			},
		}
	}

	pub fn get_str(&self, name: &str) -> Option<&str> {
		self.properties.get(name).and_then(Value::as_str)
	}

	/// Request body for inserts and updates.
	pub fn to_wire(&self) -> Value {
		let mut out = Map::with_capacity(self.properties.len() + 2);

		out.insert(PARTITION_KEY.to_string(), Value::String(self.partition_key.clone()));
		out.insert(ROW_KEY.to_string(), Value::String(self.row_key.clone()));

		for (name, value) in &self.properties {
			if is_system_property(name) {
				continue;
			}
			if let Some(value) = scalar(value.clone()) {
				out.insert(name.clone(), value);
			}
		}

		Value::Object(out)
	}

	/// Parses a JSON entity as returned by the table service, dropping OData annotations.
	pub fn from_wire(value: Value) -> Result<Self> {
		let Value::Object(mut map) = value else {
			return Err(Error::InvalidArgument("Entity payload must be a JSON object.".to_string()));
		};
		let etag = map.get("odata.etag").and_then(Value::as_str).map(str::to_string);
		let partition_key = take_string(&mut map, PARTITION_KEY)?;
		let row_key = take_string(&mut map, ROW_KEY)?;
		let timestamp = map.remove(TIMESTAMP).and_then(|v| v.as_str().map(str::to_string));

		map.retain(|name, _| !name.starts_with("odata.") && !name.contains("@odata."));

		Ok(Self { partition_key, row_key, etag, timestamp, properties: map })
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertMode {
	Merge,
	Replace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
	ManagedIdentity,
	ConnectionString,
	Memory,
}
impl AuthMode {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::ManagedIdentity => "ManagedIdentity",
			Self::ConnectionString => "ConnectionString",
			Self::Memory => "Memory",
		}
	}
}

/// Structured query filter, rendered to OData for the service and evaluated directly in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
	PartitionEq(String),
	PropertyEq { name: String, value: String },
	And(Vec<Filter>),
	Or(Vec<Filter>),
}
impl Filter {
	pub fn partition(partition_key: impl Into<String>) -> Self {
		Self::PartitionEq(partition_key.into())
	}

	pub fn property(name: impl Into<String>, value: impl Into<String>) -> Self {
		Self::PropertyEq { name: name.into(), value: value.into() }
	}

	pub fn matches(&self, entity: &TableEntity) -> bool {
		match self {
			Self::PartitionEq(pk) => entity.partition_key == *pk,
			Self::PropertyEq { name, value } => match name.as_str() {
				PARTITION_KEY => entity.partition_key == *value,
				ROW_KEY => entity.row_key == *value,
				_ => entity.get_str(name) == Some(value.as_str()),
			},
			Self::And(parts) => parts.iter().all(|part| part.matches(entity)),
			Self::Or(parts) => parts.iter().any(|part| part.matches(entity)),
		}
	}
}

pub fn is_system_property(name: &str) -> bool {
	matches!(name, PARTITION_KEY | ROW_KEY | TIMESTAMP) || name.starts_with("odata.")
}

fn scalar(value: Value) -> Option<Value> {
	match value {
		Value::Null => None,
		Value::Array(_) | Value::Object(_) => Some(Value::String(value.to_string())),
		scalar => Some(scalar),
	}
}

fn take_string(map: &mut Map<String, Value>, key: &str) -> Result<String> {
	match map.remove(key) {
		Some(Value::String(value)) => Ok(value),
		_ => Err(Error::InvalidArgument(format!("Entity payload is missing {key}."))),
	}
}
