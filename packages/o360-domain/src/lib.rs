pub mod keys;
pub mod lines;
pub mod mgfx;
pub mod routing;
pub mod scope;
pub mod summary;

mod error;

pub use error::{Error, Result};

use serde_json::Value;

/// String form of a loosely typed JSON field, mirroring how the portal renders values.
pub fn value_text(value: &Value) -> String {
	match value {
		Value::Null => String::new(),
		Value::String(text) => text.clone(),
		Value::Bool(flag) => flag.to_string(),
		Value::Number(number) => number.to_string(),
		Value::Array(_) | Value::Object(_) => value.to_string(),
	}
}

/// First non-blank text among `keys`, trimmed.
pub fn first_text(value: &Value, keys: &[&str]) -> Option<String> {
	keys.iter()
		.filter_map(|key| value.get(*key))
		.map(|field| value_text(field).trim().to_string())
		.find(|text| !text.is_empty())
}
