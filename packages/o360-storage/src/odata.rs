//! OData literals, filters and entity addressing for the Table service REST API.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use crate::models::{Filter, PARTITION_KEY, ROW_KEY};

/// Everything except RFC 3986 unreserved characters.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');

/// A string literal with embedded single quotes doubled.
pub fn quote(value: &str) -> String {
	format!("'{}'", value.replace('\'', "''"))
}

pub fn render(filter: &Filter) -> String {
	match filter {
		Filter::PartitionEq(pk) => format!("{PARTITION_KEY} eq {}", quote(pk)),
		Filter::PropertyEq { name, value } => format!("{name} eq {}", quote(value)),
		Filter::And(parts) => join(parts, "and"),
		Filter::Or(parts) => join(parts, "or"),
	}
}

/// `(PartitionKey='pk',RowKey='rk')` with the key values percent encoded.
pub fn entity_path(table: &str, partition_key: &str, row_key: &str) -> String {
	format!(
		"/{table}({PARTITION_KEY}='{}',{ROW_KEY}='{}')",
		encode(&partition_key.replace('\'', "''")),
		encode(&row_key.replace('\'', "''"))
	)
}

pub fn encode(value: &str) -> String {
	utf8_percent_encode(value, COMPONENT).to_string()
}

fn join(parts: &[Filter], op: &str) -> String {
	match parts {
		[] => String::new(),
		[single] => render(single),
		_ => parts
			.iter()
			.map(|part| format!("({})", render(part)))
			.collect::<Vec<_>>()
			.join(&format!(" {op} ")),
	}
}
