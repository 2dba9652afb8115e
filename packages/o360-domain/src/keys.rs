//! Partition and row key scheme shared by every table.

use time::{
	OffsetDateTime, UtcOffset, format_description::well_known::Rfc3339, macros::format_description,
};

use crate::{Error, Result, routing::Category};

pub const UID_PREFIX: &str = "UID_";
pub const SUGGESTIONS_PARTITION: &str = "Suggestions";
pub const CALENDAR_PARTITION: &str = "VsoCalendar";
pub const ACTIVITY_PARTITION: &str = "UserLog";

pub fn uid_partition(uid: &str) -> String {
	format!("{UID_PREFIX}{}", uid.trim())
}

pub fn uid_from_partition_key(partition_key: &str) -> Option<&str> {
	let prefix = partition_key.get(..UID_PREFIX.len())?;

	if !prefix.eq_ignore_ascii_case(UID_PREFIX) {
		return None;
	}

	let uid = &partition_key[UID_PREFIX.len()..];

	(!uid.is_empty()).then_some(uid)
}

/// Partition for a write or list in `category`.
///
/// Suggestions share one partition, calendar entries without a UID share another, everything
/// else is scoped to `UID_<uid>`.
pub fn partition_key_for(category: Option<&Category>, uid: Option<&str>) -> Result<String> {
	let uid = uid.map(str::trim).filter(|uid| !uid.is_empty());

	match (category, uid) {
		(Some(Category::Suggestions), _) => Ok(SUGGESTIONS_PARTITION.to_string()),
		(Some(Category::Calendar), None) => Ok(CALENDAR_PARTITION.to_string()),
		(_, Some(uid)) => Ok(uid_partition(uid)),
		(category, None) => Err(Error::MissingUid {
			category: category.map(category_label).unwrap_or_else(|| "(none)".to_string()),
		}),
	}
}

/// `2024-05-01T10:00:00.000Z`, the sortable row key form.
pub fn iso_timestamp(at: OffsetDateTime) -> String {
	let format =
		format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z");

	at.to_offset(UtcOffset::UTC).format(&format).unwrap_or_else(|_| at.unix_timestamp().to_string())
}

pub fn now_iso() -> String {
	iso_timestamp(OffsetDateTime::now_utc())
}

pub fn parse_timestamp(raw: &str) -> Result<OffsetDateTime> {
	OffsetDateTime::parse(raw.trim(), &Rfc3339)
		.map_err(|_| Error::InvalidTimestamp { value: raw.to_string() })
}

/// Caller row key, else the caller timestamp in ISO millisecond form, else now.
pub fn resolve_row_key(row_key: Option<&str>, timestamp: Option<&str>) -> Result<String> {
	if let Some(row_key) = row_key.map(str::trim).filter(|key| !key.is_empty()) {
		validate_key("rowKey", row_key)?;

		return Ok(row_key.to_string());
	}
	if let Some(timestamp) = timestamp.map(str::trim).filter(|ts| !ts.is_empty()) {
		return parse_timestamp(timestamp).map(iso_timestamp);
	}

	Ok(now_iso())
}

/// UIDs are exactly eleven ASCII digits.
pub fn is_valid_uid(uid: &str) -> bool {
	uid.len() == 11 && uid.bytes().all(|b| b.is_ascii_digit())
}

/// Rejects the characters Table Storage forbids in keys.
pub fn validate_key(field: &'static str, value: &str) -> Result<()> {
	if value.is_empty() {
		return Err(Error::InvalidKey { field, message: "must be non-empty.".to_string() });
	}
	if value.len() > 1024 {
		return Err(Error::InvalidKey { field, message: "must be at most 1 KiB.".to_string() });
	}
	if let Some(c) = value.chars().find(|c| matches!(c, '/' | '\\' | '#' | '?') || c.is_control())
	{
		return Err(Error::InvalidKey { field, message: format!("must not contain {c:?}.") });
	}

	Ok(())
}

fn category_label(category: &Category) -> String {
	match category {
		Category::Other(raw) => raw.clone(),
		known => format!("{known:?}"),
	}
}

#[cfg(test)]
mod tests {
	use time::macros::datetime;

	use super::*;

	#[test]
	fn partitions_follow_category() {
		let suggestions = Category::parse("suggestions");
		let calendar = Category::parse("Calendar");
		let notes = Category::parse("Notes");

		assert_eq!(
			partition_key_for(suggestions.as_ref(), Some("12345678901"))
				.expect("Failed to pick a partition."),
			"Suggestions"
		);
		assert_eq!(partition_key_for(calendar.as_ref(), None).unwrap(), "VsoCalendar");
		assert_eq!(partition_key_for(calendar.as_ref(), Some(" 42 ")).unwrap(), "UID_42");
		assert_eq!(partition_key_for(notes.as_ref(), Some("42")).unwrap(), "UID_42");
		assert_eq!(
			partition_key_for(notes.as_ref(), Some("  ")).unwrap_err(),
			Error::MissingUid { category: "Notes".to_string() }
		);
	}

	#[test]
	fn uid_prefix_is_case_insensitive() {
		assert_eq!(uid_from_partition_key("UID_123"), Some("123"));
		assert_eq!(uid_from_partition_key("uid_123"), Some("123"));
		assert_eq!(uid_from_partition_key("UID_"), None);
		assert_eq!(uid_from_partition_key("Suggestions"), None);
	}

	#[test]
	fn iso_timestamp_has_millis_and_z() {
		let at = datetime!(2024-05-01 12:00:00.5 +02:00);

		assert_eq!(iso_timestamp(at), "2024-05-01T10:00:00.500Z");
	}

	#[test]
	fn row_key_prefers_caller_value() {
		assert_eq!(resolve_row_key(Some(" abc "), Some("2024-01-01T00:00:00Z")).unwrap(), "abc");
		assert_eq!(
			resolve_row_key(None, Some("2024-01-01T00:00:00Z")).unwrap(),
			"2024-01-01T00:00:00.000Z"
		);
		assert!(matches!(
			resolve_row_key(None, Some("yesterday")),
			Err(Error::InvalidTimestamp { .. })
		));
		assert!(resolve_row_key(None, None).unwrap().ends_with('Z'));
	}

	#[test]
	fn keys_reject_forbidden_characters() {
		assert!(validate_key("rowKey", "a/b").is_err());
		assert!(validate_key("rowKey", "a#b").is_err());
		assert!(validate_key("rowKey", "2024-05-01T10:00:00.000Z").is_ok());
	}

	#[test]
	fn uid_must_be_eleven_digits() {
		assert!(is_valid_uid("12345678901"));
		assert!(!is_valid_uid("1234567890"));
		assert!(!is_valid_uid("1234567890a"));
	}
}
