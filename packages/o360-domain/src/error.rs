pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
	#[error("Missing UID for category {category}.")]
	MissingUid { category: String },
	#[error("Invalid table name {name:?}.")]
	InvalidTableName { name: String },
	#[error("Invalid {field}: {message}")]
	InvalidKey { field: &'static str, message: String },
	#[error("Invalid timestamp {value:?}.")]
	InvalidTimestamp { value: String },
}
