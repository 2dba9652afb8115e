pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Http(#[from] reqwest::Error),
	#[error(transparent)]
	Json(#[from] serde_json::Error),
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),
	#[error("Not found: {0}")]
	NotFound(String),
	#[error("Conflict: {0}")]
	Conflict(String),
	#[error("Authentication failed: {message}")]
	Auth { message: String },
	#[error("Storage is misconfigured: {message}")]
	Config { message: String },
	#[error("Table service returned {status}: {message}")]
	Status { status: u16, message: String },
}
