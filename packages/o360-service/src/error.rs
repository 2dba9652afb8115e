use serde_json::Value;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("{message}")]
	Validation { message: String },
	#[error("{message}")]
	NotFound { message: String },
	#[error("{message}")]
	Conflict { message: String },
	/// `status` is the status the caller should see, not necessarily the upstream one.
	#[error("{message}")]
	Upstream { status: u16, message: String, details: Option<Value> },
	#[error("{message}")]
	Config { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
}
impl Error {
	pub(crate) fn validation(message: impl Into<String>) -> Self {
		Self::Validation { message: message.into() }
	}
}

impl From<o360_storage::Error> for Error {
	fn from(err: o360_storage::Error) -> Self {
		match err {
			o360_storage::Error::InvalidArgument(message) => Self::Validation { message },
			o360_storage::Error::NotFound(message) => Self::NotFound { message },
			o360_storage::Error::Conflict(message) => Self::Conflict { message },
			o360_storage::Error::Config { message } => Self::Config { message },
			inner @ (o360_storage::Error::Http(_)
			| o360_storage::Error::Json(_)
			| o360_storage::Error::Auth { .. }
			| o360_storage::Error::Status { .. }) => Self::Storage { message: inner.to_string() },
		}
	}
}

impl From<o360_domain::Error> for Error {
	fn from(err: o360_domain::Error) -> Self {
		Self::Validation { message: err.to_string() }
	}
}
