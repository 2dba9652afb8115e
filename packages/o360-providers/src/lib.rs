pub mod chat;
pub mod logic_app;

use std::time::Duration;

use color_eyre::Result;
use reqwest::{
	Client,
	header::{HeaderMap, HeaderName},
};

/// Azure OpenAI authenticates with an `api-key` header rather than a bearer token.
pub fn api_key_headers(api_key: &str) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	headers.insert(HeaderName::from_static("api-key"), api_key.parse()?);

	Ok(headers)
}

/// `None` leaves the client without a timeout.
pub fn client(timeout: Option<Duration>) -> Result<Client> {
	let mut builder = Client::builder();

	if let Some(timeout) = timeout {
		builder = builder.timeout(timeout);
	}

	Ok(builder.build()?)
}
