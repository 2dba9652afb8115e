//! Logic App HTTP triggers. Responses are handed back untouched so callers can mirror the
//! upstream status and body.

use std::time::Duration;

use color_eyre::Result;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::{Response, header::CONTENT_TYPE};
use serde_json::Value;

/// The characters `encodeURIComponent` leaves alone.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
	.remove(b'-')
	.remove(b'_')
	.remove(b'.')
	.remove(b'!')
	.remove(b'~')
	.remove(b'*')
	.remove(b'\'')
	.remove(b'(')
	.remove(b')');

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamResponse {
	pub status: u16,
	pub content_type: Option<String>,
	pub body: String,
}
impl UpstreamResponse {
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	pub fn is_json(&self) -> bool {
		self.content_type
			.as_deref()
			.is_some_and(|content_type| content_type.to_ascii_lowercase().contains("json"))
	}

	/// The body parsed as JSON, or as a JSON string when it is not valid JSON.
	pub fn body_value(&self) -> Value {
		serde_json::from_str(&self.body).unwrap_or_else(|_| Value::String(self.body.clone()))
	}

	async fn read(res: Response) -> Result<Self> {
		let status = res.status().as_u16();
		let content_type = res
			.headers()
			.get(CONTENT_TYPE)
			.and_then(|value| value.to_str().ok())
			.map(str::to_string);
		let body = res.text().await?;

		Ok(Self { status, content_type, body })
	}
}

/// `<base_url>&UID=<uid>`; the trigger URL already carries its signature query.
pub fn uid_lookup_url(base_url: &str, uid: &str) -> String {
	let separator = if base_url.contains('?') { '&' } else { '?' };

	format!("{base_url}{separator}UID={}", utf8_percent_encode(uid, URI_COMPONENT))
}

pub async fn lookup_uid(
	base_url: &str,
	uid: &str,
	timeout: Option<Duration>,
) -> Result<UpstreamResponse> {
	let url = uid_lookup_url(base_url, uid);
	let client = crate::client(timeout)?;

	tracing::debug!(uid, "Calling UID lookup Logic App.");

	let res = client.get(url).send().await?;

	UpstreamResponse::read(res).await
}

pub async fn post_json(
	url: &str,
	body: &Value,
	timeout: Option<Duration>,
) -> Result<UpstreamResponse> {
	let client = crate::client(timeout)?;
	let res = client.post(url).json(body).send().await?;
	let upstream = UpstreamResponse::read(res).await?;

	tracing::debug!(status = upstream.status, "Logic App responded.");

	Ok(upstream)
}
