//! Table service credentials: account keys from connection strings and Managed Identity tokens.

use std::env;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde_json::Value;
use sha2::Sha256;
use time::{OffsetDateTime, macros::format_description};
use tokio::sync::Mutex;

use crate::{Error, Result};

pub const STORAGE_RESOURCE: &str = "https://storage.azure.com/";
pub const DEV_ACCOUNT: &str = "devstoreaccount1";
pub const DEV_ACCOUNT_KEY: &str =
	"Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";
pub const DEV_TABLE_ENDPOINT: &str = "http://127.0.0.1:10002/devstoreaccount1";

const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const REFRESH_MARGIN_SECS: i64 = 300;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionString {
	pub account_name: String,
	pub account_key: String,
	pub table_endpoint: String,
}
impl ConnectionString {
	pub fn parse(raw: &str) -> Result<Self> {
		let mut account_name = None;
		let mut account_key = None;
		let mut table_endpoint = None;
		let mut protocol = "https".to_string();
		let mut suffix = "core.windows.net".to_string();

		for part in raw.split(';').map(str::trim).filter(|part| !part.is_empty()) {
			let Some((key, value)) = part.split_once('=') else {
				continue;
			};
			let value = value.trim();

			match key.trim().to_ascii_lowercase().as_str() {
				"usedevelopmentstorage" if value.eq_ignore_ascii_case("true") =>
					return Ok(Self::development()),
				"accountname" => account_name = Some(value.to_string()),
				"accountkey" => account_key = Some(value.to_string()),
				"tableendpoint" => table_endpoint = Some(value.trim_end_matches('/').to_string()),
				"defaultendpointsprotocol" => protocol = value.to_string(),
				"endpointsuffix" => suffix = value.to_string(),
				_ => {},
			}
		}

		let (Some(account_name), Some(account_key)) = (account_name, account_key) else {
			return Err(Error::Config {
				message: "Connection string must contain AccountName and AccountKey.".to_string(),
			});
		};
		let table_endpoint = table_endpoint
			.unwrap_or_else(|| format!("{protocol}://{account_name}.table.{suffix}"));

		Ok(Self { account_name, account_key, table_endpoint })
	}

	pub fn development() -> Self {
		Self {
			account_name: DEV_ACCOUNT.to_string(),
			account_key: DEV_ACCOUNT_KEY.to_string(),
			table_endpoint: DEV_TABLE_ENDPOINT.to_string(),
		}
	}
}

/// `SharedKeyLite` request signing for the Table service.
pub struct SharedKey {
	account: String,
	key: Vec<u8>,
}
impl SharedKey {
	pub fn new(account: &str, key_base64: &str) -> Result<Self> {
		let key = STANDARD.decode(key_base64.trim()).map_err(|err| Error::Config {
			message: format!("Account key is not valid base64: {err}."),
		})?;

		Ok(Self { account: account.to_string(), key })
	}

	/// `canonical_path` is the encoded URL path, including any emulator account segment.
	pub fn string_to_sign(&self, date: &str, canonical_path: &str) -> String {
		format!("{date}\n/{}{canonical_path}", self.account)
	}

	pub fn authorization(&self, date: &str, canonical_path: &str) -> Result<String> {
		let mut mac = HmacSha256::new_from_slice(&self.key)
			.map_err(|err| Error::Auth { message: err.to_string() })?;

		mac.update(self.string_to_sign(date, canonical_path).as_bytes());

		let signature = STANDARD.encode(mac.finalize().into_bytes());

		Ok(format!("SharedKeyLite {}:{signature}", self.account))
	}
}

/// `x-ms-date` form, e.g. `Wed, 01 May 2024 10:00:00 GMT`.
pub fn rfc1123(at: OffsetDateTime) -> String {
	let format = format_description!(
		"[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
	);

	at.to_offset(time::UtcOffset::UTC).format(&format).unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenEndpoint {
	AppService { endpoint: String, secret: String },
	Imds,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
	pub token: String,
	pub expires_on: i64,
}

/// Bearer tokens from the hosting environment's Managed Identity endpoint, cached until five
/// minutes before expiry.
pub struct ManagedIdentity {
	http: Client,
	client_id: Option<String>,
	endpoint: TokenEndpoint,
	cached: Mutex<Option<AccessToken>>,
}
impl ManagedIdentity {
	pub fn from_env(http: Client, client_id: Option<String>) -> Self {
		let endpoint = match (env::var("IDENTITY_ENDPOINT"), env::var("IDENTITY_HEADER")) {
			(Ok(endpoint), Ok(secret)) if !endpoint.trim().is_empty() =>
				TokenEndpoint::AppService { endpoint, secret },
			_ => TokenEndpoint::Imds,
		};

		Self { http, client_id, endpoint, cached: Mutex::new(None) }
	}

	pub async fn token(&self) -> Result<String> {
		let mut cached = self.cached.lock().await;
		let now = OffsetDateTime::now_utc().unix_timestamp();

		if let Some(token) = cached.as_ref()
			&& token.expires_on - REFRESH_MARGIN_SECS > now
		{
			return Ok(token.token.clone());
		}

		let fresh = self.fetch(now).await?;
		let token = fresh.token.clone();

		tracing::debug!(expires_on = fresh.expires_on, "Managed Identity token refreshed.");

		*cached = Some(fresh);

		Ok(token)
	}

	async fn fetch(&self, now: i64) -> Result<AccessToken> {
		let mut query = vec![("resource", STORAGE_RESOURCE.to_string())];

		if let Some(client_id) = self.client_id.as_ref() {
			query.push(("client_id", client_id.clone()));
		}

		let request = match &self.endpoint {
			TokenEndpoint::AppService { endpoint, secret } => {
				query.push(("api-version", "2019-08-01".to_string()));

				self.http.get(endpoint).header("X-IDENTITY-HEADER", secret)
			},
			TokenEndpoint::Imds => {
				query.push(("api-version", "2018-02-01".to_string()));

				self.http.get(IMDS_ENDPOINT).header("Metadata", "true")
			},
		};
		let res = request.query(&query).send().await?;
		let status = res.status();
		let body = res.text().await?;

		if !status.is_success() {
			return Err(Error::Auth {
				message: format!("Token endpoint returned {}: {body}", status.as_u16()),
			});
		}

		parse_token_response(&serde_json::from_str(&body)?, now)
	}
}

pub fn parse_token_response(json: &Value, now: i64) -> Result<AccessToken> {
	let token = json
		.get("access_token")
		.and_then(Value::as_str)
		.filter(|token| !token.is_empty())
		.ok_or_else(|| Error::Auth {
			message: "Token response is missing access_token.".to_string(),
		})?;
	let expires_on = seconds(json.get("expires_on"))
		.or_else(|| seconds(json.get("expires_in")).map(|secs| now + secs))
		.ok_or_else(|| Error::Auth { message: "Token response has no expiry.".to_string() })?;

	Ok(AccessToken { token: token.to_string(), expires_on })
}

fn seconds(value: Option<&Value>) -> Option<i64> {
	match value? {
		Value::Number(number) => number.as_i64(),
		Value::String(text) => text.trim().parse().ok(),
		_ => None,
	}
}
