mod error;
mod types;

pub use error::{Error, Result};
pub use types::{Config, Cors, LogicApps, Service, Storage, Summary, Tables};

use std::{env, fs, net::SocketAddr, path::Path};

pub const STORAGE_BACKEND_AZURE: &str = "azure";
pub const STORAGE_BACKEND_MEMORY: &str = "memory";

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;
	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	apply_env_overrides(&mut cfg, |key| env::var(key).ok())?;
	normalize(&mut cfg);
	validate(&cfg)?;

	Ok(cfg)
}

/// Applies the Functions-era environment variables on top of the file config.
///
/// Blank values are ignored so an empty app setting never erases a configured value.
pub fn apply_env_overrides<F>(cfg: &mut Config, lookup: F) -> Result<()>
where
	F: Fn(&str) -> Option<String>,
{
	let get = |key: &str| {
		lookup(key).map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
	};

	if let Some(url) = get("TABLES_ACCOUNT_URL") {
		cfg.storage.account_url = Some(url);
	}
	if let Some(conn) = get("TABLES_CONNECTION_STRING") {
		cfg.storage.connection_string = Some(conn);
	} else if cfg.storage.connection_string.is_none()
		&& let Some(conn) = get("AzureWebJobsStorage")
	{
		cfg.storage.connection_string = Some(conn);
	}
	if let Some(raw) = get("TABLES_ALLOW_CONNECTION_STRING") {
		cfg.storage.allow_connection_string = match raw.to_ascii_lowercase().as_str() {
			"1" | "true" => true,
			"0" | "false" => false,
			_ =>
				return Err(Error::Environment {
					key: "TABLES_ALLOW_CONNECTION_STRING".to_string(),
					value: raw,
				}),
		};
	}
	if let Some(client_id) = get("AZURE_CLIENT_ID") {
		cfg.storage.managed_identity_client_id = Some(client_id);
	}

	for (key, slot) in [
		("TABLES_TABLE_NAME", &mut cfg.tables.default),
		("TABLES_TABLE_NAME_PROJECTS", &mut cfg.tables.projects),
		("TABLES_TABLE_NAME_VSO", &mut cfg.tables.calendar),
		("TABLES_TABLE_NAME_TROUBLESHOOTING", &mut cfg.tables.troubleshooting),
		("TABLES_TABLE_NAME_SUGGESTIONS", &mut cfg.tables.suggestions),
		("TABLES_TABLE_NAME_STATUS", &mut cfg.tables.status),
		("TABLES_TABLE_NAME_NOTES", &mut cfg.tables.notes),
		("TABLE_NAME_LOG", &mut cfg.tables.activity_log),
	] {
		if let Some(value) = get(key) {
			*slot = value;
		}
	}

	if let Some(url) = get("LOGICAPP_UID_URL") {
		cfg.logic_apps.uid_url = Some(url);
	}
	if let Some(url) = get("LOGICAPP_VSO_URL") {
		cfg.logic_apps.vso_url = Some(url);
	}
	if let Some(url) = get("VSO_LOGICAPP_URL") {
		cfg.logic_apps.vso_email_url = Some(url);
	}

	let endpoint = get("AZURE_OPENAI_ENDPOINT");
	let deployment = get("AZURE_OPENAI_DEPLOYMENT");
	let api_key = get("AZURE_OPENAI_API_KEY");
	let api_version = get("AZURE_OPENAI_API_VERSION");

	match cfg.summary.as_mut() {
		Some(summary) => {
			if let Some(endpoint) = endpoint {
				summary.endpoint = endpoint;
			}
			if let Some(deployment) = deployment {
				summary.deployment = deployment;
			}
			if let Some(api_key) = api_key {
				summary.api_key = api_key;
			}
			if let Some(api_version) = api_version {
				summary.api_version = api_version;
			}
		},
		None =>
			if let (Some(endpoint), Some(deployment), Some(api_key)) =
				(endpoint, deployment, api_key)
			{
				let mut summary = Summary::new(endpoint, deployment, api_key);

				if let Some(api_version) = api_version {
					summary.api_version = api_version;
				}

				cfg.summary = Some(summary);
			},
	}

	Ok(())
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}
	if cfg.service.http_bind.parse::<SocketAddr>().is_err() {
		return Err(Error::Validation {
			message: "service.http_bind must be a socket address such as 127.0.0.1:7071."
				.to_string(),
		});
	}
	if cfg.cors.allow_origin.trim().is_empty() {
		return Err(Error::Validation {
			message: "cors.allow_origin must be non-empty.".to_string(),
		});
	}
	if cfg.cors.allow_credentials && cfg.cors.allow_origin.trim() == "*" {
		return Err(Error::Validation {
			message: "cors.allow_credentials requires a fixed cors.allow_origin.".to_string(),
		});
	}

	for (label, name) in cfg.tables.labeled() {
		if !is_valid_table_name(name) {
			return Err(Error::Validation {
				message: format!(
					"{label} must be 3-63 alphanumeric characters starting with a letter."
				),
			});
		}
	}

	match cfg.storage.backend.as_str() {
		STORAGE_BACKEND_MEMORY => {},
		STORAGE_BACKEND_AZURE => validate_azure_storage(&cfg.storage)?,
		_ =>
			return Err(Error::Validation {
				message: "storage.backend must be one of azure or memory.".to_string(),
			}),
	}

	if cfg.storage.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "storage.timeout_ms must be greater than zero.".to_string(),
		});
	}

	for (label, url) in [
		("logic_apps.uid_url", &cfg.logic_apps.uid_url),
		("logic_apps.vso_url", &cfg.logic_apps.vso_url),
		("logic_apps.vso_email_url", &cfg.logic_apps.vso_email_url),
	] {
		if let Some(url) = url
			&& !is_http_url(url)
		{
			return Err(Error::Validation {
				message: format!("{label} must start with http:// or https://."),
			});
		}
	}

	if let Some(summary) = cfg.summary.as_ref() {
		for (label, value) in [
			("summary.endpoint", &summary.endpoint),
			("summary.deployment", &summary.deployment),
			("summary.api_key", &summary.api_key),
			("summary.api_version", &summary.api_version),
		] {
			if value.trim().is_empty() {
				return Err(Error::Validation { message: format!("{label} must be non-empty.") });
			}
		}

		if !is_http_url(&summary.endpoint) {
			return Err(Error::Validation {
				message: "summary.endpoint must start with http:// or https://.".to_string(),
			});
		}
		if !summary.temperature.is_finite() || !(0.0..=2.0).contains(&summary.temperature) {
			return Err(Error::Validation {
				message: "summary.temperature must be in the range 0.0-2.0.".to_string(),
			});
		}
		if summary.max_tokens == 0 {
			return Err(Error::Validation {
				message: "summary.max_tokens must be greater than zero.".to_string(),
			});
		}
	}

	Ok(())
}

/// Table Storage names: 3-63 ASCII alphanumerics, first character a letter.
pub fn is_valid_table_name(name: &str) -> bool {
	let len = name.len();

	(3..=63).contains(&len)
		&& name.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
		&& name.chars().all(|c| c.is_ascii_alphanumeric())
}

fn validate_azure_storage(storage: &Storage) -> Result<()> {
	let managed_identity = storage
		.account_url
		.as_deref()
		.is_some_and(|url| url.to_ascii_lowercase().starts_with("https://"));

	if managed_identity {
		return Ok(());
	}
	if storage.connection_string.is_none() {
		return Err(Error::Validation {
			message: "storage requires an https:// account_url or a connection_string.".to_string(),
		});
	}
	if !storage.allow_connection_string {
		return Err(Error::Validation {
			message:
				"Managed Identity is not configured and storage.allow_connection_string is false."
					.to_string(),
		});
	}

	Ok(())
}

fn is_http_url(url: &str) -> bool {
	let lower = url.trim().to_ascii_lowercase();

	lower.starts_with("https://") || lower.starts_with("http://")
}

fn normalize(cfg: &mut Config) {
	for slot in [
		&mut cfg.storage.account_url,
		&mut cfg.storage.connection_string,
		&mut cfg.storage.managed_identity_client_id,
		&mut cfg.logic_apps.uid_url,
		&mut cfg.logic_apps.vso_url,
		&mut cfg.logic_apps.vso_email_url,
	] {
		if slot.as_deref().map(|value| value.trim().is_empty()).unwrap_or(false) {
			*slot = None;
		}
	}

	cfg.cors.allow_origin = cfg.cors.allow_origin.trim().to_string();
}
