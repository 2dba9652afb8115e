use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	#[serde(default)]
	pub cors: Cors,
	pub storage: Storage,
	#[serde(default)]
	pub tables: Tables,
	#[serde(default)]
	pub logic_apps: LogicApps,
	pub summary: Option<Summary>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub http_bind: String,
	#[serde(default = "default_log_level")]
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Cors {
	/// "*" or a single fixed origin such as "https://optical360.net".
	pub allow_origin: String,
	/// Only honoured for a fixed origin; browsers reject credentials with "*".
	pub allow_credentials: bool,
}
impl Default for Cors {
	fn default() -> Self {
		Self { allow_origin: "*".to_string(), allow_credentials: false }
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
	/// One of "azure" or "memory".
	pub backend: String,
	/// When it starts with "https://" the store authenticates with Managed Identity.
	pub account_url: Option<String>,
	pub connection_string: Option<String>,
	#[serde(default)]
	pub allow_connection_string: bool,
	pub managed_identity_client_id: Option<String>,
	#[serde(default = "default_true")]
	pub ensure_tables: bool,
	#[serde(default = "default_storage_timeout_ms")]
	pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Tables {
	pub default: String,
	pub projects: String,
	pub suggestions: String,
	pub troubleshooting: String,
	pub calendar: String,
	pub status: String,
	pub notes: String,
	pub activity_log: String,
	/// Per-user project records served by /api/projects.
	pub user_projects: String,
}
impl Default for Tables {
	fn default() -> Self {
		Self {
			default: "Projects".to_string(),
			projects: "Projects".to_string(),
			suggestions: "Suggestions".to_string(),
			troubleshooting: "Troubleshooting".to_string(),
			calendar: "VsoCalendar".to_string(),
			status: "UIDStatus".to_string(),
			notes: "Notes".to_string(),
			activity_log: "ActivityLog".to_string(),
			user_projects: "Projects".to_string(),
		}
	}
}
impl Tables {
	pub fn labeled(&self) -> [(&'static str, &str); 9] {
		[
			("tables.default", &self.default),
			("tables.projects", &self.projects),
			("tables.suggestions", &self.suggestions),
			("tables.troubleshooting", &self.troubleshooting),
			("tables.calendar", &self.calendar),
			("tables.status", &self.status),
			("tables.notes", &self.notes),
			("tables.activity_log", &self.activity_log),
			("tables.user_projects", &self.user_projects),
		]
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogicApps {
	/// Base trigger URL including its signature query; "&UID=<uid>" is appended per lookup.
	pub uid_url: Option<String>,
	pub vso_url: Option<String>,
	pub vso_email_url: Option<String>,
	/// Unset means no client-side timeout; Logic Apps can take minutes.
	pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Summary {
	pub endpoint: String,
	pub deployment: String,
	pub api_key: String,
	#[serde(default = "default_summary_api_version")]
	pub api_version: String,
	#[serde(default = "default_summary_temperature")]
	pub temperature: f32,
	#[serde(default = "default_summary_max_tokens")]
	pub max_tokens: u32,
	#[serde(default = "default_summary_timeout_ms")]
	pub timeout_ms: u64,
}
impl Summary {
	pub fn new(endpoint: String, deployment: String, api_key: String) -> Self {
		Self {
			endpoint,
			deployment,
			api_key,
			api_version: default_summary_api_version(),
			temperature: default_summary_temperature(),
			max_tokens: default_summary_max_tokens(),
			timeout_ms: default_summary_timeout_ms(),
		}
	}
}

fn default_log_level() -> String {
	"info".to_string()
}

fn default_true() -> bool {
	true
}

fn default_storage_timeout_ms() -> u64 {
	30_000
}

fn default_summary_api_version() -> String {
	"2024-10-01-preview".to_string()
}

fn default_summary_temperature() -> f32 {
	0.2
}

fn default_summary_max_tokens() -> u32 {
	300
}

fn default_summary_timeout_ms() -> u64 {
	30_000
}
