//! Logic App pass-through: UID lookups, VSO requests and the VSO e-mail flow.

use serde_json::{Map, Value, json};

use o360_domain::{
	keys,
	scope::{self, ScopeInputs},
	value_text,
};
use o360_providers::logic_app::UpstreamResponse;

use crate::{Error, O360Service, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum ProxyBody {
	Json(Value),
	Text(String),
}

/// A response to hand back to the browser as is.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyReply {
	pub status: u16,
	pub body: ProxyBody,
}
impl ProxyReply {
	fn ok_json(body: Value) -> Self {
		Self { status: 200, body: ProxyBody::Json(body) }
	}
}

impl O360Service {
	/// Dispatches a `{type, ...}` request to the UID or VSO Logic App.
	pub async fn logic_app_proxy(&self, mut body: Map<String, Value>) -> Result<ProxyReply> {
		let Some(kind) = crate::field(&body, &["type"]) else {
			return Err(Error::validation("Missing type"));
		};

		match kind.to_ascii_uppercase().as_str() {
			"UID" => {
				let Some(uid) = crate::field(&body, &["uid"]) else {
					return Err(Error::validation("Missing uid"));
				};
				let Some(base_url) = self.cfg.logic_apps.uid_url.as_deref() else {
					return Err(Error::Config { message: "LogicApp UID URL missing".to_string() });
				};
				let res = self
					.providers
					.logic_app
					.lookup_uid(base_url, &uid, self.logic_app_timeout())
					.await
					.map_err(request_failed)?;

				success_or_failed(res)
			},
			"VSO" => {
				let Some(url) = self.cfg.logic_apps.vso_url.as_deref() else {
					return Err(Error::Config { message: "LogicApp VSO URL missing".to_string() });
				};

				prepare_vso_payload(&mut body);

				let payload = Value::Object(body);
				let res = self
					.providers
					.logic_app
					.post_json(url, &payload, self.logic_app_timeout())
					.await
					.map_err(request_failed)?;

				success_or_failed(res)
			},
			_ => Err(Error::validation(format!("Unsupported type: {kind}"))),
		}
	}

	/// Looks up an eleven digit UID and returns the upstream JSON.
	pub async fn uid_lookup(&self, uid: &str) -> Result<ProxyReply> {
		let uid = uid.trim();

		if !keys::is_valid_uid(uid) {
			return Err(Error::validation("Invalid UID. It must contain exactly 11 numbers."));
		}

		let Some(base_url) = self.cfg.logic_apps.uid_url.as_deref() else {
			return Err(Error::Config {
				message: "Server missing LogicApp UID URL configuration.".to_string(),
			});
		};
		let res = self
			.providers
			.logic_app
			.lookup_uid(base_url, uid, self.logic_app_timeout())
			.await
			.map_err(|err| Error::Upstream {
				status: 502,
				message: "Failed to fetch upstream.".to_string(),
				details: Some(Value::String(err.to_string())),
			})?;

		if !res.is_success() {
			tracing::warn!(status = res.status, %uid, "UID lookup failed upstream.");

			return Err(Error::Upstream {
				status: res.status,
				message: format!("Upstream error {}", res.status),
				details: (!res.body.trim().is_empty()).then(|| Value::String(res.body.clone())),
			});
		}

		let data = serde_json::from_str(&res.body).map_err(|err| Error::Upstream {
			status: 502,
			message: "Failed to fetch upstream.".to_string(),
			details: Some(Value::String(err.to_string())),
		})?;

		Ok(ProxyReply::ok_json(data))
	}

	/// Forwards a VSO notification to the e-mail Logic App, mirroring its status and body.
	pub async fn vso_email(&self, payload: Value) -> Result<ProxyReply> {
		let Some(url) = self.cfg.logic_apps.vso_email_url.as_deref() else {
			return Err(Error::Config {
				message: "Server configuration missing (VSO_LOGICAPP_URL)".to_string(),
			});
		};
		let res = self
			.providers
			.logic_app
			.post_json(url, &payload, self.logic_app_timeout())
			.await
			.map_err(|err| Error::Upstream {
				status: 500,
				message: "Unexpected error".to_string(),
				details: Some(Value::String(err.to_string())),
			})?;

		if !res.is_success() {
			tracing::warn!(status = res.status, "VSO e-mail Logic App failed.");

			let body = if res.is_json() {
				ProxyBody::Json(json!({ "error": res.body }))
			} else {
				ProxyBody::Text(res.body)
			};

			return Ok(ProxyReply { status: res.status, body });
		}

		let body = match res.is_json() {
			true => ProxyBody::Json(res.body_value()),
			false => ProxyBody::Text(res.body),
		};

		Ok(ProxyReply { status: 200, body })
	}
}

/// Shapes a VSO request the way the Logic App schema expects.
///
/// `Stage` is always a string, computed from the scope fields when absent. `Tags` is flattened
/// to a single `"; "` separated string.
pub fn prepare_vso_payload(body: &mut Map<String, Value>) {
	let stage = match body.get("Stage") {
		Some(stage) if !stage.is_null() => value_text(stage),
		_ => scope::compute_scope_stage(&ScopeInputs::from_vso_payload(body)).to_string(),
	};

	body.insert("Stage".to_string(), Value::String(stage));

	if let Some(tags) = body.get_mut("Tags") {
		let flattened = match &*tags {
			Value::Array(items) => items.iter().map(value_text).collect::<Vec<_>>().join("; "),
			Value::Object(_) => tags.to_string(),
			other => value_text(other),
		};

		*tags = Value::String(flattened);
	}
}

fn success_or_failed(res: UpstreamResponse) -> Result<ProxyReply> {
	if res.is_success() {
		return Ok(ProxyReply::ok_json(res.body_value()));
	}

	tracing::warn!(status = res.status, "Logic App call failed.");

	Err(Error::Upstream {
		status: 500,
		message: format!("Request failed with status code {}", res.status),
		details: Some(res.body_value()),
	})
}

fn request_failed(err: color_eyre::Report) -> Error {
	Error::Upstream { status: 500, message: err.to_string(), details: None }
}
