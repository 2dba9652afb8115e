//! Azure OpenAI chat completions for circuit summaries.

use std::time::Duration;

use color_eyre::{Result, eyre};
use serde_json::{Value, json};

use o360_config::Summary;

pub fn completion_url(cfg: &Summary) -> String {
	format!(
		"{}/openai/deployments/{}/chat/completions?api-version={}",
		cfg.endpoint.trim_end_matches('/'),
		cfg.deployment,
		cfg.api_version
	)
}

/// Returns the trimmed answer, or `None` when the model answered with nothing.
pub async fn complete(cfg: &Summary, system: &str, user: &Value) -> Result<Option<String>> {
	let client = crate::client(Some(Duration::from_millis(cfg.timeout_ms)))?;
	let body = json!({
		"messages": [
			{ "role": "system", "content": system },
			{ "role": "user", "content": user.to_string() }
		],
		"temperature": cfg.temperature,
		"max_tokens": cfg.max_tokens
	});
	let res = client
		.post(completion_url(cfg))
		.headers(crate::api_key_headers(&cfg.api_key)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_chat_content(&json)
}

fn parse_chat_content(json: &Value) -> Result<Option<String>> {
	let choice = json
		.get("choices")
		.and_then(Value::as_array)
		.and_then(|choices| choices.first())
		.ok_or_else(|| eyre::eyre!("Chat response has no choices."))?;
	let content = choice
		.get("message")
		.and_then(|message| message.get("content"))
		.and_then(Value::as_str)
		.unwrap_or_default()
		.trim();

	Ok((!content.is_empty()).then(|| content.to_string()))
}
