use serde::Serialize;
use serde_json::Value;

use o360_domain::summary::{self, SYSTEM_PROMPT};

use crate::O360Service;

#[derive(Debug, Clone, Serialize)]
pub struct SummaryResponse {
	pub message: String,
}

impl O360Service {
	/// Summarizes a UID lookup result. Falls back to the local summary when the chat model is
	/// not configured, fails, or answers with nothing.
	pub async fn summarize(&self, input: &Value) -> SummaryResponse {
		let Some(cfg) = self.cfg.summary.as_ref() else {
			return SummaryResponse { message: summary::build_local_summary(input) };
		};
		let payload = summary::chat_user_payload(input);

		match self.providers.summary.complete(cfg, SYSTEM_PROMPT, &payload).await {
			Ok(Some(message)) => SummaryResponse { message },
			Ok(None) => {
				tracing::warn!("Chat model returned an empty summary; using the local summary.");

				SummaryResponse { message: summary::build_local_summary(input) }
			},
			Err(err) => {
				tracing::warn!(error = %err, "Chat summary failed; using the local summary.");

				SummaryResponse { message: summary::build_local_summary(input) }
			},
		}
	}
}
