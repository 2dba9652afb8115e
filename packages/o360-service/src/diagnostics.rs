use serde::Serialize;

use crate::{O360Service, Result};

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionReport {
	pub ok: bool,
	pub auth: &'static str,
	pub table: String,
}

impl O360Service {
	/// Creates the default table if needed, proving the store is reachable with its credential.
	pub async fn test_connection(&self) -> Result<ConnectionReport> {
		let table = self.cfg.tables.default.clone();
		let auth = self.store.auth_mode().as_str();

		self.store.ensure_table(&table).await?;

		tracing::info!(%table, auth, "Table Storage connection verified.");

		Ok(ConnectionReport { ok: true, auth, table })
	}
}
