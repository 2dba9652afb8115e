use std::sync::Arc;

use o360_service::O360Service;
use o360_storage::TableStore as _;

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<O360Service>,
}
impl AppState {
	pub async fn new(config: o360_config::Config) -> color_eyre::Result<Self> {
		let store = o360_storage::connect(&config.storage)?;

		tracing::info!(
			backend = %config.storage.backend,
			auth = store.auth_mode().as_str(),
			"Table store ready."
		);

		let service = O360Service::new(config, store);

		if service.cfg.storage.ensure_tables {
			service.test_connection().await?;
		}

		Ok(Self { service: Arc::new(service) })
	}
}
