use metrics_exporter_prometheus::PrometheusHandle;
use mentis::care::{CareService, GeminiClient, JsonFileAccountStore, JsonFileChatHistory};
use mentis::config::AppConfig;
use mentis::error::AppError;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::warn;

pub(crate) type FileCareService = CareService<JsonFileAccountStore, JsonFileChatHistory, GeminiClient>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Care service over the configured JSON files and the Gemini generator.
pub(crate) fn file_backed_service(config: &AppConfig) -> Result<Arc<FileCareService>, AppError> {
    let generator = GeminiClient::from_config(&config.generation)?;
    if !generator.is_configured() {
        warn!("GOOGLE_API_KEY is not set; companion replies and summaries are unavailable");
    }

    let service = CareService::new(
        Arc::new(JsonFileAccountStore::new(&config.storage.accounts_path)),
        Arc::new(JsonFileChatHistory::new(&config.storage.chat_history_path)),
        Arc::new(generator),
        &config.care,
        config.generation.retry.clone(),
    );
    Ok(Arc::new(service))
}
