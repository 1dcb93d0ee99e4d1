use crate::cli::ServeArgs;
use crate::infra::{file_backed_service, AppState};
use crate::routes::with_care_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use mentis::config::AppConfig;
use mentis::error::AppError;
use mentis::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let care_service = file_backed_service(&config)?;

    let app = with_care_routes(care_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        accounts = %config.storage.accounts_path.display(),
        lock_window_days = config.care.lock_window_days,
        "mentis care service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
