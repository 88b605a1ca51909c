use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use docpair::api::{api_router, ApiContext};
use docpair::config::{self, AppConfig};
use docpair::db::Database;
use docpair::pipeline::{Backends, GeminiClient, OpenAiClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("Docpair starting v{}", config::APP_VERSION);

    let config = AppConfig::from_env()?;
    std::fs::create_dir_all(&config.data_dir)?;
    std::fs::create_dir_all(config.uploads_dir())?;

    let db = Database::new(config.database_path())?;

    let backends = Backends::new(
        Arc::new(GeminiClient::new(&config.gemini, config.backend_timeout_secs)),
        Arc::new(OpenAiClient::new(&config.openai, config.backend_timeout_secs)),
    );

    let ctx = ApiContext::new(db, backends, config.uploads_dir());
    let app = api_router(ctx);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
