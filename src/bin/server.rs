use clap::Parser;
use smart_student::config::{get_config, get_data_dir_path, CliArgs};
use smart_student::images::ImageSearch;
use smart_student::ocr::GeminiClient;
use smart_student::{create_app, db, run_migrations, AppState};
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const LOG_FILE_NAME: &str = "smart-student.log";

/// Sets up logging to stdout and to a daily rolling file in the data directory
///
/// `RUST_LOG` wins over the defaults; `--debug` lowers the default level.
/// The returned guard flushes the file writer and must be kept alive.
fn init_tracing(args: &CliArgs) -> Option<WorkerGuard> {
    let default_filter = if args.debug {
        "smart_student=debug,tower_http=debug"
    } else {
        "smart_student=info,tower_http=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let stdout_layer = if args.json_logs {
        fmt::layer().json().boxed()
    } else {
        fmt::layer().boxed()
    };

    let log_dir = get_data_dir_path().filter(|dir| std::fs::create_dir_all(dir).is_ok());
    let (file_layer, guard) = match &log_dir {
        Some(dir) => {
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, LOG_FILE_NAME));
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .with(filter)
        .init();

    if let Some(dir) = log_dir {
        info!("Writing logs to {}", dir.join(LOG_FILE_NAME).display());
    }
    guard
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    let args = CliArgs::parse();
    let _log_guard = init_tracing(&args);

    let config = get_config(&args);

    // Initialize the database pool
    let pool = db::init_pool(&config.database_url)?;
    {
        let mut conn = pool.get()?;
        run_migrations(&mut conn).map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;
    }
    info!("Database ready at {}", config.database_url);

    let gemini = config
        .gemini_api_key
        .clone()
        .map(|key| GeminiClient::new(key, config.gemini_model.clone()));
    if gemini.is_none() {
        warn!("No Gemini API key configured; answer sheet analysis will return fallbacks");
    }

    let image_keys = config.image_keys();
    if image_keys.configured().is_empty() {
        warn!("No image provider keys configured; slides will use placeholder images");
    }

    let state = AppState::new(Arc::new(pool))
        .with_gemini(gemini)
        .with_images(ImageSearch::new(image_keys));

    // Build our application with routes
    let app = create_app(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http());

    // Run it
    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
