mod api;
mod config;
mod device;
mod error;
mod generation;
mod model;
mod prompt;
mod sampling;
mod tokenizer;

#[cfg(test)]
mod testing;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderValue;
use clap::Parser;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::AppState;
use crate::config::{Args, LoadOptions, SamplingOptions};
use crate::model::{HubLoader, ModelSession};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "medical_llm_server=info,tower_http=debug".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    println!(
        r#"
╔═══════════════════════════════════════════════════════════════╗
║        Medical AI Server - chat & emergency assessment        ║
║                  Powered by Candle                            ║
╚═══════════════════════════════════════════════════════════════╝
"#
    );

    let load_options = LoadOptions::from(&args);
    info!("Using model: {}", load_options.model_id);
    info!("Precision: {}", load_options.precision);
    if let Some(dir) = &load_options.cache_dir {
        info!("Cache directory: {:?}", dir);
    }
    info!("Workers: {}", args.workers);

    let state = Arc::new(AppState {
        session: ModelSession::new(Arc::new(HubLoader)),
        load_options,
        sampling: SamplingOptions::from(&args),
    });

    if args.preload {
        info!("Preloading model '{}'...", state.load_options.model_id);
        if let Err(e) = state.session.ensure_loaded(&state.load_options).await {
            error!("Model preloading failed: {}", e);
        }
    } else {
        info!("Model preloading disabled. Model will load on first request.");
    }

    run_server(state, &args).await
}

fn cors_layer(origins: &[String]) -> anyhow::Result<CorsLayer> {
    let origins = origins
        .iter()
        .map(|origin| origin.parse::<HeaderValue>())
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true))
}

async fn run_server(state: Arc<AppState>, args: &Args) -> anyhow::Result<()> {
    let model_id = state.load_options.model_id.clone();

    let app = api::create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&args.allowed_origins)?);

    let addr = SocketAddr::new(args.host.parse()?, args.port);

    warn!("CORS enabled for {:?}. Review for production deployment.", args.allowed_origins);
    warn!("API endpoints are unsecured. Put authentication in front of this server for production.");

    println!(
        r#"
🚀 Server starting...
   ├─ Address: http://{}
   ├─ Model: {}
   └─ Endpoints:
      ├─ GET  /health               - Health check
      ├─ POST /chat                 - Medical chat
      └─ POST /emergency_assessment - Emergency first-aid steps

Press Ctrl+C to stop the server.
"#,
        addr, model_id
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
