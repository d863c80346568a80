//! `localm-serve`: loads a GGUF model and serves the generation routes

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use localm_serve::inference::{LlamaEngine, LoadParams};
use localm_serve::logging::init_tracing;
use localm_serve::server::{serve, AppState};
use localm_serve::storage::load_settings;

#[derive(Debug, Parser)]
#[command(name = "localm-serve", version, about = "Serve a local GGUF model over HTTP")]
struct Args {
    /// GGUF model file (overrides the config file)
    #[arg(long)]
    model: Option<PathBuf>,

    /// JSON settings file
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    init_tracing("info");
    let args = Args::parse();

    let mut settings = load_settings(args.config.as_deref());
    if let Some(model) = args.model {
        settings.model_path = Some(model);
    }
    if let Some(host) = args.host {
        settings.host = host;
    }
    if let Some(port) = args.port {
        settings.port = port;
    }
    settings.validate();

    let model_path = settings
        .model_path
        .clone()
        .ok_or("no model given: pass --model or set model_path in the config file")?;

    tracing::info!("Loading model from {:?}", model_path);
    let engine = LlamaEngine::load(
        &model_path,
        LoadParams {
            gpu_layers: settings.gpu_layers,
            context_size: settings.context_size,
        },
    )?;

    let info = engine.model_info();
    if info.context_size < settings.context_size {
        tracing::warn!(
            "Context window capped at {} tokens by the model's training context",
            info.context_size
        );
    }

    let state = AppState::from_settings(Arc::new(engine), &settings);
    let listener = TcpListener::bind(settings.bind_address()).await?;

    serve(listener, state).await?;
    Ok(())
}
