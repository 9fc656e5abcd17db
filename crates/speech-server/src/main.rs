mod api;
mod cli;
mod config;
mod openapi;
mod state;
mod synth;

use std::sync::Arc;

use actix_web::{App, HttpServer, middleware::Logger, web};
use anyhow::{Context, Result};
use clap::Parser;
use speech_player::SpeechQueue;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::state::AppState;
use crate::synth::{PiperSynthesizer, Synthesizer};

const DEFAULT_LOG_FILTER: &str = "info,speech_server=info,speech_player=info";

#[actix_web::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse();

    let fallback = args.log_level.clone().unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .init();

    if args.list_devices {
        let host = cpal::default_host();
        speech_player::device::list_devices(&host)?;
        return Ok(());
    }

    let (cfg, cfg_path) = config::ServerConfig::load_or_default(args.config.as_deref())?;
    let bind = config::resolve_bind(args.bind, &cfg)?;
    let output = config::resolve_output(args.device.clone(), &cfg)?;
    let synth_cfg = config::resolve_synth(&cfg)?;
    tracing::info!(
        version = cli::VERSION,
        bind = %bind,
        config = ?cfg_path,
        device = ?output.device,
        rate_hz = output.sample_rate,
        channels = output.channels,
        "starting speech-server"
    );

    let synth: Option<Arc<dyn Synthesizer>> = match synth_cfg {
        Some(piper) => Some(Arc::new(PiperSynthesizer::new(piper)?)),
        None => {
            tracing::warn!("no [synth] section configured; /text is disabled");
            None
        }
    };

    let player = Arc::new(SpeechQueue::start(output).context("start playback engine")?);

    // The handler runs on its own thread, so take the system handle here.
    let system = actix_web::rt::System::current();
    if let Err(err) = ctrlc::set_handler(move || system.stop()) {
        tracing::warn!("failed to install Ctrl-C handler: {err}");
    }

    let state = web::Data::new(AppState::new(player.clone(), synth));
    let served = match HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Logger::default().exclude("/status").exclude("/health"))
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-doc/openapi.json", openapi::ApiDoc::openapi()),
            )
            .configure(api::configure)
    })
    .bind(bind)
    {
        Ok(server) => server.run().await.context("http server"),
        Err(e) => Err(e).with_context(|| format!("bind {bind}")),
    };

    player.shutdown();
    served
}
