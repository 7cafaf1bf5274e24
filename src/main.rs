use anyhow::Result;
use serenity::{http::Http, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info, warn};

mod bot;
mod config;
mod error;
mod player;
mod sources;
mod ui;

use crate::bot::AriaMusicBot;
use crate::config::Config;
use crate::player::transport::SongbirdConnector;
use crate::player::PlayerRegistry;
use crate::sources::ytdlp::YtDlpResolver;
use crate::ui::sync::SerenityMessenger;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("aria_music=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    // Un panic en una tarea asíncrona se loguea sin tumbar el proceso
    std::panic::set_hook(Box::new(|info| {
        tracing::error!("Panic no capturado: {}", info);
    }));

    info!("🎵 Iniciando Aria Music v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Arc::new(Config::load()?);

    if let Err(e) = YtDlpResolver::verify_dependencies().await {
        warn!("⚠️ {} - la resolución de medios va a fallar hasta instalarlo", e);
    }

    // Colaboradores del registro: voz (songbird), resolución (yt-dlp) y
    // mensajería (http de serenity)
    let songbird = Songbird::serenity();
    let http = Arc::new(Http::new(&config.discord_token));
    let http_client = reqwest::Client::new();

    let registry = {
        let config = config.clone();
        let songbird = songbird.clone();
        Arc::new_cyclic(|weak| {
            let connector = SongbirdConnector::new(
                songbird,
                http_client,
                weak.clone(),
                config.join_timeout,
            );
            PlayerRegistry::new(
                config,
                Arc::new(connector),
                Arc::new(YtDlpResolver::new()),
                Arc::new(SerenityMessenger::new(http)),
            )
        })
    };

    // Construir cliente
    let handler = AriaMusicBot::new(config.clone(), registry);
    let mut client = Client::builder(&config.discord_token, bot::gateway_intents())
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Error al registrar Ctrl+C");
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        shard_manager.shutdown_all().await;
    });

    info!("🚀 Bot iniciado");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}
