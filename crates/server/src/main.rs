mod api;
mod builder;
mod config;
mod covers;
mod discovery;
mod jellyfin;
mod pipeline;
mod providers;
mod scheduler;
mod settings;
mod spotify;
mod state;
mod update_covers;
mod utils;
mod writer;

use std::sync::Arc;

use config::{config_path_from_env, load_or_create_config, ServerConfig};
use jellyfin::MediaServerClient;
use providers::{ArtProvider, Providers};
use reqwest::Client;
use spotify::SpotifyArt;
use state::{AppState, CycleKind};
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Serve,
    Generate,
    UpdateCovers,
}

impl Mode {
    fn parse(arg: Option<&str>) -> Result<Self, String> {
        match arg {
            None | Some("serve") => Ok(Mode::Serve),
            Some("generate") => Ok(Mode::Generate),
            Some("update-covers") => Ok(Mode::UpdateCovers),
            Some(other) => Err(format!(
                "unknown mode '{}'; expected serve, generate or update-covers",
                other
            )),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let arg = std::env::args().nth(1);
    let mode = Mode::parse(arg.as_deref())?;

    let config_path = config_path_from_env();
    let (config, created) = load_or_create_config(&config_path)?;
    if created {
        info!("Created default config at {:?}", config_path);
    } else {
        info!("Loaded config from {:?}", config_path);
    }
    if config.media_server.api_key.is_empty() {
        warn!("No media server API key configured; catalog requests will likely fail");
    }

    let client = Client::builder().user_agent("tapedeck/0.1").build()?;
    let providers = build_providers(&client, &config);
    let port = config.port;
    let state = AppState::new(config_path, config, providers);

    match mode {
        Mode::Generate => {
            let guard = state
                .try_begin(CycleKind::Generate)
                .ok_or("a cycle is already running")?;
            let report = pipeline::generate(state, guard).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Mode::UpdateCovers => {
            let guard = state
                .try_begin(CycleKind::UpdateCovers)
                .ok_or("a cycle is already running")?;
            let report = update_covers::update_covers(state, guard).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Mode::Serve => {
            let schedule = scheduler::start(state.clone());
            let app = api::router(state);
            let bind_addr = format!("0.0.0.0:{}", port);
            let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
            info!("Listening on {}", bind_addr);
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
            schedule.abort();
            Ok(())
        }
    }
}

fn build_providers(client: &Client, config: &ServerConfig) -> Providers {
    let media_server = Arc::new(MediaServerClient::new(client.clone(), &config.media_server));
    let art: Option<Arc<dyn ArtProvider>> = if config.spotify.enabled {
        if config.spotify.client_id.is_empty() || config.spotify.client_secret.is_empty() {
            warn!("Spotify art enabled without credentials; external covers disabled");
            None
        } else {
            Some(Arc::new(SpotifyArt::new(client.clone(), &config.spotify)))
        }
    } else {
        None
    };
    Providers {
        catalog: media_server.clone(),
        history: Some(media_server),
        art,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_modes() {
        assert_eq!(Mode::parse(None), Ok(Mode::Serve));
        assert_eq!(Mode::parse(Some("generate")), Ok(Mode::Generate));
        assert_eq!(Mode::parse(Some("update-covers")), Ok(Mode::UpdateCovers));
        assert!(Mode::parse(Some("scan")).is_err());
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(err) => {
                warn!("Failed to install terminate signal handler: {}", err);
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", err);
        }
    }

    info!("Shutdown signal received.");
}
