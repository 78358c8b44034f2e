use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use axum_server::tls_rustls::RustlsConfig;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use auraq_voice_relay::{
    ServerConfig,
    client::{
        CallState, ClientConfig, SessionController, TranscriptRole, TransportMode, WavFileCapture,
        WavFileSink,
    },
    routes,
    state::AppState,
};

/// AuraQ voice relay - realtime bridge between wellness-coach clients and
/// the speech API
#[derive(Parser, Debug)]
#[command(name = "auraq-voice-relay")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Subcommand to run (defaults to `serve`)
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the relay server
    Serve,

    /// Hold a call with WAV files standing in for microphone and speaker
    Call {
        /// 24 kHz mono WAV played into the call
        #[arg(short = 'i', long = "input")]
        input: PathBuf,

        /// Where the coach's audio is written when the call ends
        #[arg(short = 'o', long = "output")]
        output: PathBuf,

        /// Relay WebSocket URL, or the token URL with --direct
        #[arg(long = "url", default_value = "ws://127.0.0.1:3001/realtime")]
        url: String,

        /// Fetch an ephemeral token from --url and connect to the provider directly
        #[arg(long = "direct")]
        direct: bool,

        /// Hang up after this many seconds even if the coach is still talking
        #[arg(long = "hangup-after-secs", default_value_t = 60)]
        hangup_after_secs: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Must happen before any TLS connection is attempted
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(cli.config).await,
        Commands::Call {
            input,
            output,
            url,
            direct,
            hangup_after_secs,
        } => {
            let transport = if direct {
                TransportMode::direct(url)
            } else {
                TransportMode::relay(url)
            };
            call(
                transport,
                input,
                output,
                Duration::from_secs(hangup_after_secs),
            )
            .await
        }
    }
}

async fn serve(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = if let Some(config_path) = config_path {
        info!(path = %config_path.display(), "Loading configuration");
        ServerConfig::from_file(&config_path).map_err(|e| anyhow!(e.to_string()))?
    } else {
        ServerConfig::from_env().map_err(|e| anyhow!(e.to_string()))?
    };

    let address = config.address();
    let tls_config = config.tls.clone();
    info!(mode = %config.relay_mode, "Starting server on {address}");

    let app_state = AppState::new(config).map_err(|e| anyhow!(e.to_string()))?;
    let app = routes::create_app(app_state);

    let socket_addr: SocketAddr = address
        .parse()
        .map_err(|e| anyhow!("Invalid server address '{}': {}", address, e))?;

    if let Some(tls) = tls_config {
        let rustls_config = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
            .await
            .map_err(|e| {
                anyhow!(
                    "Failed to load TLS certificates from {} and {}: {}",
                    tls.cert_path.display(),
                    tls.key_path.display(),
                    e
                )
            })?;

        info!("Server listening on https://{} (TLS enabled)", socket_addr);

        axum_server::bind_rustls(socket_addr, rustls_config)
            .serve(app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .map_err(|e| anyhow!("TLS server error: {}", e))?;
    } else {
        info!("Server listening on http://{}", socket_addr);

        let listener = TcpListener::bind(&socket_addr).await?;
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await?;
    }

    Ok(())
}

async fn call(
    transport: TransportMode,
    input: PathBuf,
    output: PathBuf,
    hangup_after: Duration,
) -> anyhow::Result<()> {
    let sink = WavFileSink::new();
    let controller = SessionController::new(
        ClientConfig::new(transport),
        Arc::new(WavFileCapture::new(input)),
        Arc::new(sink.clone()),
    );
    let mut view = controller.subscribe();

    controller.start_call().await?;
    println!("Connected. Press Ctrl+C to hang up.");

    let deadline = tokio::time::sleep(hangup_after);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => break,
            changed = view.changed() => {
                if changed.is_err() || view.borrow().state != CallState::Active {
                    break;
                }
            }
        }
    }

    controller.end_call();

    let final_view = controller.view();
    for message in final_view.transcript.messages() {
        let who = match message.role {
            TranscriptRole::User => "you",
            TranscriptRole::Assistant => "coach",
        };
        println!("{who}: {}", message.text);
    }
    if let Some(error) = final_view.last_error {
        println!("last error: {error}");
    }

    let samples = sink
        .write_to(&output)
        .map_err(|e| anyhow!("Failed to write {}: {}", output.display(), e))?;
    println!("Wrote {samples} samples to {}", output.display());
    Ok(())
}
