use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use voicegate::server;
use voicegate::source::mic::MicCapture;

/// Microphone frontend: serves the captured signal on `GET /mic` as a
/// continuous audio/L16 octet stream.
#[derive(Debug, Parser)]
#[command(name = "micd")]
struct Args {
    /// Sampling rate in Hz.
    #[arg(long, default_value_t = 16000)]
    rate: u32,

    /// Number of audio channels.
    #[arg(long, default_value_t = 1)]
    channels: u16,

    /// Duration of audio frames in milliseconds.
    #[arg(long, default_value_t = 30)]
    frame_duration: u32,

    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    #[arg(long, default_value_t = 8000)]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    let frame_size = (args.rate * args.frame_duration / 1000) as usize;

    tracing::info!(
        "Starting mic frontend with rate {}Hz, {} channel(s), frame size {}",
        args.rate,
        args.channels,
        frame_size
    );

    let capture = MicCapture::start(args.rate, args.channels, frame_size)?;
    let app = server::mic_router(Arc::new(capture));

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("micd serving on {}", addr);

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_token.cancel();
        }
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}
