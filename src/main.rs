use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use voicegate::config::Settings;
use voicegate::event::EventBus;
use voicegate::server::{self, AppState};
use voicegate::service::driver::{DetectorFactory, VadService};
use voicegate::source::client::HttpSourceLoader;
use voicegate::vad::classifier::WebRtcClassifier;
use voicegate::vad::gate::{GatedSegmenter, VadGate};
use voicegate::vad::segmenter::Segmenter;
use voicegate::vad::SpeechDetector;

/// Streaming voice-activity detection service.
#[derive(Debug, Parser)]
#[command(name = "voicegate")]
struct Args {
    /// Path to a TOML settings file; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured server port.
    #[arg(long)]
    port: Option<u16>,

    /// Use the externally gated detector instead of the frame-wise
    /// segmenter.
    #[arg(long)]
    gated: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        settings.server.port = port;
    }

    let bus = Arc::new(EventBus::new());
    let gate = VadGate::new();
    let loader = Arc::new(HttpSourceLoader::new());

    let (detector_name, factory): (&str, Arc<DetectorFactory>) = if args.gated {
        let vad = settings.vad.clone();
        let padding = settings.gate.padding_frames;
        let gate = gate.clone();
        (
            "GatedSegmenter",
            Arc::new(move || {
                Box::new(GatedSegmenter::new(
                    gate.clone(),
                    WebRtcClassifier::new(vad.classifier_mode()),
                    padding,
                )) as Box<dyn SpeechDetector>
            }),
        )
    } else {
        let vad = settings.vad.clone();
        (
            "WebRtcSegmenter",
            Arc::new(move || {
                Box::new(Segmenter::new(
                    vad.segmenter_config(),
                    WebRtcClassifier::new(vad.classifier_mode()),
                )) as Box<dyn SpeechDetector>
            }),
        )
    };

    let mut service = VadService::new(
        settings.topics.mic.clone(),
        settings.topics.vad.clone(),
        detector_name,
        bus.clone(),
        loader.clone(),
        factory,
    );
    if args.gated {
        service = service.with_gate(settings.topics.control.clone(), gate.clone());
    }
    let service_stop = service.stop_handle();
    let service_handle = tokio::spawn(service.run());

    let state = AppState {
        loader,
        vad: settings.vad.clone(),
        listen_timeout_s: settings.server.listen_timeout_s,
        gate,
    };
    let app = server::router(state);

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("voicegate serving on {}", addr);

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
            signal_token.cancel();
        }
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    service_stop.store(true, Ordering::Release);
    service_handle.abort();

    Ok(())
}
