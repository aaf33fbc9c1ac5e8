use std::sync::Arc;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use ion::client::{self, SatelliteOptions};
use ion::config::{AsrBackend, CaptureBackend, Config, Transport};
use ion::protocol::{self, ControlEvent, Frame};
use ion::transport;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "ion", version, about = "Audio session protocol server and clients")]
struct Cli {
    /// Configuration file (any format supported by the config crate)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve sessions over TCP or stdio
    Serve(ServeArgs),
    /// Send `describe` and print the reply
    Probe(ConnectArgs),
    /// Run a satellite: stream a microphone and play returned audio
    Satellite(SatelliteArgs),
}

#[derive(Debug, Args)]
struct ConnectArgs {
    #[arg(long, value_enum)]
    transport: Option<Transport>,

    #[arg(long)]
    addr: Option<String>,
}

#[derive(Debug, Args)]
struct ServeArgs {
    #[command(flatten)]
    connect: ConnectArgs,

    #[arg(long)]
    sample_rate: Option<u32>,

    #[arg(long)]
    channels: Option<u16>,

    #[arg(long, value_enum)]
    asr: Option<AsrBackend>,

    #[arg(long)]
    whisper_cli: Option<String>,

    #[arg(long)]
    whisper_model: Option<String>,

    #[arg(long)]
    partial_interval_ms: Option<u64>,

    #[arg(long)]
    partial_window_ms: Option<u64>,

    #[arg(long, value_enum)]
    capture: Option<CaptureBackend>,

    #[arg(long)]
    capture_command: Option<String>,
}

#[derive(Debug, Args)]
struct SatelliteArgs {
    #[command(flatten)]
    connect: ConnectArgs,

    #[arg(long, default_value = "ion-satellite")]
    name: String,

    /// Command writing raw PCM to stdout, e.g. `parec --raw --rate 16000 --channels 1`
    #[arg(long)]
    mic_command: Option<String>,

    /// Command playing raw PCM from stdin, e.g. `pacat --raw --rate 16000 --channels 1`
    #[arg(long)]
    snd_command: Option<String>,

    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    auto_asr: bool,
}

impl ConnectArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(transport) = self.transport {
            config.server.transport = transport;
        }
        if let Some(addr) = &self.addr {
            config.server.addr = addr.clone();
        }
    }
}

impl ServeArgs {
    fn apply(&self, config: &mut Config) {
        self.connect.apply(config);

        if let Some(rate) = self.sample_rate {
            config.audio.sample_rate = rate;
        }
        if let Some(channels) = self.channels {
            config.audio.channels = channels;
        }
        if let Some(backend) = self.asr {
            config.asr.backend = backend;
        }
        if let Some(cli) = &self.whisper_cli {
            config.asr.whisper_cli = cli.clone();
        }
        if let Some(model) = &self.whisper_model {
            config.asr.whisper_model = model.clone();
        }
        if let Some(interval) = self.partial_interval_ms {
            config.asr.partial_interval_ms = interval;
        }
        if let Some(window) = self.partial_window_ms {
            config.asr.window_ms = window;
        }
        if let Some(backend) = self.capture {
            config.capture.backend = backend;
        }
        if let Some(command) = &self.capture_command {
            config.capture.command = command.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Stdout may carry frames, so logs always go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;

    let shutdown = CancellationToken::new();
    spawn_ctrl_c(shutdown.clone());

    match cli.command {
        Command::Serve(args) => {
            args.apply(&mut config);
            config.validate()?;
            serve(config, shutdown).await
        }
        Command::Probe(args) => {
            args.apply(&mut config);
            run_probe(&config).await
        }
        Command::Satellite(args) => {
            args.connect.apply(&mut config);
            let (reader, writer) = transport::connect(config.server.transport, &config.server.addr).await?;
            let options = SatelliteOptions {
                name: args.name,
                mic_command: args.mic_command,
                snd_command: args.snd_command,
                auto_asr: args.auto_asr,
                max_frame_bytes: config.server.max_frame_bytes,
            };
            client::run_satellite(reader, writer, options, shutdown).await
        }
    }
}

async fn serve(config: Config, shutdown: CancellationToken) -> Result<()> {
    let adapters = config.build_adapters()?;
    let session_config = Arc::new(config.session_config());

    info!(
        "ion v{} ({}Hz, {} channels, asr: {:?}, capture: {:?})",
        env!("CARGO_PKG_VERSION"),
        config.audio.sample_rate,
        config.audio.channels,
        config.asr.backend,
        config.capture.backend
    );

    match config.server.transport {
        Transport::Tcp => transport::serve_tcp(&config.server.addr, session_config, adapters, shutdown).await,
        Transport::Stdio => {
            let summary = transport::serve_stdio(session_config, adapters, shutdown).await?;
            info!("Session {} finished", summary.session_id);
            Ok(())
        }
    }
}

async fn run_probe(config: &Config) -> Result<()> {
    let (mut reader, mut writer) = transport::connect(config.server.transport, &config.server.addr).await?;

    if config.server.transport == Transport::Stdio {
        // Nothing will answer on stdin; just emit the request
        let payload = protocol::encode(&ControlEvent::Describe)?;
        protocol::write_frame(&mut writer, &Frame::control(payload)).await?;
        writer.flush().await?;
        return Ok(());
    }

    match client::probe(&mut reader, &mut writer, config.server.max_frame_bytes).await? {
        Some(event) => info!("Reply: {}", event.event_type()),
        None => warn!("Reply had an unrecognized event type"),
    }

    Ok(())
}

fn spawn_ctrl_c(shutdown: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, shutting down");
                shutdown.cancel();
            }
            Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
        }
    });
}
