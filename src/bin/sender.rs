//! Audio Sender Application
//!
//! Captures audio from an input device (or a test tone) and streams it to a
//! receiver over UDP.

use anyhow::{Context, Result};
use clap::Parser;
use std::time::Duration;
use tokio::task::JoinHandle;

use lan_audio_link::{
    audio::{AudioCapture, CaptureConfig, CaptureSource, ToneSource},
    cli::{init_logging, print_devices, SenderArgs},
    config::AppConfig,
    network::{resolve, SenderPipeline, SenderStats, UdpSender},
    protocol::StreamParams,
    Shutdown,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = SenderArgs::parse();
    init_logging(&args.common);

    if args.common.list_devices {
        print_devices();
        return Ok(());
    }

    let mut config =
        AppConfig::load(args.common.config.as_deref()).context("Failed to load configuration")?;
    args.apply(&mut config);
    config.validate().context("Invalid settings")?;

    tracing::info!("Starting LAN Audio Sender");

    let server = config
        .network
        .server
        .clone()
        .context("No receiver address given")?;
    let target = resolve(&server, config.network.port)
        .with_context(|| format!("Cannot resolve receiver {}", server))?;
    let transport = UdpSender::new(target, &config.network).context("Failed to open socket")?;

    let params = config.stream.params();
    let bitrate = config.stream.bitrate;
    let shutdown = Shutdown::new();

    let (mut task, bridge) = match config.capture.tone_hz {
        Some(frequency) => {
            tracing::info!("Streaming a {} Hz test tone", frequency);
            let tone = ToneSource::new(
                frequency,
                params.sample_rate,
                params.channels,
                params.format,
                (params.sample_rate / 100) as usize,
            )
            .paced(true);
            let task = spawn_pipeline(tone, transport, params, bitrate, shutdown.clone());
            (task, None)
        }
        None => {
            let capture = AudioCapture::open(CaptureConfig {
                device: config.capture.device.clone(),
                sample_rate: params.sample_rate,
                channels: params.channels,
                format: params.format,
            })
            .context("Failed to open capture device")?;
            let bridge = capture.bridge().clone();
            let task = spawn_pipeline(capture, transport, params, bitrate, shutdown.clone());
            (task, Some(bridge))
        }
    };

    tracing::info!("Press Ctrl+C to stop");

    let stats = tokio::select! {
        result = &mut task => result.context("Sender task panicked")??,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Ctrl+C received, stopping");
            shutdown.trigger();
            // Wake a read blocked on the device
            if let Some(bridge) = bridge {
                bridge.cancel();
            }
            tokio::time::timeout(Duration::from_secs(5), &mut task)
                .await
                .context("Sender did not stop in time")?
                .context("Sender task panicked")??
        }
    };

    tracing::info!(
        "Sent {} frames in {} packets ({:.1} KB)",
        stats.frames_encoded,
        stats.packets_sent,
        stats.bytes_sent as f64 / 1024.0
    );
    Ok(())
}

/// Run the blocking pipeline on its own thread
fn spawn_pipeline<C>(
    capture: C,
    transport: UdpSender,
    params: StreamParams,
    bitrate: u32,
    shutdown: Shutdown,
) -> JoinHandle<lan_audio_link::Result<SenderStats>>
where
    C: CaptureSource + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        SenderPipeline::new(capture, transport, params, bitrate, shutdown)?.run()
    })
}
