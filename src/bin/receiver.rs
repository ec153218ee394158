//! Audio Receiver Application
//!
//! Receives a stream over UDP and plays it on an output device, following
//! whatever codec and format the sender announces.

use anyhow::{Context, Result};
use clap::Parser;
use std::time::Duration;

use lan_audio_link::{
    cli::{init_logging, print_devices, ReceiverArgs},
    config::AppConfig,
    network::{DeviceSessionFactory, ReceiverPipeline, UdpPacketSource},
    Shutdown,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = ReceiverArgs::parse();
    init_logging(&args.common);

    if args.common.list_devices {
        print_devices();
        return Ok(());
    }

    let mut config =
        AppConfig::load(args.common.config.as_deref()).context("Failed to load configuration")?;
    args.apply(&mut config);
    config.validate().context("Invalid settings")?;

    tracing::info!("Starting LAN Audio Receiver");

    let source = UdpPacketSource::bind(&config.network).context("Failed to bind socket")?;
    let factory = DeviceSessionFactory::new(
        config.playback.device.clone(),
        config.playback.prebuffer(),
    );
    let idle_timeout = config.network.idle_timeout();
    let shutdown = Shutdown::new();

    let pipeline_shutdown = shutdown.clone();
    let mut task = tokio::task::spawn_blocking(move || {
        ReceiverPipeline::new(source, factory, pipeline_shutdown)
            .with_idle_timeout(idle_timeout)
            .run()
    });

    tracing::info!("Press Ctrl+C to stop");

    let stats = tokio::select! {
        result = &mut task => result.context("Receiver task panicked")?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Ctrl+C received, stopping");
            shutdown.trigger();
            // The socket poll timeout bounds how long this takes
            let grace = config.network.poll_timeout() + Duration::from_secs(2);
            tokio::time::timeout(grace, &mut task)
                .await
                .context("Receiver did not stop in time")?
                .context("Receiver task panicked")?
        }
    };

    tracing::info!(
        "Received {} packets, played {} frames across {} sessions",
        stats.packets_received,
        stats.frames_played,
        stats.sessions_opened
    );
    Ok(())
}
