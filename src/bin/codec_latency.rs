//! Codec Latency Tool
//!
//! Pushes a click through each codec variant's encoder and decoder and
//! reports the algorithmic delay and processing cost.

use anyhow::{Context, Result};
use clap::Parser;

use lan_audio_link::{
    cli::{init_logging, print_devices, LatencyArgs},
    codec::measure_round_trip,
    config::AppConfig,
    protocol::StreamParams,
};

fn main() -> Result<()> {
    let args = LatencyArgs::parse();
    init_logging(&args.common);

    if args.common.list_devices {
        print_devices();
        return Ok(());
    }

    let mut config =
        AppConfig::load(args.common.config.as_deref()).context("Failed to load configuration")?;
    args.apply(&mut config);
    config.validate().context("Invalid settings")?;

    let stream = &config.stream;
    for codec in args.codecs() {
        let params = StreamParams::new(codec, stream.format, stream.channels, stream.sample_rate);
        let report = measure_round_trip(&params, stream.bitrate, args.frames)
            .with_context(|| format!("Round trip through {} failed", codec))?;
        println!("{}", report);
    }
    Ok(())
}
