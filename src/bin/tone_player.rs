//! Plays, checks or renders a tone pattern file.

use std::io;
use std::path::PathBuf;

use clap::Parser;
use reveille::audio::{PcmSink, RawPcmSink, RodioSink, WavSink};
use reveille::engine::{Executor, Pacing, VolumeCell};
use reveille::tone::ToneProgram;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tone-player")]
#[command(author, version, about = "Tone pattern player", long_about = None)]
struct Cli {
    /// Pattern file to play
    pattern: PathBuf,

    /// Parse and print the instruction tree without playing
    #[arg(long)]
    check: bool,

    /// Write raw s16le mono PCM at 44.1 kHz to stdout
    #[arg(long, conflicts_with = "wav")]
    raw: bool,

    /// Render to a WAV file instead of the speakers
    #[arg(long, value_name = "PATH")]
    wav: Option<PathBuf>,

    /// Play the pattern this many times
    #[arg(long, default_value_t = 1)]
    repeat: u32,

    /// Volume in percent
    #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u8).range(0..=100))]
    volume: u8,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let program = ToneProgram::load(&cli.pattern)?;

    if cli.check {
        print!("{program}");
        println!(
            "{} tones, {} ms",
            program.tone_count(),
            program.duration().as_millis()
        );
        return Ok(());
    }

    let (mut sink, pacing): (Box<dyn PcmSink>, Pacing) = if cli.raw {
        (Box::new(RawPcmSink::new(io::stdout().lock())), Pacing::Offline)
    } else if let Some(path) = &cli.wav {
        (Box::new(WavSink::create(path)?), Pacing::Offline)
    } else {
        (Box::new(RodioSink::open()?), Pacing::RealTime)
    };

    let volume = VolumeCell::new(cli.volume);
    for _ in 0..cli.repeat {
        let stats = Executor::new(&mut sink)
            .with_volume(volume.clone())
            .with_pacing(pacing)
            .run(&program)?;
        info!(tones = stats.tones, delays = stats.delays, "pattern played");
    }
    sink.finish()?;
    Ok(())
}
