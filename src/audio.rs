//! PCM synthesis and audio sinks for the tone engine.

use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, OutputStreamHandle, Sink};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const SAMPLE_RATE: u32 = 44_100;
pub const CHANNELS: u16 = 1;

/// Longest stretch synthesized or written in one piece.
pub const BLOCK_DURATION: Duration = Duration::from_secs(1);

/// Peak amplitude of a tone at full volume, as a fraction of i16::MAX.
pub const TONE_AMPLITUDE: f64 = 0.15;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Failed to initialize audio output: {0}")]
    Stream(#[from] rodio::StreamError),
    #[error("Failed to play audio: {0}")]
    Play(#[from] rodio::PlayError),
    #[error("Failed to write audio: {0}")]
    Io(#[from] io::Error),
    #[error("Failed to write WAV file: {0}")]
    Wav(#[from] hound::Error),
}

/// Destination for mono 16-bit PCM at [`SAMPLE_RATE`].
pub trait PcmSink {
    fn write(&mut self, samples: &[i16]) -> Result<(), AudioError>;

    /// Completes any buffered output.
    fn finish(&mut self) -> Result<(), AudioError> {
        Ok(())
    }
}

impl<S: PcmSink + ?Sized> PcmSink for Box<S> {
    fn write(&mut self, samples: &[i16]) -> Result<(), AudioError> {
        (**self).write(samples)
    }

    fn finish(&mut self) -> Result<(), AudioError> {
        (**self).finish()
    }
}

/// Number of samples covering `duration`, saturating at `usize::MAX`.
pub fn sample_count(duration: Duration) -> usize {
    let samples = u128::from(SAMPLE_RATE) * duration.as_nanos() / 1_000_000_000;
    usize::try_from(samples).unwrap_or(usize::MAX)
}

/// Synthesizes a sine tone. `volume` is a percentage of the fixed tone
/// amplitude.
pub fn synthesize_tone(freq: f64, duration: Duration, volume: u8) -> Vec<i16> {
    synthesize_block(freq, 0, sample_count(duration), volume)
}

/// Synthesizes `len` samples of a sine tone starting at sample `offset`.
/// Consecutive blocks join without a phase jump.
pub fn synthesize_block(freq: f64, offset: usize, len: usize, volume: u8) -> Vec<i16> {
    let gain = f64::from(i16::MAX) * TONE_AMPLITUDE * f64::from(volume.min(100)) / 100.0;
    let step = 2.0 * std::f64::consts::PI * freq / f64::from(SAMPLE_RATE);
    (offset..offset.saturating_add(len))
        .map(|i| ((step * i as f64).sin() * gain) as i16)
        .collect()
}

/// Silence covering `duration`.
pub fn silence(duration: Duration) -> Vec<i16> {
    vec![0; sample_count(duration)]
}

/// Encodes samples as signed 16-bit little-endian bytes.
pub fn encode_le(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Plays samples on the default output device.
pub struct RodioSink {
    _stream: OutputStream,
    _handle: OutputStreamHandle,
    sink: Sink,
}

impl RodioSink {
    /// Opens the default output device. The stream is not `Send`, so open
    /// it on the thread that will write to it.
    pub fn open() -> Result<Self, AudioError> {
        let (stream, handle) = OutputStream::try_default()?;
        let sink = Sink::try_new(&handle)?;
        Ok(Self {
            _stream: stream,
            _handle: handle,
            sink,
        })
    }
}

impl PcmSink for RodioSink {
    fn write(&mut self, samples: &[i16]) -> Result<(), AudioError> {
        self.sink
            .append(SamplesBuffer::new(CHANNELS, SAMPLE_RATE, samples.to_vec()));
        Ok(())
    }

    fn finish(&mut self) -> Result<(), AudioError> {
        self.sink.sleep_until_end();
        Ok(())
    }
}

/// Writes raw s16le PCM to any writer, e.g. stdout piped into `aplay`.
pub struct RawPcmSink<W: Write> {
    writer: W,
}

impl<W: Write> RawPcmSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> PcmSink for RawPcmSink<W> {
    fn write(&mut self, samples: &[i16]) -> Result<(), AudioError> {
        self.writer.write_all(&encode_le(samples))?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), AudioError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Renders samples into a 16-bit mono WAV file.
pub struct WavSink {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
}

impl WavSink {
    pub fn create(path: &Path) -> Result<Self, AudioError> {
        let spec = hound::WavSpec {
            channels: CHANNELS,
            sample_rate: SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        Ok(Self {
            writer: Some(hound::WavWriter::create(path, spec)?),
        })
    }
}

impl PcmSink for WavSink {
    fn write(&mut self, samples: &[i16]) -> Result<(), AudioError> {
        if let Some(writer) = self.writer.as_mut() {
            for &sample in samples {
                writer.write_sample(sample)?;
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), AudioError> {
        if let Some(writer) = self.writer.take() {
            writer.finalize()?;
        }
        Ok(())
    }
}
