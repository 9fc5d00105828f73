//! Executes parsed tone programs against a PCM sink.

use crate::audio::{self, AudioError, PcmSink};
use crate::tone::{Instruction, ToneProgram};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Shared cancellation flag, checked between instructions and between
/// the one-second blocks of a long tone or delay.
///
/// Cancelling does not interrupt a block that is already sleeping; the
/// executor notices at its next check.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Volume percentage shared between the executor and a ramp loop.
#[derive(Debug, Clone)]
pub struct VolumeCell(Arc<AtomicU8>);

impl VolumeCell {
    pub fn new(percent: u8) -> Self {
        Self(Arc::new(AtomicU8::new(percent.min(100))))
    }

    pub fn get(&self) -> u8 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self, percent: u8) {
        self.0.store(percent.min(100), Ordering::SeqCst);
    }
}

impl Default for VolumeCell {
    fn default() -> Self {
        Self::new(100)
    }
}

/// How the executor paces itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pacing {
    /// Block for every tone and delay, for live playback.
    #[default]
    RealTime,
    /// Never sleep; delays become silence in the sink. For rendering.
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecutionStats {
    pub tones: usize,
    pub delays: usize,
    pub cancelled: bool,
}

pub struct Executor<'a, S: PcmSink + ?Sized> {
    sink: &'a mut S,
    volume: VolumeCell,
    cancel: CancelFlag,
    pacing: Pacing,
    stats: ExecutionStats,
}

impl<'a, S: PcmSink + ?Sized> Executor<'a, S> {
    pub fn new(sink: &'a mut S) -> Self {
        Self {
            sink,
            volume: VolumeCell::default(),
            cancel: CancelFlag::new(),
            pacing: Pacing::default(),
            stats: ExecutionStats::default(),
        }
    }

    pub fn with_volume(mut self, volume: VolumeCell) -> Self {
        self.volume = volume;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    /// Runs the program depth-first, returning what was played.
    pub fn run(mut self, program: &ToneProgram) -> Result<ExecutionStats, AudioError> {
        self.stats.cancelled = !self.execute(program)?;
        Ok(self.stats)
    }

    /// Returns false once cancelled.
    fn execute(&mut self, program: &ToneProgram) -> Result<bool, AudioError> {
        for instruction in program.instructions() {
            if self.cancel.is_cancelled() {
                return Ok(false);
            }
            match instruction {
                Instruction::Tone { freq, duration } => {
                    self.stats.tones += 1;
                    if !self.render(Some(*freq), *duration)? {
                        return Ok(false);
                    }
                }
                Instruction::Delay(duration) => {
                    self.stats.delays += 1;
                    if !self.render(None, *duration)? {
                        return Ok(false);
                    }
                }
                Instruction::Loop { count, body } => {
                    for _ in 0..*count {
                        if !self.execute(body)? {
                            return Ok(false);
                        }
                    }
                }
            }
        }
        Ok(true)
    }

    /// Plays a tone, or silence when `freq` is `None`, one block at a time.
    /// Live silence is only waited out. Returns false once cancelled.
    fn render(&mut self, freq: Option<f64>, duration: Duration) -> Result<bool, AudioError> {
        let mut offset = 0;
        let mut remaining = duration;
        while !remaining.is_zero() {
            if self.cancel.is_cancelled() {
                return Ok(false);
            }
            let block = remaining.min(audio::BLOCK_DURATION);
            let len = audio::sample_count(block);
            match freq {
                Some(freq) => {
                    let samples = audio::synthesize_block(freq, offset, len, self.volume.get());
                    self.sink.write(&samples)?;
                }
                None if self.pacing == Pacing::Offline => {
                    self.sink.write(&audio::silence(block))?;
                }
                None => {}
            }
            self.pause(block);
            offset += len;
            remaining -= block;
        }
        Ok(true)
    }

    fn pause(&self, duration: Duration) {
        if self.pacing == Pacing::RealTime {
            thread::sleep(duration);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::RawPcmSink;
    use std::time::Instant;

    /// Counts writes and forwards nothing.
    #[derive(Default)]
    struct CountingSink {
        writes: usize,
        samples: usize,
    }

    impl PcmSink for CountingSink {
        fn write(&mut self, samples: &[i16]) -> Result<(), AudioError> {
            self.writes += 1;
            self.samples += samples.len();
            Ok(())
        }
    }

    fn reference_program() -> ToneProgram {
        ToneProgram::parse("tone A4 200ms delay 100ms loop 3 { tone C5 50ms }").unwrap()
    }

    #[test]
    fn test_realtime_execution_counts_and_timing() {
        let mut sink = CountingSink::default();
        let started = Instant::now();
        let stats = Executor::new(&mut sink).run(&reference_program()).unwrap();
        let elapsed = started.elapsed();

        assert_eq!(
            stats,
            ExecutionStats {
                tones: 4,
                delays: 1,
                cancelled: false
            }
        );
        assert_eq!(sink.writes, 4);
        assert_eq!(sink.samples, 8_820 + 3 * 2_205);
        assert!(elapsed >= Duration::from_millis(450));
        assert!(elapsed < Duration::from_millis(1_500));
    }

    #[test]
    fn test_offline_execution_renders_delays() {
        let mut sink = RawPcmSink::new(Vec::new());
        let started = Instant::now();
        let stats = Executor::new(&mut sink)
            .with_pacing(Pacing::Offline)
            .run(&reference_program())
            .unwrap();

        assert!(started.elapsed() < Duration::from_millis(200));
        assert_eq!(stats.tones, 4);
        // 450ms of mono s16le
        assert_eq!(sink.into_inner().len(), 19_845 * 2);
    }

    #[test]
    fn test_zero_count_loop_plays_nothing() {
        let mut sink = CountingSink::default();
        let program = ToneProgram::parse("loop 0 { tone A4 100ms }").unwrap();
        let stats = Executor::new(&mut sink).run(&program).unwrap();
        assert_eq!(stats.tones, 0);
        assert_eq!(sink.writes, 0);
    }

    #[test]
    fn test_cancelled_before_start() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let mut sink = CountingSink::default();
        let stats = Executor::new(&mut sink)
            .with_cancel(cancel)
            .run(&reference_program())
            .unwrap();
        assert!(stats.cancelled);
        assert_eq!(stats.tones, 0);
    }

    #[test]
    fn test_cancel_is_observed_between_instructions() {
        let cancel = CancelFlag::new();
        let remote = cancel.clone();
        let program = ToneProgram::parse("loop 50 { tone A4 20ms }").unwrap();

        let worker = thread::spawn(move || {
            let mut sink = CountingSink::default();
            Executor::new(&mut sink)
                .with_cancel(cancel)
                .run(&program)
                .unwrap()
        });
        thread::sleep(Duration::from_millis(100));
        remote.cancel();

        let stats = worker.join().unwrap();
        assert!(stats.cancelled);
        assert!(stats.tones > 0);
        assert!(stats.tones < 50);
    }

    #[test]
    fn test_long_tone_is_written_in_blocks() {
        let mut sink = CountingSink::default();
        let program = ToneProgram::parse("tone A4 2500ms delay 1200ms").unwrap();
        let stats = Executor::new(&mut sink)
            .with_pacing(Pacing::Offline)
            .run(&program)
            .unwrap();
        assert_eq!(stats.tones, 1);
        // 1s + 1s + 0.5s of tone, then 1s + 0.2s of silence
        assert_eq!(sink.writes, 5);
        assert_eq!(sink.samples, 110_250 + 52_920);
    }

    #[test]
    fn test_cancel_is_observed_inside_a_long_tone() {
        let cancel = CancelFlag::new();
        let remote = cancel.clone();
        let program = ToneProgram::parse("tone A4 600000ms").unwrap();

        let started = Instant::now();
        let worker = thread::spawn(move || {
            let mut sink = CountingSink::default();
            let stats = Executor::new(&mut sink)
                .with_cancel(cancel)
                .run(&program)
                .unwrap();
            (stats, sink.samples)
        });
        thread::sleep(Duration::from_millis(100));
        remote.cancel();

        let (stats, samples) = worker.join().unwrap();
        assert!(stats.cancelled);
        assert_eq!(samples, 44_100);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn test_volume_cell_is_read_per_tone() {
        let volume = VolumeCell::new(0);
        let mut sink = RawPcmSink::new(Vec::new());
        let program = ToneProgram::parse("tone A4 10ms").unwrap();
        Executor::new(&mut sink)
            .with_volume(volume.clone())
            .with_pacing(Pacing::Offline)
            .run(&program)
            .unwrap();
        assert!(sink.into_inner().iter().all(|&b| b == 0));

        volume.set(250);
        assert_eq!(volume.get(), 100);
    }
}
