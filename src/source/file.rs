use std::time::Duration;

use thiserror::Error;

use crate::config::Config;
use crate::media::{EncodeError, Encoder, FfmpegEncoder, FfmpegFrameSource, FrameError, FrameSource};
use crate::nal::{NalScanner, ParameterSetCache};
use crate::pacing::{PacingClock, RateMeter};

use super::SampleSource;

const RATE_REPORT_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to open source: {0}")]
    Frames(#[from] FrameError),
    #[error("failed to start encoder: {0}")]
    Encoder(#[from] EncodeError),
}

/// File-backed sample source: decodes frames, re-encodes them to Annex-B
/// H.264 and paces one sample per tick at the source's native frame
/// duration, looping at end of stream so a finite file reads like a live
/// feed. Single-slot: each tick replaces the previous sample.
pub struct FileSource {
    frames: Box<dyn FrameSource + Send>,
    encoder: Box<dyn Encoder + Send>,
    clock: PacingClock,
    cache: ParameterSetCache,
    rate: RateMeter,
    sample: Vec<u8>,
    sample_time_us: u64,
    loop_playback: bool,
    /// Computed from target/native fps but not applied: every decoded frame
    /// is emitted and the target rate only paces the drive loop. See
    /// DESIGN.md.
    frame_skip: u32,
}

impl FileSource {
    pub fn open(config: &Config) -> Result<Self, SourceError> {
        let frames =
            FfmpegFrameSource::open(&config.source.path, config.encoder.width, config.encoder.height)?;
        let encoder = FfmpegEncoder::spawn(&config.encoder)?;
        Ok(Self::from_parts(
            Box::new(frames),
            Box::new(encoder),
            config.source.fps,
            config.source.loop_playback,
        ))
    }

    pub(crate) fn from_parts(
        frames: Box<dyn FrameSource + Send>,
        encoder: Box<dyn Encoder + Send>,
        target_fps: u32,
        loop_playback: bool,
    ) -> Self {
        let native_fps = frames.native_fps();
        let frame_duration_us = (1_000_000.0 / native_fps) as u64;
        let frame_skip = ((target_fps as f64 / native_fps) as u32).max(1);

        tracing::debug!(
            native_fps = format!("{:.2}", native_fps),
            frame_duration_us,
            frame_skip,
            loop_playback,
            "file source ready"
        );

        Self {
            frames,
            encoder,
            clock: PacingClock::new(frame_duration_us),
            cache: ParameterSetCache::new(),
            rate: RateMeter::with_default_hook(RATE_REPORT_INTERVAL),
            sample: Vec::new(),
            sample_time_us: 0,
            loop_playback,
            frame_skip,
        }
    }

    pub fn is_alive(&mut self) -> bool {
        self.encoder.is_alive()
    }

    /// End-of-stream: either park the clock (non-looping) or rewind and try
    /// exactly one more read. None leaves all state as it was; the caller
    /// polls again rather than treating this as an error.
    fn restart_at_end(&mut self) -> Option<Vec<u8>> {
        if !self.loop_playback {
            tracing::debug!("end of stream, source stopped");
            self.clock.halt();
            return None;
        }
        if !self.frames.rewind() {
            return None;
        }
        // Clock epoch resets only once the rewound source actually delivers
        let frame = self.frames.next_frame()?;
        tracing::debug!(frame_skip = self.frame_skip, "looping back to first frame");
        self.clock.rewind();
        Some(frame)
    }
}

impl SampleSource for FileSource {
    fn start(&mut self) {
        self.clock.start();
        self.load_next_sample();
    }

    fn stop(&mut self) {
        self.sample.clear();
        self.sample_time_us = 0;
        self.clock.stop();
    }

    fn load_next_sample(&mut self) {
        if !self.clock.is_running() {
            return;
        }

        loop {
            let frame = match self.frames.next_frame() {
                Some(frame) => frame,
                None => match self.restart_at_end() {
                    Some(frame) => frame,
                    None => return,
                },
            };

            let encoded = match self.encoder.encode(&frame) {
                Ok(encoded) => encoded,
                Err(e) => {
                    // Absorbed: the consumer just sees no new sample
                    tracing::warn!(error = %e, "encode failed, skipping tick");
                    return;
                }
            };
            if encoded.is_empty() {
                // Encoder still buffering; retry with the next frame so the
                // consumer never observes a gap
                continue;
            }

            let mut units = 0usize;
            let mut keyframe = false;
            for unit in NalScanner::new(&encoded) {
                keyframe |= unit.ty.is_some_and(|t| t.is_keyframe());
                self.cache.observe(&unit, &encoded);
                units += 1;
            }

            self.sample_time_us = self.clock.advance();
            tracing::trace!(
                units,
                keyframe,
                bytes = encoded.len(),
                time_us = self.sample_time_us,
                "sample loaded"
            );
            self.sample = encoded;
            self.rate.tick();
            return;
        }
    }

    fn sample(&self) -> &[u8] {
        &self.sample
    }

    fn sample_time_us(&self) -> u64 {
        self.sample_time_us
    }

    fn sample_duration_us(&self) -> u64 {
        self.clock.frame_duration_us()
    }

    fn initial_nalus(&self) -> Vec<u8> {
        self.cache.bootstrap_units()
    }
}
