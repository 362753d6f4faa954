//! Microphone capture and utterance segmentation.
//!
//! Capture runs on its own blocking thread: the cpal stream is built inside
//! [`AudioSource::run`] so it never crosses threads. Raw chunks are mixed to
//! mono, downsampled to the pipeline rate, and fed through an energy-based
//! [`UtteranceSegmenter`] that turns the continuous stream into discrete
//! utterances. Listen timeouts surface as empty segments so the session loop
//! can count idle cycles.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::AudioConfig;
use crate::error::{Result, SessionError};
use crate::pipeline::messages::AudioSegment;
use crate::pipeline::queue::{SegmentSender, SendOutcome};

use std::time::{Duration, Instant};

/// Blocking producer of audio segments.
///
/// `run` owns the capture thread until the token is cancelled. Timeouts are
/// reported as segments with no samples.
pub trait AudioSource: Send {
    fn run(&mut self, tx: SegmentSender, cancel: CancellationToken) -> Result<()>;
}

/// What the segmenter made of the latest chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum SegmenterEvent {
    /// A complete utterance ended.
    Utterance(AudioSegment),
    /// No speech started within the listen timeout.
    Timeout,
}

/// Energy-based utterance segmenter.
///
/// Speech starts when chunk RMS crosses the energy threshold and ends after
/// a sustained pause or at the phrase time limit. Utterances shorter than
/// the minimum duration are discarded as noise.
pub struct UtteranceSegmenter {
    sample_rate: u32,
    threshold: f32,
    pause_samples: usize,
    max_samples: usize,
    min_samples: usize,
    timeout_samples: usize,

    buffer: Vec<f32>,
    in_speech: bool,
    silent_run: usize,
    idle_run: usize,
    started_at: Option<Instant>,
}

impl UtteranceSegmenter {
    pub fn new(config: &AudioConfig) -> Self {
        let rate = config.sample_rate as usize;
        Self {
            sample_rate: config.sample_rate,
            threshold: config.energy_threshold,
            pause_samples: rate * config.pause_threshold_ms as usize / 1000,
            max_samples: rate * config.phrase_time_limit_s as usize,
            min_samples: rate * config.min_utterance_ms as usize / 1000,
            timeout_samples: rate * config.listen_timeout_s as usize,
            buffer: Vec::new(),
            in_speech: false,
            silent_run: 0,
            idle_run: 0,
            started_at: None,
        }
    }

    /// Feeds one chunk of mono samples, returning at most one event.
    pub fn push(&mut self, chunk: &[f32], now: Instant) -> Option<SegmenterEvent> {
        if chunk.is_empty() {
            return None;
        }
        let voiced = rms(chunk) >= self.threshold;

        if !self.in_speech {
            if voiced {
                self.in_speech = true;
                self.started_at = Some(now);
                self.silent_run = 0;
                self.idle_run = 0;
                self.buffer.extend_from_slice(chunk);
                return None;
            }
            self.idle_run += chunk.len();
            if self.idle_run >= self.timeout_samples {
                self.idle_run = 0;
                return Some(SegmenterEvent::Timeout);
            }
            return None;
        }

        self.buffer.extend_from_slice(chunk);
        if voiced {
            self.silent_run = 0;
        } else {
            self.silent_run += chunk.len();
        }

        if self.silent_run >= self.pause_samples || self.buffer.len() >= self.max_samples {
            return self.finish();
        }
        None
    }

    fn finish(&mut self) -> Option<SegmenterEvent> {
        let samples = std::mem::take(&mut self.buffer);
        // Voiced content excludes the trailing pause that ended the utterance.
        let content = samples.len().saturating_sub(self.silent_run);
        let started_at = self.started_at.take().unwrap_or_else(Instant::now);
        self.in_speech = false;
        self.silent_run = 0;
        self.idle_run = 0;

        if content < self.min_samples {
            debug!(samples = content, "utterance below minimum duration, discarded");
            return None;
        }
        Some(SegmenterEvent::Utterance(AudioSegment {
            samples,
            sample_rate: self.sample_rate,
            started_at,
        }))
    }
}

fn rms(chunk: &[f32]) -> f32 {
    let sum: f32 = chunk.iter().map(|s| s * s).sum();
    (sum / chunk.len() as f32).sqrt()
}

const RECV_POLL: Duration = Duration::from_millis(100);

/// Microphone source backed by cpal.
///
/// Captures at the device's native configuration and downsamples to the
/// configured pipeline rate in software.
pub struct CpalSource {
    config: AudioConfig,
}

impl CpalSource {
    pub fn new(config: AudioConfig) -> Self {
        Self { config }
    }

    /// List available input devices.
    pub fn list_input_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| SessionError::Audio(format!("cannot enumerate devices: {e}")))?;
        let mut names = Vec::new();
        for device in devices {
            if let Ok(desc) = device.description() {
                names.push(desc.name().to_owned());
            }
        }
        Ok(names)
    }
}

impl AudioSource for CpalSource {
    fn run(&mut self, tx: SegmentSender, cancel: CancellationToken) -> Result<()> {
        let host = cpal::default_host();
        let device = if let Some(ref name) = self.config.input_device {
            host.input_devices()
                .map_err(|e| SessionError::Audio(format!("cannot enumerate devices: {e}")))?
                .find(|d| {
                    d.description()
                        .ok()
                        .map(|desc| desc.name() == name)
                        .unwrap_or(false)
                })
                .ok_or_else(|| SessionError::Audio(format!("input device '{name}' not found")))?
        } else {
            host.default_input_device()
                .ok_or_else(|| SessionError::Audio("no default input device".into()))?
        };
        let device_name = device
            .description()
            .map(|d| d.name().to_owned())
            .unwrap_or_else(|_| "<unknown>".into());
        info!("using input device: {device_name}");

        let default_config = device
            .default_input_config()
            .map_err(|e| SessionError::Audio(format!("no default input config: {e}")))?;
        let native_rate = default_config.sample_rate();
        let native_channels = default_config.channels();
        let stream_config = StreamConfig {
            channels: native_channels,
            sample_rate: native_rate,
            buffer_size: cpal::BufferSize::Default,
        };
        let target_rate = self.config.sample_rate;
        info!(
            "native input config: {}Hz, {} channels, target {}Hz",
            native_rate, native_channels, target_rate
        );

        let (chunk_tx, chunk_rx) = std::sync::mpsc::sync_channel::<Vec<f32>>(64);
        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                    let mono = if native_channels > 1 {
                        to_mono(data, native_channels)
                    } else {
                        data.to_vec()
                    };
                    let samples = if native_rate != target_rate {
                        downsample(&mono, native_rate, target_rate)
                    } else {
                        mono
                    };
                    // try_send keeps the audio callback non-blocking.
                    if chunk_tx.try_send(samples).is_err() {
                        debug!("capture channel full, dropping chunk");
                    }
                },
                move |err| {
                    error!("audio input stream error: {err}");
                },
                None,
            )
            .map_err(|e| SessionError::Audio(format!("failed to build input stream: {e}")))?;
        stream
            .play()
            .map_err(|e| SessionError::Audio(format!("failed to start input stream: {e}")))?;
        info!("audio capture started");

        let mut segmenter = UtteranceSegmenter::new(&self.config);
        let sample_rate = target_rate;
        while !cancel.is_cancelled() {
            let chunk = match chunk_rx.recv_timeout(RECV_POLL) {
                Ok(chunk) => chunk,
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => continue,
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
            };
            let segment = match segmenter.push(&chunk, Instant::now()) {
                Some(SegmenterEvent::Utterance(segment)) => segment,
                Some(SegmenterEvent::Timeout) => AudioSegment {
                    samples: Vec::new(),
                    sample_rate,
                    started_at: Instant::now(),
                },
                None => continue,
            };
            if tx.send(segment, &cancel) == SendOutcome::Cancelled {
                break;
            }
        }

        drop(stream);
        info!("audio capture stopped");
        Ok(())
    }
}

/// Convert interleaved multi-channel audio to mono by averaging channels.
fn to_mono(data: &[f32], channels: u16) -> Vec<f32> {
    let ch = channels as usize;
    data.chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

/// Linear-interpolation downsampler. Speech energy sits below 8kHz, so no
/// anti-alias filter is needed for 48kHz to 16kHz.
fn downsample(samples: &[f32], src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if src_rate == dst_rate || samples.is_empty() {
        return samples.to_vec();
    }
    let ratio = src_rate as f64 / dst_rate as f64;
    let out_len = (samples.len() as f64 / ratio) as usize;
    let mut output = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let src_pos = i as f64 * ratio;
        let idx = src_pos as usize;
        let frac = src_pos - idx as f64;
        let sample = if idx + 1 < samples.len() {
            samples[idx] as f64 * (1.0 - frac) + samples[idx + 1] as f64 * frac
        } else {
            samples[idx.min(samples.len() - 1)] as f64
        };
        output.push(sample as f32);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AudioConfig {
        AudioConfig {
            sample_rate: 16_000,
            energy_threshold: 0.01,
            pause_threshold_ms: 300,
            phrase_time_limit_s: 2,
            listen_timeout_s: 1,
            min_utterance_ms: 200,
            ..AudioConfig::default()
        }
    }

    // 100ms chunks at 16kHz.
    fn loud() -> Vec<f32> {
        vec![0.5; 1600]
    }

    fn quiet() -> Vec<f32> {
        vec![0.0; 1600]
    }

    fn drive(seg: &mut UtteranceSegmenter, chunks: &[Vec<f32>]) -> Vec<SegmenterEvent> {
        let now = Instant::now();
        chunks
            .iter()
            .filter_map(|c| seg.push(c, now))
            .collect()
    }

    #[test]
    fn utterance_ends_after_sustained_pause() {
        let mut seg = UtteranceSegmenter::new(&config());
        // 500ms of speech, then 300ms of silence triggers the pause.
        let chunks: Vec<_> = (0..5)
            .map(|_| loud())
            .chain((0..3).map(|_| quiet()))
            .collect();
        let events = drive(&mut seg, &chunks);
        assert_eq!(events.len(), 1);
        match &events[0] {
            SegmenterEvent::Utterance(s) => {
                assert_eq!(s.sample_rate, 16_000);
                // 800ms total, speech plus trailing pause.
                assert_eq!(s.samples.len(), 8 * 1600);
            }
            other => panic!("expected utterance, got {other:?}"),
        }
    }

    #[test]
    fn short_blip_is_discarded() {
        let mut seg = UtteranceSegmenter::new(&config());
        // 100ms of speech is under the 200ms minimum.
        let chunks: Vec<_> = std::iter::once(loud())
            .chain((0..3).map(|_| quiet()))
            .collect();
        let events = drive(&mut seg, &chunks);
        assert!(events.is_empty());
    }

    #[test]
    fn brief_silence_does_not_split_an_utterance() {
        let mut seg = UtteranceSegmenter::new(&config());
        // speech, 100ms gap (under the 300ms pause), more speech.
        let chunks = vec![loud(), loud(), quiet(), loud(), loud()];
        let events = drive(&mut seg, &chunks);
        assert!(events.is_empty());
        assert!(seg.in_speech);
    }

    #[test]
    fn phrase_time_limit_caps_an_utterance() {
        let mut seg = UtteranceSegmenter::new(&config());
        // 2.5s of continuous speech against a 2s limit.
        let chunks: Vec<_> = (0..25).map(|_| loud()).collect();
        let events = drive(&mut seg, &chunks);
        assert_eq!(events.len(), 1);
        match &events[0] {
            SegmenterEvent::Utterance(s) => assert_eq!(s.samples.len(), 20 * 1600),
            other => panic!("expected utterance, got {other:?}"),
        }
    }

    #[test]
    fn silence_produces_timeouts() {
        let mut seg = UtteranceSegmenter::new(&config());
        // 2.5s of silence against a 1s listen timeout.
        let chunks: Vec<_> = (0..25).map(|_| quiet()).collect();
        let events = drive(&mut seg, &chunks);
        assert_eq!(events, vec![SegmenterEvent::Timeout, SegmenterEvent::Timeout]);
    }

    #[test]
    fn speech_resets_the_listen_timeout() {
        let mut seg = UtteranceSegmenter::new(&config());
        // 900ms silence, then speech: no timeout fires.
        let chunks: Vec<_> = (0..9)
            .map(|_| quiet())
            .chain(std::iter::once(loud()))
            .collect();
        let events = drive(&mut seg, &chunks);
        assert!(events.is_empty());
        assert!(seg.in_speech);
    }

    #[test]
    fn downsample_halves_48k_to_24k() {
        let samples: Vec<f32> = (0..480).map(|i| i as f32 / 480.0).collect();
        let out = downsample(&samples, 48_000, 24_000);
        assert_eq!(out.len(), 240);
    }

    #[test]
    fn to_mono_averages_stereo_frames() {
        let stereo = vec![1.0, 0.0, 0.5, 0.5, -1.0, 1.0];
        assert_eq!(to_mono(&stereo, 2), vec![0.5, 0.5, 0.0]);
    }
}
