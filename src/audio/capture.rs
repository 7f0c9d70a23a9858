use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use hound::{WavSpec, WavWriter};
use ringbuf::{
    traits::{Consumer, Producer, Split},
    HeapCons, HeapRb,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

use crate::config::{AudioConfig, Config};

/// Exponential smoothing factor applied per audio buffer
const LEVEL_SMOOTHING: f32 = 0.3;
/// Maps typical speech RMS into the 0.0-1.0 display range
const LEVEL_GAIN: f32 = 6.0;
/// Ring buffer capacity in seconds of device-rate audio
const MAX_RECORDING_SECS: usize = 30;

/// Handle to one captured audio file
///
/// Created by [`AudioCapture::stop_recording`], consumed exactly once
/// by the transcription coordinator, and deleted when the session is
/// done with it.
#[derive(Debug)]
pub struct RecordingArtifact {
    path: PathBuf,
}

impl RecordingArtifact {
    /// Wraps an existing WAV file path
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Location of the backing WAV file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Deletes the backing file; safe to call when it no longer exists
    pub fn delete(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("deleted recording artifact: {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("failed to delete {}: {}", self.path.display(), e),
        }
    }
}

/// Live smoothed audio level for feedback consumers
///
/// Fire-and-forget: dropping it has no effect on capture or
/// transcription.
#[derive(Debug, Clone)]
pub struct LevelMonitor {
    bits: Arc<AtomicU32>,
}

impl LevelMonitor {
    /// Current smoothed level in 0.0-1.0
    #[must_use]
    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

/// Trait for controlling audio stream lifecycle
trait StreamControl: Send {
    /// Resume audio stream (activate microphone)
    fn play(&self) -> Result<()>;
    /// Pause audio stream (deactivate microphone)
    fn pause(&self) -> Result<()>;
}

struct CpalStreamControl {
    stream: cpal::Stream,
}

impl StreamControl for CpalStreamControl {
    fn play(&self) -> Result<()> {
        self.stream.play().context("failed to resume audio stream")
    }

    fn pause(&self) -> Result<()> {
        self.stream.pause().context("failed to pause audio stream")
    }
}

/// Microphone capture producing WAV artifacts
///
/// The stream stays open for the life of the process and is paused
/// between sessions; `start_recording`/`stop_recording` toggle it.
pub struct AudioCapture {
    /// Stream controller (kept alive to prevent stream drop)
    #[allow(dead_code)]
    stream_control: Option<Box<dyn StreamControl>>,
    ring_buffer_consumer: HeapCons<f32>,
    is_recording: Arc<AtomicBool>,
    level_bits: Arc<AtomicU32>,
    device_sample_rate: u32,
    device_channels: u16,
    target_sample_rate: u32,
    recordings_dir: PathBuf,
}

impl AudioCapture {
    /// Opens the default input device and prepares a paused stream
    ///
    /// # Errors
    /// Returns error if no input device is available or the stream
    /// cannot be created (a setup error in session terms)
    pub fn new(config: &AudioConfig) -> Result<Self> {
        info!("initializing audio capture");

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .context("no input device available")?;

        let device_name = device.name().unwrap_or_else(|_| "unknown".to_owned());
        info!("using input device: {}", device_name);

        let supported_config = device
            .default_input_config()
            .context("failed to get default input config")?;

        let device_sample_rate = supported_config.sample_rate();
        let device_channels = supported_config.channels();

        info!(
            "device config: {} Hz, {} channels",
            device_sample_rate, device_channels
        );

        let ring_buffer_capacity =
            (device_sample_rate as usize) * (device_channels as usize) * MAX_RECORDING_SECS;
        let ring_buffer = HeapRb::<f32>::new(ring_buffer_capacity);
        let (mut producer, ring_buffer_consumer) = ring_buffer.split();

        let is_recording = Arc::new(AtomicBool::new(false));
        let level_bits = Arc::new(AtomicU32::new(0.0_f32.to_bits()));

        let is_recording_cb = Arc::clone(&is_recording);
        let level_bits_cb = Arc::clone(&level_bits);

        let stream_config = supported_config.into();
        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    update_level(&level_bits_cb, data);
                    if is_recording_cb.load(Ordering::Relaxed) {
                        let pushed = producer.push_slice(data);
                        if pushed < data.len() {
                            warn!("ring buffer full, dropped {} samples", data.len() - pushed);
                        }
                    }
                },
                move |err| {
                    warn!("audio stream error: {}", err);
                },
                None,
            )
            .context("failed to build input stream")?;

        let stream_control = CpalStreamControl { stream };

        // Start then immediately pause: mic inactive until a session begins
        stream_control.play()?;
        stream_control.pause()?;
        info!("audio stream initialized (paused)");

        Ok(Self {
            stream_control: Some(Box::new(stream_control)),
            ring_buffer_consumer,
            is_recording,
            level_bits,
            device_sample_rate,
            device_channels,
            target_sample_rate: config.sample_rate,
            recordings_dir: Config::expand_path(&config.recordings_dir)?,
        })
    }

    /// Shared handle to the smoothed audio level
    #[must_use]
    pub fn level_monitor(&self) -> LevelMonitor {
        LevelMonitor {
            bits: Arc::clone(&self.level_bits),
        }
    }

    /// Begins capturing audio
    ///
    /// # Errors
    /// Returns error if the microphone stream cannot be resumed
    pub fn start_recording(&mut self) -> Result<()> {
        let start = std::time::Instant::now();
        debug!("starting recording");

        self.ring_buffer_consumer.clear();
        self.level_bits.store(0.0_f32.to_bits(), Ordering::Relaxed);

        // Set the flag before resuming so no early buffers are missed
        self.is_recording.store(true, Ordering::Relaxed);

        if let Some(stream_control) = &self.stream_control {
            if let Err(e) = stream_control.play() {
                self.is_recording.store(false, Ordering::Relaxed);
                return Err(e);
            }
        }

        info!(latency_us = start.elapsed().as_micros(), "recording started");
        Ok(())
    }

    /// Stops capture and encodes the artifact WAV
    ///
    /// Returns `None` when no capture was active.
    ///
    /// # Errors
    /// Returns error if the artifact file cannot be written
    pub fn stop_recording(&mut self) -> Result<Option<RecordingArtifact>> {
        if !self.is_recording.swap(false, Ordering::Relaxed) {
            debug!("stop requested with no active capture");
            return Ok(None);
        }

        if let Some(stream_control) = &self.stream_control {
            stream_control.pause()?;
        }

        let mut samples = Vec::new();
        while let Some(sample) = self.ring_buffer_consumer.try_pop() {
            samples.push(sample);
        }

        let mono = downmix_to_mono(&samples, self.device_channels);
        let resampled = resample_linear(&mono, self.device_sample_rate, self.target_sample_rate);

        let path = self.artifact_path()?;
        write_wav(&resampled, self.target_sample_rate, &path)?;

        info!(
            captured = samples.len(),
            encoded = resampled.len(),
            path = %path.display(),
            "recording stopped"
        );

        Ok(Some(RecordingArtifact::new(path)))
    }

    fn artifact_path(&self) -> Result<PathBuf> {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .context("failed to get current time")?
            .as_millis();
        Ok(self
            .recordings_dir
            .join(format!("recording_{timestamp_ms}.wav")))
    }
}

/// Folds one audio buffer into the smoothed level
fn update_level(level_bits: &AtomicU32, data: &[f32]) {
    let rms = buffer_rms(data);
    let scaled = (rms * LEVEL_GAIN).min(1.0);
    let previous = f32::from_bits(level_bits.load(Ordering::Relaxed));
    let smoothed = LEVEL_SMOOTHING.mul_add(scaled, (1.0 - LEVEL_SMOOTHING) * previous);
    level_bits.store(smoothed.to_bits(), Ordering::Relaxed);
}

fn buffer_rms(data: &[f32]) -> f32 {
    if data.is_empty() {
        return 0.0;
    }
    let sum_squares: f64 = data.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    // f64 → f32 after the mean keeps precision where it matters
    #[allow(clippy::cast_possible_truncation)]
    {
        (sum_squares / data.len() as f64).sqrt() as f32
    }
}

/// Averages interleaved channels down to mono
fn downmix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let channels_f64 = f64::from(channels);
    samples
        .chunks(channels as usize)
        .map(|frame| {
            let sum: f64 = frame.iter().map(|&s| f64::from(s)).sum();
            #[allow(clippy::cast_possible_truncation)]
            {
                (sum / channels_f64) as f32
            }
        })
        .collect()
}

/// Linear-interpolation resampler
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = f64::from(from_rate) / f64::from(to_rate);
    let output_len = ((samples.len() as f64) / ratio).ceil() as usize;

    let mut resampled = Vec::with_capacity(output_len);
    for i in 0..output_len {
        let src_idx = (i as f64) * ratio;
        let floor = (src_idx.floor() as usize).min(samples.len() - 1);
        let ceil = (floor + 1).min(samples.len() - 1);
        let fract = src_idx - src_idx.floor();

        let s1 = f64::from(samples[floor]);
        let s2 = f64::from(samples[ceil]);
        resampled.push(s1.mul_add(1.0 - fract, s2 * fract) as f32);
    }

    resampled
}

/// Encodes samples as 16-bit PCM WAV, creating parent directories
fn write_wav(samples: &[f32], sample_rate: u32, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("failed to create recordings directory")?;
    }

    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec).context("failed to create WAV file")?;
    for &sample in samples {
        // f32 [-1, 1] → i16; clamp guards against clipped capture buffers
        #[allow(clippy::cast_possible_truncation)]
        let quantized = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
        writer
            .write_sample(quantized)
            .context("failed to write sample")?;
    }
    writer.finalize().context("failed to finalize WAV file")?;

    Ok(())
}
