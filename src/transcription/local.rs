use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Mutex;
use tracing::{debug, info, warn};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::audio::RecordingArtifact;
use crate::config::{Config, LocalModelConfig};
use crate::transcription::coordinator::{SpeechBackend, TranscribeError};

/// One transcription request for the worker thread
struct Job {
    samples: Vec<f32>,
    reply: mpsc::Sender<Result<String, TranscribeError>>,
}

/// On-device whisper backend
///
/// The model runtime is not reentrant, so every call in the process is
/// funneled through one dedicated worker thread that owns the loaded
/// context. Callers block on a per-job reply channel; serialization
/// comes from the single consumer, not from per-call locking.
pub struct LocalBackend {
    model_path: PathBuf,
    jobs: Mutex<mpsc::Sender<Job>>,
}

impl LocalBackend {
    /// Spawns the worker thread and returns the backend handle
    ///
    /// The model itself is loaded lazily on the worker the first time a
    /// job arrives, so startup stays fast when the user never dictates.
    ///
    /// # Errors
    /// Returns error if the model path cannot be expanded or the worker
    /// thread cannot be spawned
    pub fn new(config: &LocalModelConfig, language: Option<String>) -> anyhow::Result<Self> {
        let model_path = Config::expand_path(&config.model_path)?;

        let (tx, rx) = mpsc::channel::<Job>();
        let worker_config = WorkerConfig {
            model_path: model_path.clone(),
            threads: config.threads,
            beam_size: config.beam_size,
            language,
        };

        std::thread::Builder::new()
            .name("whisper-worker".to_owned())
            .spawn(move || worker_loop(&worker_config, &rx))?;

        Ok(Self {
            model_path,
            jobs: Mutex::new(tx),
        })
    }
}

impl SpeechBackend for LocalBackend {
    fn transcribe(&self, artifact: &RecordingArtifact) -> Result<String, TranscribeError> {
        if !self.model_path.exists() {
            return Err(TranscribeError::NoModelAvailable(format!(
                "{} does not exist",
                self.model_path.display()
            )));
        }

        let samples = read_wav_samples(artifact.path())?;
        debug!(samples = samples.len(), "dispatching to whisper worker");

        let (reply_tx, reply_rx) = mpsc::channel();
        let job = Job {
            samples,
            reply: reply_tx,
        };

        let sender = self
            .jobs
            .lock()
            .map_err(|_| TranscribeError::BackendRejected("whisper worker lock poisoned".to_owned()))?
            .clone();

        sender.send(job).map_err(|_| {
            TranscribeError::BackendRejected("whisper worker has exited".to_owned())
        })?;

        reply_rx.recv().map_err(|_| {
            TranscribeError::BackendRejected("whisper worker dropped the request".to_owned())
        })?
    }

    fn validate(&self) -> Option<String> {
        if self.model_path.exists() {
            None
        } else {
            Some(format!(
                "no local model installed at {} - download one or switch to remote mode",
                self.model_path.display()
            ))
        }
    }
}

struct WorkerConfig {
    model_path: PathBuf,
    threads: usize,
    beam_size: usize,
    language: Option<String>,
}

/// Worker loop: loads the model on first use, then serves jobs until
/// every sender is gone.
fn worker_loop(config: &WorkerConfig, jobs: &mpsc::Receiver<Job>) {
    let mut engine: Option<WhisperEngine> = None;

    while let Ok(job) = jobs.recv() {
        if engine.is_none() {
            match WhisperEngine::load(
                &config.model_path,
                config.threads,
                config.beam_size,
                config.language.clone(),
            ) {
                Ok(loaded) => engine = Some(loaded),
                Err(err) => {
                    warn!(%err, "whisper model load failed");
                    let _ = job.reply.send(Err(err));
                    continue;
                }
            }
        }

        let result = match &engine {
            Some(engine) => engine.transcribe(&job.samples),
            None => Err(TranscribeError::ModelLoadFailed(
                "engine unavailable".to_owned(),
            )),
        };

        // A disconnected reply channel means the session was torn down;
        // nothing to do with the result.
        let _ = job.reply.send(result);
    }

    debug!("whisper worker shutting down");
}

/// Loaded whisper context plus inference parameters
///
/// Owned exclusively by the worker thread; never shared.
struct WhisperEngine {
    ctx: WhisperContext,
    threads: i32,
    beam_size: i32,
    language: Option<String>,
}

impl WhisperEngine {
    /// Sampling strategy for the configured beam width
    const fn sampling_strategy(beam_size: i32) -> SamplingStrategy {
        if beam_size > 1 {
            SamplingStrategy::BeamSearch {
                beam_size,
                patience: -1.0,
            }
        } else {
            SamplingStrategy::Greedy { best_of: 1 }
        }
    }

    fn load(
        model_path: &Path,
        threads: usize,
        beam_size: usize,
        language: Option<String>,
    ) -> Result<Self, TranscribeError> {
        let threads = i32::try_from(threads.max(1)).map_err(|_| {
            TranscribeError::ModelLoadFailed(format!("threads value too large (max {})", i32::MAX))
        })?;
        let beam_size = i32::try_from(beam_size.max(1)).map_err(|_| {
            TranscribeError::ModelLoadFailed(format!(
                "beam_size value too large (max {})",
                i32::MAX
            ))
        })?;

        let path_str = model_path.to_str().ok_or_else(|| {
            TranscribeError::ModelLoadFailed("model path contains invalid UTF-8".to_owned())
        })?;

        info!(
            path = %model_path.display(),
            threads,
            beam_size,
            language = ?language,
            "loading whisper model"
        );

        let params = WhisperContextParameters::default();
        let ctx = WhisperContext::new_with_params(path_str, params)
            .map_err(|e| TranscribeError::ModelLoadFailed(format!("{e:?}")))?;

        info!("whisper model loaded");

        Ok(Self {
            ctx,
            threads,
            beam_size,
            language,
        })
    }

    fn transcribe(&self, samples: &[f32]) -> Result<String, TranscribeError> {
        let _span = tracing::debug_span!("whisper_inference", samples = samples.len()).entered();

        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| TranscribeError::BackendRejected(format!("state creation failed: {e:?}")))?;

        let mut params = FullParams::new(Self::sampling_strategy(self.beam_size));
        params.set_n_threads(self.threads);
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        params.set_language(self.language.as_deref());
        params.set_translate(false);

        let start = std::time::Instant::now();
        state
            .full(params, samples)
            .map_err(|e| TranscribeError::BackendRejected(format!("inference failed: {e:?}")))?;

        let mut text = String::new();
        for segment in state.as_iter() {
            text.push_str(&segment.to_string());
        }

        info!(
            segments = state.full_n_segments(),
            text_len = text.len(),
            inference_ms = start.elapsed().as_millis(),
            "whisper inference finished"
        );

        Ok(text)
    }
}

/// Reads a mono WAV artifact back into f32 samples
fn read_wav_samples(path: &Path) -> Result<Vec<f32>, TranscribeError> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| TranscribeError::AudioUnreadable(e.to_string()))?;

    let spec = reader.spec();
    match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<Vec<f32>, _>>()
            .map_err(|e| TranscribeError::AudioUnreadable(e.to_string())),
        hound::SampleFormat::Int => reader
            .samples::<i16>()
            .map(|sample| sample.map(|v| f32::from(v) / 32768.0))
            .collect::<Result<Vec<f32>, _>>()
            .map_err(|e| TranscribeError::AudioUnreadable(e.to_string())),
    }
}
