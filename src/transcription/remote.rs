use std::time::Duration;
use tracing::{debug, info, warn};

use crate::audio::RecordingArtifact;
use crate::config::RemoteConfig;
use crate::transcription::coordinator::{SpeechBackend, TranscribeError};

/// Env var consulted when no API key is present in the config file
const API_KEY_ENV: &str = "VOICEDROP_API_KEY";

/// Remote backend speaking the OpenAI-compatible transcription API
///
/// Uploads the artifact WAV as a multipart form to
/// `<endpoint>/v1/audio/transcriptions` and expects a JSON body with a
/// `text` field.
pub struct RemoteBackend {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    timeout: Duration,
    language: Option<String>,
}

impl RemoteBackend {
    /// Builds the backend from config; the API key falls back to the
    /// `VOICEDROP_API_KEY` environment variable.
    #[must_use]
    pub fn new(config: &RemoteConfig, language: Option<String>) -> Self {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var(API_KEY_ENV).ok());

        if config.endpoint.starts_with("http://") && !is_local_endpoint(&config.endpoint) {
            warn!("remote endpoint uses plain HTTP; audio will be transmitted unencrypted");
        }

        Self {
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
            timeout: Duration::from_secs(config.timeout_secs),
            language,
        }
    }

    fn request_url(&self) -> String {
        format!(
            "{}/v1/audio/transcriptions",
            self.endpoint.trim_end_matches('/')
        )
    }
}

impl SpeechBackend for RemoteBackend {
    fn transcribe(&self, artifact: &RecordingArtifact) -> Result<String, TranscribeError> {
        if let Some(reason) = self.validate() {
            return Err(TranscribeError::BackendRejected(reason));
        }

        let bytes = std::fs::read(artifact.path())
            .map_err(|e| TranscribeError::AudioUnreadable(e.to_string()))?;

        debug!(bytes = bytes.len(), url = %self.request_url(), "uploading audio for transcription");

        let part = reqwest::blocking::multipart::Part::bytes(bytes)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| TranscribeError::BackendRejected(e.to_string()))?;

        let mut form = reqwest::blocking::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("temperature", self.temperature.to_string());
        if let Some(language) = &self.language {
            form = form.text("language", language.clone());
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| TranscribeError::Network(e.to_string()))?;

        let mut request = client.post(self.request_url()).multipart(form);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .map_err(|e| TranscribeError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| TranscribeError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(TranscribeError::BackendRejected(format!(
                "{status}: {}",
                truncate_body(&body)
            )));
        }

        let text = parse_transcript(&body)?;
        info!(text_len = text.len(), "remote transcription finished");
        Ok(text)
    }

    fn validate(&self) -> Option<String> {
        if self.endpoint.is_empty() {
            return Some("remote transcription selected but no endpoint is configured".to_owned());
        }
        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Some(format!(
                "remote endpoint must start with http:// or https://, got {}",
                self.endpoint
            ));
        }
        if self.api_key.is_none() && !is_local_endpoint(&self.endpoint) {
            return Some(format!(
                "no remote credential configured - set transcription.remote.api_key or {API_KEY_ENV}"
            ));
        }
        None
    }
}

/// Local whisper.cpp servers commonly run without authentication
fn is_local_endpoint(endpoint: &str) -> bool {
    endpoint.contains("localhost") || endpoint.contains("127.0.0.1") || endpoint.contains("[::1]")
}

/// Extracts the `text` field from an API response body
fn parse_transcript(body: &str) -> Result<String, TranscribeError> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|_| TranscribeError::BackendRejected("unparseable response body".to_owned()))?;

    match value.get("text").and_then(serde_json::Value::as_str) {
        Some(text) => Ok(text.to_owned()),
        None => Err(TranscribeError::NoTextReturned),
    }
}

fn truncate_body(body: &str) -> &str {
    let mut end = body.len().min(200);
    while end > 0 && !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
