//! Модуль для интеграции с OpenAI Speech API
//!
//! Поправка темпа передается в поле `speed` (1 + p/100), которое API
//! ограничивает диапазоном [0.25, 4.0].

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, info};
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{DubError, Result};
use crate::media::audio::{decode_audio_bytes, RenderedClip};
use crate::tts::{SpeechSynthesizer, SynthesisRequest};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const MIN_SPEED: f64 = 0.25;
const MAX_SPEED: f64 = 4.0;

/// Параметры запроса к API OpenAI TTS
#[derive(Debug, Serialize)]
struct TtsRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    speed: f64,
    response_format: &'a str,
}

/// Синтезатор на основе OpenAI TTS
pub struct OpenAiSynthesizer {
    client: Client,
    api_key: String,
    model: String,
    voice: String,
    base_url: String,
}

impl OpenAiSynthesizer {
    /// Создать синтезатор; пустой ключ API считается ошибкой конфигурации
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        voice: impl Into<String>,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            error!("OpenAI API key is empty");
            return Err(DubError::Configuration(
                "OpenAI API key is required for speech synthesis".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| DubError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            model: model.into(),
            voice: voice.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Использовать другой адрес API (прокси, совместимый сервер)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/audio/speech", self.base_url)
    }
}

/// Значение `speed` для поправки темпа
fn speed_for_request(request: &SynthesisRequest<'_>) -> f64 {
    request
        .rate
        .map(|rate| rate.speed_multiplier())
        .unwrap_or(1.0)
        .clamp(MIN_SPEED, MAX_SPEED)
}

/// Достает сообщение из JSON-ответа с ошибкой
fn error_message(body: &str) -> String {
    let value: Value = serde_json::from_str(body)
        .unwrap_or_else(|_| json!({ "error": { "message": body } }));
    value["error"]["message"]
        .as_str()
        .unwrap_or("Unknown API error")
        .to_string()
}

#[async_trait]
impl SpeechSynthesizer for OpenAiSynthesizer {
    fn name(&self) -> &str {
        "openai"
    }

    async fn synthesize(&self, request: &SynthesisRequest<'_>) -> Result<RenderedClip> {
        let body = TtsRequest {
            model: &self.model,
            input: request.text,
            voice: &self.voice,
            speed: speed_for_request(request),
            response_format: "mp3",
        };

        debug!(
            "Sending TTS request for segment {} (attempt {}, speed {:.2})",
            request.segment_index, request.attempt, body.speed
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| DubError::SynthesisTransient(format!("HTTP error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = error_message(&text);
            error!("OpenAI TTS API error (status {}): {}", status, message);
            if status.as_u16() == 429 || status.is_server_error() {
                return Err(DubError::SynthesisTransient(format!(
                    "API error ({}): {}",
                    status, message
                )));
            }
            return Err(DubError::Configuration(format!(
                "API rejected request ({}): {}",
                status, message
            )));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| {
                DubError::SynthesisTransient(format!("Failed to read response body: {}", e))
            })?;
        info!(
            "Received {} bytes of audio for segment {}",
            audio.len(),
            request.segment_index
        );

        decode_audio_bytes(audio.to_vec(), Some("mp3")).map_err(|e| {
            DubError::SynthesisTransient(format!("Undecodable audio from OpenAI: {}", e))
        })
    }
}
