//! Адаптер для утилиты `edge-tts`
//!
//! Каждый вызов запускает `edge-tts --voice V --text T --write-media F [--rate=+N%]`,
//! читает получившийся mp3 и декодирует его. Временный файл удаляется при
//! любом исходе вызова.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::process::Command;

use crate::error::{DubError, Result};
use crate::media::audio::{decode_audio_bytes, RenderedClip};
use crate::tts::{SpeechSynthesizer, SynthesisRequest};
use crate::utils::temp::ScratchDir;

/// Голос по умолчанию
pub const DEFAULT_VOICE: &str = "zh-CN-YunxiaoMultilingualNeural";

/// Синтезатор на основе `edge-tts`
pub struct EdgeTtsSynthesizer {
    /// Имя или путь к исполняемому файлу
    program: String,
    /// Голос
    voice: String,
    /// Временная директория для mp3
    scratch: Arc<ScratchDir>,
}

impl EdgeTtsSynthesizer {
    pub fn new(voice: impl Into<String>, scratch: Arc<ScratchDir>) -> Self {
        Self {
            program: "edge-tts".to_string(),
            voice: voice.into(),
            scratch,
        }
    }

    /// Использовать другой исполняемый файл (например, из виртуального окружения)
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Проверить, что исполняемый файл есть в PATH
    pub fn check_available(&self) -> Result<PathBuf> {
        which::which(&self.program).map_err(|e| {
            DubError::Configuration(format!("{} not found in PATH: {}", self.program, e))
        })
    }

    pub fn voice(&self) -> &str {
        &self.voice
    }

    /// Аргументы командной строки для запроса
    fn build_args(&self, request: &SynthesisRequest<'_>, media_path: &str) -> Vec<String> {
        let mut args = vec![
            "--voice".to_string(),
            self.voice.clone(),
            "--text".to_string(),
            request.text.to_string(),
            "--write-media".to_string(),
            media_path.to_string(),
        ];
        if let Some(rate) = request.rate {
            args.push(format!("--rate={}", rate.as_edge_arg()));
        }
        args
    }
}

#[async_trait]
impl SpeechSynthesizer for EdgeTtsSynthesizer {
    fn name(&self) -> &str {
        "edge-tts"
    }

    async fn synthesize(&self, request: &SynthesisRequest<'_>) -> Result<RenderedClip> {
        let media = self
            .scratch
            .clip_file(request.segment_index, request.attempt, "mp3");
        let media_path = media.path().to_string_lossy().to_string();
        let args = self.build_args(request, &media_path);

        debug!(
            "Running {} for segment {} (attempt {}, rate {:?})",
            self.program, request.segment_index, request.attempt, request.rate
        );

        let output = Command::new(&self.program)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                DubError::SynthesisTransient(format!("Failed to start {}: {}", self.program, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(
                "{} exited with {} for segment {}: {}",
                self.program,
                output.status,
                request.segment_index,
                stderr.trim()
            );
            return Err(DubError::SynthesisTransient(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let bytes = tokio::fs::read(media.path()).await.map_err(|e| {
            DubError::SynthesisTransient(format!("No audio written by {}: {}", self.program, e))
        })?;
        if bytes.is_empty() {
            return Err(DubError::SynthesisTransient(format!(
                "{} produced an empty file for segment {}",
                self.program, request.segment_index
            )));
        }

        decode_audio_bytes(bytes, Some("mp3")).map_err(|e| {
            DubError::SynthesisTransient(format!("Undecodable audio from {}: {}", self.program, e))
        })
    }
}
