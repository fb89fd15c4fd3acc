//! Модуль обработки ошибок библиотеки dub-sync
//!
//! Содержит фатальные ошибки (`DubError`), которые прерывают задачу озвучки,
//! и нефатальные предупреждения (`DubWarning`), которые накапливаются в отчете.

use std::fmt;
use thiserror::Error;

/// Ошибки библиотеки dub-sync
#[derive(Debug, Error)]
pub enum DubError {
    /// Некорректный файл субтитров, без таймлайна работать нельзя
    #[error("Subtitle format error: {0}")]
    Format(String),

    /// Временный сбой синтезатора (сеть, модель)
    #[error("Transient synthesis error: {0}")]
    SynthesisTransient(String),

    /// Синтезатор недоступен после всех повторных попыток
    #[error("Synthesizer unavailable for segment {index} after {attempts} attempts: {last_error}")]
    SynthesisUnavailable {
        index: usize,
        attempts: u32,
        last_error: String,
    },

    /// Ошибка обработки аудио
    #[error("Audio processing error: {0}")]
    AudioProcessing(String),

    /// Ошибка изменения длительности
    #[error("Time-stretching error: {0}")]
    TimeStretching(String),

    /// Ошибка WAV-кодирования
    #[error("WAV encoding error: {0}")]
    WavEncoding(#[from] hound::Error),

    /// Ошибка ввода-вывода
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Ошибка сериализации/десериализации JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Ошибка конфигурации
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Задача отменена вызывающей стороной
    #[error("Dubbing job cancelled")]
    Cancelled,

    /// Другая ошибка
    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl DubError {
    /// Можно ли повторить вызов синтезатора после этой ошибки
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::SynthesisTransient(_))
    }
}

/// Тип Result для библиотеки dub-sync
pub type Result<T> = std::result::Result<T, DubError>;

/// Нефатальные события, о которых сообщается вызывающей стороне.
/// Задача продолжается, сегмент либо принят как есть, либо пропущен.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DubWarning {
    /// Коррекция темпа не уложила клип в порог за отведенное число попыток
    ConvergenceExhausted {
        index: usize,
        attempts: u32,
        duration_ms: u64,
        threshold_ms: Option<u64>,
    },
    /// Синтезатор падал внутри цикла коррекции, взят лучший клип
    CorrectionFailed {
        index: usize,
        failures: u32,
        last_error: String,
    },
    /// Клип целиком съеден перекрытием с предыдущим сегментом
    OverlapDropped { index: usize, overlap_ms: u64 },
}

impl DubWarning {
    /// Номер сегмента, к которому относится предупреждение
    pub fn segment_index(&self) -> usize {
        match self {
            Self::ConvergenceExhausted { index, .. }
            | Self::CorrectionFailed { index, .. }
            | Self::OverlapDropped { index, .. } => *index,
        }
    }
}

impl fmt::Display for DubWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConvergenceExhausted {
                index,
                attempts,
                duration_ms,
                threshold_ms,
            } => {
                write!(
                    f,
                    "segment {}: rate correction did not converge after {} attempts ({} ms",
                    index, attempts, duration_ms
                )?;
                match threshold_ms {
                    Some(threshold) => write!(f, " > {} ms)", threshold),
                    None => write!(f, ")"),
                }
            }
            Self::CorrectionFailed {
                index,
                failures,
                last_error,
            } => write!(
                f,
                "segment {}: synthesis failed {} times during rate correction, \
                 keeping best clip ({})",
                index, failures, last_error
            ),
            Self::OverlapDropped { index, overlap_ms } => write!(
                f,
                "segment {}: clip fully consumed by {} ms overlap, dropped",
                index, overlap_ms
            ),
        }
    }
}
