//! Модуль для работы с TTS
//!
//! Синтезатор речи подключается через трейт [`SpeechSynthesizer`]. Контроллер
//! длительности знает о синтезаторе только то, что тот принимает текст и
//! необязательную поправку темпа и возвращает PCM-клип.
//!
//! Готовые адаптеры:
//! - [`edge::EdgeTtsSynthesizer`] запускает утилиту `edge-tts`;
//! - [`openai::OpenAiSynthesizer`] обращается к OpenAI Speech API;
//! - [`cache::CachedSynthesizer`] запоминает результаты любого синтезатора.

pub mod cache;
pub mod edge;
pub mod openai;

use std::fmt;

use async_trait::async_trait;

use crate::config::RateRange;
use crate::error::Result;
pub use crate::media::audio::RenderedClip;

pub use cache::CachedSynthesizer;
pub use edge::EdgeTtsSynthesizer;
pub use openai::OpenAiSynthesizer;

/// Поправка темпа в процентах относительно нейтрального (+30 = на 30% быстрее)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RateInstruction {
    percent: i32,
}

impl RateInstruction {
    pub const NEUTRAL: RateInstruction = RateInstruction { percent: 0 };

    /// Поправка из процентов с учетом допустимых границ
    pub fn from_percent(percent: i32, range: &RateRange) -> Self {
        Self {
            percent: range.clamp(percent),
        }
    }

    /// Поправка для желаемого ускорения `speed_factor`.
    ///
    /// Процент округляется вверх, чтобы клип гарантированно не вышел длиннее.
    /// Погрешность вычислений в плавающей точке не должна поднимать 30.000000000000004 до 31.
    pub fn from_speed_factor(speed_factor: f64, range: &RateRange) -> Self {
        let raw = ((speed_factor - 1.0) * 100.0 - 1e-9).ceil();
        let bounded = raw.clamp(range.min_percent as f64, range.max_percent as f64);
        Self {
            percent: bounded as i32,
        }
    }

    pub fn percent(&self) -> i32 {
        self.percent
    }

    pub fn is_neutral(&self) -> bool {
        self.percent == 0
    }

    /// Множитель скорости (1.3 для +30%)
    pub fn speed_multiplier(&self) -> f64 {
        1.0 + self.percent as f64 / 100.0
    }

    /// Значение аргумента `--rate` для edge-tts, например `+30%`
    pub fn as_edge_arg(&self) -> String {
        format!("{:+}%", self.percent)
    }
}

impl fmt::Display for RateInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:+}%", self.percent)
    }
}

/// Запрос к синтезатору
#[derive(Debug, Clone, Copy)]
pub struct SynthesisRequest<'a> {
    /// Текст сегмента
    pub text: &'a str,
    /// Поправка темпа; `None` для первого (нейтрального) синтеза
    pub rate: Option<RateInstruction>,
    /// Номер сегмента (для логов и имен временных файлов)
    pub segment_index: usize,
    /// Номер попытки внутри сегмента, начиная с 0
    pub attempt: u32,
}

impl<'a> SynthesisRequest<'a> {
    pub fn neutral(text: &'a str, segment_index: usize) -> Self {
        Self {
            text,
            rate: None,
            segment_index,
            attempt: 0,
        }
    }
}

/// Движок синтеза речи.
///
/// Ошибки, после которых имеет смысл повторить вызов, нужно возвращать как
/// `DubError::SynthesisTransient`. Реализация должна быть безопасна для
/// одновременных вызовов из нескольких задач.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Имя движка для логов и ключей кэша
    fn name(&self) -> &str;

    /// Синтезировать речь для запроса
    async fn synthesize(&self, request: &SynthesisRequest<'_>) -> Result<RenderedClip>;
}
