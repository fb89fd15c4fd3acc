//! Сборка выходного таймлайна
//!
//! Клипы записываются строго по порядку сегментов. Перед клипом вставляется
//! тишина до начала сегмента; если предыдущий клип залез на текущий сегмент,
//! начало текущего клипа обрезается.

use std::path::Path;

use log::{debug, warn};

use crate::error::Result;
use crate::media::audio::{encode_wav, ms_for_samples, samples_for_ms, AudioClip};

/// Что произошло с клипом при записи на таймлайн
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Клип записан
    Appended {
        /// Вставленная перед клипом тишина
        gap_ms: u64,
        /// Обрезано от начала клипа
        trimmed_ms: u64,
        /// Записанная длительность
        length_ms: u64,
    },
    /// Перекрытие съело клип целиком
    Dropped { overlap_ms: u64 },
}

/// Растущий моно-буфер с курсором.
///
/// Длина буфера всегда равна `samples_for_ms(cursor_ms)`, так что ошибки
/// округления не накапливаются.
pub struct TimelineAssembler {
    samples: Vec<f32>,
    sample_rate: u32,
    cursor_ms: u64,
}

impl TimelineAssembler {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            samples: Vec::new(),
            sample_rate,
            cursor_ms: 0,
        }
    }

    /// Текущая позиция курсора
    pub fn cursor_ms(&self) -> u64 {
        self.cursor_ms
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Записывает клип сегмента, начинающегося в `start_ms`
    pub fn place(&mut self, index: usize, start_ms: u64, mut clip: AudioClip) -> Placement {
        let mut gap_ms = 0;
        let mut trimmed_ms = 0;

        if self.cursor_ms < start_ms {
            gap_ms = start_ms - self.cursor_ms;
            self.cursor_ms = start_ms;
            self.samples.resize(samples_for_ms(self.cursor_ms, self.sample_rate), 0.0);
        } else if self.cursor_ms > start_ms {
            let overlap_ms = self.cursor_ms - start_ms;
            if overlap_ms >= clip.duration_ms() {
                warn!(
                    "Segment {} dropped: previous audio overlaps it by {} ms",
                    index, overlap_ms
                );
                return Placement::Dropped { overlap_ms };
            }
            debug!("Segment {}: trimming {} ms overlap", index, overlap_ms);
            clip.trim_start_ms(overlap_ms);
            trimmed_ms = overlap_ms;
        }

        let length_ms = clip.duration_ms();
        self.samples.extend_from_slice(clip.samples());
        self.cursor_ms += length_ms;
        // Клип мог быть на полсемпла длиннее или короче своей длительности в мс
        self.samples.resize(samples_for_ms(self.cursor_ms, self.sample_rate), 0.0);

        debug!(
            "Segment {} placed: gap {} ms, trimmed {} ms, length {} ms, cursor {} ms",
            index, gap_ms, trimmed_ms, length_ms, self.cursor_ms
        );
        Placement::Appended {
            gap_ms,
            trimmed_ms,
            length_ms,
        }
    }

    /// Завершает сборку
    pub fn finish(self) -> OutputTimeline {
        OutputTimeline {
            duration_ms: self.cursor_ms,
            samples: self.samples,
            sample_rate: self.sample_rate,
        }
    }
}

/// Готовая дорожка
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTimeline {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub duration_ms: u64,
}

impl OutputTimeline {
    /// Длительность, посчитанная по числу семплов
    pub fn measured_duration_ms(&self) -> u64 {
        ms_for_samples(self.samples.len(), self.sample_rate)
    }

    /// Сохраняет дорожку в WAV
    pub fn write_wav<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        encode_wav(&self.samples, self.sample_rate, path)
    }
}
