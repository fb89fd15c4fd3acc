//! Модуль для работы с субтитрами
//!
//! Парсинг SRT, нормализация по знакам препинания, объединение субтитров с
//! малыми промежутками и сохранение результата обратно в SRT.

pub mod merger;
pub mod normalizer;
pub mod parser;
pub mod timestamp;
pub mod writer;

use std::path::Path;

use log::info;

use crate::error::Result;
pub use merger::{merge, DEFAULT_MERGE_GAP_MS};
pub use normalizer::normalize;
pub use parser::{parse, Segment};
pub use timestamp::{format_timestamp, parse_timestamp};

/// Упорядоченный список сегментов после объединения.
/// После построения не изменяется.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeline {
    segments: Vec<Segment>,
}

impl Timeline {
    /// Разобрать SRT-текст и объединить субтитры с промежутком не больше
    /// `merge_gap_ms`
    pub fn parse(text: &str, merge_gap_ms: u64) -> Result<Self> {
        let raw = parser::parse(text)?;
        let segments = merger::merge(&raw, merge_gap_ms);
        info!(
            "Parsed {} subtitles, {} segments after merging (gap <= {} ms)",
            raw.len(),
            segments.len(),
            merge_gap_ms
        );
        Ok(Self { segments })
    }

    /// Прочитать SRT-файл
    pub fn from_srt_file<P: AsRef<Path>>(path: P, merge_gap_ms: u64) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&contents, merge_gap_ms)
    }

    /// Построить таймлайн из готовых сегментов (объединение тоже применяется)
    pub fn from_segments(segments: &[Segment], merge_gap_ms: u64) -> Self {
        Self {
            segments: merger::merge(segments, merge_gap_ms),
        }
    }

    /// То же, что `from_segments`, но сначала субтитры нормализуются
    pub fn from_normalized_segments(segments: &[Segment], merge_gap_ms: u64) -> Self {
        Self::from_segments(&normalizer::normalize(segments), merge_gap_ms)
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn into_segments(self) -> Vec<Segment> {
        self.segments
    }
}
