//! Модуль для парсинга субтитров
//!
//! Этот модуль содержит функции для разбора SRT-текста в упорядоченный список
//! сегментов.

use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{DubError, Result};
use crate::subtitle::timestamp::parse_timestamp;

lazy_static! {
    /// Пустая строка (возможно, с пробелами) разделяет блоки
    static ref BLOCK_SEPARATOR: Regex = Regex::new(r"\n[ \t]*\n").unwrap();
    /// Номер, строка таймингов, одна или несколько строк текста
    static ref CUE_BLOCK: Regex =
        Regex::new(r"^(\d+)[ \t]*\n[ \t]*(\S+)[ \t]+-->[ \t]+(\S+)[^\n]*\n([\s\S]+)$").unwrap();
}

/// Один субтитр на исходном таймлайне
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Порядковый номер (с 1), переназначается после объединения
    pub index: usize,
    /// Время начала в миллисекундах
    pub start_ms: u64,
    /// Время окончания в миллисекундах
    pub end_ms: u64,
    /// Текст, переводы строк заменены пробелами
    pub text: String,
}

impl Segment {
    /// Создать новый сегмент
    pub fn new(index: usize, start_ms: u64, end_ms: u64, text: impl Into<String>) -> Self {
        Self {
            index,
            start_ms,
            end_ms,
            text: text.into(),
        }
    }

    /// Длительность субтитра в миллисекундах
    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }
}

/// Парсит SRT-текст.
///
/// Блоки, которые не подходят под формат, пропускаются (в том числе мусор в
/// конце файла). Если не подошел ни один блок, возвращается
/// `DubError::Format`. Результат отсортирован по времени начала.
pub fn parse(text: &str) -> Result<Vec<Segment>> {
    let normalized = text
        .trim_start_matches('\u{feff}')
        .replace("\r\n", "\n")
        .replace('\r', "\n");

    let mut segments = Vec::new();
    let mut skipped = 0usize;

    for block in BLOCK_SEPARATOR.split(&normalized) {
        let block = block.trim();
        if block.is_empty() {
            continue;
        }
        match parse_cue_block(block) {
            Some(segment) => segments.push(segment),
            None => {
                skipped += 1;
                let first_line = block.lines().next().unwrap_or("");
                debug!("Skipping unparseable subtitle block: {:?}", first_line);
            }
        }
    }

    if segments.is_empty() {
        return Err(DubError::Format(
            "no subtitle block matched the expected `index / start --> end / text` layout"
                .to_string(),
        ));
    }

    if skipped > 0 {
        warn!("Skipped {} unparseable subtitle blocks", skipped);
    }

    if segments.windows(2).any(|pair| pair[1].start_ms < pair[0].start_ms) {
        warn!("Subtitle blocks are out of order, sorting by start time");
        segments.sort_by_key(|segment| segment.start_ms);
    }

    Ok(segments)
}

/// Парсинг блока субтитра
fn parse_cue_block(block: &str) -> Option<Segment> {
    let captures = CUE_BLOCK.captures(block)?;

    let index = captures[1].parse::<usize>().ok()?;
    let start_ms = parse_timestamp(&captures[2]).ok()?;
    let end_ms = parse_timestamp(&captures[3]).ok()?;

    if end_ms <= start_ms {
        warn!(
            "Subtitle {} has non-positive duration ({} -> {} ms), skipping",
            index, start_ms, end_ms
        );
        return None;
    }

    let text = captures[4]
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<&str>>()
        .join(" ");

    if text.is_empty() {
        return None;
    }

    Some(Segment::new(index, start_ms, end_ms, text))
}
