//! Модуль конфигурации библиотеки dub-sync
//!
//! Этот модуль содержит структуры и перечисления для настройки задачи озвучки.
//! Все поля имеют значения по умолчанию, поэтому JSON-файл может задавать
//! только то, что отличается от них.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DubError, Result};

/// Способ коррекции длительности отвергнутого клипа
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionMode {
    /// Повторный синтез с поправкой темпа (для движков, понимающих rate)
    #[default]
    Resynthesize,
    /// Растяжение/сжатие готового клипа (для движков без управления темпом)
    TimeStretch,
}

/// Допустимое отношение длительности клипа к длительности субтитра
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AcceptanceBand {
    pub min_ratio: f64,
    pub max_ratio: f64,
}

impl Default for AcceptanceBand {
    fn default() -> Self {
        Self {
            min_ratio: 0.8,
            max_ratio: 1.2,
        }
    }
}

impl AcceptanceBand {
    /// Попадает ли отношение в полосу (границы включены)
    pub fn contains(&self, ratio: f64) -> bool {
        ratio >= self.min_ratio && ratio <= self.max_ratio
    }
}

/// Границы поправки темпа в процентах (положительные = быстрее)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateRange {
    pub min_percent: i32,
    pub max_percent: i32,
}

impl Default for RateRange {
    fn default() -> Self {
        Self {
            min_percent: -50,
            max_percent: 150,
        }
    }
}

impl RateRange {
    pub fn clamp(&self, percent: i32) -> i32 {
        percent.clamp(self.min_percent, self.max_percent)
    }
}

/// Конфигурация задачи озвучки
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DubConfig {
    /// Нормализовать субтитры по знакам препинания до объединения
    pub normalize_subtitles: bool,
    /// Соседние субтитры с промежутком не больше этого значения объединяются
    pub merge_gap_ms: u64,
    /// Частота дискретизации выходного файла
    pub sample_rate: u32,
    /// Полоса приемлемого отношения длительностей
    pub acceptance: AcceptanceBand,
    /// Границы поправки темпа
    pub rate_range: RateRange,
    /// Способ коррекции
    pub correction_mode: CorrectionMode,
    /// Максимум повторных синтезов с поправкой темпа на один сегмент
    pub max_correction_attempts: u32,
    /// Максимум сбоев синтезатора внутри цикла коррекции
    pub max_correction_failures: u32,
    /// Лимит повторов первого (нейтрального) синтеза; `None` = без ограничений
    pub initial_retry_limit: Option<u32>,
    /// Начальная пауза между повторами
    pub retry_backoff_ms: u64,
    /// Верхняя граница паузы между повторами
    pub max_backoff_ms: u64,
    /// Подгонять ли последний сегмент под длительность его субтитра
    pub finalize_last_segment: bool,
    /// Максимальное количество одновременных запросов к синтезатору
    pub max_concurrent_requests: usize,
    /// Кэшировать результаты синтеза в памяти
    pub use_caching: bool,
    /// Максимальное число записей в кэше
    pub max_cache_entries: usize,
    /// Удалять временные файлы после завершения
    pub cleanup_temp_files: bool,
}

impl Default for DubConfig {
    fn default() -> Self {
        Self {
            normalize_subtitles: false,
            merge_gap_ms: 300,
            sample_rate: 24000,
            acceptance: AcceptanceBand::default(),
            rate_range: RateRange::default(),
            correction_mode: CorrectionMode::default(),
            max_correction_attempts: 5,
            max_correction_failures: 3,
            initial_retry_limit: None,
            retry_backoff_ms: 1000,
            max_backoff_ms: 8000,
            finalize_last_segment: true,
            max_concurrent_requests: 5,
            use_caching: true,
            max_cache_entries: 512,
            cleanup_temp_files: true,
        }
    }
}

impl DubConfig {
    /// Загрузить конфигурацию из JSON-файла и проверить ее
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: DubConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Проверить согласованность параметров
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate < 8000 {
            return Err(DubError::Configuration(format!(
                "sample_rate must be at least 8000 Hz, got {}",
                self.sample_rate
            )));
        }
        if self.rate_range.min_percent <= -100 {
            return Err(DubError::Configuration(format!(
                "rate_range.min_percent must be above -100, got {}",
                self.rate_range.min_percent
            )));
        }
        if self.rate_range.min_percent > 0 || self.rate_range.max_percent < 0 {
            return Err(DubError::Configuration(
                "rate_range must include the neutral rate 0%".to_string(),
            ));
        }
        let band = self.acceptance;
        if !(band.min_ratio > 0.0 && band.min_ratio <= 1.0 && band.max_ratio >= 1.0) {
            return Err(DubError::Configuration(format!(
                "acceptance band [{}, {}] must contain 1.0 and be positive",
                band.min_ratio, band.max_ratio
            )));
        }
        if self.max_concurrent_requests == 0 {
            return Err(DubError::Configuration(
                "max_concurrent_requests must be at least 1".to_string(),
            ));
        }
        if self.initial_retry_limit == Some(0) {
            return Err(DubError::Configuration(
                "initial_retry_limit must allow at least one attempt".to_string(),
            ));
        }
        Ok(())
    }
}
