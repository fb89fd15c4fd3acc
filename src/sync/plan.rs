//! Бюджеты длительности сегментов
//!
//! Бюджет каждого сегмента зависит только от его субтитра и начала следующего,
//! поэтому все планы считаются заранее, до первого обращения к синтезатору.

use serde::Serialize;

use crate::subtitle::Segment;

/// План озвучки одного сегмента
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentPlan {
    /// Номер сегмента
    pub index: usize,
    /// Начало сегмента на выходном таймлайне
    pub start_ms: u64,
    /// Текст для синтеза
    pub text: String,
    /// Длительность субтитра, не меньше 1 мс
    pub subtitle_duration_ms: u64,
    /// Время до начала следующего сегмента; `None` для последнего
    pub threshold_ms: Option<u64>,
    /// Точная длительность готового клипа; `None` = оставить естественную длину
    pub target_ms: Option<u64>,
}

impl SegmentPlan {
    /// Укладывается ли клип в порог
    pub fn fits_threshold(&self, duration_ms: u64) -> bool {
        self.threshold_ms.map_or(true, |threshold| duration_ms <= threshold)
    }

    /// Отношение длительности клипа к длительности субтитра
    pub fn ratio(&self, duration_ms: u64) -> f64 {
        duration_ms as f64 / self.subtitle_duration_ms as f64
    }

    /// Длительность, к которой стремится коррекция
    pub fn goal_ms(&self) -> u64 {
        self.target_ms.unwrap_or(self.subtitle_duration_ms)
    }
}

/// Считает планы для всех сегментов таймлайна
pub fn plan_segments(segments: &[Segment], finalize_last_segment: bool) -> Vec<SegmentPlan> {
    segments
        .iter()
        .enumerate()
        .map(|(i, segment)| {
            let subtitle_duration_ms = segment.end_ms.saturating_sub(segment.start_ms).max(1);
            let threshold_ms = segments
                .get(i + 1)
                .map(|next| next.start_ms.saturating_sub(segment.start_ms));
            let target_ms = match threshold_ms {
                Some(threshold) => Some(threshold.min(subtitle_duration_ms)),
                None if finalize_last_segment => Some(subtitle_duration_ms),
                None => None,
            };

            SegmentPlan {
                index: segment.index,
                start_ms: segment.start_ms,
                text: segment.text.clone(),
                subtitle_duration_ms,
                threshold_ms,
                target_ms,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budgets() {
        let segments = vec![
            Segment::new(1, 0, 2_000, "A"),
            Segment::new(2, 2_500, 4_000, "B"),
        ];
        let plans = plan_segments(&segments, true);

        assert_eq!(plans[0].subtitle_duration_ms, 2_000);
        assert_eq!(plans[0].threshold_ms, Some(2_500));
        assert_eq!(plans[0].target_ms, Some(2_000));

        assert_eq!(plans[1].subtitle_duration_ms, 1_500);
        assert_eq!(plans[1].threshold_ms, None);
        assert_eq!(plans[1].target_ms, Some(1_500));
        assert!(plans[1].fits_threshold(u64::MAX));
    }

    #[test]
    fn test_target_is_threshold_when_next_starts_inside() {
        let segments = vec![
            Segment::new(1, 1_000, 4_000, "A"),
            Segment::new(2, 3_000, 5_000, "B"),
        ];
        let plans = plan_segments(&segments, false);
        assert_eq!(plans[0].threshold_ms, Some(2_000));
        assert_eq!(plans[0].target_ms, Some(2_000));
        assert_eq!(plans[1].target_ms, None);
        assert_eq!(plans[1].goal_ms(), 2_000);
    }

    #[test]
    fn test_zero_length_subtitle_gets_one_ms() {
        let plans = plan_segments(&[Segment::new(1, 500, 500, "x")], true);
        assert_eq!(plans[0].subtitle_duration_ms, 1);
        assert_eq!(plans[0].target_ms, Some(1));
        assert!((plans[0].ratio(3) - 3.0).abs() < 1e-12);
    }
}
