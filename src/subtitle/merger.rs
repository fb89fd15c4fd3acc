//! Объединение субтитров с малыми промежутками
//!
//! Один проход слева направо: текущий (возможно уже объединенный) сегмент
//! сравнивается только со следующим. После прохода номера переназначаются 1..N.

use crate::subtitle::parser::Segment;

/// Промежуток по умолчанию, при котором соседние субтитры объединяются
pub const DEFAULT_MERGE_GAP_MS: u64 = 300;

/// Объединяет соседние сегменты, если `next.start_ms - current.end_ms <= gap_threshold_ms`.
///
/// Перекрывающиеся сегменты (отрицательный промежуток) тоже объединяются.
/// После объединения каждый соседний промежуток строго больше порога, поэтому
/// повторный вызов с тем же порогом ничего не меняет.
pub fn merge(segments: &[Segment], gap_threshold_ms: u64) -> Vec<Segment> {
    let mut iter = segments.iter();
    let mut current = match iter.next() {
        Some(first) => first.clone(),
        None => return Vec::new(),
    };

    let mut merged = Vec::with_capacity(segments.len());
    for next in iter {
        let within_gap = next.start_ms <= current.end_ms.saturating_add(gap_threshold_ms);
        if within_gap {
            current.end_ms = current.end_ms.max(next.end_ms);
            let joined = format!("{} {}", current.text.trim_end(), next.text.trim_start());
            current.text = joined;
        } else {
            merged.push(std::mem::replace(&mut current, next.clone()));
        }
    }
    merged.push(current);

    for (i, segment) in merged.iter_mut().enumerate() {
        segment.index = i + 1;
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(start_ms: u64, end_ms: u64, text: &str) -> Segment {
        Segment::new(0, start_ms, end_ms, text)
    }

    /// Детерминированный генератор для псевдослучайных таймлайнов
    fn random_timeline(seed: u64, len: usize) -> Vec<Segment> {
        let mut state = seed;
        let mut next = move |bound: u64| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (state >> 33) % bound
        };
        let mut start = next(500);
        (0..len)
            .map(|i| {
                let duration = 1 + next(3000);
                let segment = Segment::new(i + 1, start, start + duration, format!("t{}", i));
                start = start + duration + next(800);
                segment
            })
            .collect()
    }

    #[test]
    fn test_empty_input() {
        assert!(merge(&[], 300).is_empty());
    }

    #[test]
    fn test_small_gap_merges() {
        let segments = vec![seg(0, 1_000, "Hello "), seg(1_100, 2_000, " world")];
        let merged = merge(&segments, DEFAULT_MERGE_GAP_MS);
        assert_eq!(merged, vec![Segment::new(1, 0, 2_000, "Hello world")]);
    }

    #[test]
    fn test_large_gap_keeps_segments() {
        let segments = vec![seg(0, 2_000, "A"), seg(2_500, 4_000, "B")];
        let merged = merge(&segments, DEFAULT_MERGE_GAP_MS);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0], Segment::new(1, 0, 2_000, "A"));
        assert_eq!(merged[1], Segment::new(2, 2_500, 4_000, "B"));
    }

    #[test]
    fn test_gap_equal_to_threshold_merges() {
        let segments = vec![seg(0, 1_000, "A"), seg(1_300, 2_000, "B"), seg(2_301, 3_000, "C")];
        let merged = merge(&segments, 300);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].text, "A B");
        assert_eq!(merged[1], Segment::new(2, 2_301, 3_000, "C"));
    }

    #[test]
    fn test_chain_merges_against_extended_end() {
        // Второй сегмент продлевает конец, и третий уже укладывается в порог
        let segments = vec![seg(0, 1_000, "A"), seg(1_200, 5_000, "B"), seg(5_100, 6_000, "C")];
        let merged = merge(&segments, 300);
        assert_eq!(merged, vec![Segment::new(1, 0, 6_000, "A B C")]);
    }

    #[test]
    fn test_overlap_keeps_later_end() {
        let segments = vec![seg(0, 3_000, "long"), seg(1_000, 2_000, "inner")];
        let merged = merge(&segments, 300);
        assert_eq!(merged, vec![Segment::new(1, 0, 3_000, "long inner")]);
    }

    #[test]
    fn test_merge_saturation_invariant() {
        for seed in 0..50 {
            let timeline = random_timeline(seed, 40);
            for gap in [0u64, 100, 300, 700] {
                let merged = merge(&timeline, gap);
                for pair in merged.windows(2) {
                    assert!(
                        pair[1].start_ms > pair[0].end_ms + gap,
                        "seed {} gap {}: {:?} / {:?}",
                        seed, gap, pair[0], pair[1]
                    );
                }
                let indices: Vec<usize> = merged.iter().map(|s| s.index).collect();
                assert_eq!(indices, (1..=merged.len()).collect::<Vec<_>>());
            }
        }
    }

    #[test]
    fn test_merge_is_idempotent() {
        for seed in 0..50 {
            let timeline = random_timeline(seed, 40);
            for gap in [0u64, 300, 700] {
                let once = merge(&timeline, gap);
                let twice = merge(&once, gap);
                assert_eq!(once, twice, "seed {} gap {}", seed, gap);
            }
        }
    }
}
