//! Нормализация субтитров перед озвучкой
//!
//! - субтитр режется по знакам препинания внутри текста, время делится
//!   пропорционально числу символов;
//! - субтитры, не оканчивающиеся знаком препинания, склеиваются со следующими;
//! - короткие фразы, оканчивающиеся запятой или `、`, склеиваются, пока в
//!   результате не больше `MAX_COMMA_MERGE_WORDS` слов.

use lazy_static::lazy_static;
use log::{debug, info};
use regex::Regex;

use crate::subtitle::parser::Segment;

/// Предел слов для склейки по запятой
pub const MAX_COMMA_MERGE_WORDS: usize = 10;

/// Знаки, которыми может заканчиваться фраза
const PUNCTUATION: &[char] = &[
    '.', '。', '!', '！', '?', '？', ',', '，', ';', '；', ':', '：', '、',
];

/// Знаки, после которых фраза считается незаконченной
const COMMA_PUNCTUATION: &[char] = &[',', '，', '、'];

lazy_static! {
    /// Знак препинания, за которым идет пробел
    static ref MID_PUNCTUATION: Regex = Regex::new(r"[.。!！?？,，;；:：、] ").unwrap();
}

/// Нормализует субтитры. Результат отсортирован и перенумерован с 1.
pub fn normalize(segments: &[Segment]) -> Vec<Segment> {
    if segments.is_empty() {
        return Vec::new();
    }

    let mut sorted = segments.to_vec();
    sorted.sort_by_key(|segment| segment.start_ms);

    let split = split_at_punctuation(&sorted);
    let terminated = merge_unterminated(split);
    let mut normalized = merge_comma_phrases(terminated, MAX_COMMA_MERGE_WORDS);

    for (i, segment) in normalized.iter_mut().enumerate() {
        segment.index = i + 1;
    }

    info!(
        "Normalized {} subtitles into {} segments",
        segments.len(),
        normalized.len()
    );
    normalized
}

fn ends_with_any(text: &str, set: &[char]) -> bool {
    text.trim_end()
        .chars()
        .last()
        .map_or(false, |c| set.contains(&c))
}

/// Дописывает `next` в конец `open`
fn append(open: &mut Segment, next: Segment) {
    open.end_ms = open.end_ms.max(next.end_ms);
    open.text = format!("{} {}", open.text.trim_end(), next.text.trim_start());
}

fn push_piece(out: &mut Vec<Segment>, index: usize, start_ms: u64, end_ms: u64, text: &str) {
    let text = text.trim();
    if !text.is_empty() {
        out.push(Segment::new(index, start_ms, end_ms, text));
    }
}

/// Первый проход: разрезать по знаку препинания, за которым следует пробел
fn split_at_punctuation(segments: &[Segment]) -> Vec<Segment> {
    let mut result = Vec::with_capacity(segments.len());

    for segment in segments {
        let text = segment.text.as_str();
        let total_chars = text.chars().count() as u128;
        // Байтовая позиция пробела сразу после знака
        let cuts: Vec<usize> = MID_PUNCTUATION
            .find_iter(text)
            .map(|m| m.end() - 1)
            .collect();

        if total_chars <= 1 || cuts.is_empty() {
            result.push(segment.clone());
            continue;
        }

        let duration = segment.duration_ms() as u128;
        let mut piece_start = 0usize;
        let mut start_ms = segment.start_ms;
        for cut in cuts {
            let chars_before = text[..cut].chars().count() as u128;
            let end_ms = segment.start_ms + (chars_before * duration / total_chars) as u64;
            push_piece(&mut result, segment.index, start_ms, end_ms, &text[piece_start..cut]);
            piece_start = cut;
            start_ms = end_ms;
        }
        push_piece(&mut result, segment.index, start_ms, segment.end_ms, &text[piece_start..]);

        debug!("Subtitle {} split at inner punctuation", segment.index);
    }

    result
}

/// Второй проход: субтитр без знака в конце поглощает следующий
fn merge_unterminated(segments: Vec<Segment>) -> Vec<Segment> {
    let mut result = Vec::with_capacity(segments.len());
    let mut current: Option<Segment> = None;

    for segment in segments {
        if segment.text.trim().is_empty() {
            continue;
        }
        match current.take() {
            None => current = Some(segment),
            Some(open) if ends_with_any(&open.text, PUNCTUATION) => {
                result.push(open);
                current = Some(segment);
            }
            Some(mut open) => {
                append(&mut open, segment);
                current = Some(open);
            }
        }
    }

    result.extend(current);
    result
}

/// Третий проход: склейка фраз, оканчивающихся запятой, в пределах `max_words` слов
fn merge_comma_phrases(segments: Vec<Segment>, max_words: usize) -> Vec<Segment> {
    let mut result = Vec::with_capacity(segments.len());
    let mut current: Option<(Segment, usize)> = None;

    for segment in segments {
        let words = segment.text.split_whitespace().count();
        match current.take() {
            None => current = Some((segment, words)),
            Some((mut open, count))
                if ends_with_any(&open.text, COMMA_PUNCTUATION) && count + words <= max_words =>
            {
                append(&mut open, segment);
                current = Some((open, count + words));
            }
            Some((open, _)) => {
                result.push(open);
                current = Some((segment, words));
            }
        }
    }

    result.extend(current.map(|(segment, _)| segment));
    result
}
