//! Кодек временных меток SRT: `HH:MM:SS,mmm` ⇄ миллисекунды.
//!
//! Преобразование точное в обе стороны, без плавающей точки.

use crate::error::{DubError, Result};

const MS_PER_SECOND: u64 = 1_000;
const MS_PER_MINUTE: u64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: u64 = 60 * MS_PER_MINUTE;

/// Парсит метку `HH:MM:SS,mmm` в миллисекунды.
///
/// Часы могут иметь любое число цифр, минуты и секунды ровно две (меньше 60),
/// миллисекунды ровно три. Разделитель миллисекунд `,` или `.`.
pub fn parse_timestamp(time_str: &str) -> Result<u64> {
    let s = time_str.trim();
    let invalid = || DubError::Format(format!("Invalid SRT timestamp: {:?}", time_str));

    let (clock, millis) = s.split_once(|c| c == ',' || c == '.').ok_or_else(invalid)?;
    let mut parts = clock.split(':');
    let fields = (parts.next(), parts.next(), parts.next(), parts.next());
    let (hours, minutes, seconds) = match fields {
        (Some(h), Some(m), Some(sec), None) => (h, m, sec),
        _ => return Err(invalid()),
    };

    let hours = parse_digits(hours, None).ok_or_else(invalid)?;
    let minutes = parse_digits(minutes, Some(2)).ok_or_else(invalid)?;
    let seconds = parse_digits(seconds, Some(2)).ok_or_else(invalid)?;
    let millis = parse_digits(millis, Some(3)).ok_or_else(invalid)?;

    if minutes >= 60 || seconds >= 60 {
        return Err(invalid());
    }

    hours
        .checked_mul(MS_PER_HOUR)
        .and_then(|ms| ms.checked_add(minutes * MS_PER_MINUTE + seconds * MS_PER_SECOND + millis))
        .ok_or_else(invalid)
}

/// Форматирует миллисекунды как `HH:MM:SS,mmm` (часы минимум двумя цифрами).
pub fn format_timestamp(ms: u64) -> String {
    let hours = ms / MS_PER_HOUR;
    let minutes = (ms % MS_PER_HOUR) / MS_PER_MINUTE;
    let seconds = (ms % MS_PER_MINUTE) / MS_PER_SECOND;
    let millis = ms % MS_PER_SECOND;
    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, seconds, millis)
}

fn parse_digits(field: &str, width: Option<usize>) -> Option<u64> {
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if let Some(width) = width {
        if field.len() != width {
            return None;
        }
    }
    field.parse().ok()
}
