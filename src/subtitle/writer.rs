//! Сохранение сегментов обратно в SRT.
//!
//! Используется для выгрузки объединенного таймлайна, номера пишутся заново
//! по порядку.

use std::fmt::Write as _;
use std::path::Path;

use log::info;

use crate::error::Result;
use crate::subtitle::parser::Segment;
use crate::subtitle::timestamp::format_timestamp;

/// Сериализует сегменты в SRT-текст с номерами 1..N
pub fn to_srt_string(segments: &[Segment]) -> String {
    let mut out = String::new();
    for (i, segment) in segments.iter().enumerate() {
        let _ = writeln!(out, "{}", i + 1);
        let _ = writeln!(
            out,
            "{} --> {}",
            format_timestamp(segment.start_ms),
            format_timestamp(segment.end_ms)
        );
        let _ = writeln!(out, "{}", segment.text);
        out.push('\n');
    }
    out
}

/// Записывает сегменты в SRT-файл
pub fn write_srt_file<P: AsRef<Path>>(segments: &[Segment], path: P) -> Result<()> {
    std::fs::write(path.as_ref(), to_srt_string(segments))?;
    info!("Saved {} subtitles to {}", segments.len(), path.as_ref().display());
    Ok(())
}
