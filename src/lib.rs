//! Основной файл библиотеки dub-sync
//!
//! Библиотека озвучивает файл субтитров так, чтобы каждая реплика звучала в
//! своем временном окне: субтитры разбираются и объединяются по малым
//! промежуткам, для каждого сегмента синтезируется речь с подгонкой темпа,
//! а готовые клипы собираются в одну WAV-дорожку.
//!
//! ```no_run
//! use std::sync::Arc;
//! use dub_sync::{DubConfig, Dubber, EdgeTtsSynthesizer, ScratchDir};
//!
//! # async fn run() -> dub_sync::Result<()> {
//! let config = DubConfig::default();
//! let scratch = Arc::new(ScratchDir::new(config.cleanup_temp_files)?);
//! let synthesizer = Arc::new(EdgeTtsSynthesizer::new("en-US-AriaNeural", scratch));
//! let report = Dubber::new(synthesizer, config)?
//!     .dub_srt_file("input.srt", "dub.wav")
//!     .await?;
//! println!("{} ms, {} warnings", report.output.duration_ms, report.warnings.len());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod media;
pub mod progress;
pub mod subtitle;
pub mod sync;
pub mod tts;
pub mod utils;

pub use config::{AcceptanceBand, CorrectionMode, DubConfig, RateRange};
pub use error::{DubError, DubWarning, Result};
pub use media::{AudioClip, RenderedClip};
pub use progress::ProgressUpdate;
pub use subtitle::{Segment, Timeline};
pub use sync::{dub_srt_file, DubReport, Dubber, OutputTimeline, Placement};
pub use tts::{
    CachedSynthesizer, EdgeTtsSynthesizer, OpenAiSynthesizer, RateInstruction, SpeechSynthesizer,
    SynthesisRequest,
};
pub use utils::temp::ScratchDir;
