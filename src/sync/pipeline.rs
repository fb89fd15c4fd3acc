//! Задача озвучки целиком
//!
//! Планы всех сегментов считаются заранее, затем на каждый сегмент
//! запускается отдельная задача Tokio. Семафор ограничивает число
//! одновременных обращений к синтезатору, разрешения выдаются в порядке
//! номеров сегментов. Готовые клипы приходят в произвольном порядке и
//! записываются на таймлайн строго по порядку через буфер `BTreeMap`.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use log::{error, info, warn};
use tokio::sync::mpsc::{self, Sender};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::config::DubConfig;
use crate::error::{DubError, DubWarning, Result};
use crate::progress::{send_progress, ProgressUpdate};
use crate::subtitle::{self, Segment, Timeline};
use crate::sync::assembler::{OutputTimeline, Placement, TimelineAssembler};
use crate::sync::controller::{fit_segment, FittedClip};
use crate::sync::plan::plan_segments;
use crate::tts::{CachedSynthesizer, SpeechSynthesizer};

/// Результат задачи озвучки
#[derive(Debug, Clone)]
pub struct DubReport {
    /// Готовая дорожка
    pub output: OutputTimeline,
    /// Нефатальные предупреждения в порядке сегментов
    pub warnings: Vec<DubWarning>,
    /// Номер сегмента и то, как он лег на таймлайн
    pub placements: Vec<(usize, Placement)>,
}

/// Исполнитель задач озвучки
pub struct Dubber {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    config: Arc<DubConfig>,
    progress: Option<Sender<ProgressUpdate>>,
    cancel: CancellationToken,
}

impl Dubber {
    /// Создать исполнитель; при `use_caching` синтезатор оборачивается в кэш
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>, config: DubConfig) -> Result<Self> {
        config.validate()?;
        let synthesizer: Arc<dyn SpeechSynthesizer> = if config.use_caching {
            Arc::new(CachedSynthesizer::new(synthesizer, config.max_cache_entries))
        } else {
            synthesizer
        };

        Ok(Self {
            synthesizer,
            config: Arc::new(config),
            progress: None,
            cancel: CancellationToken::new(),
        })
    }

    /// Отправлять обновления прогресса в канал
    pub fn with_progress(mut self, sender: Sender<ProgressUpdate>) -> Self {
        self.progress = Some(sender);
        self
    }

    /// Использовать внешний токен отмены
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Токен, которым можно отменить задачу из другого места
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &DubConfig {
        &self.config
    }

    /// Озвучить уже построенный таймлайн
    pub async fn dub_timeline(&self, timeline: &Timeline) -> Result<DubReport> {
        send_progress(&self.progress, ProgressUpdate::Started).await;
        let report = self.run(timeline.segments()).await?;
        send_progress(&self.progress, ProgressUpdate::Finished).await;
        Ok(report)
    }

    /// Озвучить SRT-текст
    pub async fn dub_srt_text(&self, text: &str) -> Result<DubReport> {
        send_progress(&self.progress, ProgressUpdate::Started).await;
        let timeline = self.build_timeline(text).await?;
        let report = self.run(timeline.segments()).await?;
        send_progress(&self.progress, ProgressUpdate::Finished).await;
        Ok(report)
    }

    /// Озвучить SRT-файл и сохранить результат в WAV
    pub async fn dub_srt_file<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        srt_path: P,
        output_path: Q,
    ) -> Result<DubReport> {
        info!("Dubbing {}", srt_path.as_ref().display());
        send_progress(&self.progress, ProgressUpdate::Started).await;

        let text = tokio::fs::read_to_string(srt_path.as_ref()).await?;
        let timeline = self.build_timeline(&text).await?;
        let report = self.run(timeline.segments()).await?;

        send_progress(&self.progress, ProgressUpdate::Encoding).await;
        report.output.write_wav(output_path.as_ref())?;
        send_progress(&self.progress, ProgressUpdate::Finished).await;

        info!(
            "Dubbed track saved to {} ({} ms, {} warning(s))",
            output_path.as_ref().display(),
            report.output.duration_ms,
            report.warnings.len()
        );
        Ok(report)
    }

    async fn build_timeline(&self, text: &str) -> Result<Timeline> {
        send_progress(&self.progress, ProgressUpdate::ParsingSubtitles).await;
        let raw = subtitle::parse(text)?;
        let timeline = if self.config.normalize_subtitles {
            Timeline::from_normalized_segments(&raw, self.config.merge_gap_ms)
        } else {
            Timeline::from_segments(&raw, self.config.merge_gap_ms)
        };
        info!(
            "Parsed {} subtitles, {} segments after merging",
            raw.len(),
            timeline.len()
        );
        send_progress(
            &self.progress,
            ProgressUpdate::Merged {
                before: raw.len(),
                after: timeline.len(),
            },
        )
        .await;
        Ok(timeline)
    }

    async fn run(&self, segments: &[Segment]) -> Result<DubReport> {
        let plans = plan_segments(segments, self.config.finalize_last_segment);
        let total = plans.len();
        let mut assembler = TimelineAssembler::new(self.config.sample_rate);
        let mut warnings = Vec::new();
        let mut placements = Vec::with_capacity(total);

        if total == 0 {
            return Ok(DubReport {
                output: assembler.finish(),
                warnings,
                placements,
            });
        }

        info!(
            "Dubbing {} segments with {} (up to {} concurrent requests)",
            total,
            self.synthesizer.name(),
            self.config.max_concurrent_requests
        );

        // Останавливает все задачи сегментов при любом выходе из функции
        let job_token = self.cancel.child_token();
        let _job_guard = job_token.clone().drop_guard();

        let (tx, mut rx) = mpsc::channel::<(usize, Result<FittedClip>)>(total);
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_requests));

        let dispatcher = {
            let synthesizer = self.synthesizer.clone();
            let config = self.config.clone();
            let token = job_token.clone();
            tokio::spawn(async move {
                for (position, plan) in plans.into_iter().enumerate() {
                    let permit = tokio::select! {
                        permit = semaphore.clone().acquire_owned() => match permit {
                            Ok(permit) => permit,
                            Err(_) => return,
                        },
                        _ = token.cancelled() => return,
                    };

                    let synthesizer = synthesizer.clone();
                    let config = config.clone();
                    let token = token.clone();
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        let _permit = permit;
                        let result = tokio::select! {
                            result = fit_segment(synthesizer.as_ref(), &plan, &config) => result,
                            _ = token.cancelled() => return,
                        };
                        let _ = tx.send((position, result)).await;
                    });
                }
            })
        };

        let mut pending: BTreeMap<usize, FittedClip> = BTreeMap::new();
        let mut next_position = 0;
        let mut fitted = 0;

        while next_position < total {
            let received = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    warn!("Dubbing cancelled after {} of {} segments", next_position, total);
                    dispatcher.abort();
                    return Err(DubError::Cancelled);
                }
                message = rx.recv() => message,
            };

            let (position, result) = match received {
                Some(message) => message,
                None => {
                    error!("Segment workers stopped before all segments were fitted");
                    return Err(DubError::Other(anyhow::anyhow!(
                        "segment workers stopped after {} of {} segments",
                        fitted,
                        total
                    )));
                }
            };

            let clip = match result {
                Ok(clip) => clip,
                Err(e) => {
                    error!("Dubbing failed: {}", e);
                    dispatcher.abort();
                    return Err(e);
                }
            };

            fitted += 1;
            let update = ProgressUpdate::SegmentFitted {
                current: fitted,
                total,
            };
            send_progress(&self.progress, update).await;
            pending.insert(position, clip);

            while let Some(clip) = pending.remove(&next_position) {
                if self.cancel.is_cancelled() {
                    warn!("Dubbing cancelled after {} of {} segments", next_position, total);
                    dispatcher.abort();
                    return Err(DubError::Cancelled);
                }

                let index = clip.index;
                warnings.extend(clip.warnings);
                let placement = assembler.place(index, clip.start_ms, clip.clip);
                if let Placement::Dropped { overlap_ms } = placement {
                    warnings.push(DubWarning::OverlapDropped { index, overlap_ms });
                }
                placements.push((index, placement));
                send_progress(&self.progress, ProgressUpdate::SegmentPlaced { index, total }).await;
                next_position += 1;
            }
        }

        let output = assembler.finish();
        info!(
            "Timeline assembled: {} ms, {} warning(s)",
            output.duration_ms,
            warnings.len()
        );

        Ok(DubReport {
            output,
            warnings,
            placements,
        })
    }
}

/// Озвучить SRT-файл с настройками `config` и сохранить WAV
pub async fn dub_srt_file<P: AsRef<Path>, Q: AsRef<Path>>(
    synthesizer: Arc<dyn SpeechSynthesizer>,
    config: DubConfig,
    srt_path: P,
    output_path: Q,
) -> Result<DubReport> {
    Dubber::new(synthesizer, config)?
        .dub_srt_file(srt_path, output_path)
        .await
}
