//! Контроллер длительности
//!
//! Подгоняет синтезированный клип под бюджет сегмента: сначала нейтральный
//! синтез, затем повторные синтезы с поправкой темпа, пока клип не уложится
//! в порог или не кончатся попытки. Принятый клип доводится ровно до целевой
//! длительности.
//!
//! Состояния: `Initial -> Correcting(n) -> Accepted | Exhausted`.

use std::time::Duration;

use log::{debug, info, warn};

use crate::config::{AcceptanceBand, CorrectionMode, DubConfig, RateRange};
use crate::error::{DubError, DubWarning, Result};
use crate::media::audio::AudioClip;
use crate::sync::plan::SegmentPlan;
use crate::tts::{RateInstruction, SpeechSynthesizer, SynthesisRequest};

/// Состояние контроллера одного сегмента
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControllerState {
    /// Ждем нейтральный клип
    Initial,
    /// Выполнена `attempt`-я коррекция с накопленным ускорением `speed_factor`
    Correcting { attempt: u32, speed_factor: f64 },
    /// Клип принят
    Accepted,
    /// Попытки исчерпаны, принят последний клип
    Exhausted,
}

/// Решение контроллера после очередного клипа
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Клип подходит
    Accept,
    /// Синтезировать заново с этой поправкой
    Retry(RateInstruction),
    /// Больше не пытаться, взять последний клип
    GiveUp,
}

/// Следующая поправка темпа.
///
/// Накопленное ускорение умножается на наблюдаемое отношение длительностей,
/// так что движок, который исполняет поправку лишь частично, получает все
/// более сильную поправку. Возвращает новое ускорение и инструкцию для движка.
pub fn next_rate_instruction(
    previous_speed: f64,
    observed_ratio: f64,
    range: &RateRange,
) -> (f64, RateInstruction) {
    let speed = previous_speed * observed_ratio;
    (speed, RateInstruction::from_speed_factor(speed, range))
}

/// Конечный автомат подгонки одного сегмента, без ввода-вывода
#[derive(Debug, Clone)]
pub struct DurationController {
    subtitle_duration_ms: u64,
    threshold_ms: Option<u64>,
    acceptance: AcceptanceBand,
    rate_range: RateRange,
    max_attempts: u32,
    state: ControllerState,
}

impl DurationController {
    pub fn new(plan: &SegmentPlan, config: &DubConfig) -> Self {
        Self {
            subtitle_duration_ms: plan.subtitle_duration_ms.max(1),
            threshold_ms: plan.threshold_ms,
            acceptance: config.acceptance,
            rate_range: config.rate_range,
            max_attempts: config.max_correction_attempts,
            state: ControllerState::Initial,
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Сколько корректирующих синтезов уже выполнено
    pub fn corrections(&self) -> u32 {
        match self.state {
            ControllerState::Correcting { attempt, .. } => attempt,
            _ => 0,
        }
    }

    fn fits_threshold(&self, duration_ms: u64) -> bool {
        self.threshold_ms.map_or(true, |threshold| duration_ms <= threshold)
    }

    /// Учитывает длительность очередного клипа и возвращает решение
    pub fn observe(&mut self, duration_ms: u64) -> Decision {
        let ratio = duration_ms as f64 / self.subtitle_duration_ms as f64;
        match self.state {
            ControllerState::Initial => {
                if self.fits_threshold(duration_ms) && self.acceptance.contains(ratio) {
                    self.state = ControllerState::Accepted;
                    return Decision::Accept;
                }
                if self.max_attempts == 0 {
                    self.state = ControllerState::Exhausted;
                    return Decision::GiveUp;
                }
                let (speed_factor, instruction) =
                    next_rate_instruction(1.0, ratio, &self.rate_range);
                self.state = ControllerState::Correcting {
                    attempt: 1,
                    speed_factor,
                };
                Decision::Retry(instruction)
            }
            ControllerState::Correcting { attempt, speed_factor } => {
                if self.fits_threshold(duration_ms) {
                    self.state = ControllerState::Accepted;
                    return Decision::Accept;
                }
                if attempt >= self.max_attempts {
                    self.state = ControllerState::Exhausted;
                    return Decision::GiveUp;
                }
                let (speed_factor, instruction) =
                    next_rate_instruction(speed_factor, ratio, &self.rate_range);
                self.state = ControllerState::Correcting {
                    attempt: attempt + 1,
                    speed_factor,
                };
                Decision::Retry(instruction)
            }
            ControllerState::Accepted => Decision::Accept,
            ControllerState::Exhausted => Decision::GiveUp,
        }
    }
}

/// Клип сегмента, готовый к записи на таймлайн
#[derive(Debug, Clone)]
pub struct FittedClip {
    /// Номер сегмента
    pub index: usize,
    /// Начало на таймлайне
    pub start_ms: u64,
    /// Клип после финальной подгонки
    pub clip: AudioClip,
    /// Длительность принятого клипа до подгонки
    pub natural_duration_ms: u64,
    /// Поправка темпа, с которой получен принятый клип
    pub rate: Option<RateInstruction>,
    /// Количество успешных синтезов
    pub attempts: u32,
    /// Предупреждения по сегменту
    pub warnings: Vec<DubWarning>,
}

/// Пауза перед `failures`-м повтором: экспоненциальный рост до `max_backoff_ms`
fn backoff_delay(config: &DubConfig, failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(16);
    let delay = config
        .retry_backoff_ms
        .saturating_mul(1u64 << exponent)
        .min(config.max_backoff_ms);
    Duration::from_millis(delay)
}

/// Нейтральный синтез; временные сбои повторяются до `initial_retry_limit` раз
async fn synthesize_neutral(
    synthesizer: &dyn SpeechSynthesizer,
    plan: &SegmentPlan,
    config: &DubConfig,
) -> Result<AudioClip> {
    let mut failures = 0u32;
    loop {
        let request = SynthesisRequest {
            text: &plan.text,
            rate: None,
            segment_index: plan.index,
            attempt: 0,
        };
        let result = synthesizer
            .synthesize(&request)
            .await
            .and_then(|rendered| rendered.into_mono(config.sample_rate));

        match result {
            Ok(clip) => return Ok(clip),
            Err(e) if e.is_transient() => {
                failures += 1;
                if let Some(limit) = config.initial_retry_limit {
                    if failures >= limit {
                        return Err(DubError::SynthesisUnavailable {
                            index: plan.index,
                            attempts: failures,
                            last_error: e.to_string(),
                        });
                    }
                }
                let delay = backoff_delay(config, failures);
                warn!(
                    "Synthesis failed for segment {} ({}), retrying in {} ms",
                    plan.index,
                    e,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Подгоняет клип сегмента под его бюджет.
///
/// Ошибкой заканчивается только нейтральная попытка: недоступность
/// синтезатора или нетранзиентная ошибка. Как только нейтральный клип есть,
/// несошедшаяся коррекция и любые сбои внутри нее превращаются в
/// предупреждения, а сегмент получает лучший из полученных клипов.
pub async fn fit_segment(
    synthesizer: &dyn SpeechSynthesizer,
    plan: &SegmentPlan,
    config: &DubConfig,
) -> Result<FittedClip> {
    let mut controller = DurationController::new(plan, config);
    let mut warnings = Vec::new();

    let mut clip = synthesize_neutral(synthesizer, plan, config).await?;
    let mut rate = None;
    let mut attempts = 1u32;
    debug!(
        "Segment {}: neutral clip {} ms (subtitle {} ms, threshold {:?})",
        plan.index,
        clip.duration_ms(),
        plan.subtitle_duration_ms,
        plan.threshold_ms
    );

    let mut decision = controller.observe(clip.duration_ms());

    match config.correction_mode {
        CorrectionMode::TimeStretch => {
            if decision != Decision::Accept {
                let goal = plan.goal_ms();
                match clip.stretch_to(goal) {
                    Ok(stretched) => clip = stretched,
                    Err(e) => warn!(
                        "Segment {}: time-stretch failed, keeping natural clip: {}",
                        plan.index, e
                    ),
                }
            }
        }
        CorrectionMode::Resynthesize => {
            let goal = plan.goal_ms();
            let mut best: (u64, AudioClip, Option<RateInstruction>) =
                (clip.duration_ms().abs_diff(goal), clip.clone(), None);
            let mut failures = 0u32;

            loop {
                let instruction = match decision {
                    Decision::Accept => break,
                    Decision::GiveUp => {
                        let warning = DubWarning::ConvergenceExhausted {
                            index: plan.index,
                            attempts: controller.corrections(),
                            duration_ms: clip.duration_ms(),
                            threshold_ms: plan.threshold_ms,
                        };
                        warn!("{}", warning);
                        warnings.push(warning);
                        break;
                    }
                    Decision::Retry(instruction) => instruction,
                };

                let request = SynthesisRequest {
                    text: &plan.text,
                    rate: Some(instruction),
                    segment_index: plan.index,
                    attempt: attempts,
                };
                debug!("Segment {}: re-synthesizing at {}", plan.index, instruction);

                let result = synthesizer
                    .synthesize(&request)
                    .await
                    .and_then(|rendered| rendered.into_mono(config.sample_rate));

                match result {
                    Ok(next) => {
                        attempts += 1;
                        clip = next;
                        rate = Some(instruction);
                        let distance = clip.duration_ms().abs_diff(goal);
                        if distance < best.0 {
                            best = (distance, clip.clone(), rate);
                        }
                        debug!(
                            "Segment {}: clip at {} is {} ms",
                            plan.index,
                            instruction,
                            clip.duration_ms()
                        );
                        decision = controller.observe(clip.duration_ms());
                    }
                    Err(DubError::Cancelled) => return Err(DubError::Cancelled),
                    Err(e) => {
                        failures += 1;
                        // Нетранзиентная ошибка прекращает коррекцию сразу
                        if !e.is_transient() || failures >= config.max_correction_failures {
                            let warning = DubWarning::CorrectionFailed {
                                index: plan.index,
                                failures,
                                last_error: e.to_string(),
                            };
                            warn!("{}", warning);
                            warnings.push(warning);
                            clip = best.1;
                            rate = best.2;
                            break;
                        }
                        let delay = backoff_delay(config, failures);
                        warn!(
                            "Segment {}: correction attempt failed ({}), retrying in {} ms",
                            plan.index,
                            e,
                            delay.as_millis()
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }

    let natural_duration_ms = clip.duration_ms();
    if let Some(target) = plan.target_ms {
        clip.fit_to_duration(target);
    }

    info!(
        "Segment {} fitted: {} ms -> {} ms after {} synthesis call(s), rate {}",
        plan.index,
        natural_duration_ms,
        clip.duration_ms(),
        attempts,
        rate.map_or_else(|| "neutral".to_string(), |r| r.to_string())
    );

    Ok(FittedClip {
        index: plan.index,
        start_ms: plan.start_ms,
        clip,
        natural_duration_ms,
        rate,
        attempts,
        warnings,
    })
}
