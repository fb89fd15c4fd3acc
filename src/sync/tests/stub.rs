//! Тестовый синтезатор: длительность клипа = базовая / (1 + p/100)

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{DubError, Result};
use crate::media::audio::{samples_for_ms, RenderedClip};
use crate::tts::{SpeechSynthesizer, SynthesisRequest};

pub const STUB_RATE: u32 = 16_000;
pub const STUB_LEVEL: f32 = 0.25;

pub struct StubSynthesizer {
    /// Базовая длительность по тексту
    durations: HashMap<String, u64>,
    default_ms: u64,
    honours_rate: bool,
    delays: HashMap<usize, u64>,
    /// Оставшиеся сбои на любых вызовах сегмента
    failures: Mutex<HashMap<usize, u32>>,
    /// Оставшиеся сбои на вызовах с поправкой темпа
    correction_failures: Mutex<HashMap<usize, u32>>,
    fatal: Option<usize>,
    /// Сегменты, для которых движок отвергает любую поправку темпа
    rate_rejected: Vec<usize>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    requests: Mutex<Vec<(usize, Option<i32>)>>,
}

impl StubSynthesizer {
    pub fn new() -> Self {
        Self {
            durations: HashMap::new(),
            default_ms: 1_000,
            honours_rate: true,
            delays: HashMap::new(),
            failures: Mutex::new(HashMap::new()),
            correction_failures: Mutex::new(HashMap::new()),
            fatal: None,
            rate_rejected: Vec::new(),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_duration(mut self, text: &str, ms: u64) -> Self {
        self.durations.insert(text.to_string(), ms);
        self
    }

    /// Движок, который не умеет менять темп
    pub fn ignoring_rate(mut self) -> Self {
        self.honours_rate = false;
        self
    }

    pub fn with_delay(mut self, segment: usize, ms: u64) -> Self {
        self.delays.insert(segment, ms);
        self
    }

    pub fn failing(self, segment: usize, times: u32) -> Self {
        self.failures.lock().insert(segment, times);
        self
    }

    pub fn failing_corrections(self, segment: usize, times: u32) -> Self {
        self.correction_failures.lock().insert(segment, times);
        self
    }

    pub fn fatal_on(mut self, segment: usize) -> Self {
        self.fatal = Some(segment);
        self
    }

    pub fn rejecting_rates(mut self, segment: usize) -> Self {
        self.rate_rejected.push(segment);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Поправки темпа успешных и неуспешных вызовов сегмента по порядку
    pub fn rates_for(&self, segment: usize) -> Vec<Option<i32>> {
        self.requests
            .lock()
            .iter()
            .filter(|(index, _)| *index == segment)
            .map(|(_, rate)| *rate)
            .collect()
    }

    pub fn duration_for(&self, text: &str, rate: Option<i32>) -> u64 {
        let base = self.durations.get(text).copied().unwrap_or(self.default_ms);
        match rate {
            Some(percent) if self.honours_rate => {
                (base as f64 / (1.0 + percent as f64 / 100.0)).round() as u64
            }
            _ => base,
        }
    }

    fn take_failure(map: &Mutex<HashMap<usize, u32>>, segment: usize) -> bool {
        let mut map = map.lock();
        match map.get_mut(&segment) {
            Some(left) if *left > 0 => {
                *left -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for StubSynthesizer {
    fn name(&self) -> &str {
        "stub"
    }

    async fn synthesize(&self, request: &SynthesisRequest<'_>) -> Result<RenderedClip> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let rate = request.rate.map(|r| r.percent());
        self.requests.lock().push((request.segment_index, rate));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delays.get(&request.segment_index) {
            tokio::time::sleep(Duration::from_millis(*delay)).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fatal == Some(request.segment_index) {
            return Err(DubError::Configuration("voice not found".to_string()));
        }
        if rate.is_some() && self.rate_rejected.contains(&request.segment_index) {
            return Err(DubError::Configuration("speed not supported".to_string()));
        }
        if Self::take_failure(&self.failures, request.segment_index) {
            return Err(DubError::SynthesisTransient("connection reset".to_string()));
        }
        if rate.is_some() && Self::take_failure(&self.correction_failures, request.segment_index) {
            return Err(DubError::SynthesisTransient("model overloaded".to_string()));
        }

        let duration = self.duration_for(request.text, rate);
        Ok(RenderedClip {
            samples: vec![STUB_LEVEL; samples_for_ms(duration, STUB_RATE)],
            sample_rate: STUB_RATE,
            channel_count: 1,
        })
    }
}
