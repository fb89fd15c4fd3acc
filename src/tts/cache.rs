//! Модуль для кэширования результатов TTS
//!
//! Повторный синтез одного и того же текста с той же поправкой темпа
//! возвращает сохраненный клип, поэтому повторный запуск задачи после сбоя
//! не обращается к движку за уже готовыми сегментами.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use parking_lot::Mutex;

use crate::error::Result;
use crate::media::audio::RenderedClip;
use crate::tts::{SpeechSynthesizer, SynthesisRequest};

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, RenderedClip>,
    /// Порядок вставки для вытеснения старых записей
    order: VecDeque<String>,
}

/// Кэширующая обертка над любым синтезатором
pub struct CachedSynthesizer {
    inner: Arc<dyn SpeechSynthesizer>,
    state: Mutex<CacheState>,
    max_entries: usize,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl CachedSynthesizer {
    pub fn new(inner: Arc<dyn SpeechSynthesizer>, max_entries: usize) -> Self {
        Self {
            inner,
            state: Mutex::new(CacheState::default()),
            max_entries: max_entries.max(1),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    /// Генерировать ключ для кэша
    fn cache_key(&self, request: &SynthesisRequest<'_>) -> String {
        let mut hasher = md5::Context::new();
        hasher.consume(self.inner.name().as_bytes());
        hasher.consume([0u8]);
        hasher.consume(request.text.as_bytes());
        hasher.consume([0u8]);
        match request.rate {
            Some(rate) => hasher.consume(rate.percent().to_le_bytes()),
            None => hasher.consume(b"neutral"),
        }
        format!("{:x}", hasher.compute())
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> usize {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Очистить кэш
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.order.clear();
    }

    fn insert(&self, key: String, clip: RenderedClip) {
        let mut state = self.state.lock();
        if state.entries.insert(key.clone(), clip).is_none() {
            state.order.push_back(key);
        }
        while state.entries.len() > self.max_entries {
            match state.order.pop_front() {
                Some(oldest) => {
                    state.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for CachedSynthesizer {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn synthesize(&self, request: &SynthesisRequest<'_>) -> Result<RenderedClip> {
        let key = self.cache_key(request);
        let cached = self.state.lock().entries.get(&key).cloned();
        if let Some(clip) = cached {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!("Cache hit for segment {} (rate {:?})", request.segment_index, request.rate);
            return Ok(clip);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let clip = self.inner.synthesize(request).await?;
        self.insert(key, clip.clone());
        Ok(clip)
    }
}
