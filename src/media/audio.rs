//! # Audio
//!
//! Модуль для работы с PCM-буферами: перевод миллисекунд в семплы,
//! сведение в моно, ресемплинг и изменение длительности через Rubato,
//! декодирование ответов синтезатора через Symphonia и запись WAV через hound.
//!
//! Все клипы внутри задачи хранятся в моно `f32` с частотой дискретизации
//! задачи. Длительность клипа в миллисекундах выводится из числа семплов.

use std::io::Cursor;
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use log::{debug, info, warn};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{DubError, Result};

/// Количество семплов, соответствующее `ms` миллисекундам (с округлением).
///
/// Для частот выше 1 кГц `ms_for_samples(samples_for_ms(ms, r), r) == ms`.
pub fn samples_for_ms(ms: u64, sample_rate: u32) -> usize {
    ((ms * sample_rate as u64 + 500) / 1000) as usize
}

/// Длительность `samples` семплов в миллисекундах (с округлением)
pub fn ms_for_samples(samples: usize, sample_rate: u32) -> u64 {
    let rate = sample_rate as u64;
    (samples as u64 * 1000 + rate / 2) / rate
}

/// Результат одного вызова синтезатора: семплы с чередованием каналов
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedClip {
    /// Семплы PCM (f32), каналы чередуются
    pub samples: Vec<f32>,
    /// Частота дискретизации
    pub sample_rate: u32,
    /// Количество каналов
    pub channel_count: u16,
}

impl RenderedClip {
    /// Длительность в миллисекундах
    pub fn duration_ms(&self) -> u64 {
        let channels = self.channel_count.max(1) as usize;
        ms_for_samples(self.samples.len() / channels, self.sample_rate)
    }

    /// Сводит в моно и приводит к частоте задачи
    pub fn into_mono(self, target_rate: u32) -> Result<AudioClip> {
        if self.sample_rate == 0 {
            return Err(DubError::AudioProcessing(
                "Synthesizer returned a zero sample rate".to_string(),
            ));
        }
        let mono = downmix(&self.samples, self.channel_count);
        if self.sample_rate == target_rate {
            return Ok(AudioClip::new(mono, target_rate));
        }
        debug!("Resampling clip {} Hz -> {} Hz", self.sample_rate, target_rate);
        let ratio = target_rate as f64 / self.sample_rate as f64;
        let expected = (mono.len() as f64 * ratio).round() as usize;
        let resampled = resample_with_rubato(&mono, ratio, expected)?;
        Ok(AudioClip::new(resampled, target_rate))
    }
}

/// Моно-клип с частотой дискретизации задачи
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioClip {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    /// Тишина заданной длительности
    pub fn silence(ms: u64, sample_rate: u32) -> Self {
        Self::new(vec![0.0; samples_for_ms(ms, sample_rate)], sample_rate)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    /// Длительность в миллисекундах
    pub fn duration_ms(&self) -> u64 {
        ms_for_samples(self.samples.len(), self.sample_rate)
    }

    /// Приводит клип ровно к `target_ms`: добивает тишиной в конце или обрезает конец
    pub fn fit_to_duration(&mut self, target_ms: u64) {
        let target_len = samples_for_ms(target_ms, self.sample_rate);
        self.samples.resize(target_len, 0.0);
    }

    /// Отрезает `ms` миллисекунд от начала клипа
    pub fn trim_start_ms(&mut self, ms: u64) {
        let cut = samples_for_ms(ms, self.sample_rate).min(self.samples.len());
        self.samples.drain(..cut);
    }

    /// Растягивает или сжимает клип до `target_ms` ресемплингом.
    ///
    /// Высота тона меняется вместе с темпом.
    pub fn stretch_to(&self, target_ms: u64) -> Result<AudioClip> {
        let target_len = samples_for_ms(target_ms, self.sample_rate);
        if self.samples.is_empty() || target_len == 0 {
            return Ok(AudioClip::new(vec![0.0; target_len], self.sample_rate));
        }
        let ratio = target_len as f64 / self.samples.len() as f64;
        if (ratio - 1.0).abs() < 0.02 {
            debug!("Stretch not needed: ratio {:.3}", ratio);
            let mut clip = self.clone();
            clip.samples.resize(target_len, 0.0);
            return Ok(clip);
        }
        info!(
            "Time-stretching clip {} ms -> {} ms (ratio {:.3})",
            self.duration_ms(),
            target_ms,
            ratio
        );
        let stretched = resample_with_rubato(&self.samples, ratio, target_len)?;
        Ok(AudioClip::new(stretched, self.sample_rate))
    }
}

/// Сводит чередующиеся каналы в моно усреднением
pub fn downmix(samples: &[f32], channel_count: u16) -> Vec<f32> {
    let channels = channel_count.max(1) as usize;
    if channels == 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Ресемплинг моно-сигнала с коэффициентом `ratio` (выход/вход).
///
/// Задержка фильтра отбрасывается, результат приводится ровно к
/// `expected_len` семплам.
fn resample_with_rubato(input: &[f32], ratio: f64, expected_len: usize) -> Result<Vec<f32>> {
    if input.is_empty() {
        return Ok(vec![0.0; expected_len]);
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let chunk_size = 1024;

    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, chunk_size, 1)
        .map_err(|e| DubError::TimeStretching(format!("Failed to create resampler: {}", e)))?;

    let delay = resampler.output_delay();
    let mut output: Vec<f32> = Vec::with_capacity(expected_len + delay + chunk_size);

    let mut chunks = input.chunks_exact(chunk_size);
    for chunk in &mut chunks {
        let frames = resampler
            .process(&[chunk], None)
            .map_err(|e| DubError::TimeStretching(format!("Resampling failed: {}", e)))?;
        output.extend_from_slice(&frames[0]);
    }

    let remainder = chunks.remainder();
    if !remainder.is_empty() {
        let frames = resampler
            .process_partial(Some(&[remainder]), None)
            .map_err(|e| DubError::TimeStretching(format!("Resampling failed: {}", e)))?;
        output.extend_from_slice(&frames[0]);
    }

    // Выталкиваем хвост, застрявший в задержке фильтра
    let mut flushes = 0;
    while output.len() < expected_len + delay && flushes < 8 {
        let frames = resampler
            .process_partial(None::<&[Vec<f32>]>, None)
            .map_err(|e| DubError::TimeStretching(format!("Resampler flush failed: {}", e)))?;
        output.extend_from_slice(&frames[0]);
        flushes += 1;
    }

    let start = delay.min(output.len());
    let mut result = output.split_off(start);
    result.resize(expected_len, 0.0);
    Ok(result)
}

/// Декодирует сжатое аудио (MP3, WAV, AAC) из памяти.
///
/// `extension` используется только как подсказка для определения формата.
pub fn decode_audio_bytes(data: Vec<u8>, extension: Option<&str>) -> Result<RenderedClip> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(data)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let format_opts = FormatOptions {
        enable_gapless: true,
        ..Default::default()
    };

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &format_opts, &MetadataOptions::default())
        .map_err(|e| DubError::AudioProcessing(format!("Unrecognised audio format: {}", e)))?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| DubError::AudioProcessing("No audio track found".to_string()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| DubError::AudioProcessing(format!("Failed to create decoder: {}", e)))?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channel_count = track.codec_params.channels.map(|c| c.count() as u16).unwrap_or(0);
    let mut samples = Vec::new();

    while let Ok(packet) = format.next_packet() {
        if packet.track_id() != track_id {
            continue;
        }
        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                channel_count = spec.channels.count() as u16;
                let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buffer.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buffer.samples());
            }
            Err(e) => {
                warn!("Skipping undecodable audio packet: {}", e);
            }
        }
    }

    if sample_rate == 0 || channel_count == 0 {
        return Err(DubError::AudioProcessing(
            "Decoded audio has no usable stream parameters".to_string(),
        ));
    }

    debug!("Decoded {} samples, {} Hz, {} channels", samples.len(), sample_rate, channel_count);
    Ok(RenderedClip {
        samples,
        sample_rate,
        channel_count,
    })
}

/// Кодирует моно PCM семплы в WAV-файл (32 бита, плавающая точка)
pub fn encode_wav<P: AsRef<Path>>(
    pcm_data: &[f32],
    sample_rate: u32,
    output_path: P,
) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let mut writer = WavWriter::create(output_path.as_ref(), spec)?;
    for &sample in pcm_data {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    info!(
        "Saved WAV file: {} ({} samples, {} Hz)",
        output_path.as_ref().display(),
        pcm_data.len(),
        sample_rate
    );
    Ok(())
}

/// Читает WAV-файл в моно-клип
pub fn decode_wav_file<P: AsRef<Path>>(file_path: P) -> Result<AudioClip> {
    let mut reader = WavReader::open(file_path.as_ref())?;
    let spec = reader.spec();

    let pcm_data: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / 32768.0))
            .collect::<std::result::Result<Vec<f32>, hound::Error>>()?,
        (SampleFormat::Int, 24) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 8388608.0))
            .collect::<std::result::Result<Vec<f32>, hound::Error>>()?,
        (SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, hound::Error>>()?,
        _ => {
            return Err(DubError::AudioProcessing(format!(
                "Unsupported WAV format: {:?}, {} bits",
                spec.sample_format, spec.bits_per_sample
            )));
        }
    };

    Ok(AudioClip::new(downmix(&pcm_data, spec.channels), spec.sample_rate))
}
