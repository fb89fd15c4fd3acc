use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_test::{assert_err, assert_ok};

use super::stub::{StubSynthesizer, STUB_LEVEL, STUB_RATE};
use crate::config::DubConfig;
use crate::error::DubError;
use crate::media::audio::{decode_wav_file, samples_for_ms};
use crate::progress::ProgressUpdate;
use crate::subtitle::{Segment, Timeline};
use crate::sync::assembler::Placement;
use crate::sync::pipeline::Dubber;

const TWO_CUES: &str = "1
00:00:00,000 --> 00:00:02,000
A

2
00:00:02,500 --> 00:00:04,000
B
";

fn test_config() -> DubConfig {
    DubConfig {
        sample_rate: STUB_RATE,
        retry_backoff_ms: 1,
        max_backoff_ms: 4,
        use_caching: false,
        ..DubConfig::default()
    }
}

fn srt_of(cues: &[(u64, u64, &str)]) -> String {
    let segments: Vec<Segment> = cues
        .iter()
        .enumerate()
        .map(|(i, &(start, end, text))| Segment::new(i + 1, start, end, text))
        .collect();
    crate::subtitle::writer::to_srt_string(&segments)
}

#[tokio::test]
async fn test_end_to_end_two_segments() {
    let stub = Arc::new(StubSynthesizer::new().with_duration("A", 2_600).with_duration("B", 1_400));
    let (tx, mut rx) = mpsc::channel(64);
    let dubber = assert_ok!(Dubber::new(stub.clone(), test_config())).with_progress(tx);

    let report = assert_ok!(dubber.dub_srt_text(TWO_CUES).await);

    assert_eq!(stub.rates_for(1), vec![None, Some(30)]);
    assert_eq!(stub.rates_for(2), vec![None]);
    assert_eq!(report.output.duration_ms, 4_000);
    assert!(report.warnings.is_empty());
    assert_eq!(
        report.placements,
        vec![
            (1, Placement::Appended { gap_ms: 0, trimmed_ms: 0, length_ms: 2_000 }),
            (2, Placement::Appended { gap_ms: 500, trimmed_ms: 0, length_ms: 1_500 }),
        ]
    );

    let samples = &report.output.samples;
    assert_eq!(samples[0], STUB_LEVEL);
    let gap = samples_for_ms(2_000, STUB_RATE)..samples_for_ms(2_500, STUB_RATE);
    assert!(samples[gap].iter().all(|&s| s == 0.0));
    assert_eq!(samples[samples_for_ms(2_500, STUB_RATE)], STUB_LEVEL);

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert_eq!(events.first(), Some(&ProgressUpdate::Started));
    assert_eq!(events[1], ProgressUpdate::ParsingSubtitles);
    assert_eq!(events[2], ProgressUpdate::Merged { before: 2, after: 2 });
    assert!(events.contains(&ProgressUpdate::SegmentFitted { current: 2, total: 2 }));
    assert!(events.contains(&ProgressUpdate::SegmentPlaced { index: 2, total: 2 }));
    assert_eq!(events.last(), Some(&ProgressUpdate::Finished));
}

#[tokio::test]
async fn test_close_cues_are_dubbed_as_one_segment() {
    let srt = srt_of(&[(0, 1_000, "Hello"), (1_100, 2_000, "world")]);
    let stub = Arc::new(StubSynthesizer::new().with_duration("Hello world", 1_900));
    let dubber = assert_ok!(Dubber::new(stub.clone(), test_config()));

    let report = assert_ok!(dubber.dub_srt_text(&srt).await);

    assert_eq!(stub.calls(), 1);
    assert_eq!(report.placements.len(), 1);
    assert_eq!(report.output.duration_ms, 2_000);
}

#[tokio::test]
async fn test_normalized_subtitles_join_unfinished_sentence() {
    let srt = srt_of(&[(0, 1_000, "this is"), (1_500, 2_500, "a sentence.")]);
    let stub = Arc::new(StubSynthesizer::new().with_duration("this is a sentence.", 2_400));
    let config = DubConfig {
        normalize_subtitles: true,
        ..test_config()
    };
    let (tx, mut rx) = mpsc::channel(64);
    let dubber = assert_ok!(Dubber::new(stub.clone(), config)).with_progress(tx);

    let report = assert_ok!(dubber.dub_srt_text(&srt).await);

    assert_eq!(stub.calls(), 1);
    assert_eq!(report.placements.len(), 1);
    assert_eq!(report.output.duration_ms, 2_500);

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert!(events.contains(&ProgressUpdate::Merged { before: 2, after: 1 }));
}

#[tokio::test]
async fn test_segments_are_placed_in_order() {
    let srt = srt_of(&[(0, 1_000, "one"), (1_500, 2_500, "two"), (3_000, 4_000, "three")]);
    let stub = Arc::new(
        StubSynthesizer::new()
            .with_delay(1, 80)
            .with_delay(2, 40),
    );
    let dubber = assert_ok!(Dubber::new(stub.clone(), test_config()));

    let report = assert_ok!(dubber.dub_srt_text(&srt).await);

    let order: Vec<usize> = report.placements.iter().map(|(index, _)| *index).collect();
    assert_eq!(order, vec![1, 2, 3]);
    assert_eq!(report.output.duration_ms, 4_000);
}

#[tokio::test]
async fn test_concurrency_is_bounded() {
    let cues: Vec<(u64, u64, String)> = (0..6u64)
        .map(|i| (i * 2_000, i * 2_000 + 1_000, format!("line {}", i)))
        .collect();
    let refs: Vec<(u64, u64, &str)> = cues.iter().map(|(s, e, t)| (*s, *e, t.as_str())).collect();
    let srt = srt_of(&refs);

    let mut stub = StubSynthesizer::new();
    for segment in 1..=6 {
        stub = stub.with_delay(segment, 30);
    }
    let stub = Arc::new(stub);
    let config = DubConfig {
        max_concurrent_requests: 2,
        ..test_config()
    };
    let dubber = assert_ok!(Dubber::new(stub.clone(), config));

    assert_ok!(dubber.dub_srt_text(&srt).await);
    assert_eq!(stub.calls(), 6);
    assert!(stub.max_in_flight() <= 2, "max in flight {}", stub.max_in_flight());
}

#[tokio::test]
async fn test_fatal_segment_error_fails_job() {
    let stub = Arc::new(StubSynthesizer::new().fatal_on(2));
    let dubber = assert_ok!(Dubber::new(stub, test_config()));
    let err = assert_err!(dubber.dub_srt_text(TWO_CUES).await);
    assert!(matches!(err, DubError::Configuration(_)));
}

#[tokio::test]
async fn test_rejected_correction_does_not_fail_job() {
    let stub = Arc::new(
        StubSynthesizer::new()
            .with_duration("A", 2_600)
            .with_duration("B", 1_400)
            .rejecting_rates(1),
    );
    let dubber = assert_ok!(Dubber::new(stub.clone(), test_config()));

    let report = assert_ok!(dubber.dub_srt_text(TWO_CUES).await);

    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].segment_index(), 1);
    assert_eq!(report.output.duration_ms, 4_000);
    assert_eq!(stub.rates_for(2), vec![None]);
}

#[tokio::test]
async fn test_unavailable_synthesizer_fails_job() {
    let stub = Arc::new(StubSynthesizer::new().failing(1, 100));
    let config = DubConfig {
        initial_retry_limit: Some(2),
        ..test_config()
    };
    let dubber = assert_ok!(Dubber::new(stub, config));
    let err = assert_err!(dubber.dub_srt_text(TWO_CUES).await);
    assert!(matches!(err, DubError::SynthesisUnavailable { index: 1, attempts: 2, .. }));
}

#[tokio::test]
async fn test_cancel_before_start() {
    let stub = Arc::new(StubSynthesizer::new());
    let dubber = assert_ok!(Dubber::new(stub, test_config()));
    dubber.cancellation_token().cancel();
    let err = assert_err!(dubber.dub_srt_text(TWO_CUES).await);
    assert!(matches!(err, DubError::Cancelled));
}

#[tokio::test]
async fn test_cancel_while_running() {
    let stub = Arc::new(StubSynthesizer::new().with_delay(2, 10_000));
    let dubber = assert_ok!(Dubber::new(stub, test_config()));
    let token = dubber.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });

    let result = tokio::time::timeout(Duration::from_secs(5), dubber.dub_srt_text(TWO_CUES)).await;
    let err = assert_err!(assert_ok!(result));
    assert!(matches!(err, DubError::Cancelled));
}

#[tokio::test]
async fn test_invalid_srt_is_format_error() {
    let stub = Arc::new(StubSynthesizer::new());
    let dubber = assert_ok!(Dubber::new(stub.clone(), test_config()));
    let err = assert_err!(dubber.dub_srt_text("not a subtitle file").await);
    assert!(matches!(err, DubError::Format(_)));
    assert_eq!(stub.calls(), 0);
}

#[tokio::test]
async fn test_empty_timeline_gives_empty_output() {
    let stub = Arc::new(StubSynthesizer::new());
    let dubber = assert_ok!(Dubber::new(stub.clone(), test_config()));
    let report = assert_ok!(dubber.dub_timeline(&Timeline::from_segments(&[], 300)).await);
    assert_eq!(report.output.duration_ms, 0);
    assert!(report.output.samples.is_empty());
    assert_eq!(stub.calls(), 0);
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let stub = Arc::new(StubSynthesizer::new());
    let config = DubConfig {
        max_concurrent_requests: 0,
        ..test_config()
    };
    assert!(matches!(Dubber::new(stub, config), Err(DubError::Configuration(_))));
}

#[tokio::test]
async fn test_dub_srt_file_writes_wav_and_uses_cache() {
    let srt = srt_of(&[(0, 1_000, "same"), (3_000, 4_000, "same")]);
    let dir = tempfile::tempdir().unwrap();
    let srt_path = dir.path().join("input.srt");
    let wav_path = dir.path().join("dub.wav");
    std::fs::write(&srt_path, srt).unwrap();

    let stub = Arc::new(StubSynthesizer::new().with_duration("same", 1_000));
    let config = DubConfig {
        use_caching: true,
        max_concurrent_requests: 1,
        ..test_config()
    };

    let report = assert_ok!(
        crate::sync::pipeline::dub_srt_file(stub.clone(), config, &srt_path, &wav_path).await
    );

    assert_eq!(stub.calls(), 1);
    assert_eq!(report.output.duration_ms, 4_000);
    let decoded = assert_ok!(decode_wav_file(&wav_path));
    assert_eq!(decoded.duration_ms(), 4_000);
}
