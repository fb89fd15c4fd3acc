//! Пример озвучки SRT-файла
//!
//! ```text
//! cargo run --example dub_srt -- input.srt dub.wav --engine openai --voice alloy
//! ```
//!
//! Для `--engine openai` нужен `OPENAI_API_KEY`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio::sync::mpsc;

use dub_sync::tts::edge::DEFAULT_VOICE;
use dub_sync::utils::init_logger;
use dub_sync::{
    DubConfig, Dubber, EdgeTtsSynthesizer, OpenAiSynthesizer, ProgressUpdate, ScratchDir,
    SpeechSynthesizer,
};

/// Движок синтеза речи
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Engine {
    /// Утилита `edge-tts` из PATH
    Edge,
    /// OpenAI Speech API
    Openai,
}

#[derive(Parser)]
#[command(about = "Dub an SRT file into a WAV track aligned with the subtitles")]
struct Args {
    #[arg(value_name = "SRT", help = "Subtitle file to dub")]
    input: PathBuf,

    #[arg(value_name = "WAV", help = "Where to write the dubbed track")]
    output: PathBuf,

    #[arg(long, value_enum, default_value_t = Engine::Edge, help = "Speech engine")]
    engine: Engine,

    #[arg(long, help = "Voice name; the engine default is used when omitted")]
    voice: Option<String>,

    #[arg(long, value_name = "FILE", help = "JSON file with job settings")]
    config: Option<PathBuf>,

    #[arg(long, help = "Normalize subtitles at punctuation before merging")]
    normalize: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logger();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => DubConfig::from_json_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => DubConfig::default(),
    };
    if args.normalize {
        config.normalize_subtitles = true;
    }

    // Временная директория должна жить до конца задачи
    let scratch = Arc::new(ScratchDir::new(config.cleanup_temp_files)?);
    let synthesizer: Arc<dyn SpeechSynthesizer> = match args.engine {
        Engine::Edge => {
            let edge = EdgeTtsSynthesizer::new(
                args.voice.clone().unwrap_or_else(|| DEFAULT_VOICE.to_string()),
                scratch.clone(),
            );
            edge.check_available()?;
            Arc::new(edge)
        }
        Engine::Openai => {
            let api_key =
                std::env::var("OPENAI_API_KEY").context("OPENAI_API_KEY must be set")?;
            Arc::new(OpenAiSynthesizer::new(
                api_key,
                "tts-1",
                args.voice.clone().unwrap_or_else(|| "alloy".to_string()),
            )?)
        }
    };

    let (tx, mut rx) = mpsc::channel(32);
    let printer = tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            match update {
                ProgressUpdate::Merged { before, after } => {
                    println!("{} subtitles -> {} segments", before, after)
                }
                ProgressUpdate::SegmentPlaced { index, total } => {
                    println!("[{}/{}] placed", index, total)
                }
                ProgressUpdate::Finished => println!("done"),
                _ => {}
            }
        }
    });

    let dubber = Dubber::new(synthesizer, config)?.with_progress(tx);
    let token = dubber.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    let report = dubber.dub_srt_file(&args.input, &args.output).await?;
    drop(dubber);
    let _ = printer.await;

    for warning in &report.warnings {
        println!("warning: {}", warning);
    }
    println!(
        "{} -> {} ({} ms)",
        args.input.display(),
        args.output.display(),
        report.output.duration_ms
    );
    Ok(())
}
