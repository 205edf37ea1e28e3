//! Kiosk voice binary: wires the recognition loop to the speak pipeline
//! with the standard provider cascade, then runs until interrupted.
//!
//! The FAQ store, vision hooks and face registration belong to the other
//! kiosk processes; this binary runs with their null implementations so
//! the voice stack works standalone.

use std::path::PathBuf;
use std::sync::Arc;

use omnis_voice::audio::CpalPlayer;
use omnis_voice::chat::ChatBackend;
use omnis_voice::hooks::{NullFaq, NullRegistration, NullTracking};
use omnis_voice::stt::WhisperApi;
use omnis_voice::tts::{EspeakVoice, ProviderCascade};
use omnis_voice::{LoopDeps, RecognitionLoop, SharedState, SpeechPipeline, VoiceConfig};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map_or_else(VoiceConfig::default_path, PathBuf::from);
    let config = VoiceConfig::load(&config_path)?;
    tracing::info!("config: {}", config_path.display());

    let state = Arc::new(SharedState::new());
    let cancel = CancellationToken::new();

    let playback = Arc::new(CpalPlayer::new(&config.audio)?);
    let pipeline = SpeechPipeline::start(
        ProviderCascade::from_config(&config.synthesis),
        Arc::new(EspeakVoice::discover()),
        playback,
        Arc::clone(&state),
        Arc::new(NullTracking),
        config.synthesis.clone(),
        cancel.clone(),
    );

    let deps = LoopDeps {
        state: Arc::clone(&state),
        pipeline: pipeline.clone(),
        stt: Arc::new(WhisperApi::new(&config.stt)),
        faq: Arc::new(NullFaq),
        chat: Arc::new(ChatBackend::new(&config.chat, Arc::clone(&state))),
        tracking: Arc::new(NullTracking),
        registration: Arc::new(NullRegistration),
    };
    let loop_task = tokio::spawn(RecognitionLoop::new(&config, deps, cancel.clone()).run());

    pipeline.speak("Hello! Say my name when you need me.");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    pipeline.stop();
    cancel.cancel();
    let _ = loop_task.await;

    Ok(())
}
