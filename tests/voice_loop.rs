//! End-to-end tests over the public API: the provider cascade against
//! mock HTTP services, and the speak pipeline from text to speaker
//! samples.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use omnis_voice::config::{ElevenLabsConfig, LocalTtsConfig, SynthesisConfig};
use omnis_voice::hooks::NullTracking;
use omnis_voice::persona::VoiceProfile;
use omnis_voice::speech::{OfflineSpeaker, PlayGuard, Playback, SpeechPipeline};
use omnis_voice::state::SharedState;
use omnis_voice::tts::elevenlabs::ElevenLabsTts;
use omnis_voice::tts::local::LocalNeuralTts;
use omnis_voice::tts::ProviderCascade;
use omnis_voice::Result;

/// A small valid mono WAV at 16kHz.
fn wav_bytes(samples: usize) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..samples {
            let v = ((i as f32 / 30.0).sin() * 12_000.0) as i16;
            writer.write_sample(v).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

struct RecordingSink {
    played: Mutex<Vec<(usize, u32)>>,
}

impl Playback for RecordingSink {
    fn play(&self, samples: &[f32], sample_rate: u32, _guard: &PlayGuard) -> Result<()> {
        self.played
            .lock()
            .unwrap()
            .push((samples.len(), sample_rate));
        Ok(())
    }
}

struct SilentOffline;

#[async_trait]
impl OfflineSpeaker for SilentOffline {
    async fn speak(&self, _text: &str, _voice: &VoiceProfile, _guard: &PlayGuard) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn premium_auth_failures_fall_through_to_the_local_server() {
    let elevenlabs = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/text-to-speech/voice-a"))
        .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
        .mount(&elevenlabs)
        .await;

    let local = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(wav_bytes(800)))
        .mount(&local)
        .await;

    let mut cascade = ProviderCascade::new(Duration::from_secs(2));
    cascade.push(
        Arc::new(ElevenLabsTts::new(&ElevenLabsConfig {
            api_keys: Vec::new(),
            api_url: elevenlabs.uri(),
            voice_id: "voice-a".to_owned(),
            model_id: "eleven_turbo_v2".to_owned(),
        })),
        vec!["k1".to_owned(), "k2".to_owned(), "k3".to_owned()],
    );
    cascade.push(
        Arc::new(LocalNeuralTts::new(&LocalTtsConfig {
            url: local.uri(),
            voice: "af_heart".to_owned(),
        })),
        Vec::new(),
    );

    let clip = cascade
        .synthesize("Welcome to the library.", &VoiceProfile::default())
        .await
        .unwrap();
    assert_eq!(clip.bytes, wav_bytes(800));

    // Every premium key was tried once before falling through.
    assert_eq!(elevenlabs.received_requests().await.unwrap().len(), 3);
    assert_eq!(cascade.key_cursor("elevenlabs"), Some(2));
}

#[tokio::test]
async fn quota_rotation_lands_on_the_second_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("xi-api-key", "burned"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(header("xi-api-key", "fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xff, 0xfb]))
        .mount(&server)
        .await;

    let mut cascade = ProviderCascade::new(Duration::from_secs(2));
    cascade.push(
        Arc::new(ElevenLabsTts::new(&ElevenLabsConfig {
            api_keys: Vec::new(),
            api_url: server.uri(),
            voice_id: "voice-a".to_owned(),
            model_id: "eleven_turbo_v2".to_owned(),
        })),
        vec!["burned".to_owned(), "fresh".to_owned()],
    );

    let clip = cascade
        .synthesize("hi there everyone", &VoiceProfile::default())
        .await
        .unwrap();
    assert_eq!(clip.bytes, vec![0xff, 0xfb]);
    assert_eq!(cascade.key_cursor("elevenlabs"), Some(1));
}

#[tokio::test]
async fn pipeline_speaks_a_reply_through_the_cascade() {
    let local = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(wav_bytes(1600)))
        .mount(&local)
        .await;

    let mut cascade = ProviderCascade::new(Duration::from_secs(2));
    cascade.push(
        Arc::new(LocalNeuralTts::new(&LocalTtsConfig {
            url: local.uri(),
            voice: "af_heart".to_owned(),
        })),
        Vec::new(),
    );

    let sink = Arc::new(RecordingSink {
        played: Mutex::new(Vec::new()),
    });
    let cancel = CancellationToken::new();
    let pipeline = SpeechPipeline::start(
        cascade,
        Arc::new(SilentOffline),
        sink.clone(),
        Arc::new(SharedState::new()),
        Arc::new(NullTracking),
        SynthesisConfig {
            fast_path_max_chars: 0,
            stock_phrases: Vec::new(),
            ..SynthesisConfig::default()
        },
        cancel.clone(),
    );

    pipeline.speak("The gym is on the east side of the building.");
    for _ in 0..400 {
        if !pipeline.is_speaking() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(!pipeline.is_speaking());

    let played = sink.played.lock().unwrap().clone();
    assert_eq!(played, vec![(1600, 16_000)]);
    cancel.cancel();
}
