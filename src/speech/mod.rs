//! The speak pipeline: decoupled synthesis and playback.
//!
//! Two always-running stages are joined by ordered queues. The generator
//! pulls pending text units and synthesizes them through the provider
//! cascade; the player decodes and plays ready clips. Because the stages
//! are independent, sentence *n+1* is synthesized while sentence *n* is
//! still audible, which hides provider latency on multi-sentence replies.
//!
//! Cancellation is an epoch: every unit is stamped when enqueued, and
//! [`SpeechPipeline::stop`] bumps the epoch. Stale units are discarded
//! wherever they are (pending, generating, ready, or mid-playback), so a
//! stop means silence — already-generated audio never drains.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::audio::decode::decode_clip;
use crate::config::SynthesisConfig;
use crate::error::Result;
use crate::hooks::TrackingSink;
use crate::persona::VoiceProfile;
use crate::segment::split_sentences;
use crate::state::SharedState;
use crate::tts::{ProviderCascade, SynthesizedClip};

/// Ready-to-play queue depth; bounds how far generation runs ahead.
const READY_QUEUE_SIZE: usize = 8;

/// One text unit waiting to be voiced.
#[derive(Debug, Clone)]
struct SpeechRequest {
    id: Uuid,
    text: String,
    epoch: u64,
    created_at: Instant,
}

/// Audio for one unit, ready for the player.
enum JobAudio {
    /// Encoded clip from the provider cascade.
    Clip(SynthesizedClip),
    /// No clip: voice the unit's text offline (fast path or cascade
    /// exhaustion).
    Offline,
}

struct SynthesisJob {
    id: Uuid,
    epoch: u64,
    text: String,
    audio: JobAudio,
}

/// Cancellation stamp handed to whatever is playing a unit.
///
/// Cheap to poll from audio wait loops; reports cancelled as soon as the
/// pipeline epoch moves past the unit's stamp.
#[derive(Clone)]
pub struct PlayGuard {
    epoch: Arc<AtomicU64>,
    stamp: u64,
}

impl PlayGuard {
    #[must_use]
    pub fn cancelled(&self) -> bool {
        self.epoch.load(Ordering::Relaxed) != self.stamp
    }

    /// A guard that never cancels, for one-off playback outside the
    /// pipeline.
    #[must_use]
    pub fn detached() -> Self {
        Self {
            epoch: Arc::new(AtomicU64::new(0)),
            stamp: 0,
        }
    }
}

/// Something that can play raw samples, observing the guard at fine
/// granularity.
pub trait Playback: Send + Sync {
    /// Play mono samples to completion or until the guard cancels.
    /// Blocking; the pipeline calls it from a blocking task.
    fn play(&self, samples: &[f32], sample_rate: u32, guard: &PlayGuard) -> Result<()>;
}

/// The non-networked voice of last resort (and the fast path).
#[async_trait]
pub trait OfflineSpeaker: Send + Sync {
    async fn speak(&self, text: &str, voice: &VoiceProfile, guard: &PlayGuard) -> Result<()>;
}

/// Units in flight for the current epoch.
struct Flight {
    epoch: u64,
    live: usize,
}

struct Shared {
    text_tx: mpsc::UnboundedSender<SpeechRequest>,
    /// Mirror of `Flight::epoch` for lock-free polling from audio loops.
    epoch: Arc<AtomicU64>,
    flight: Mutex<Flight>,
    config: SynthesisConfig,
}

impl Shared {
    fn flight(&self) -> std::sync::MutexGuard<'_, Flight> {
        self.flight.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::Relaxed)
    }

    /// Unit finished or was discarded. Only units from the live epoch
    /// still count; stop() already settled the rest.
    fn unit_done(&self, stamp: u64) {
        let mut flight = self.flight();
        if stamp == flight.epoch {
            flight.live = flight.live.saturating_sub(1);
        }
    }
}

/// Handle to the running speak pipeline. Cheap to clone; all clones share
/// the same queues and epoch.
#[derive(Clone)]
pub struct SpeechPipeline {
    shared: Arc<Shared>,
}

impl SpeechPipeline {
    /// Spawn the generator and player stages and return the handle.
    ///
    /// The stages run until `cancel` fires.
    pub fn start(
        cascade: ProviderCascade,
        offline: Arc<dyn OfflineSpeaker>,
        playback: Arc<dyn Playback>,
        state: Arc<SharedState>,
        tracking: Arc<dyn TrackingSink>,
        config: SynthesisConfig,
        cancel: CancellationToken,
    ) -> Self {
        let (text_tx, text_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = mpsc::channel(READY_QUEUE_SIZE);

        let shared = Arc::new(Shared {
            text_tx,
            epoch: Arc::new(AtomicU64::new(0)),
            flight: Mutex::new(Flight { epoch: 0, live: 0 }),
            config,
        });

        tokio::spawn(run_generator(
            Arc::clone(&shared),
            cascade,
            Arc::clone(&state),
            text_rx,
            ready_tx,
            cancel.clone(),
        ));
        tokio::spawn(run_player(
            Arc::clone(&shared),
            offline,
            playback,
            state,
            tracking,
            ready_rx,
            cancel,
        ));

        Self { shared }
    }

    /// Queue text for speech. Never blocks.
    ///
    /// Text longer than the split threshold is broken into sentence units
    /// so playback can begin before the whole reply is synthesized.
    pub fn speak(&self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        let units = if text.chars().count() > self.shared.config.split_threshold {
            split_sentences(text)
        } else {
            vec![text.to_owned()]
        };

        let mut flight = self.shared.flight();
        let epoch = flight.epoch;
        for unit in units {
            let request = SpeechRequest {
                id: Uuid::new_v4(),
                text: unit,
                epoch,
                created_at: Instant::now(),
            };
            if self.shared.text_tx.send(request).is_ok() {
                flight.live += 1;
            } else {
                debug!("speak after pipeline shutdown, dropping unit");
            }
        }
    }

    /// Cut speech off now and forget everything queued.
    ///
    /// Pending, generating and already-generated units are all discarded;
    /// the player aborts the current clip within one poll interval.
    pub fn stop(&self) {
        let mut flight = self.shared.flight();
        flight.epoch += 1;
        flight.live = 0;
        self.shared.epoch.store(flight.epoch, Ordering::Relaxed);
        info!("speech stopped, queue cleared");
    }

    /// Whether anything is pending, generating or playing.
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.shared.flight().live > 0
    }
}

/// Whether `text` should skip the cascade for the instant offline voice.
fn takes_fast_path(text: &str, config: &SynthesisConfig) -> bool {
    if text.chars().count() < config.fast_path_max_chars {
        return true;
    }
    let lower = text.to_lowercase();
    config.stock_phrases.iter().any(|p| lower.contains(p.as_str()))
}

/// Generator stage: pending text -> synthesized jobs, running ahead of
/// playback.
async fn run_generator(
    shared: Arc<Shared>,
    cascade: ProviderCascade,
    state: Arc<SharedState>,
    mut text_rx: mpsc::UnboundedReceiver<SpeechRequest>,
    ready_tx: mpsc::Sender<SynthesisJob>,
    cancel: CancellationToken,
) {
    loop {
        let request = tokio::select! {
            () = cancel.cancelled() => break,
            req = text_rx.recv() => match req {
                Some(req) => req,
                None => break,
            },
        };

        if request.epoch != shared.current_epoch() {
            continue; // cancelled while queued
        }

        let audio = if takes_fast_path(&request.text, &shared.config) {
            JobAudio::Offline
        } else {
            let voice = state.voice_profile();
            match cascade.synthesize(&request.text, &voice).await {
                Ok(clip) => JobAudio::Clip(clip),
                Err(e) => {
                    // Degrade to the offline voice rather than go silent.
                    warn!("cascade exhausted ({e}), using offline voice");
                    JobAudio::Offline
                }
            }
        };

        if request.epoch != shared.current_epoch() {
            debug!("discarding synthesis finished after stop");
            continue;
        }

        let age = request.created_at.elapsed();
        debug!(
            "unit {} ready after {:.0}ms",
            request.id,
            age.as_millis()
        );

        let job = SynthesisJob {
            id: request.id,
            epoch: request.epoch,
            text: request.text,
            audio,
        };
        if ready_tx.send(job).await.is_err() {
            break;
        }
    }
    debug!("generator stage stopped");
}

/// Player stage: ready jobs -> audible speech, one at a time.
async fn run_player(
    shared: Arc<Shared>,
    offline: Arc<dyn OfflineSpeaker>,
    playback: Arc<dyn Playback>,
    state: Arc<SharedState>,
    tracking: Arc<dyn TrackingSink>,
    mut ready_rx: mpsc::Receiver<SynthesisJob>,
    cancel: CancellationToken,
) {
    loop {
        let job = tokio::select! {
            () = cancel.cancelled() => break,
            job = ready_rx.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        if job.epoch != shared.current_epoch() {
            continue; // stopped while waiting in the ready queue
        }

        let guard = PlayGuard {
            epoch: Arc::clone(&shared.epoch),
            stamp: job.epoch,
        };

        let mut use_offline = matches!(job.audio, JobAudio::Offline);

        if let JobAudio::Clip(clip) = job.audio {
            let playback = Arc::clone(&playback);
            let guard_clone = guard.clone();
            let played = tokio::task::spawn_blocking(move || {
                let (samples, rate) = decode_clip(&clip)?;
                playback.play(&samples, rate, &guard_clone)
            })
            .await;

            match played {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    // Last resort so the unit is still heard.
                    warn!("clip playback failed ({e}), trying offline voice");
                    use_offline = true;
                }
                Err(e) => {
                    error!("playback task panicked: {e}");
                    use_offline = true;
                }
            }
        }

        if use_offline && !guard.cancelled() {
            let voice = state.voice_profile();
            if let Err(e) = offline.speak(&job.text, &voice, &guard).await {
                warn!("offline voice failed: {e}");
            }
        }

        shared.unit_done(job.epoch);
        tracking.on_utterance_spoken();
        debug!("unit {} done", job.id);
    }
    debug!("player stage stopped");
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::hooks::NullTracking;
    use crate::tts::{AttemptError, AudioFormat, TtsProvider};
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::time::Duration;

    /// Offline speaker that records what it voices. With `hold` set it
    /// blocks until the guard cancels, standing in for long playback.
    struct RecordingOffline {
        spoken: Mutex<Vec<String>>,
        started: AtomicUsize,
        hold: bool,
        saw_cancel: AtomicBool,
    }

    impl RecordingOffline {
        fn new(hold: bool) -> Arc<Self> {
            Arc::new(Self {
                spoken: Mutex::new(Vec::new()),
                started: AtomicUsize::new(0),
                hold,
                saw_cancel: AtomicBool::new(false),
            })
        }

        fn spoken(&self) -> Vec<String> {
            self.spoken.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl OfflineSpeaker for RecordingOffline {
        async fn speak(&self, text: &str, _voice: &VoiceProfile, guard: &PlayGuard) -> Result<()> {
            self.started.fetch_add(1, Ordering::SeqCst);
            if self.hold {
                for _ in 0..400 {
                    if guard.cancelled() {
                        self.saw_cancel.store(true, Ordering::SeqCst);
                        return Ok(());
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
                panic!("guard never cancelled");
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.spoken.lock().unwrap().push(text.to_owned());
            Ok(())
        }
    }

    struct NoopPlayback;

    impl Playback for NoopPlayback {
        fn play(&self, _samples: &[f32], _sample_rate: u32, _guard: &PlayGuard) -> Result<()> {
            Ok(())
        }
    }

    /// Playback double that records what reached the speaker.
    struct RecordingPlayback {
        played: Mutex<Vec<(usize, u32)>>,
    }

    impl Playback for RecordingPlayback {
        fn play(&self, samples: &[f32], sample_rate: u32, _guard: &PlayGuard) -> Result<()> {
            self.played
                .lock()
                .unwrap()
                .push((samples.len(), sample_rate));
            Ok(())
        }
    }

    /// Provider that always returns a small valid WAV clip.
    struct WavProvider;

    #[async_trait]
    impl TtsProvider for WavProvider {
        fn name(&self) -> &str {
            "wav-test"
        }

        fn requires_key(&self) -> bool {
            false
        }

        async fn synthesize(
            &self,
            _text: &str,
            _voice: &VoiceProfile,
            _api_key: &str,
        ) -> std::result::Result<SynthesizedClip, AttemptError> {
            let spec = hound::WavSpec {
                channels: 1,
                sample_rate: 16_000,
                bits_per_sample: 16,
                sample_format: hound::SampleFormat::Int,
            };
            let mut cursor = std::io::Cursor::new(Vec::new());
            {
                let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
                for i in 0..1600 {
                    let v = ((i as f32 / 20.0).sin() * 10_000.0) as i16;
                    writer.write_sample(v).unwrap();
                }
                writer.finalize().unwrap();
            }
            Ok(SynthesizedClip {
                bytes: cursor.into_inner(),
                format: AudioFormat::Wav,
            })
        }
    }

    /// Everything through the offline path: fast-path threshold above any
    /// test text.
    fn offline_config() -> SynthesisConfig {
        SynthesisConfig {
            fast_path_max_chars: 10_000,
            ..SynthesisConfig::default()
        }
    }

    fn start(
        offline: Arc<RecordingOffline>,
        config: SynthesisConfig,
    ) -> (SpeechPipeline, CancellationToken) {
        let cancel = CancellationToken::new();
        let pipeline = SpeechPipeline::start(
            ProviderCascade::new(Duration::from_secs(1)),
            offline,
            Arc::new(NoopPlayback),
            Arc::new(SharedState::new()),
            Arc::new(NullTracking),
            config,
            cancel.clone(),
        );
        (pipeline, cancel)
    }

    async fn wait_until(mut f: impl FnMut() -> bool) {
        for _ in 0..400 {
            if f() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn short_text_is_one_unit() {
        let offline = RecordingOffline::new(false);
        let (pipeline, cancel) = start(offline.clone(), offline_config());

        pipeline.speak("Hello there.");
        wait_until(|| !pipeline.is_speaking()).await;

        assert_eq!(offline.spoken(), vec!["Hello there.".to_owned()]);
        cancel.cancel();
    }

    #[tokio::test]
    async fn long_reply_splits_into_ordered_sentence_units() {
        let offline = RecordingOffline::new(false);
        let (pipeline, cancel) = start(offline.clone(), offline_config());

        let reply = "The library opens at eight in the morning every weekday. \
                     It closes at five in the afternoon! Weekend hours are \
                     posted at the front desk?";
        assert!(reply.chars().count() > SynthesisConfig::default().split_threshold);

        pipeline.speak(reply);
        wait_until(|| !pipeline.is_speaking()).await;

        let spoken = offline.spoken();
        assert_eq!(spoken.len(), 3);
        let squash = |s: &str| s.chars().filter(|c| !c.is_whitespace()).collect::<String>();
        assert_eq!(squash(&spoken.concat()), squash(reply));
        cancel.cancel();
    }

    #[tokio::test]
    async fn is_speaking_covers_the_whole_lifecycle() {
        let offline = RecordingOffline::new(false);
        let (pipeline, cancel) = start(offline.clone(), offline_config());

        assert!(!pipeline.is_speaking());
        pipeline.speak("One moment.");
        // True from the enqueue itself, before generation starts.
        assert!(pipeline.is_speaking());
        wait_until(|| !pipeline.is_speaking()).await;
        assert_eq!(offline.spoken().len(), 1);
        cancel.cancel();
    }

    #[tokio::test]
    async fn stop_means_silence() {
        let offline = RecordingOffline::new(true);
        let (pipeline, cancel) = start(offline.clone(), offline_config());

        let reply = "First sentence of a long reply that needs splitting. \
                     Second sentence that should never be heard. Third one \
                     must also stay silent after the stop command arrives.";
        pipeline.speak(reply);

        // Wait for the player to start voicing unit one.
        wait_until(|| offline.started.load(Ordering::SeqCst) == 1).await;
        assert!(pipeline.is_speaking());

        pipeline.stop();
        assert!(!pipeline.is_speaking());

        // The held unit observes the cancel within its poll interval and
        // the queued units are discarded, not drained.
        wait_until(|| offline.saw_cancel.load(Ordering::SeqCst)).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(offline.started.load(Ordering::SeqCst), 1);
        assert!(offline.spoken().is_empty());
        cancel.cancel();
    }

    #[tokio::test]
    async fn speak_after_stop_starts_a_fresh_epoch() {
        let offline = RecordingOffline::new(false);
        let (pipeline, cancel) = start(offline.clone(), offline_config());

        pipeline.speak("Old news.");
        pipeline.stop();
        pipeline.speak("Fresh start.");
        wait_until(|| !pipeline.is_speaking()).await;

        let spoken = offline.spoken();
        assert!(spoken.contains(&"Fresh start.".to_owned()));
        assert!(!spoken.contains(&"Old news.".to_owned()));
        cancel.cancel();
    }

    #[tokio::test]
    async fn cascade_clips_reach_the_speaker() {
        let playback = Arc::new(RecordingPlayback {
            played: Mutex::new(Vec::new()),
        });
        let mut cascade = ProviderCascade::new(Duration::from_secs(1));
        cascade.push(Arc::new(WavProvider), Vec::new());

        let cancel = CancellationToken::new();
        let config = SynthesisConfig {
            fast_path_max_chars: 0,
            stock_phrases: Vec::new(),
            ..SynthesisConfig::default()
        };
        let pipeline = SpeechPipeline::start(
            cascade,
            RecordingOffline::new(false),
            playback.clone(),
            Arc::new(SharedState::new()),
            Arc::new(NullTracking),
            config,
            cancel.clone(),
        );

        pipeline.speak("The cafeteria is on the ground floor.");
        wait_until(|| !pipeline.is_speaking()).await;

        let played = playback.played.lock().unwrap().clone();
        assert_eq!(played, vec![(1600, 16_000)]);
        cancel.cancel();
    }

    #[test]
    fn fast_path_takes_short_and_stock_phrases() {
        let config = SynthesisConfig::default();
        assert!(takes_fast_path("Yes?", &config));
        assert!(takes_fast_path("OK.", &config));
        // Long, but contains a stock phrase.
        assert!(takes_fast_path(
            "Welcome. It is a genuine pleasure to have you here with us today.",
            &config
        ));
        assert!(!takes_fast_path(
            "Photosynthesis converts light energy into chemical energy inside chloroplasts.",
            &config
        ));
    }
}
