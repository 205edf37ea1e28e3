//! Microphone acquisition and phrase capture.
//!
//! The microphone is only open while the loop is actually listening: each
//! phrase capture builds a fresh cpal input stream and tears it down
//! afterwards, so the kiosk never records its own speech.

use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::collections::VecDeque;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::audio::{resample, rms_energy, to_mono};
use crate::config::{AudioConfig, ListenConfig};
use crate::error::{Result, VoiceError};

/// Why a phrase capture produced nothing.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// Nobody spoke before the listen timeout.
    #[error("no speech before the listen timeout")]
    StartTimeout,
    /// The input stream died; the microphone must be reacquired.
    #[error("capture stream failed: {0}")]
    Stream(String),
}

/// An opened input device, calibrated against ambient noise.
pub struct Microphone {
    device: cpal::Device,
    stream_config: StreamConfig,
    target_rate: u32,
}

impl Microphone {
    /// Acquire a working microphone, retrying over every candidate device
    /// and sample rate until one opens and calibrates. Never fails: waits
    /// and retries until the token is cancelled (returns `None` then).
    ///
    /// Returns the microphone plus the calibrated energy threshold.
    pub async fn acquire(
        audio: &AudioConfig,
        listen: &ListenConfig,
        cancel: &CancellationToken,
    ) -> Option<(Self, f32)> {
        let retry = Duration::from_secs(audio.acquire_retry_s.max(1));
        loop {
            if cancel.is_cancelled() {
                return None;
            }

            let audio_cfg = audio.clone();
            let listen_cfg = listen.clone();
            let probe = tokio::task::spawn_blocking(move || probe_devices(&audio_cfg, &listen_cfg));
            match probe.await {
                Ok(Some(found)) => return Some(found),
                Ok(None) => warn!("no working microphone found, retrying"),
                Err(e) => error!("microphone probe panicked: {e}"),
            }

            tokio::select! {
                () = cancel.cancelled() => return None,
                () = tokio::time::sleep(retry) => {}
            }
        }
    }

    fn open(device: cpal::Device, sample_rate: u32, target_rate: u32) -> Result<Self> {
        let channels = device
            .default_input_config()
            .map_err(|e| VoiceError::Capture(format!("no default input config: {e}")))?
            .channels();

        Ok(Self {
            device,
            stream_config: StreamConfig {
                channels,
                sample_rate,
                buffer_size: cpal::BufferSize::Default,
            },
            target_rate,
        })
    }

    /// Sample ambient noise and derive the speech energy threshold.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream cannot start or produces no audio.
    pub fn calibrate(&self, listen: &ListenConfig) -> Result<f32> {
        let (stream, rx) = self.start_stream()?;
        let wanted = (self.target_rate as u64 * listen.calibration_ms / 1000) as usize;
        let mut samples: Vec<f32> = Vec::with_capacity(wanted);

        while samples.len() < wanted {
            match rx.recv_timeout(Duration::from_millis(500)) {
                Ok(chunk) => samples.extend(chunk),
                Err(_) => {
                    drop(stream);
                    return Err(VoiceError::Capture("no audio during calibration".into()));
                }
            }
        }
        drop(stream);

        let ambient = rms_energy(&samples);
        let threshold = (ambient * listen.energy_ratio).clamp(listen.energy_floor, listen.energy_cap);
        info!("ambient noise rms={ambient:.4}, speech threshold={threshold:.4}");
        Ok(threshold)
    }

    /// Record one phrase.
    ///
    /// Waits up to the configured start timeout for speech energy, then
    /// accumulates until trailing silence or the phrase limit. A short
    /// pre-roll ahead of the trigger is included so quiet first syllables
    /// survive.
    pub fn capture_phrase(
        &self,
        listen: &ListenConfig,
        threshold: f32,
    ) -> std::result::Result<Vec<f32>, CaptureError> {
        let (stream, rx) = self
            .start_stream()
            .map_err(|e| CaptureError::Stream(e.to_string()))?;

        let rate = self.target_rate as usize;
        let pause_samples = rate * listen.pause_ms as usize / 1000;
        let limit_samples = rate * listen.phrase_limit_s as usize;
        let preroll_cap = rate * 3 / 10; // 300ms
        let start_deadline = Instant::now() + Duration::from_secs(listen.start_timeout_s);

        let mut preroll: VecDeque<f32> = VecDeque::with_capacity(preroll_cap);
        let mut phrase: Vec<f32> = Vec::new();
        let mut in_speech = false;
        let mut silence_run = 0usize;

        let outcome = loop {
            let chunk = match rx.recv_timeout(Duration::from_millis(200)) {
                Ok(chunk) => chunk,
                Err(RecvTimeoutError::Timeout) => {
                    if !in_speech && Instant::now() >= start_deadline {
                        break Err(CaptureError::StartTimeout);
                    }
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    break Err(CaptureError::Stream("input stream closed".into()));
                }
            };

            let energy = rms_energy(&chunk);

            if !in_speech {
                preroll.extend(chunk.iter().copied());
                while preroll.len() > preroll_cap {
                    preroll.pop_front();
                }
                if energy > threshold {
                    in_speech = true;
                    phrase.extend(preroll.drain(..));
                } else if Instant::now() >= start_deadline {
                    break Err(CaptureError::StartTimeout);
                }
                continue;
            }

            phrase.extend_from_slice(&chunk);
            if energy > threshold {
                silence_run = 0;
            } else {
                silence_run += chunk.len();
                if silence_run >= pause_samples {
                    break Ok(());
                }
            }
            if phrase.len() >= limit_samples {
                debug!("phrase limit reached");
                break Ok(());
            }
        };

        drop(stream);
        outcome.map(|()| phrase)
    }

    fn start_stream(&self) -> Result<(cpal::Stream, mpsc::Receiver<Vec<f32>>)> {
        let (tx, rx) = mpsc::channel::<Vec<f32>>();
        let channels = self.stream_config.channels;
        let native_rate = self.stream_config.sample_rate;
        let target_rate = self.target_rate;

        let stream = self
            .device
            .build_input_stream(
                &self.stream_config,
                move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                    let mono = to_mono(data, channels);
                    let samples = resample(&mono, native_rate, target_rate);
                    // Receiver gone means the capture ended; nothing to do.
                    let _ = tx.send(samples);
                },
                move |err| {
                    error!("audio input stream error: {err}");
                },
                None,
            )
            .map_err(|e| VoiceError::Capture(format!("failed to build input stream: {e}")))?;

        stream
            .play()
            .map_err(|e| VoiceError::Capture(format!("failed to start input stream: {e}")))?;

        Ok((stream, rx))
    }
}

/// Walk every candidate device and rate; return the first combination
/// that opens and calibrates.
fn probe_devices(audio: &AudioConfig, listen: &ListenConfig) -> Option<(Microphone, f32)> {
    let host = cpal::default_host();

    let mut candidates: Vec<cpal::Device> = Vec::new();
    if let Some(ref wanted) = audio.input_device {
        if let Ok(devices) = host.input_devices() {
            candidates.extend(devices.filter(|d| {
                d.description()
                    .ok()
                    .map(|desc| desc.name() == wanted)
                    .unwrap_or(false)
            }));
        }
    } else {
        if let Some(default) = host.default_input_device() {
            candidates.push(default);
        }
        if let Ok(devices) = host.input_devices() {
            candidates.extend(devices);
        }
    }

    for device in candidates {
        let name = device
            .description()
            .map(|d| d.name().to_owned())
            .unwrap_or_else(|_| "<unknown>".into());

        for &rate in &audio.capture_rates {
            debug!("trying microphone '{name}' @ {rate}Hz");
            let mic = match Microphone::open(device.clone(), rate, audio.input_sample_rate) {
                Ok(mic) => mic,
                Err(e) => {
                    debug!("open failed: {e}");
                    continue;
                }
            };
            match mic.calibrate(listen) {
                Ok(threshold) => {
                    info!("microphone connected: '{name}' @ {rate}Hz");
                    return Some((mic, threshold));
                }
                Err(e) => debug!("calibration failed on '{name}' @ {rate}Hz: {e}"),
            }
        }
    }

    None
}
