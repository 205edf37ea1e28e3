//! Clip playback to system speakers via cpal.

use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::audio::resample;
use crate::config::AudioConfig;
use crate::error::{Result, VoiceError};
use crate::speech::{PlayGuard, Playback};

/// How often the wait loop checks for completion or cancellation.
const POLL: Duration = Duration::from_millis(25);

/// Speaker output via cpal. One clip plays at a time; `play` blocks until
/// the clip finishes or the guard is cancelled.
pub struct CpalPlayer {
    device: cpal::Device,
    /// Rate the device natively prefers, used when it rejects a clip's rate.
    native_rate: u32,
}

impl CpalPlayer {
    /// Create a new playback instance.
    ///
    /// # Errors
    ///
    /// Returns an error if no output device is available.
    pub fn new(config: &AudioConfig) -> Result<Self> {
        let host = cpal::default_host();

        let device = if let Some(ref name) = config.output_device {
            host.output_devices()
                .map_err(|e| VoiceError::Audio(format!("cannot enumerate devices: {e}")))?
                .find(|d| {
                    d.description()
                        .ok()
                        .map(|desc| desc.name() == name)
                        .unwrap_or(false)
                })
                .ok_or_else(|| VoiceError::Audio(format!("output device '{name}' not found")))?
        } else {
            host.default_output_device()
                .ok_or_else(|| VoiceError::Audio("no default output device".into()))?
        };

        let device_name = device
            .description()
            .map(|d| d.name().to_owned())
            .unwrap_or_else(|_| "<unknown>".into());

        let native_rate = device
            .default_output_config()
            .map_err(|e| VoiceError::Audio(format!("no default output config: {e}")))?
            .sample_rate();

        info!("using output device: {device_name} ({native_rate}Hz native)");

        Ok(Self {
            device,
            native_rate,
        })
    }

    fn run_stream(&self, samples: &[f32], sample_rate: u32, guard: &PlayGuard) -> Result<bool> {
        let buffer = Arc::new(Mutex::new(PlaybackBuffer {
            samples: samples.to_vec(),
            position: 0,
            finished: false,
        }));
        let buffer_clone = Arc::clone(&buffer);

        let stream_config = StreamConfig {
            channels: 1,
            sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };

        let stream = self
            .device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                    let mut buf = match buffer_clone.lock() {
                        Ok(b) => b,
                        Err(_) => return,
                    };
                    for sample in data.iter_mut() {
                        if buf.position < buf.samples.len() {
                            *sample = buf.samples[buf.position];
                            buf.position += 1;
                        } else {
                            *sample = 0.0;
                            buf.finished = true;
                        }
                    }
                },
                move |err| {
                    error!("audio output stream error: {err}");
                },
                None,
            )
            .map_err(|e| VoiceError::Audio(format!("failed to build output stream: {e}")))?;

        stream
            .play()
            .map_err(|e| VoiceError::Audio(format!("failed to start output stream: {e}")))?;

        // Wait for the clip to drain, watching for cancellation at poll
        // granularity so a stop command lands mid-sentence.
        let interrupted = loop {
            std::thread::sleep(POLL);
            if guard.cancelled() {
                break true;
            }
            let buf = buffer
                .lock()
                .map_err(|e| VoiceError::Audio(format!("playback buffer lock poisoned: {e}")))?;
            if buf.finished {
                break false;
            }
        };

        drop(stream);
        Ok(interrupted)
    }
}

impl Playback for CpalPlayer {
    fn play(&self, samples: &[f32], sample_rate: u32, guard: &PlayGuard) -> Result<()> {
        let interrupted = match self.run_stream(samples, sample_rate, guard) {
            Ok(done) => done,
            Err(_) if sample_rate != self.native_rate => {
                // Device refused the clip's rate; resample and retry once.
                debug!("resampling clip {sample_rate}Hz -> {}Hz", self.native_rate);
                let resampled = resample(samples, sample_rate, self.native_rate);
                self.run_stream(&resampled, self.native_rate, guard)?
            }
            Err(e) => return Err(e),
        };
        if interrupted {
            debug!("playback interrupted");
        }
        Ok(())
    }
}

/// Internal buffer for tracking playback progress.
struct PlaybackBuffer {
    samples: Vec<f32>,
    position: usize,
    finished: bool,
}
