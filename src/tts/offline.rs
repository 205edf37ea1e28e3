//! Offline espeak voice: the path of last resort and the fast path.
//!
//! espeak-ng plays straight through the default device, so there is no
//! clip to decode or queue. Latency is near zero, which is why short
//! acknowledgements ("Yes?") skip the cloud cascade entirely and land
//! here. It is also the terminal fallback when every cascade provider is
//! down: the kiosk must never go silent.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{Result, VoiceError};
use crate::persona::VoiceProfile;
use crate::speech::{OfflineSpeaker, PlayGuard};

/// Cancellation poll granularity while the child process runs.
const POLL: Duration = Duration::from_millis(50);

/// espeak-ng subprocess voice.
pub struct EspeakVoice {
    binary: Option<PathBuf>,
}

impl EspeakVoice {
    /// Locate the espeak binary on PATH. A missing binary is not an error
    /// here; [`OfflineSpeaker::speak`] reports it per call so the kiosk
    /// can keep running on cloud voices alone.
    #[must_use]
    pub fn discover() -> Self {
        let binary = which::which("espeak-ng")
            .or_else(|_| which::which("espeak"))
            .ok();
        match &binary {
            Some(path) => debug!("offline voice: {}", path.display()),
            None => warn!("espeak not found; offline voice unavailable"),
        }
        Self { binary }
    }

    #[must_use]
    pub fn available(&self) -> bool {
        self.binary.is_some()
    }
}

#[async_trait]
impl OfflineSpeaker for EspeakVoice {
    async fn speak(&self, text: &str, voice: &VoiceProfile, guard: &PlayGuard) -> Result<()> {
        let binary = self
            .binary
            .as_ref()
            .ok_or_else(|| VoiceError::Tts("espeak-ng is not installed".into()))?;

        let mut child = Command::new(binary)
            .arg("-p")
            .arg(voice.pitch.to_string())
            .arg("-s")
            .arg(voice.speed.to_string())
            .arg(text)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| VoiceError::Tts(format!("cannot spawn espeak: {e}")))?;

        loop {
            if guard.cancelled() {
                let _ = child.kill().await;
                debug!("offline playback interrupted");
                return Ok(());
            }
            match tokio::time::timeout(POLL, child.wait()).await {
                Ok(Ok(status)) => {
                    if !status.success() {
                        return Err(VoiceError::Tts(format!("espeak exited with {status}")));
                    }
                    return Ok(());
                }
                Ok(Err(e)) => {
                    return Err(VoiceError::Tts(format!("espeak wait failed: {e}")));
                }
                Err(_) => {} // still speaking, poll cancellation again
            }
        }
    }
}
