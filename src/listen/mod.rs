//! The recognition loop: microphone lifecycle, ambient calibration and
//! the conversation state machine.
//!
//! One supervised task owns the whole cycle: wait for our own voice to
//! finish, open the microphone, capture a phrase, transcribe it, classify
//! it, and hand the response text to the speak pipeline. The microphone
//! is reacquired from scratch whenever the stream dies; nothing in here
//! is fatal.

pub mod commands;
pub mod wake;

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::audio::Microphone;
use crate::audio::capture::CaptureError;
use crate::config::{AudioConfig, ConversationConfig, ListenConfig, VoiceConfig};
use crate::hooks::{AiBackend, FaqLookup, RegistrationSink, TrackingSink};
use crate::listen::commands::BuiltinCommand;
use crate::listen::wake::WakeMatcher;
use crate::persona::{Persona, VoiceProfile};
use crate::speech::SpeechPipeline;
use crate::state::SharedState;
use crate::stt::{AudioClip, SpeechToText, TranscribeError};

/// What the loop is doing right now, for animation and UI hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenState {
    /// Looking for a microphone / measuring ambient noise.
    Calibrating,
    /// Waiting for the wake word; everything else is discarded.
    WakeListen,
    /// In dialogue; follow-ups need no wake word.
    Conversation,
    /// The next utterance is a person's name, not a command.
    AwaitingName,
}

/// Poll interval while waiting for our own speech to finish.
const SPEAKING_POLL: Duration = Duration::from_millis(100);

/// Spoken when the chat backend fails; the conversation itself survives.
const BACKEND_APOLOGY: &str =
    "Sorry, I'm having trouble thinking right now. Please ask me again in a moment.";

/// Everything the loop talks to.
pub struct LoopDeps {
    pub state: Arc<SharedState>,
    pub pipeline: SpeechPipeline,
    pub stt: Arc<dyn SpeechToText>,
    pub faq: Arc<dyn FaqLookup>,
    pub chat: Arc<dyn AiBackend>,
    pub tracking: Arc<dyn TrackingSink>,
    pub registration: Arc<dyn RegistrationSink>,
}

pub struct RecognitionLoop {
    audio: AudioConfig,
    listen: ListenConfig,
    conversation: ConversationConfig,
    deps: LoopDeps,
    wake: WakeMatcher,
    mode: ListenState,
    strikes: u32,
    cancel: CancellationToken,
}

impl RecognitionLoop {
    #[must_use]
    pub fn new(config: &VoiceConfig, deps: LoopDeps, cancel: CancellationToken) -> Self {
        let wake = WakeMatcher::new(&config.conversation.wake_words);
        Self {
            audio: config.audio.clone(),
            listen: config.listen.clone(),
            conversation: config.conversation.clone(),
            deps,
            wake,
            mode: ListenState::WakeListen,
            strikes: 0,
            cancel,
        }
    }

    /// Run until cancelled. Microphone loss, transcription failures and
    /// backend errors are all absorbed here.
    pub async fn run(mut self) {
        info!(
            "voice recognition started, wake words: {:?}",
            self.conversation.wake_words
        );

        'acquire: while !self.cancel.is_cancelled() {
            self.set_phase(ListenState::Calibrating);
            let Some((mic, threshold)) =
                Microphone::acquire(&self.audio, &self.listen, &self.cancel).await
            else {
                break;
            };
            let mut mic = Some(mic);
            self.mode = ListenState::WakeListen;
            self.strikes = 0;

            while !self.cancel.is_cancelled() {
                // Never open the microphone while we are talking, and give
                // the room a moment to swallow the tail of our own voice.
                if !self.wait_for_quiet().await {
                    break 'acquire;
                }
                if self.deps.pipeline.is_speaking() {
                    continue; // something new started during the guard delay
                }

                let Some(current_mic) = mic.take() else {
                    continue 'acquire;
                };
                self.set_phase(self.phase());
                self.deps.state.set_listening(true);

                let listen_cfg = self.listen.clone();
                let captured = tokio::task::spawn_blocking(move || {
                    let result = current_mic.capture_phrase(&listen_cfg, threshold);
                    (current_mic, result)
                })
                .await;

                self.deps.state.set_listening(false);

                let (returned_mic, outcome) = match captured {
                    Ok(pair) => pair,
                    Err(e) => {
                        error!("capture task failed: {e}");
                        continue 'acquire;
                    }
                };
                mic = Some(returned_mic);

                match outcome {
                    Ok(samples) => {
                        if self.deps.pipeline.is_speaking() {
                            debug!("discarding clip captured while speaking");
                            continue;
                        }
                        let clip = AudioClip {
                            samples,
                            sample_rate: self.audio.input_sample_rate,
                            captured_at: Instant::now(),
                        };
                        self.transcribe_and_handle(clip).await;
                    }
                    Err(CaptureError::StartTimeout) => self.note_listen_timeout(),
                    Err(CaptureError::Stream(e)) => {
                        warn!("microphone stream failed ({e}), reacquiring");
                        continue 'acquire;
                    }
                }
            }
        }

        info!("voice recognition stopped");
    }

    /// Wait until the pipeline is silent, then the echo guard. Returns
    /// false when cancelled.
    async fn wait_for_quiet(&self) -> bool {
        while self.deps.pipeline.is_speaking() {
            if self.cancel.is_cancelled() {
                return false;
            }
            tokio::time::sleep(SPEAKING_POLL).await;
        }
        tokio::time::sleep(Duration::from_millis(self.conversation.echo_guard_ms)).await;
        !self.cancel.is_cancelled()
    }

    /// The externally visible phase, folding in the registration sub-state.
    fn phase(&self) -> ListenState {
        if self.deps.state.registration_armed() {
            ListenState::AwaitingName
        } else {
            self.mode
        }
    }

    fn set_phase(&self, phase: ListenState) {
        self.deps.tracking.on_listening_state(phase);
    }

    async fn transcribe_and_handle(&mut self, clip: AudioClip) {
        match self.deps.stt.transcribe(&clip).await {
            Ok(text) => {
                debug!("heard: \"{text}\"");
                self.deps.state.set_last_user_text(&text);
                self.handle_utterance(&text).await;
            }
            Err(TranscribeError::NoSpeech | TranscribeError::Timeout) => {
                self.note_listen_timeout();
            }
            Err(TranscribeError::Service(e)) => {
                warn!("transcription service error: {e}");
            }
        }
    }

    /// A listen cycle ended with nothing usable. Only conversation mode
    /// counts strikes; wake listening is patient forever.
    fn note_listen_timeout(&mut self) {
        if self.mode != ListenState::Conversation {
            return;
        }
        self.strikes += 1;
        if self.strikes >= self.conversation.max_timeout_strikes {
            info!("conversation timed out, waiting for the wake word again");
            self.mode = ListenState::WakeListen;
            self.strikes = 0;
        }
    }

    /// Classify one transcribed utterance and respond to it.
    async fn handle_utterance(&mut self, text: &str) {
        // Any successful utterance keeps the conversation alive.
        self.strikes = 0;

        // An armed registration claims the utterance outright.
        if self.deps.state.registration_armed() {
            self.handle_registration_name(text).await;
            return;
        }

        let normalized = WakeMatcher::normalize(text);
        let has_wake = self.wake.contains(&normalized);

        if self.mode == ListenState::WakeListen && !has_wake {
            debug!("no wake word, ignoring");
            return;
        }

        let question = self.wake.strip(&normalized);

        if let Some(command) = commands::classify(&question) {
            self.run_command(command);
            return;
        }

        if has_wake {
            info!("wake word detected");
            // Instant offline acknowledgement while the real answer is
            // still being produced.
            self.deps.pipeline.speak("Yes?");
            self.mode = ListenState::Conversation;
        }

        if question.chars().count() < self.conversation.min_query_chars {
            return;
        }

        self.answer(&question).await;
        self.mode = ListenState::Conversation;
    }

    fn run_command(&mut self, command: BuiltinCommand) {
        match command {
            BuiltinCommand::Silence => {
                info!("silence command");
                // No acknowledgement: silence means silence.
                self.deps.pipeline.stop();
                self.mode = ListenState::WakeListen;
                self.strikes = 0;
            }
            BuiltinCommand::WhoIsHere => {
                let people = self.deps.state.detected_people();
                self.deps.pipeline.speak(&describe_people(&people));
            }
            BuiltinCommand::Resume => {
                self.deps.pipeline.speak("Ok, I am listening.");
                self.mode = ListenState::Conversation;
            }
            BuiltinCommand::SetPersona(persona) => {
                info!("switching persona to {}", persona.display_name());
                self.deps.state.set_persona(persona);
                self.deps.state.set_voice_profile(persona.voice_profile());
                self.deps.pipeline.speak(&format!(
                    "Initializing {} mode. I am ready.",
                    persona.display_name()
                ));
                self.mode = ListenState::Conversation;
            }
            BuiltinCommand::ResetPersona => {
                self.deps.state.set_persona(Persona::Default);
                self.deps.state.set_voice_profile(VoiceProfile::default());
                self.deps
                    .pipeline
                    .speak("Resetting to my normal personality. How can I help you?");
            }
        }
    }

    /// Answer a query: knowledge base first, chat backend on a miss.
    async fn answer(&mut self, question: &str) {
        if let Some(answer) = self.deps.faq.lookup(question) {
            info!("answered from the knowledge base");
            self.deps.state.set_last_reply_text(&answer);
            self.deps.pipeline.speak(&answer);
            return;
        }

        // Cover the backend's first-token latency with a filler.
        let filler = {
            let fillers = self.deps.state.persona().thinking_fillers();
            let mut rng = rand::thread_rng();
            fillers[rng.gen_range(0..fillers.len())]
        };
        self.deps.pipeline.speak(filler);

        self.deps.state.set_thinking(true);
        let user = self.deps.state.active_user();

        match self.deps.chat.stream_reply(question, user.as_deref()).await {
            Ok(mut sentences) => {
                let mut full = String::new();
                while let Some(sentence) = sentences.next().await {
                    // Forward each sentence as soon as it exists; never
                    // buffer the whole reply.
                    self.deps.pipeline.speak(&sentence);
                    if !full.is_empty() {
                        full.push(' ');
                    }
                    full.push_str(&sentence);
                    self.deps.state.set_last_reply_text(&full);
                }
                debug!("reply complete ({} chars)", full.chars().count());
            }
            Err(e) => {
                warn!("chat backend failed: {e}");
                self.deps.pipeline.speak(BACKEND_APOLOGY);
            }
        }
        self.deps.state.set_thinking(false);
    }

    /// The armed utterance is a name candidate, not a command.
    async fn handle_registration_name(&mut self, text: &str) {
        let name = text.trim();
        if !wake::is_valid_name(name) {
            info!("rejected name candidate: \"{name}\"");
            self.deps.state.take_registration();
            self.deps.pipeline.speak("I didn't catch a name.");
            return;
        }

        let Some(pending) = self.deps.state.take_registration() else {
            return;
        };
        if self.deps.registration.register_name(name, pending).await {
            self.deps
                .pipeline
                .speak(&format!("Thanks {name}, I will remember you."));
        } else {
            self.deps.pipeline.speak("Sorry, I couldn't save your name.");
        }
    }
}

/// Compose the who-is-here answer from the live people list.
fn describe_people(people: &[String]) -> String {
    if people.is_empty() {
        return "I don't see anyone right now.".to_owned();
    }

    let known: Vec<&str> = people
        .iter()
        .filter(|p| *p != "Unknown")
        .map(String::as_str)
        .collect();
    let unknown = people.len() - known.len();

    let mut parts = Vec::new();
    if !known.is_empty() {
        parts.push(format!("I can see {}.", known.join(", ")));
    }
    if unknown > 0 {
        if known.is_empty() {
            return "I see some people, but I don't know their names.".to_owned();
        }
        parts.push(format!("And {unknown} people I don't recognize."));
    }
    parts.join(" ")
}
