//! Seams to the kiosk's other subsystems.
//!
//! The voice loop talks to the rest of the robot through these traits:
//! the FAQ store answers known questions, the chat backend answers
//! everything else, the tracking sink animates the head and screen, and
//! the registration sink persists newly enrolled faces. Null
//! implementations keep the voice stack runnable on its own.

use std::pin::Pin;

use async_trait::async_trait;
use tokio_stream::Stream;

use crate::error::Result;
use crate::listen::ListenState;
use crate::state::PendingRegistration;

/// Ordered, finite stream of reply sentences.
pub type SentenceStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// Confidence-gated lookup over the kiosk's local knowledge base.
pub trait FaqLookup: Send + Sync {
    /// Returns an answer only on a confident match; `None` routes the
    /// question to the chat backend.
    fn lookup(&self, question: &str) -> Option<String>;
}

/// Conversational backend for questions the FAQ cannot answer.
#[async_trait]
pub trait AiBackend: Send + Sync {
    /// Stream the reply sentence-by-sentence so the first sentence is
    /// audible while the rest is still generating.
    async fn stream_reply(&self, question: &str, user: Option<&str>) -> Result<SentenceStream>;
}

/// One-way notifications for the head tracker and on-screen UI.
/// Implementations must not block.
pub trait TrackingSink: Send + Sync {
    /// A speech unit finished playing.
    fn on_utterance_spoken(&self) {}

    /// The recognition loop changed state.
    fn on_listening_state(&self, state: ListenState) {
        let _ = state;
    }
}

/// Persists a newly enrolled face under its spoken name.
#[async_trait]
pub trait RegistrationSink: Send + Sync {
    /// Returns whether the face was saved.
    async fn register_name(&self, name: &str, pending: PendingRegistration) -> bool;
}

/// No knowledge base attached.
pub struct NullFaq;

impl FaqLookup for NullFaq {
    fn lookup(&self, _question: &str) -> Option<String> {
        None
    }
}

/// No tracking consumers attached.
pub struct NullTracking;

impl TrackingSink for NullTracking {}

/// Face registration unavailable; enrollment always fails politely.
pub struct NullRegistration;

#[async_trait]
impl RegistrationSink for NullRegistration {
    async fn register_name(&self, _name: &str, _pending: PendingRegistration) -> bool {
        false
    }
}
