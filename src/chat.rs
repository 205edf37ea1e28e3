//! Streaming chat backend over an OpenAI-compatible completions API.
//!
//! Replies are consumed as an SSE token stream and regrouped into
//! sentences; each sentence is yielded the moment its terminator arrives,
//! so the speak pipeline can voice the leading edge of a long answer
//! while the rest is still generating.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::json;
use tracing::debug;

use crate::config::ChatConfig;
use crate::error::{Result, VoiceError};
use crate::hooks::{AiBackend, SentenceStream};
use crate::segment::drain_sentences;
use crate::state::SharedState;
use std::sync::Arc;

/// Baseline voice-assistant behaviour, always present regardless of the
/// active persona.
const SYSTEM_PROMPT: &str = "You are OMNIS, a friendly and lifelike school kiosk robot. \
Keep answers conversational, short (2-3 sentences), and helpful. \
Never start your response with 'AI:' or 'OMNIS:'. Be natural.";

pub struct ChatBackend {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    state: Arc<SharedState>,
}

impl ChatBackend {
    #[must_use]
    pub fn new(config: &ChatConfig, state: Arc<SharedState>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: config.api_url.trim_end_matches('/').to_owned(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            state,
        }
    }

    fn system_prompt(&self, user: Option<&str>) -> String {
        let mut prompt = String::from(SYSTEM_PROMPT);
        if let Some(flavor) = self.state.persona().prompt_flavor() {
            prompt.push(' ');
            prompt.push_str(flavor);
        }
        let now = chrono::Local::now();
        prompt.push_str(&format!(
            " Current time: {}. Current date: {}. User mood: {}.",
            now.format("%I:%M %p"),
            now.format("%A, %B %d, %Y"),
            self.state.mood().as_str(),
        ));
        if let Some(user) = user {
            prompt.push_str(&format!(" You are talking to {user}."));
        }
        prompt
    }
}

/// Pull the token text out of one SSE data payload, if it carries any.
fn delta_content(data: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(data).ok()?;
    value["choices"][0]["delta"]["content"]
        .as_str()
        .map(str::to_owned)
}

/// Drop markdown the voice cannot speak.
fn strip_markup(sentence: &str) -> String {
    sentence.replace(['*', '#'], "")
}

#[async_trait]
impl AiBackend for ChatBackend {
    async fn stream_reply(&self, question: &str, user: Option<&str>) -> Result<SentenceStream> {
        let body = json!({
            "model": self.model,
            "stream": true,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "messages": [
                {"role": "system", "content": self.system_prompt(user)},
                {"role": "user", "content": question},
            ],
        });

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| VoiceError::Chat(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VoiceError::Chat(format!("status {status}: {body}")));
        }

        let mut bytes = response.bytes_stream();

        let stream = async_stream::stream! {
            let mut line_buf = String::new();
            let mut acc = String::new();
            let mut done = false;

            while !done {
                let Some(chunk) = bytes.next().await else { break };
                let Ok(chunk) = chunk else {
                    debug!("reply stream interrupted mid-response");
                    break;
                };
                line_buf.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(newline) = line_buf.find('\n') {
                    let line: String = line_buf.drain(..=newline).collect();
                    let line = line.trim();
                    let Some(data) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let data = data.trim();
                    if data == "[DONE]" {
                        done = true;
                        break;
                    }
                    if let Some(content) = delta_content(data) {
                        acc.push_str(&content);
                        for sentence in drain_sentences(&mut acc) {
                            yield strip_markup(&sentence);
                        }
                    }
                }
            }

            let tail = acc.trim();
            if !tail.is_empty() {
                yield strip_markup(tail);
            }
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(server: &MockServer) -> ChatBackend {
        ChatBackend::new(
            &ChatConfig {
                api_url: server.uri(),
                api_key: "sk-test".to_owned(),
                model: "gpt-4o-mini".to_owned(),
                max_tokens: 300,
                temperature: 0.7,
            },
            Arc::new(SharedState::new()),
        )
    }

    fn sse_body(tokens: &[&str]) -> String {
        let mut body = String::new();
        for token in tokens {
            let event = json!({"choices": [{"delta": {"content": token}}]});
            body.push_str(&format!("data: {event}\n\n"));
        }
        body.push_str("data: [DONE]\n\n");
        body
    }

    #[tokio::test]
    async fn sentences_arrive_in_order_before_stream_ends() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_string(sse_body(&[
                "The school ",
                "opened in 1983. ",
                "It now has ",
                "2900 students.",
            ])))
            .mount(&server)
            .await;

        let mut stream = backend(&server)
            .stream_reply("when did the school open", Some("Asha"))
            .await
            .unwrap();

        let mut sentences = Vec::new();
        while let Some(sentence) = stream.next().await {
            sentences.push(sentence);
        }
        assert_eq!(
            sentences,
            vec![
                "The school opened in 1983.".to_owned(),
                "It now has 2900 students.".to_owned(),
            ]
        );
    }

    #[tokio::test]
    async fn unterminated_tail_is_flushed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(sse_body(&["Sure! ", "Ask me anything"])),
            )
            .mount(&server)
            .await;

        let mut stream = backend(&server).stream_reply("hi", None).await.unwrap();
        let mut sentences = Vec::new();
        while let Some(sentence) = stream.next().await {
            sentences.push(sentence);
        }
        assert_eq!(
            sentences,
            vec!["Sure!".to_owned(), "Ask me anything".to_owned()]
        );
    }

    #[tokio::test]
    async fn backend_failure_surfaces_as_chat_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = backend(&server).stream_reply("hi", None).await.err().unwrap();
        assert!(matches!(err, VoiceError::Chat(_)));
    }

    #[test]
    fn markup_is_stripped_for_speech() {
        assert_eq!(strip_markup("**Bold** and #tagged"), "Bold and tagged");
    }

    #[test]
    fn delta_parsing_ignores_other_events() {
        assert!(delta_content(r#"{"choices":[{"finish_reason":"stop"}]}"#).is_none());
        assert_eq!(
            delta_content(r#"{"choices":[{"delta":{"content":"hi"}}]}"#),
            Some("hi".to_owned())
        );
    }
}
