//! Reply generation with an accompanying expression frame.

use crate::error::Result;
use crate::expression::{EmotionCue, ExpressionFrame, ExpressionGenerator};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

/// Text produced for one utterance, with an optional emotion label.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub text: String,
    pub emotion: Option<EmotionCue>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            emotion: None,
        }
    }

    pub fn with_emotion(mut self, cue: EmotionCue) -> Self {
        self.emotion = Some(cue);
        self
    }
}

/// Conversational text generation. Opaque to this crate.
#[async_trait]
pub trait ReplyBackend: Send + Sync {
    async fn reply(&self, session_id: &str, utterance: &str) -> Result<Reply>;
}

/// Replies with the utterance itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoBackend;

#[async_trait]
impl ReplyBackend for EchoBackend {
    async fn reply(&self, _session_id: &str, utterance: &str) -> Result<Reply> {
        Ok(Reply::text(utterance))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatResponse {
    pub response: String,
    #[serde(rename = "expressionData")]
    pub expression_data: ExpressionFrame,
}

/// Pairs every backend reply with a frame generated from the reply text.
#[derive(Clone)]
pub struct ChatService {
    backend: Arc<dyn ReplyBackend>,
    generator: ExpressionGenerator,
}

impl ChatService {
    pub fn new(backend: Arc<dyn ReplyBackend>) -> Self {
        Self {
            backend,
            generator: ExpressionGenerator::new(),
        }
    }

    pub fn with_generator(mut self, generator: ExpressionGenerator) -> Self {
        self.generator = generator;
        self
    }

    pub async fn respond(&self, session_id: &str, user_id: &str, message: &str) -> Result<ChatResponse> {
        let reply = self.backend.reply(session_id, message).await?;
        tracing::debug!(
            session = session_id,
            user = user_id,
            emotion = ?reply.emotion,
            "reply generated"
        );

        let frame = self.generator.generate_with_emotion(&reply.text, reply.emotion);
        Ok(ChatResponse {
            response: reply.text,
            expression_data: frame,
        })
    }
}

impl Default for ChatService {
    fn default() -> Self {
        Self::new(Arc::new(EchoBackend))
    }
}
