use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use async_trait::async_trait;

use super::provider::LlmProvider;
use super::types::ChatRequest;
use crate::core::errors::ApiError;

pub enum EmbedMode {
    /// Bag-of-words vectors: texts sharing words land close together.
    Hashed(usize),
    /// Same vector for every input.
    Constant(Vec<f32>),
    /// Vectors of the wrong length.
    WrongDimension(usize),
    Fail,
}

/// Provider double with queued chat replies and synthetic embeddings.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<String, ApiError>>>,
    fallback_reply: Option<String>,
    embed_mode: EmbedMode,
    requests: Mutex<Vec<ChatRequest>>,
    embed_calls: Mutex<usize>,
}

impl ScriptedProvider {
    pub fn new(embed_mode: EmbedMode) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback_reply: None,
            embed_mode,
            requests: Mutex::new(Vec::new()),
            embed_calls: Mutex::new(0),
        }
    }

    /// Fails every chat and embedding call.
    pub fn failing() -> Self {
        Self::new(EmbedMode::Fail)
    }

    pub fn with_reply(self, reply: impl Into<String>) -> Self {
        self.replies.lock().unwrap().push_back(Ok(reply.into()));
        self
    }

    pub fn with_error(self, err: ApiError) -> Self {
        self.replies.lock().unwrap().push_back(Err(err));
        self
    }

    /// Returned once the queue is exhausted.
    pub fn with_fallback_reply(mut self, reply: impl Into<String>) -> Self {
        self.fallback_reply = Some(reply.into());
        self
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn embed_calls(&self) -> usize {
        *self.embed_calls.lock().unwrap()
    }
}

pub fn hashed_embedding(text: &str, dim: usize) -> Vec<f32> {
    let mut vector = vec![0.0; dim];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2)
    {
        let mut hasher = DefaultHasher::new();
        word.to_lowercase().hash(&mut hasher);
        vector[(hasher.finish() % dim as u64) as usize] += 1.0;
    }
    vector
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn health_check(&self) -> Result<bool, ApiError> {
        Ok(!matches!(self.embed_mode, EmbedMode::Fail))
    }

    async fn chat(&self, request: ChatRequest, _model_id: &str) -> Result<String, ApiError> {
        self.requests.lock().unwrap().push(request);
        if let Some(reply) = self.replies.lock().unwrap().pop_front() {
            return reply;
        }
        self.fallback_reply
            .clone()
            .ok_or(ApiError::ServiceUnavailable)
    }

    async fn embed(&self, inputs: &[String], _model_id: &str) -> Result<Vec<Vec<f32>>, ApiError> {
        *self.embed_calls.lock().unwrap() += 1;
        match &self.embed_mode {
            EmbedMode::Hashed(dim) => Ok(inputs
                .iter()
                .map(|text| hashed_embedding(text, *dim))
                .collect()),
            EmbedMode::Constant(vector) => Ok(inputs.iter().map(|_| vector.clone()).collect()),
            EmbedMode::WrongDimension(dim) => Ok(inputs.iter().map(|_| vec![1.0; *dim]).collect()),
            EmbedMode::Fail => Err(ApiError::ServiceUnavailable),
        }
    }
}
