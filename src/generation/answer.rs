use serde::Serialize;

use super::prompt::preview;
use crate::rag::{ChunkType, ContextBundle};

pub const ANSWER_CONTEXT_CHUNKS: usize = 5;
const ANSWER_SOURCES: usize = 3;
const SOURCE_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerSource {
    pub title: String,
    pub chunk_type: ChunkType,
    pub preview: String,
    pub similarity: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<AnswerSource>,
    pub confidence: f32,
    pub context_used: bool,
}

impl Answer {
    /// Wraps an LLM reply with the top sources of `bundle`.
    pub fn from_reply(text: String, bundle: &ContextBundle) -> Self {
        let context_used = !bundle.relevant_chunks.is_empty();
        let sources = bundle
            .relevant_chunks
            .iter()
            .take(ANSWER_SOURCES)
            .map(|hit| AnswerSource {
                title: hit.chunk.source_title.clone(),
                chunk_type: hit.chunk.chunk_type,
                preview: preview(&hit.chunk.content, SOURCE_PREVIEW_CHARS),
                similarity: hit.similarity,
            })
            .collect();

        Self {
            text,
            sources,
            confidence: if context_used { 0.8 } else { 0.3 },
            context_used,
        }
    }
}
