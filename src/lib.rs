pub mod core;
pub mod directory;
pub mod generation;
pub mod ingest;
pub mod llm;
pub mod pipeline;
pub mod rag;
pub mod security;
pub mod state;
pub mod text;
