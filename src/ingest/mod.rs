//! Write path: raw upload → text → analyzed chunk drafts.

pub mod analysis;
pub mod chunker;
pub mod extract;
pub mod topics;

pub use analysis::{analyze, ContentAnalysis};
pub use chunker::{ChunkDraft, SemanticChunker, SplitStrategy};
pub use extract::{FileStore, FileType, LocalFileStore, TextExtractor};
pub use topics::TopicExtractor;
