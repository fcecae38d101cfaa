pub mod chunking;
pub mod composer;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod retriever;
pub mod session;
pub mod store;
pub mod stores;
pub mod traits;

pub use chunking::{build_chunks, merge_segments, split_text, ChunkingConfig, TextSegment};
pub use composer::{AnswerComposer, ComposerConfig, FallbackStyle};
pub use config::{EmbeddingBackend, Settings};
pub use embeddings::{
    CachingEmbedder, CharacterNgramEmbedder, Embedder, OllamaEmbedder,
    DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{
    ChatError, ConfigError, EmbeddingError, IngestError, ModelError, SearchError, ServiceError,
};
pub use extractor::{LopdfExtractor, PageText, PdfExtractor};
pub use ingest::{discover_pdf_files, IngestionReport, SkippedPdf};
pub use llm::{ModelConfig, OllamaModel};
pub use models::{
    AddReport, Answer, AnswerStatus, ChunkMetadata, ConversationTurn, DocumentChunk,
    DocumentFingerprint, IndexState, IngestionOptions, RetrievedChunk, Role, UploadedFile,
};
pub use orchestrator::{ChatbotService, IndexStatus, ServiceOptions};
pub use retriever::Retriever;
pub use session::ChatSession;
pub use stores::LocalVectorStore;
pub use traits::{LanguageModel, VectorIndex};
