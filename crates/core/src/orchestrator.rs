use crate::chunking::ChunkingConfig;
use crate::composer::{AnswerComposer, ComposerConfig};
use crate::config::{EmbeddingBackend, Settings};
use crate::embeddings::{CachingEmbedder, CharacterNgramEmbedder, Embedder, OllamaEmbedder};
use crate::extractor::{LopdfExtractor, PdfExtractor};
use crate::ingest::{ingest_upload_paths, ingest_uploads, rebuild_from_folder, IngestionReport};
use crate::llm::OllamaModel;
use crate::retriever::{Retriever, DEFAULT_TOP_K};
use crate::stores::LocalVectorStore;
use crate::traits::{LanguageModel, VectorIndex};
use crate::{
    Answer, ChatError, ConversationTurn, IndexState, IngestError, SearchError, ServiceError,
    UploadedFile,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, instrument};

#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub chunking: ChunkingConfig,
    pub top_k: usize,
    pub composer: ComposerConfig,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            chunking: ChunkingConfig::default(),
            top_k: DEFAULT_TOP_K,
            composer: ComposerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStatus {
    pub collection: String,
    pub state: IndexState,
    pub chunks: usize,
}

/// Ingestion and question answering over one vector index.
///
/// All collaborators are injected, so tests can run the whole pipeline
/// against an in-memory index and a stub model.
pub struct ChatbotService {
    index: Arc<dyn VectorIndex>,
    retriever: Retriever,
    composer: AnswerComposer,
    extractor: Arc<dyn PdfExtractor>,
    chunking: ChunkingConfig,
}

impl ChatbotService {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        model: Arc<dyn LanguageModel>,
        options: ServiceOptions,
    ) -> Self {
        Self {
            retriever: Retriever::new(Arc::clone(&index), options.top_k),
            composer: AnswerComposer::new(model, options.composer),
            extractor: Arc::new(LopdfExtractor),
            chunking: options.chunking,
            index,
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn PdfExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Opens the durable index under `settings.store` and connects the
    /// configured embedding and generation backends.
    pub async fn open(settings: &Settings) -> Result<Self, ServiceError> {
        settings.validate()?;

        let embedder = embedder_from_settings(settings)?;
        let store = LocalVectorStore::open(
            &settings.store.persist_dir,
            settings.store.collection.clone(),
            embedder,
        )
        .await?;
        let model = OllamaModel::new(settings.model_config())?;

        info!(
            collection = %settings.store.collection,
            persist_dir = %settings.store.persist_dir.display(),
            chat_model = %model.model_name(),
            "chatbot service opened"
        );

        let options = ServiceOptions {
            chunking: settings.chunking_config(),
            top_k: settings.retrieval.top_k,
            composer: settings.composer_config(),
        };
        Ok(Self::new(Arc::new(store), Arc::new(model), options))
    }

    pub async fn close(&self) {
        self.index.close().await;
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    pub async fn status(&self) -> Result<IndexStatus, SearchError> {
        let state = self.index.state().await;
        let chunks = match state {
            IndexState::Uninitialized => 0,
            IndexState::Building | IndexState::Ready => self.index.len().await?,
        };
        Ok(IndexStatus {
            collection: self.index.collection().to_string(),
            state,
            chunks,
        })
    }

    /// Adds uploaded PDFs to the index. Files that cannot be read are
    /// reported and skipped.
    pub async fn upload(&self, files: &[UploadedFile]) -> Result<IngestionReport, IngestError> {
        ingest_uploads(self.index.as_ref(), self.extractor.as_ref(), files, self.chunking).await
    }

    /// Reads PDFs from disk and adds them. Paths that cannot be read are
    /// reported alongside files that cannot be parsed.
    pub async fn upload_paths(&self, paths: &[PathBuf]) -> Result<IngestionReport, IngestError> {
        ingest_upload_paths(self.index.as_ref(), self.extractor.as_ref(), paths, self.chunking).await
    }

    /// Replaces the index with the PDFs found below `folder`.
    pub async fn build_from_folder(&self, folder: &Path) -> Result<IngestionReport, IngestError> {
        rebuild_from_folder(self.index.as_ref(), self.extractor.as_ref(), folder, self.chunking)
            .await
    }

    /// Retrieves context for `question` and composes a grounded answer.
    #[instrument(skip_all, fields(collection = %self.index.collection()))]
    pub async fn ask(
        &self,
        question: &str,
        history: &[ConversationTurn],
    ) -> Result<Answer, ChatError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ChatError::EmptyQuestion);
        }

        let chunks = self.retriever.retrieve(question).await?;
        let answer = self.composer.compose(question, &chunks, history).await?;

        info!(
            retrieved = chunks.len(),
            status = ?answer.status,
            sources = ?answer.sources,
            "question answered"
        );
        Ok(answer)
    }
}

pub fn embedder_from_settings(settings: &Settings) -> Result<Arc<dyn Embedder>, ServiceError> {
    let embedding = &settings.embedding;
    let embedder: Arc<dyn Embedder> = match embedding.backend {
        EmbeddingBackend::Hashed => Arc::new(CachingEmbedder::new(CharacterNgramEmbedder {
            dimensions: embedding.dimensions,
        })),
        EmbeddingBackend::Ollama => Arc::new(CachingEmbedder::new(OllamaEmbedder::new(
            &embedding.endpoint,
            embedding.model.clone(),
            embedding.timeout(),
        )?)),
    };
    Ok(embedder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composer::tests::StubModel;
    use crate::composer::{FallbackStyle, STRICT_FALLBACK};
    use crate::error::EmbeddingError;
    use crate::extractor::tests::pdf_with_pages;
    use crate::AnswerStatus;
    use async_trait::async_trait;
    use tempfile::tempdir;

    fn in_memory_service(model: &Arc<StubModel>, options: ServiceOptions) -> ChatbotService {
        let index = LocalVectorStore::in_memory(
            "hr_brochures",
            Arc::new(CharacterNgramEmbedder::default()),
        );
        ChatbotService::new(
            Arc::new(index),
            Arc::clone(model) as Arc<dyn LanguageModel>,
            options,
        )
    }

    /// Embeds documents but times out on anything phrased as a question.
    struct QuestionTimeoutEmbedder;

    #[async_trait]
    impl Embedder for QuestionTimeoutEmbedder {
        fn model_name(&self) -> &str {
            "char-trigram"
        }

        fn dimensions(&self) -> Option<usize> {
            Some(128)
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            if text.ends_with('?') {
                return Err(EmbeddingError::Timeout("http://embedder/api/embeddings".to_string()));
            }
            Ok(CharacterNgramEmbedder::default().embed_sync(text))
        }
    }

    #[tokio::test]
    async fn empty_index_answers_without_calling_the_model() {
        let model = Arc::new(StubModel::replying("unused"));
        let service = in_memory_service(
            &model,
            ServiceOptions {
                composer: ComposerConfig {
                    fallback_style: FallbackStyle::Strict,
                    ..ComposerConfig::default()
                },
                ..ServiceOptions::default()
            },
        );

        let answer = service.ask("What is the leave policy?", &[]).await.unwrap();

        assert_eq!(answer.status, AnswerStatus::InsufficientContext);
        assert_eq!(answer.text, STRICT_FALLBACK);
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn uploaded_brochure_grounds_the_answer() {
        let model = Arc::new(StubModel::replying(
            "**Summary:** Employees receive 14 days annual leave.\n*Source:* leave.pdf",
        ));
        let service = in_memory_service(&model, ServiceOptions::default());

        let report = service
            .upload(&[UploadedFile::new(
                "leave.pdf",
                pdf_with_pages(&[Some("Employees receive 14 days annual leave")]),
            )])
            .await
            .unwrap();
        assert_eq!(report.chunks_added, 1);

        let answer = service.ask("What is the leave policy?", &[]).await.unwrap();

        assert_eq!(answer.status, AnswerStatus::Answered);
        assert!(answer.text.contains("14 days"));
        assert_eq!(answer.sources, vec!["leave.pdf".to_string()]);
        assert!(model.last_prompt().contains("Employees receive 14 days annual leave"));
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn upload_paths_keeps_going_past_a_missing_file() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let good = dir.path().join("leave.pdf");
        std::fs::write(&good, pdf_with_pages(&[Some("Employees receive 14 days annual leave")]))?;

        let model = Arc::new(StubModel::replying("**Summary:** 14 days."));
        let service = in_memory_service(&model, ServiceOptions::default());
        let report = service
            .upload_paths(&[dir.path().join("missing.pdf"), good])
            .await?;

        assert_eq!(report.chunks_added, 1);
        assert_eq!(report.skipped_files.len(), 1);
        assert!(report.skipped_files[0].name.ends_with("missing.pdf"));

        let answer = service.ask("What is the leave policy?", &[]).await?;
        assert_eq!(answer.sources, vec!["leave.pdf".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn blank_question_is_rejected() {
        let model = Arc::new(StubModel::replying("unused"));
        let service = in_memory_service(&model, ServiceOptions::default());

        let error = service.ask("   \n", &[]).await.unwrap_err();
        assert!(matches!(error, ChatError::EmptyQuestion));
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn embedding_timeout_surfaces_as_an_error() {
        let model = Arc::new(StubModel::replying("unused"));
        let index = LocalVectorStore::in_memory("hr_brochures", Arc::new(QuestionTimeoutEmbedder));
        let service = ChatbotService::new(
            Arc::new(index),
            Arc::clone(&model) as Arc<dyn LanguageModel>,
            ServiceOptions::default(),
        );
        service
            .upload(&[UploadedFile::new(
                "leave.pdf",
                pdf_with_pages(&[Some("Employees receive 14 days annual leave")]),
            )])
            .await
            .unwrap();

        let error = service.ask("What is the leave policy?", &[]).await.unwrap_err();

        assert!(matches!(
            error,
            ChatError::Search(SearchError::Embedding(EmbeddingError::Timeout(_)))
        ));
        assert!(error.is_retryable());
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn closed_service_reports_unavailable_index() {
        let model = Arc::new(StubModel::replying("unused"));
        let service = in_memory_service(&model, ServiceOptions::default());
        service.close().await;

        let error = service.ask("What is the leave policy?", &[]).await.unwrap_err();
        assert!(matches!(error, ChatError::Search(SearchError::IndexUnavailable(_))));

        let status = service.status().await.unwrap();
        assert_eq!(status.state, IndexState::Uninitialized);
        assert_eq!(status.chunks, 0);
    }

    #[tokio::test]
    async fn open_from_settings_persists_folder_builds() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let brochures = dir.path().join("brochures");
        std::fs::create_dir(&brochures)?;
        std::fs::write(
            brochures.join("leave.pdf"),
            pdf_with_pages(&[Some("Employees receive 14 days annual leave")]),
        )?;
        std::fs::write(
            brochures.join("benefits.pdf"),
            pdf_with_pages(&[Some("Health insurance covers dependants")]),
        )?;

        let mut settings = Settings::default();
        settings.store.persist_dir = dir.path().join("db");
        settings.embedding.backend = EmbeddingBackend::Hashed;

        let service = ChatbotService::open(&settings).await?;
        let report = service.build_from_folder(&brochures).await?;
        assert_eq!(report.files_processed, 2);
        assert_eq!(report.chunks_added, 2);
        service.close().await;

        let reopened = ChatbotService::open(&settings).await?;
        let status = reopened.status().await?;
        assert_eq!(status.collection, "hr_brochures");
        assert_eq!(status.state, IndexState::Ready);
        assert_eq!(status.chunks, 2);
        Ok(())
    }

    #[test]
    fn hashed_backend_uses_configured_dimensions() {
        let mut settings = Settings::default();
        settings.embedding.backend = EmbeddingBackend::Hashed;
        settings.embedding.dimensions = 32;

        let embedder = embedder_from_settings(&settings).unwrap();
        assert_eq!(embedder.dimensions(), Some(32));
        assert_eq!(embedder.model_name(), "char-trigram");
    }
}
