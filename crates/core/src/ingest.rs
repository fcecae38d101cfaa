use crate::chunking::{build_chunks, ChunkingConfig};
use crate::extractor::PdfExtractor;
use crate::traits::VectorIndex;
use crate::{DocumentChunk, DocumentFingerprint, IngestError, UploadedFile};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub fn read_upload(path: &Path) -> Result<UploadedFile, IngestError> {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?;
    Ok(UploadedFile::new(name, fs::read(path)?))
}

/// Reads every path. Paths that cannot be read are returned as skipped.
pub fn read_uploads(paths: &[PathBuf]) -> (Vec<UploadedFile>, Vec<SkippedPdf>) {
    let mut uploads = Vec::with_capacity(paths.len());
    let mut unreadable = Vec::new();
    for path in paths {
        match read_upload(path) {
            Ok(upload) => uploads.push(upload),
            Err(error) => {
                warn!(path = %path.display(), %error, "skipped unreadable file");
                unreadable.push(SkippedPdf {
                    name: path.display().to_string(),
                    reason: error.to_string(),
                });
            }
        }
    }
    (uploads, unreadable)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedPdf {
    pub name: String,
    pub reason: String,
}

/// Chunks of every readable file plus the files that could not be read.
#[derive(Debug, Default)]
pub struct PreparedBatch {
    pub files: usize,
    pub chunks: Vec<DocumentChunk>,
    pub skipped_files: Vec<SkippedPdf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestionReport {
    pub files_processed: usize,
    pub chunk_ids: Vec<String>,
    pub chunks_added: usize,
    pub duplicates_skipped: usize,
    pub skipped_files: Vec<SkippedPdf>,
}

pub fn chunk_upload(
    extractor: &dyn PdfExtractor,
    file: &UploadedFile,
    config: ChunkingConfig,
) -> Result<Vec<DocumentChunk>, IngestError> {
    let text = extractor.extract_text(&file.name, &file.bytes)?;
    let fingerprint = DocumentFingerprint {
        source_name: file.name.clone(),
        checksum: digest_bytes(&file.bytes),
        ingested_at: Utc::now(),
    };
    build_chunks(&fingerprint, &text, config)
}

/// Extracts and splits every file. A failing file is recorded and the rest of
/// the batch continues. Chunk ids derive from the file name, so a later file
/// repeating an earlier name is skipped and reported.
pub fn prepare_batch(
    extractor: &dyn PdfExtractor,
    files: &[UploadedFile],
    config: ChunkingConfig,
) -> Result<PreparedBatch, IngestError> {
    config.validate()?;
    let mut batch = PreparedBatch {
        files: files.len(),
        ..PreparedBatch::default()
    };

    let mut seen_names = HashSet::new();
    for file in files {
        if !seen_names.insert(file.name.as_str()) {
            warn!(file = %file.name, "skipped pdf with a repeated file name");
            batch.skipped_files.push(SkippedPdf {
                name: file.name.clone(),
                reason: "duplicate file name in batch".to_string(),
            });
            continue;
        }

        match chunk_upload(extractor, file, config) {
            Ok(chunks) => {
                if chunks.is_empty() {
                    warn!(file = %file.name, "no extractable text");
                }
                batch.chunks.extend(chunks);
            }
            Err(error) => {
                warn!(file = %file.name, %error, "skipped pdf");
                batch.skipped_files.push(SkippedPdf {
                    name: file.name.clone(),
                    reason: error.to_string(),
                });
            }
        }
    }

    Ok(batch)
}

/// Adds uploads to the index. Chunks already stored are skipped and counted.
pub async fn ingest_uploads(
    index: &dyn VectorIndex,
    extractor: &dyn PdfExtractor,
    files: &[UploadedFile],
    config: ChunkingConfig,
) -> Result<IngestionReport, IngestError> {
    let batch = prepare_batch(extractor, files, config)?;
    let added = index.add(&batch.chunks).await?;

    let report = IngestionReport {
        files_processed: batch.files,
        chunk_ids: batch.chunks.iter().map(|chunk| chunk.id.clone()).collect(),
        chunks_added: added.added,
        duplicates_skipped: added.skipped_duplicates,
        skipped_files: batch.skipped_files,
    };
    info!(
        files = report.files_processed,
        added = report.chunks_added,
        duplicates = report.duplicates_skipped,
        failed = report.skipped_files.len(),
        "upload ingested"
    );
    Ok(report)
}

/// Reads `paths` from disk and adds them like [`ingest_uploads`]. Missing or
/// unreadable paths are reported and the rest of the batch continues.
pub async fn ingest_upload_paths(
    index: &dyn VectorIndex,
    extractor: &dyn PdfExtractor,
    paths: &[PathBuf],
    config: ChunkingConfig,
) -> Result<IngestionReport, IngestError> {
    let (uploads, unreadable) = read_uploads(paths);
    let mut report = ingest_uploads(index, extractor, &uploads, config).await?;
    report.files_processed = paths.len();
    report.skipped_files.splice(0..0, unreadable);
    Ok(report)
}

/// Rebuilds the index from every PDF below `folder`. A folder without PDFs
/// produces an empty index.
pub async fn rebuild_from_folder(
    index: &dyn VectorIndex,
    extractor: &dyn PdfExtractor,
    folder: &Path,
    config: ChunkingConfig,
) -> Result<IngestionReport, IngestError> {
    if !folder.is_dir() {
        return Err(IngestError::InvalidArgument(format!(
            "not a directory: {}",
            folder.display()
        )));
    }

    let paths = discover_pdf_files(folder);
    if paths.is_empty() {
        warn!(folder = %folder.display(), "no pdf files found");
    }

    let (uploads, unreadable) = read_uploads(&paths);
    let mut batch = prepare_batch(extractor, &uploads, config)?;
    batch.skipped_files.splice(0..0, unreadable);
    let rebuilt = index.rebuild(&batch.chunks).await?;

    let report = IngestionReport {
        files_processed: paths.len(),
        chunk_ids: batch.chunks.iter().map(|chunk| chunk.id.clone()).collect(),
        chunks_added: rebuilt.added,
        duplicates_skipped: rebuilt.skipped_duplicates,
        skipped_files: batch.skipped_files,
    };
    info!(
        folder = %folder.display(),
        files = report.files_processed,
        chunks = report.chunks_added,
        failed = report.skipped_files.len(),
        "index rebuilt from folder"
    );
    Ok(report)
}
