use crate::error::IngestError;
use crate::models::{ChunkMetadata, DocumentChunk, DocumentFingerprint, IngestionOptions};
use regex::Regex;
use std::sync::OnceLock;

const PARAGRAPH_BREAK: &str = r"\n[ \t]*\n";
const SENTENCE_END: &str = r#"[.!?]['")\]]*\s"#;

static PARAGRAPH_RE: OnceLock<Regex> = OnceLock::new();
static SENTENCE_RE: OnceLock<Regex> = OnceLock::new();

fn compiled(cell: &'static OnceLock<Regex>, pattern: &str) -> Result<&'static Regex, IngestError> {
    if let Some(re) = cell.get() {
        return Ok(re);
    }
    let re = Regex::new(pattern)?;
    Ok(cell.get_or_init(|| re))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        IngestionOptions::default().into()
    }
}

impl From<IngestionOptions> for ChunkingConfig {
    fn from(value: IngestionOptions) -> Self {
        Self {
            max_chars: value.chunk_max_chars,
            overlap_chars: value.chunk_overlap_chars,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.max_chars == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "max_chars must be greater than zero".to_string(),
            ));
        }
        if self.overlap_chars >= self.max_chars {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap_chars {} must be smaller than max_chars {}",
                self.overlap_chars, self.max_chars
            )));
        }
        Ok(())
    }
}

/// A contiguous slice of the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSegment {
    pub text: String,
    /// Offset of the first character in the source text, in chars.
    pub start: usize,
    /// Number of leading chars shared with the previous segment.
    pub overlap: usize,
}

/// Split strength of a cut position. Higher wins when picking a chunk end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Boundary {
    None,
    Word,
    Sentence,
    Paragraph,
}

/// Splits `text` into segments of at most `max_chars` characters.
///
/// Each segment ends on the strongest boundary found in the back half of its
/// window (paragraph, then sentence, then word) and falls back to a hard cut.
/// The next segment re-reads up to `overlap_chars` characters, starting on a
/// word boundary when one exists inside the overlap window.
pub fn split_text(text: &str, config: ChunkingConfig) -> Result<Vec<TextSegment>, IngestError> {
    config.validate()?;
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let byte_offsets: Vec<usize> = text
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_count = byte_offsets.len() - 1;
    let boundaries = classify_boundaries(text, &byte_offsets)?;

    let max = config.max_chars;
    let overlap = config.overlap_chars;
    let mut segments = Vec::new();
    let mut start = 0usize;
    let mut shared = 0usize;

    loop {
        let end = if char_count - start <= max {
            char_count
        } else {
            pick_end(&boundaries, start, max, overlap)
        };

        segments.push(TextSegment {
            text: text[byte_offsets[start]..byte_offsets[end]].to_string(),
            start,
            overlap: shared,
        });

        if end == char_count {
            break;
        }

        let next_start = pick_overlap_start(&boundaries, end, overlap);
        shared = end - next_start;
        start = next_start;
    }

    Ok(segments)
}

/// Rebuilds the source text from segments produced by [`split_text`].
pub fn merge_segments(segments: &[TextSegment]) -> String {
    let mut merged = String::new();
    for segment in segments {
        merged.extend(segment.text.chars().skip(segment.overlap));
    }
    merged
}

fn classify_boundaries(text: &str, byte_offsets: &[usize]) -> Result<Vec<Boundary>, IngestError> {
    let mut boundaries = vec![Boundary::None; byte_offsets.len()];

    let chars = text.chars();
    for (index, character) in chars.enumerate() {
        if character.is_whitespace() {
            boundaries[index + 1] = Boundary::Word;
        }
    }

    let sentence_re = compiled(&SENTENCE_RE, SENTENCE_END)?;
    let paragraph_re = compiled(&PARAGRAPH_RE, PARAGRAPH_BREAK)?;

    for (re, kind) in [(sentence_re, Boundary::Sentence), (paragraph_re, Boundary::Paragraph)] {
        for found in re.find_iter(text) {
            if let Ok(position) = byte_offsets.binary_search(&found.end()) {
                boundaries[position] = boundaries[position].max(kind);
            }
        }
    }

    Ok(boundaries)
}

fn pick_end(boundaries: &[Boundary], start: usize, max: usize, overlap: usize) -> usize {
    let hard = start + max;
    // Never cut so early that the overlap would reach back to `start`.
    let lower = start + (max / 2).max(overlap + 1);

    let mut best = (Boundary::None, hard);
    for position in (lower..=hard).rev() {
        if boundaries[position] > best.0 {
            best = (boundaries[position], position);
        }
    }
    best.1
}

fn pick_overlap_start(boundaries: &[Boundary], end: usize, overlap: usize) -> usize {
    let earliest = end - overlap;
    (earliest..end)
        .find(|&position| boundaries[position] >= Boundary::Word)
        .unwrap_or(earliest)
}

pub fn chunk_id(source_name: &str, index: usize) -> String {
    format!("{source_name}-chunk-{index}")
}

pub fn build_chunks(
    document: &DocumentFingerprint,
    text: &str,
    config: ChunkingConfig,
) -> Result<Vec<DocumentChunk>, IngestError> {
    if text.trim().is_empty() {
        config.validate()?;
        return Ok(Vec::new());
    }

    let chunks = split_text(text, config)?
        .into_iter()
        .enumerate()
        .map(|(index, segment)| DocumentChunk {
            id: chunk_id(&document.source_name, index),
            text: segment.text,
            metadata: ChunkMetadata {
                source: document.source_name.clone(),
                chunk_index: index,
                checksum: document.checksum.clone(),
                ingested_at: document.ingested_at,
            },
        })
        .collect();

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn config(max_chars: usize, overlap_chars: usize) -> ChunkingConfig {
        ChunkingConfig {
            max_chars,
            overlap_chars,
        }
    }

    fn fingerprint(name: &str) -> DocumentFingerprint {
        DocumentFingerprint {
            source_name: name.to_string(),
            checksum: "checksum".to_string(),
            ingested_at: Utc::now(),
        }
    }

    fn policy_text(len: usize) -> String {
        "Employees receive annual leave. ".chars().cycle().take(len).collect()
    }

    #[test]
    fn empty_text_yields_no_segments() {
        let segments = split_text("", ChunkingConfig::default()).unwrap();
        assert!(segments.is_empty());
    }

    #[test]
    fn short_text_is_a_single_segment() {
        let segments = split_text("Leave policy", ChunkingConfig::default()).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, "Leave policy");
        assert_eq!(segments[0].overlap, 0);
    }

    #[test]
    fn hard_cut_when_no_boundaries_exist() {
        let text = "abcdefghij".repeat(3);
        let segments = split_text(&text, config(10, 2)).unwrap();

        let lengths: Vec<usize> = segments.iter().map(|s| s.text.chars().count()).collect();
        assert_eq!(lengths, vec![10, 10, 10, 6]);
        assert_eq!(segments[0].text, "abcdefghij");
        assert_eq!(segments[1].text, "ijabcdefgh");
        assert_eq!(segments[1].overlap, 2);
    }

    #[test]
    fn prefers_paragraph_over_sentence_and_word() {
        let text = "First paragraph.\n\nSecond paragraph here is longer text";
        let segments = split_text(text, config(20, 5)).unwrap();
        assert_eq!(segments[0].text, "First paragraph.\n\n");
    }

    #[test]
    fn prefers_sentence_over_word() {
        let text = "Short one. Another sentence keeps going on";
        let segments = split_text(text, config(16, 3)).unwrap();
        assert_eq!(segments[0].text, "Short one. ");
    }

    #[test]
    fn segments_respect_size_and_overlap_limits() {
        let text = policy_text(5_000);
        let cfg = config(300, 40);
        let segments = split_text(&text, cfg).unwrap();

        assert!(segments.len() > 1);
        for segment in &segments {
            assert!(segment.text.chars().count() <= cfg.max_chars);
            assert!(segment.overlap <= cfg.overlap_chars);
        }
        assert_eq!(segments[0].overlap, 0);
    }

    #[test]
    fn boundary_patterns_compile_once() {
        let first = compiled(&SENTENCE_RE, SENTENCE_END).unwrap();
        let second = compiled(&SENTENCE_RE, SENTENCE_END).unwrap();
        assert!(std::ptr::eq(first, second));
        assert!(compiled(&PARAGRAPH_RE, PARAGRAPH_BREAK).unwrap().is_match("a\n \nb"));
    }

    #[test]
    fn merge_reconstructs_source_text() {
        let samples = [
            policy_text(2_345),
            "abcdefghij".repeat(57),
            "Überstunden werden vergütet. Café ☕ breaks are paid.\n\nNew section ✓ with text."
                .repeat(9),
            "one\n\n\n\ntwo three. four? five!\tsix".to_string(),
        ];

        for sample in samples {
            for cfg in [config(10, 0), config(37, 9), config(120, 30), config(1_000, 100)] {
                let segments = split_text(&sample, cfg).unwrap();
                assert_eq!(merge_segments(&segments), sample, "config {cfg:?}");
            }
        }
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let error = split_text("text", config(10, 10)).unwrap_err();
        assert!(matches!(error, IngestError::InvalidChunkConfig(_)));
    }

    #[test]
    fn single_page_of_2500_chars_yields_three_chunks() {
        let text = "x".repeat(2_500);
        let chunks = build_chunks(&fingerprint("file.pdf"), &text, ChunkingConfig::default()).unwrap();

        let ids: Vec<&str> = chunks.iter().map(|chunk| chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["file.pdf-chunk-0", "file.pdf-chunk-1", "file.pdf-chunk-2"]);

        let lengths: Vec<usize> = chunks.iter().map(|c| c.text.chars().count()).collect();
        assert_eq!(lengths, vec![1_000, 1_000, 700]);
    }

    #[test]
    fn prose_of_2500_chars_also_yields_three_chunks() {
        let text = policy_text(2_500);
        let chunks = build_chunks(&fingerprint("file.pdf"), &text, ChunkingConfig::default()).unwrap();

        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|chunk| chunk.text.chars().count() <= 1_000));
        assert_eq!(chunks[2].metadata.chunk_index, 2);
        assert_eq!(chunks[0].source(), "file.pdf");
    }

    #[test]
    fn chunk_ids_are_stable_across_runs() {
        let text = policy_text(3_100);
        let first = build_chunks(&fingerprint("a.pdf"), &text, ChunkingConfig::default()).unwrap();
        let second = build_chunks(&fingerprint("a.pdf"), &text, ChunkingConfig::default()).unwrap();

        let first_ids: Vec<_> = first.iter().map(|c| c.id.clone()).collect();
        let second_ids: Vec<_> = second.iter().map(|c| c.id.clone()).collect();
        assert_eq!(first_ids, second_ids);
    }

    #[test]
    fn whitespace_only_document_has_no_chunks() {
        let chunks = build_chunks(&fingerprint("blank.pdf"), " \n\n ", ChunkingConfig::default()).unwrap();
        assert!(chunks.is_empty());
    }
}
